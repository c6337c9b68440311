//! Ingress gate: client identification, general rate limiting and the
//! request body cap

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap};
use curevia_core::RateLimiter;
use futures::StreamExt;
use std::net::SocketAddr;

use crate::{GatewayError, Result};

/// Identifier used for rate limiting: the first `X-Forwarded-For` entry,
/// else the peer address, else `"unknown"`
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Short digest of a client identifier for log lines
pub fn client_digest(client: &str) -> String {
    let hash = blake3::hash(client.as_bytes());
    hash.to_hex()[..12].to_string()
}

/// Admission control in front of the pipeline
#[derive(Debug, Clone)]
pub struct IngressGate {
    general: RateLimiter,
    max_payload_bytes: usize,
}

impl IngressGate {
    pub fn new(general_per_minute: u32, max_payload_bytes: usize) -> Self {
        Self {
            general: RateLimiter::new(general_per_minute),
            max_payload_bytes,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.general
    }

    /// Count one request against the general ceiling
    pub fn admit(&self, client: &str) -> Result<()> {
        if self.general.check(client) {
            Ok(())
        } else {
            tracing::info!(client = %client_digest(client), "General rate limit exceeded");
            Err(GatewayError::RateLimitExceeded("general requests".to_string()))
        }
    }

    /// Read the body, rejecting a declared length above the cap up front
    /// and stopping as soon as the streamed bytes exceed it
    pub async fn read_body(&self, headers: &HeaderMap, body: Body) -> Result<Bytes> {
        let limit = self.max_payload_bytes;
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(GatewayError::PayloadTooLarge { limit });
        }

        let mut buf = Vec::with_capacity(declared.unwrap_or(0));
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GatewayError::BadRequest(format!("reading body: {e}")))?;
            if buf.len() + chunk.len() > limit {
                return Err(GatewayError::PayloadTooLarge { limit });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buf))
    }

    /// Drop expired counters
    pub fn cleanup(&self) {
        self.general.cleanup();
    }
}
