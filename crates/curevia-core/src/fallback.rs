//! Generative fallback adapter
//!
//! Wraps a [`CompletionProvider`] with a hard deadline. The returned fragment
//! stream owns a cancellation token: the deadline firing or the consumer
//! dropping the stream both cancel the outbound call.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ResolveError, Result};
use crate::providers::{CompletionProvider, CompletionRequest};

/// Fragments of one generative answer
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Clone)]
pub struct GenerativeFallback {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for GenerativeFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeFallback")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GenerativeFallback {
    pub fn new(provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_configured()
    }

    /// Lazy, finite, forward-only sequence of fragments. Ends with an error
    /// on timeout, provider failure or an empty completion.
    pub fn stream(&self, request: CompletionRequest) -> FragmentStream {
        let provider = Arc::clone(&self.provider);
        let timeout = self.timeout;

        Box::pin(async_stream::stream! {
            let cancel = CancellationToken::new();
            let _guard = cancel.clone().drop_guard();
            let deadline = Instant::now() + timeout;
            let started = Instant::now();

            let opened = tokio::time::timeout_at(deadline, provider.stream(request, cancel.clone())).await;
            let mut fragments = match opened {
                Err(_) => {
                    cancel.cancel();
                    warn!(?timeout, "Completion provider timed out before responding");
                    yield Err(ResolveError::UpstreamTimeout(timeout));
                    return;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Completion provider failed");
                    yield Err(ResolveError::from(e));
                    return;
                }
                Ok(Ok(fragments)) => fragments,
            };

            let mut produced = false;
            loop {
                match tokio::time::timeout_at(deadline, fragments.next()).await {
                    Err(_) => {
                        cancel.cancel();
                        warn!(?timeout, "Completion stream timed out");
                        yield Err(ResolveError::UpstreamTimeout(timeout));
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Ok(text))) => {
                        if !text.is_empty() {
                            produced = true;
                            yield Ok(text);
                        }
                    }
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "Completion stream failed");
                        yield Err(ResolveError::from(e));
                        return;
                    }
                }
            }

            if produced {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Completion finished");
            } else {
                warn!("Completion provider returned no text");
                yield Err(ResolveError::Upstream("empty completion".to_string()));
            }
        })
    }

    /// Blocking variant: drain the stream and concatenate
    pub async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut stream = self.stream(request);
        let mut out = String::new();
        while let Some(fragment) = stream.next().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::TextStream;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Scripted {
        fragments: Vec<&'static str>,
        delay: Duration,
        token: Arc<Mutex<Option<CancellationToken>>>,
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
            cancel: CancellationToken,
        ) -> std::result::Result<TextStream, ProviderError> {
            *self.token.lock() = Some(cancel);
            let fragments = self.fragments.clone();
            let delay = self.delay;
            Ok(Box::pin(async_stream::stream! {
                for f in fragments {
                    tokio::time::sleep(delay).await;
                    yield Ok::<_, ProviderError>(f.to_string());
                }
            }))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "s".into(),
            user_prompt: "u".into(),
            max_output_tokens: 220,
        }
    }

    fn fallback(
        fragments: Vec<&'static str>,
        delay: Duration,
        timeout: Duration,
    ) -> (GenerativeFallback, Arc<Mutex<Option<CancellationToken>>>) {
        let token = Arc::new(Mutex::new(None));
        let provider = Scripted {
            fragments,
            delay,
            token: Arc::clone(&token),
        };
        (GenerativeFallback::new(Arc::new(provider), timeout), token)
    }

    #[tokio::test]
    async fn test_complete_concatenates() {
        let (fb, _) = fallback(vec!["Hej ", "där."], Duration::ZERO, Duration::from_secs(5));
        assert_eq!(fb.complete(request()).await.unwrap(), "Hej där.");
    }

    #[tokio::test]
    async fn test_empty_completion_is_an_error() {
        let (fb, _) = fallback(vec![], Duration::ZERO, Duration::from_secs(5));
        assert!(matches!(fb.complete(request()).await, Err(ResolveError::Upstream(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_provider() {
        let (fb, token) = fallback(
            vec!["a", "b", "c"],
            Duration::from_secs(10),
            Duration::from_secs(18),
        );
        let result = fb.complete(request()).await;
        assert!(matches!(result, Err(ResolveError::UpstreamTimeout(_))));
        assert!(token.lock().as_ref().unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels() {
        let (fb, token) = fallback(vec!["a", "b"], Duration::from_millis(5), Duration::from_secs(5));
        let mut stream = fb.stream(request());
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(!token.lock().as_ref().unwrap().is_cancelled());
        drop(stream);
        assert!(token.lock().as_ref().unwrap().is_cancelled());
    }
}
