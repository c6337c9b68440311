//! Conversation sessions
//!
//! Language preference and slot-filling state per session token. Reads
//! prefer the durable store and fall back to a volatile in-process map;
//! writes always land in the map and are written through with a renewed
//! expiry. Durable failures are logged, never raised.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SessionStoreError;
use crate::language::Language;
use crate::storage::{migrate, open_database, Migration};

/// Default session lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Sessions held in the in-process map before the least recently seen
/// are evicted
pub const DEFAULT_VOLATILE_CAPACITY: usize = 10_000;

const MAX_TOKEN_LEN: usize = 128;
const MAX_SLOT_VALUE_CHARS: usize = 200;
const MAX_SLOTS: usize = 32;

pub mod slots {
    pub const ROLE: &str = "role";
    pub const LAST_INVOICE: &str = "last_invoice";
    pub const LAST_SOURCE: &str = "last_source";
}

/// Opaque session token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh token
    pub fn new() -> Self {
        Self(format!("sess-{}", Uuid::new_v4()))
    }

    /// Accept a caller-supplied token if it is short and printable
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_TOKEN_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'));
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State carried across turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub slots: BTreeMap<String, String>,
    pub last_seen: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            language: None,
            slots: BTreeMap::new(),
            last_seen: Utc::now(),
        }
    }
}

impl SessionState {
    pub fn slot(&self, key: &str) -> Option<&str> {
        self.slots.get(key).map(String::as_str)
    }

    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.last_seen);
        age.num_seconds() > ttl.as_secs() as i64
    }

    /// Merge a patch; slot values are capped and the slot map is bounded
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(lang) = patch.language {
            self.language = Some(lang);
        }
        for (key, value) in patch.slots {
            if self.slots.len() >= MAX_SLOTS && !self.slots.contains_key(&key) {
                debug!(key = %key, "Slot map full, dropping slot");
                continue;
            }
            let value: String = value.chars().take(MAX_SLOT_VALUE_CHARS).collect();
            self.slots.insert(key, value);
        }
        self.last_seen = Utc::now();
    }
}

/// Partial update produced by one turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub language: Option<Language>,
    pub slots: BTreeMap<String, String>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, lang: Language) -> Self {
        self.language = Some(lang);
        self
    }

    pub fn with_slot(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.slots.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.language.is_none() && self.slots.is_empty()
    }
}

/// Durable key-value backend for session state
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a live session; expired rows read as absent
    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>, SessionStoreError>;

    /// Save with an expiry `ttl` from now
    async fn save(&self, id: &SessionId, state: &SessionState, ttl: Duration) -> Result<(), SessionStoreError>;

    /// Delete expired rows; returns how many
    async fn purge_expired(&self) -> Result<usize, SessionStoreError>;
}

const MIGRATIONS: &[Migration] = &[Migration {
    name: "101_sessions",
    sql: "
        CREATE TABLE IF NOT EXISTS sessions (
            token       TEXT PRIMARY KEY,
            state_json  TEXT NOT NULL,
            expires_at  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
    ",
}];

/// Session store on SQLite with an `expires_at` column
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore").finish_non_exhaustive()
    }
}

impl SqliteSessionStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut conn = open_database(path)?;
        migrate(&mut conn, MIGRATIONS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, SessionStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SessionStoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| SessionStoreError::Store(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>, SessionStoreError> {
        let token = id.as_str().to_string();
        let now = Utc::now().timestamp();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT state_json FROM sessions WHERE token = ?1 AND expires_at > ?2",
                    params![token, now],
                    |row| row.get(0),
                )
                .optional()?;
            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn save(&self, id: &SessionId, state: &SessionState, ttl: Duration) -> Result<(), SessionStoreError> {
        let token = id.as_str().to_string();
        let json = serde_json::to_string(state)?;
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (token, state_json, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(token) DO UPDATE SET state_json = excluded.state_json,
                                                  expires_at = excluded.expires_at",
                params![token, json, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn purge_expired(&self) -> Result<usize, SessionStoreError> {
        let now = Utc::now().timestamp();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
            Ok(removed)
        })
        .await
    }
}

/// Durable store plus volatile fallback
#[derive(Clone)]
pub struct SessionManager {
    durable: Option<Arc<dyn SessionStore>>,
    volatile: Arc<RwLock<HashMap<SessionId, SessionState>>>,
    ttl: Duration,
    capacity: usize,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("durable", &self.durable.is_some())
            .field("volatile", &self.volatile.read().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionManager {
    /// Volatile-only manager
    pub fn in_memory() -> Self {
        Self {
            durable: None,
            volatile: Arc::new(RwLock::new(HashMap::new())),
            ttl: DEFAULT_TTL,
            capacity: DEFAULT_VOLATILE_CAPACITY,
        }
    }

    pub fn with_store(store: Arc<dyn SessionStore>) -> Self {
        Self {
            durable: Some(store),
            ..Self::in_memory()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_volatile_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Make room for `id` in the volatile map: expired entries go first,
    /// then the least recently seen.
    fn make_room(&self, volatile: &mut HashMap<SessionId, SessionState>, id: &SessionId) {
        if volatile.len() < self.capacity || volatile.contains_key(id) {
            return;
        }
        let now = Utc::now();
        let ttl = self.ttl;
        volatile.retain(|_, s| !s.is_expired(ttl, now));
        while volatile.len() >= self.capacity {
            let oldest = volatile
                .iter()
                .min_by_key(|(_, s)| s.last_seen)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    volatile.remove(&key);
                }
                None => break,
            }
        }
        debug!(capacity = self.capacity, "Evicted in-process sessions");
    }

    fn volatile_get(&self, id: &SessionId) -> Option<SessionState> {
        let now = Utc::now();
        self.volatile
            .read()
            .get(id)
            .filter(|s| !s.is_expired(self.ttl, now))
            .cloned()
    }

    /// Current state; unknown tokens start empty
    pub async fn get(&self, id: &SessionId) -> SessionState {
        if let Some(store) = &self.durable {
            match store.load(id).await {
                Ok(Some(state)) => {
                    let mut volatile = self.volatile.write();
                    self.make_room(&mut volatile, id);
                    volatile.insert(id.clone(), state.clone());
                    return state;
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(error = %e, "Session store read failed, using in-process state");
                }
            }
        }
        self.volatile_get(id).unwrap_or_default()
    }

    /// Merge `patch` into the session and write it through
    pub async fn patch(&self, id: &SessionId, patch: SessionPatch) {
        if patch.is_empty() {
            return;
        }
        let state = {
            let mut volatile = self.volatile.write();
            self.make_room(&mut volatile, id);
            let state = volatile.entry(id.clone()).or_default();
            state.apply(patch);
            state.clone()
        };

        if let Some(store) = &self.durable {
            if let Err(e) = store.save(id, &state, self.ttl).await {
                warn!(error = %e, "Session write-through failed");
            }
        }
    }

    /// Drop expired volatile entries and purge the durable store
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        let ttl = self.ttl;
        let mut removed = {
            let mut volatile = self.volatile.write();
            let before = volatile.len();
            volatile.retain(|_, s| !s.is_expired(ttl, now));
            before - volatile.len()
        };
        if let Some(store) = &self.durable {
            match store.purge_expired().await {
                Ok(n) => removed += n,
                Err(e) => warn!(error = %e, "Session purge failed"),
            }
        }
        removed
    }
}
