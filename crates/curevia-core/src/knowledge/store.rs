//! Knowledge store interface and the in-process implementation

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{CacheError, CacheResult};
use crate::language::Language;

/// A previously answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: i64,
    pub language: Language,
    pub question: String,
    pub answer: String,
    pub embedding: Vec<f32>,
    pub votes: u32,
    /// Unix seconds
    pub last_used_at: i64,
}

/// Entry to be inserted; the store assigns the id
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub language: Language,
    pub question: String,
    pub answer: String,
    pub embedding: Vec<f32>,
    pub created_at: i64,
}

/// One anonymized utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub language: Language,
    /// Already redacted
    pub text: String,
    pub matched_entry: Option<i64>,
    pub created_at: i64,
}

/// Persistence for the knowledge cache. Entries are append-only apart from
/// the vote score and the last-used timestamp.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Insert an entry and return its id
    async fn insert(&self, entry: NewEntry) -> CacheResult<i64>;

    /// All entries of one language, with embeddings
    async fn entries(&self, language: Language) -> CacheResult<Vec<KnowledgeEntry>>;

    async fn get(&self, id: i64) -> CacheResult<Option<KnowledgeEntry>>;

    /// Record a use of the entry
    async fn touch(&self, id: i64, at: i64) -> CacheResult<()>;

    /// Adjust the vote score, floored at 0, and return the new score.
    /// Fails with [`CacheError::NotFound`] for unknown ids.
    async fn vote(&self, id: i64, delta: i32) -> CacheResult<u32>;

    async fn log_query(&self, entry: QueryLogEntry) -> CacheResult<()>;

    /// Most recent query log entries, newest first
    async fn recent_queries(&self, limit: usize) -> CacheResult<Vec<QueryLogEntry>>;

    /// Number of stored entries across all languages
    async fn count(&self) -> CacheResult<usize>;
}

/// Apply a vote delta with the floor at zero
pub(crate) fn apply_vote(current: u32, delta: i32) -> u32 {
    (i64::from(current) + i64::from(delta)).clamp(0, i64::from(u32::MAX)) as u32
}

/// Query log entries kept by [`MemoryKnowledgeStore`] before the oldest
/// are dropped
pub const DEFAULT_QUERY_LOG_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct MemoryState {
    entries: Vec<KnowledgeEntry>,
    queries: VecDeque<QueryLogEntry>,
    next_id: i64,
}

/// Process-local store for tests and deployments without a database.
/// The query log is a ring of the most recent entries.
#[derive(Debug)]
pub struct MemoryKnowledgeStore {
    state: RwLock<MemoryState>,
    query_capacity: usize,
}

impl Default for MemoryKnowledgeStore {
    fn default() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            query_capacity: DEFAULT_QUERY_LOG_CAPACITY,
        }
    }
}

impl MemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_capacity(mut self, capacity: usize) -> Self {
        self.query_capacity = capacity;
        self
    }
}

#[async_trait]
impl KnowledgeStore for MemoryKnowledgeStore {
    async fn insert(&self, entry: NewEntry) -> CacheResult<i64> {
        let mut state = self.state.write();
        state.next_id += 1;
        let id = state.next_id;
        state.entries.push(KnowledgeEntry {
            id,
            language: entry.language,
            question: entry.question,
            answer: entry.answer,
            embedding: entry.embedding,
            votes: 0,
            last_used_at: entry.created_at,
        });
        Ok(id)
    }

    async fn entries(&self, language: Language) -> CacheResult<Vec<KnowledgeEntry>> {
        Ok(self
            .state
            .read()
            .entries
            .iter()
            .filter(|e| e.language == language)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> CacheResult<Option<KnowledgeEntry>> {
        Ok(self.state.read().entries.iter().find(|e| e.id == id).cloned())
    }

    async fn touch(&self, id: i64, at: i64) -> CacheResult<()> {
        let mut state = self.state.write();
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(CacheError::NotFound(id))?;
        entry.last_used_at = at;
        Ok(())
    }

    async fn vote(&self, id: i64, delta: i32) -> CacheResult<u32> {
        let mut state = self.state.write();
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(CacheError::NotFound(id))?;
        entry.votes = apply_vote(entry.votes, delta);
        Ok(entry.votes)
    }

    async fn log_query(&self, entry: QueryLogEntry) -> CacheResult<()> {
        if self.query_capacity == 0 {
            return Ok(());
        }
        let mut state = self.state.write();
        while state.queries.len() >= self.query_capacity {
            state.queries.pop_front();
        }
        state.queries.push_back(entry);
        Ok(())
    }

    async fn recent_queries(&self, limit: usize) -> CacheResult<Vec<QueryLogEntry>> {
        Ok(self
            .state
            .read()
            .queries
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> CacheResult<usize> {
        Ok(self.state.read().entries.len())
    }
}
