//! SQLite-backed knowledge store
//!
//! Tables: `faqs` (entries), `embeddings` (JSON vectors keyed by entry id)
//! and `queries` (anonymized query log).

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use super::store::{apply_vote, KnowledgeEntry, KnowledgeStore, NewEntry, QueryLogEntry};
use crate::error::{CacheError, CacheResult};
use crate::language::Language;
use crate::storage::{migrate, open_database, Migration};

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "001_init_faqs",
        sql: "
            CREATE TABLE IF NOT EXISTS faqs (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                lang          TEXT NOT NULL,
                question      TEXT NOT NULL,
                answer        TEXT NOT NULL,
                upvotes       INTEGER NOT NULL DEFAULT 0,
                last_used_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_faqs_lang ON faqs(lang);
            CREATE INDEX IF NOT EXISTS idx_faqs_last_used ON faqs(last_used_at);
        ",
    },
    Migration {
        name: "002_embeddings",
        sql: "
            CREATE TABLE IF NOT EXISTS embeddings (
                faq_id  INTEGER PRIMARY KEY,
                vector  TEXT NOT NULL,
                FOREIGN KEY(faq_id) REFERENCES faqs(id) ON DELETE CASCADE
            );
        ",
    },
    Migration {
        name: "003_queries",
        sql: "
            CREATE TABLE IF NOT EXISTS queries (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                lang            TEXT NOT NULL,
                user_text       TEXT NOT NULL,
                matched_faq_id  INTEGER,
                created_at      INTEGER NOT NULL,
                FOREIGN KEY(matched_faq_id) REFERENCES faqs(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queries_lang ON queries(lang);
            CREATE INDEX IF NOT EXISTS idx_queries_created ON queries(created_at);
        ",
    },
];

/// Knowledge store on a single WAL-mode SQLite connection
#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteKnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKnowledgeStore").finish_non_exhaustive()
    }
}

impl SqliteKnowledgeStore {
    /// Open (or create) the database and run pending migrations
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut conn = open_database(path)?;
        migrate(&mut conn, MIGRATIONS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CacheResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| CacheError::Store(format!("blocking task failed: {e}")))?
    }
}

fn parse_language(code: &str) -> CacheResult<Language> {
    Language::from_code(code).ok_or_else(|| CacheError::Store(format!("unknown language '{code}'")))
}

fn row_to_entry(
    id: i64,
    lang: String,
    question: String,
    answer: String,
    upvotes: i64,
    last_used_at: i64,
    vector: Option<String>,
) -> CacheResult<KnowledgeEntry> {
    let embedding = match vector {
        Some(json) => serde_json::from_str(&json)?,
        None => Vec::new(),
    };
    Ok(KnowledgeEntry {
        id,
        language: parse_language(&lang)?,
        question,
        answer,
        embedding,
        votes: upvotes.clamp(0, i64::from(u32::MAX)) as u32,
        last_used_at,
    })
}

type EntryRow = (i64, String, String, String, i64, i64, Option<String>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

const SELECT_ENTRY: &str = "
    SELECT f.id, f.lang, f.question, f.answer, f.upvotes, f.last_used_at, e.vector
    FROM faqs f LEFT JOIN embeddings e ON e.faq_id = f.id";

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn insert(&self, entry: NewEntry) -> CacheResult<i64> {
        let vector = serde_json::to_string(&entry.embedding)?;
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO faqs (lang, question, answer, upvotes, last_used_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![
                    entry.language.code(),
                    entry.question,
                    entry.answer,
                    entry.created_at
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT OR REPLACE INTO embeddings (faq_id, vector) VALUES (?1, ?2)",
                params![id, vector],
            )?;
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    async fn entries(&self, language: Language) -> CacheResult<Vec<KnowledgeEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_ENTRY} WHERE f.lang = ?1 ORDER BY f.id"))?;
            let rows = stmt
                .query_map(params![language.code()], read_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows
                .into_iter()
                .filter_map(|(id, lang, q, a, up, used, vector)| {
                    match row_to_entry(id, lang, q, a, up, used, vector) {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            warn!(id, error = %e, "Skipping unreadable knowledge entry");
                            None
                        }
                    }
                })
                .collect())
        })
        .await
    }

    async fn get(&self, id: i64) -> CacheResult<Option<KnowledgeEntry>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(&format!("{SELECT_ENTRY} WHERE f.id = ?1"), params![id], read_row)
                .optional()?;
            row.map(|(id, lang, q, a, up, used, vector)| row_to_entry(id, lang, q, a, up, used, vector))
                .transpose()
        })
        .await
    }

    async fn touch(&self, id: i64, at: i64) -> CacheResult<()> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE faqs SET last_used_at = ?1 WHERE id = ?2",
                params![at, id],
            )?;
            if changed == 0 {
                return Err(CacheError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn vote(&self, id: i64, delta: i32) -> CacheResult<u32> {
        self.with_conn(move |conn| {
            let current: Option<i64> = conn
                .query_row("SELECT upvotes FROM faqs WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            let current = current.ok_or(CacheError::NotFound(id))?;
            let updated = apply_vote(current.clamp(0, i64::from(u32::MAX)) as u32, delta);
            conn.execute(
                "UPDATE faqs SET upvotes = ?1 WHERE id = ?2",
                params![i64::from(updated), id],
            )?;
            Ok(updated)
        })
        .await
    }

    async fn log_query(&self, entry: QueryLogEntry) -> CacheResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO queries (lang, user_text, matched_faq_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.language.code(),
                    entry.text,
                    entry.matched_entry,
                    entry.created_at
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent_queries(&self, limit: usize) -> CacheResult<Vec<QueryLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT lang, user_text, matched_faq_id, created_at
                 FROM queries ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|(lang, text, matched_entry, created_at)| {
                    Ok(QueryLogEntry {
                        language: parse_language(&lang)?,
                        text,
                        matched_entry,
                        created_at,
                    })
                })
                .collect()
        })
        .await
    }

    async fn count(&self) -> CacheResult<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM faqs", [], |row| row.get(0))?;
            Ok(n.max(0) as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(question: &str, embedding: Vec<f32>) -> NewEntry {
        NewEntry {
            language: Language::Sv,
            question: question.to_string(),
            answer: format!("Svar på {question}"),
            embedding,
            created_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_roundtrip_with_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteKnowledgeStore::open(dir.path().join("kb.db")).unwrap();

        let id = store
            .insert(new_entry("Vad kostar det?", vec![0.1, 0.2, 0.3]))
            .await
            .unwrap();
        let entry = store.get(id).await.unwrap().unwrap();
        assert_eq!(entry.question, "Vad kostar det?");
        assert_eq!(entry.embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(entry.votes, 0);

        assert!(store.entries(Language::En).await.unwrap().is_empty());
        assert_eq!(store.entries(Language::Sv).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteKnowledgeStore::open(dir.path().join("kb.db")).unwrap();
        let broken = store.insert(new_entry("trasig", vec![1.0, 0.0])).await.unwrap();
        let good = store.insert(new_entry("hel", vec![0.0, 1.0])).await.unwrap();
        store
            .conn
            .lock()
            .execute(
                "UPDATE embeddings SET vector = 'not json' WHERE faq_id = ?1",
                params![broken],
            )
            .unwrap();

        let entries = store.entries(Language::Sv).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, good);
    }

    #[tokio::test]
    async fn test_vote_touch_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.db");

        let id = {
            let store = SqliteKnowledgeStore::open(&path).unwrap();
            let id = store.insert(new_entry("q", vec![1.0])).await.unwrap();
            assert_eq!(store.vote(id, 1).await.unwrap(), 1);
            assert_eq!(store.vote(id, 1).await.unwrap(), 2);
            assert_eq!(store.vote(id, -5).await.unwrap(), 0);
            store.vote(id, 1).await.unwrap();
            store.touch(id, 1_800_000_000).await.unwrap();
            id
        };

        let store = SqliteKnowledgeStore::open(&path).unwrap();
        let entry = store.get(id).await.unwrap().unwrap();
        assert_eq!(entry.votes, 1);
        assert_eq!(entry.last_used_at, 1_800_000_000);
        assert!(matches!(store.vote(42, 1).await, Err(CacheError::NotFound(42))));
        assert!(matches!(store.touch(42, 0).await, Err(CacheError::NotFound(42))));
    }

    #[tokio::test]
    async fn test_query_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteKnowledgeStore::open(dir.path().join("kb.db")).unwrap();
        let id = store.insert(new_entry("q", vec![1.0])).await.unwrap();

        for (text, matched) in [("first", None), ("second", Some(id))] {
            store
                .log_query(QueryLogEntry {
                    language: Language::Sv,
                    text: text.to_string(),
                    matched_entry: matched,
                    created_at: 1_700_000_000,
                })
                .await
                .unwrap();
        }

        let recent = store.recent_queries(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "second");
        assert_eq!(recent[0].matched_entry, Some(id));
    }
}
