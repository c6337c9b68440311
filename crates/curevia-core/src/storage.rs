//! Shared SQLite plumbing
//!
//! WAL-mode connections and named, idempotent migrations recorded in a
//! `migrations` table.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;

/// One named schema step
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Open (or create) a database file in WAL mode
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating database directory '{}'", parent.display()))?;
        }
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Opening SQLite database '{}'", path.display()))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Configuring SQLite WAL pragmas")?;

    Ok(conn)
}

/// Apply every migration not yet recorded, inside one transaction
pub fn migrate(conn: &mut Connection, migrations: &[Migration]) -> Result<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            applied_at  INTEGER NOT NULL
        );",
    )
    .context("Creating migrations table")?;

    let applied: HashSet<String> = {
        let mut stmt = conn.prepare("SELECT name FROM migrations")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        names
    };

    let now = chrono::Utc::now().timestamp();
    let tx = conn.transaction().context("Starting migration transaction")?;
    let mut count = 0;
    for m in migrations {
        if applied.contains(m.name) {
            continue;
        }
        tx.execute_batch(m.sql)
            .with_context(|| format!("Applying migration '{}'", m.name))?;
        tx.execute(
            "INSERT INTO migrations (name, applied_at) VALUES (?1, ?2)",
            params![m.name, now],
        )?;
        count += 1;
    }
    tx.commit().context("Committing migrations")?;

    if count > 0 {
        tracing::info!(applied = count, "Applied database migrations");
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEPS: &[Migration] = &[
        Migration {
            name: "001_items",
            sql: "CREATE TABLE IF NOT EXISTS items (id INTEGER PRIMARY KEY);",
        },
        Migration {
            name: "002_items_name",
            sql: "ALTER TABLE items ADD COLUMN name TEXT;",
        },
    ];

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");

        let mut conn = open_database(&path).unwrap();
        assert_eq!(migrate(&mut conn, STEPS).unwrap(), 2);
        assert_eq!(migrate(&mut conn, STEPS).unwrap(), 0);

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
