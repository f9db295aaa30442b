//! Shared SQLite persistence layer used by the Trace Ledger, Intent Router
//! (cache + HITL queue), and Approval Store (spec §6's persisted table
//! layout).
//!
//! `rusqlite::Connection` is `!Sync`; one connection is held behind a
//! `parking_lot::Mutex` and shared via `Arc`, the way the teacher repo
//! guards its in-memory caches — trading a single-writer bottleneck for
//! simplicity appropriate to a local-first, single-process service.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use warden_domain::error::{Error, Result};

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if needed) the SQLite database at `path`, enabling
    /// WAL journal mode, and run schema migrations.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::TraceBackendError(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| Error::TraceBackendError(e.to_string()))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// An in-memory database, for tests and ephemeral deployments.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::TraceBackendError(e.to_string()))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn).map_err(|e| Error::TraceBackendError(e.to_string()))
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS traces (
            trace_id    TEXT PRIMARY KEY,
            created_at  TEXT NOT NULL,
            parent      TEXT,
            status      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trace_steps (
            trace_id          TEXT NOT NULL,
            position          INTEGER NOT NULL,
            step_type         TEXT NOT NULL,
            created_at        TEXT NOT NULL,
            sanitized_payload TEXT NOT NULL,
            event_hash        TEXT NOT NULL,
            chain_hash        TEXT NOT NULL,
            PRIMARY KEY (trace_id, position)
        );

        CREATE TABLE IF NOT EXISTS tool_approvals (
            approval_id TEXT PRIMARY KEY,
            tool_name   TEXT NOT NULL,
            args_hash   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            expires_at  TEXT NOT NULL,
            status      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS intent_cache (
            policy_hash TEXT NOT NULL,
            signature   TEXT NOT NULL,
            tool        TEXT NOT NULL,
            params      TEXT NOT NULL,
            confidence  REAL NOT NULL,
            reason      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            ttl_seconds INTEGER NOT NULL,
            PRIMARY KEY (policy_hash, signature)
        );

        CREATE TABLE IF NOT EXISTS hitl_queue (
            hitl_id      TEXT PRIMARY KEY,
            trace_id     TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            candidates   TEXT NOT NULL,
            guard_reason TEXT NOT NULL,
            state        TEXT NOT NULL
        );
        "#,
    )
    .map_err(|e| Error::TraceBackendError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_create_all_tables() {
        let store = Store::in_memory().unwrap();
        let count: i64 = store
            .with_conn(|c| {
                c.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                    [],
                    |r| r.get(0),
                )
            })
            .unwrap();
        assert_eq!(count, 5);
    }
}
