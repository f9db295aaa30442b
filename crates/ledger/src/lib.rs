//! Trace Ledger (C1): an append-only, chain-hashed decision log.
//!
//! Grounded in the event-emission idiom of the teacher's
//! `sa_domain::trace::TraceEvent` (a closed tag enum logged through one
//! `.emit()`-style path), generalized here to a persisted, SHA-256
//! chain-hashed append log per spec §4.1.
//!
//! Sanitization decision (spec ambiguity, recorded in DESIGN.md): the
//! redaction ruleset is applied to the payload at *append* time, before
//! hashing — the stored/hashed `sanitized_payload` is what the formula in
//! §4.1 names. `read_steps` re-applies the same ruleset defensively (a
//! tighter `redaction_cap` at read time can truncate further, never less).

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use warden_domain::canonical_json::canonical_json;
use warden_domain::error::{Error, Result};
use warden_domain::model::{ChainVerification, StepType, Trace, TraceId, TraceStatus, TraceStep};
use warden_domain::redaction::redact_value;
use warden_store::Store;

const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000";

/// Append-only, chain-hashed trace ledger.
pub struct Ledger {
    store: Store,
    /// Per-trace lock so concurrent appends to the *same* trace serialize,
    /// while appends to different traces proceed in parallel (spec §5).
    trace_locks: Mutex<HashMap<TraceId, Arc<Mutex<()>>>>,
    redaction_cap: usize,
}

impl Ledger {
    pub fn new(store: Store, redaction_cap: usize) -> Self {
        Self {
            store,
            trace_locks: Mutex::new(HashMap::new()),
            redaction_cap,
        }
    }

    fn lock_for(&self, trace_id: TraceId) -> Arc<Mutex<()>> {
        self.trace_locks
            .lock()
            .entry(trace_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn open_trace(&self, parent: Option<TraceId>) -> Result<TraceId> {
        let trace_id = TraceId::new();
        let created_at = Utc::now();
        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO traces (trace_id, created_at, parent, status) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    trace_id.to_string(),
                    created_at.to_rfc3339(),
                    parent.map(|p| p.to_string()),
                    "open",
                ],
            )
        })?;
        Ok(trace_id)
    }

    pub fn close_trace(&self, trace_id: TraceId) -> Result<()> {
        self.store.with_conn(|conn| {
            conn.execute(
                "UPDATE traces SET status = 'closed' WHERE trace_id = ?1",
                rusqlite::params![trace_id.to_string()],
            )
        })?;
        Ok(())
    }

    pub fn get_trace(&self, trace_id: TraceId) -> Result<Option<Trace>> {
        self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT created_at, parent, status FROM traces WHERE trace_id = ?1",
                rusqlite::params![trace_id.to_string()],
                |row| {
                    let created_at: String = row.get(0)?;
                    let parent: Option<String> = row.get(1)?;
                    let status: String = row.get(2)?;
                    Ok(Trace {
                        trace_id,
                        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                        parent: parent.and_then(|p| p.parse().ok()),
                        status: if status == "closed" {
                            TraceStatus::Closed
                        } else {
                            TraceStatus::Open
                        },
                    })
                },
            )
            .optional()
        })
    }

    fn last_step(&self, trace_id: TraceId) -> Result<Option<(u64, String)>> {
        self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT position, chain_hash FROM trace_steps WHERE trace_id = ?1 ORDER BY position DESC LIMIT 1",
                rusqlite::params![trace_id.to_string()],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
            )
            .optional()
        })
    }

    /// Append one chain-hashed step to `trace_id`. Returns the step's
    /// position and new chain hash.
    pub fn append_step(
        &self,
        trace_id: TraceId,
        step_type: StepType,
        payload: serde_json::Value,
    ) -> Result<(u64, String)> {
        let lock = self.lock_for(trace_id);
        let _guard = lock.lock();

        let sanitized = redact_value(&payload, self.redaction_cap);
        let created_at = Utc::now();
        let created_at_iso = created_at.to_rfc3339();

        let mut hasher = Sha256::new();
        hasher.update(step_type.to_string().as_bytes());
        hasher.update(created_at_iso.as_bytes());
        hasher.update(canonical_json(&sanitized).as_bytes());
        let event_hash = hex::encode(hasher.finalize());

        let prev = self.last_step(trace_id)?;
        let (position, prev_chain) = match prev {
            Some((pos, chain)) => (pos + 1, chain),
            None => (0, ZERO_HASH.to_string()),
        };

        let mut chain_hasher = Sha256::new();
        chain_hasher.update(hex_decode_or_raw(&prev_chain));
        chain_hasher.update(hex::decode(&event_hash).unwrap_or_default());
        let chain_hash = hex::encode(chain_hasher.finalize());

        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO trace_steps (trace_id, position, step_type, created_at, sanitized_payload, event_hash, chain_hash) VALUES (?1,?2,?3,?4,?5,?6,?7)",
                rusqlite::params![
                    trace_id.to_string(),
                    position as i64,
                    step_type.to_string(),
                    created_at_iso,
                    sanitized.to_string(),
                    event_hash,
                    chain_hash,
                ],
            )
        })?;

        Ok((position, chain_hash))
    }

    /// Read all steps for a trace, ordered by position. `redaction_cap`
    /// lets the caller apply a tighter cap than the one used at append
    /// time (e.g. for an external, lower-trust consumer).
    pub fn read_steps(&self, trace_id: TraceId, redaction_cap: usize) -> Result<Vec<TraceStep>> {
        let cap = redaction_cap.min(self.redaction_cap);
        let rows: Vec<(i64, String, String, String, String, String)> = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT position, step_type, created_at, sanitized_payload, event_hash, chain_hash FROM trace_steps WHERE trace_id = ?1 ORDER BY position ASC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![trace_id.to_string()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(position, step_type, created_at, payload, event_hash, chain_hash)| {
                let payload: serde_json::Value =
                    serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
                Ok(TraceStep {
                    trace_id,
                    position: position as u64,
                    step_type: parse_step_type(&step_type)?,
                    created_at: created_at
                        .parse()
                        .map_err(|_| Error::TraceBackendError("corrupt created_at".into()))?,
                    sanitized_payload: redact_value(&payload, cap),
                    event_hash,
                    chain_hash,
                })
            })
            .collect()
    }

    /// Read the most recent steps across all traces, newest first —
    /// the feed backing an audit/trust dashboard rather than one trace's
    /// detail view.
    pub fn recent_steps(&self, limit: u32, redaction_cap: usize) -> Result<Vec<TraceStep>> {
        let cap = redaction_cap.min(self.redaction_cap);
        let rows: Vec<(String, i64, String, String, String, String, String)> = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT trace_id, position, step_type, created_at, sanitized_payload, event_hash, chain_hash
                 FROM trace_steps ORDER BY created_at DESC, position DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(trace_id, position, step_type, created_at, payload, event_hash, chain_hash)| {
                let payload: serde_json::Value =
                    serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
                Ok(TraceStep {
                    trace_id: trace_id
                        .parse()
                        .map_err(|_| Error::TraceBackendError("corrupt trace_id".to_string()))?,
                    position: position as u64,
                    step_type: parse_step_type(&step_type)?,
                    created_at: created_at
                        .parse()
                        .map_err(|_| Error::TraceBackendError("corrupt created_at".to_string()))?,
                    sanitized_payload: redact_value(&payload, cap),
                    event_hash,
                    chain_hash,
                })
            })
            .collect()
    }

    /// Recompute the chain hash from the stored (possibly tampered) rows
    /// and compare it against the last recorded chain hash, and optionally
    /// against a caller-supplied `expected_hash`.
    pub fn verify_chain(
        &self,
        trace_id: TraceId,
        expected_hash: Option<&str>,
    ) -> Result<ChainVerification> {
        let rows: Vec<(String, String, String, String)> = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT step_type, created_at, sanitized_payload, chain_hash FROM trace_steps WHERE trace_id = ?1 ORDER BY position ASC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![trace_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let mut chain = ZERO_HASH.to_string();
        let mut last_stored_chain = ZERO_HASH.to_string();
        for (step_type, created_at, payload, stored_chain) in rows {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
            let mut hasher = Sha256::new();
            hasher.update(step_type.as_bytes());
            hasher.update(created_at.as_bytes());
            hasher.update(canonical_json(&payload).as_bytes());
            let event_hash = hex::encode(hasher.finalize());

            let mut chain_hasher = Sha256::new();
            chain_hasher.update(hex_decode_or_raw(&chain));
            chain_hasher.update(hex::decode(&event_hash).unwrap_or_default());
            chain = hex::encode(chain_hasher.finalize());
            last_stored_chain = stored_chain;
        }

        let ok = expected_hash.map(|h| h == chain || h == last_stored_chain);
        Ok(ChainVerification {
            trace_id,
            computed_hash: chain,
            ok,
        })
    }
}

fn hex_decode_or_raw(s: &str) -> Vec<u8> {
    hex::decode(s).unwrap_or_else(|_| s.as_bytes().to_vec())
}

fn parse_step_type(s: &str) -> Result<StepType> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| Error::TraceBackendError(format!("unknown step_type '{s}'")))
}
