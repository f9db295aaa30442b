//! Approval Store (C4): TTL-bound tokens gating unsafe tool execution,
//! persisted through the shared SQLite store with a single transactional
//! section per `validate_and_consume` to avoid TOCTOU races.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::OptionalExtension;
use warden_domain::canonical_json::canonical_hash;
use warden_domain::error::{ApprovalRejection, Error, Result};
use warden_domain::model::{Approval, ApprovalId, ApprovalStatus};
use warden_store::Store;

pub struct ApprovalStore {
    store: Store,
    default_ttl_seconds: u64,
}

impl ApprovalStore {
    pub fn new(store: Store, default_ttl_seconds: u64) -> Self {
        Self {
            store,
            default_ttl_seconds,
        }
    }

    /// Issues a new approval token for `tool_name`/`args`, computing
    /// `args_hash` from the canonical-JSON form of `args`.
    pub fn issue(
        &self,
        tool_name: &str,
        args: &serde_json::Value,
        ttl_seconds: Option<u64>,
    ) -> Result<Approval> {
        let approval_id = ApprovalId::new();
        let args_hash = canonical_hash(args);
        let created_at = Utc::now();
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        let expires_at = created_at + ChronoDuration::seconds(ttl as i64);

        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tool_approvals (approval_id, tool_name, args_hash, created_at, expires_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    approval_id.to_string(),
                    tool_name,
                    args_hash,
                    created_at.to_rfc3339(),
                    expires_at.to_rfc3339(),
                    "pending",
                ],
            )
        })?;

        Ok(Approval {
            approval_id,
            tool_name: tool_name.to_string(),
            args_hash,
            created_at,
            expires_at,
            status: ApprovalStatus::Pending,
        })
    }

    /// Atomically verifies the approval exists, is pending, matches
    /// `tool_name`/`args`, and has not expired, then transitions it to
    /// consumed — all within one transaction.
    pub fn validate_and_consume(
        &self,
        approval_id: ApprovalId,
        tool_name: &str,
        args: &serde_json::Value,
    ) -> Result<()> {
        let args_hash = canonical_hash(args);
        let now = Utc::now();

        self.store.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let row: Option<(String, String, String, String)> = tx
                .query_row(
                    "SELECT tool_name, args_hash, expires_at, status FROM tool_approvals WHERE approval_id = ?1",
                    [approval_id.to_string()],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .optional()?;

            let Some((stored_tool, stored_hash, stored_expires, stored_status)) = row else {
                return Ok(Err(ApprovalRejection::UnknownApproval));
            };

            if stored_status != "pending" {
                return Ok(Err(ApprovalRejection::AlreadyConsumed));
            }

            let expires_at: DateTime<Utc> = stored_expires.parse().unwrap_or(now);
            if now >= expires_at {
                tx.execute(
                    "UPDATE tool_approvals SET status = 'expired' WHERE approval_id = ?1",
                    [approval_id.to_string()],
                )?;
                tx.commit()?;
                return Ok(Err(ApprovalRejection::Expired));
            }

            if stored_tool != tool_name {
                return Ok(Err(ApprovalRejection::ToolMismatch));
            }
            if stored_hash != args_hash {
                return Ok(Err(ApprovalRejection::ArgsHashMismatch));
            }

            tx.execute(
                "UPDATE tool_approvals SET status = 'consumed' WHERE approval_id = ?1",
                [approval_id.to_string()],
            )?;
            tx.commit()?;
            Ok(Ok(()))
        })?
        .map_err(Error::ApprovalRequired)
    }

    /// Marks expired pending approvals. Returns the count updated.
    pub fn garbage_collect(&self, now: DateTime<Utc>) -> Result<usize> {
        self.store.with_conn(|conn| {
            conn.execute(
                "UPDATE tool_approvals SET status = 'expired' WHERE status = 'pending' AND expires_at <= ?1",
                [now.to_rfc3339()],
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ApprovalStore {
        ApprovalStore::new(Store::in_memory().unwrap(), 900)
    }

    #[test]
    fn issue_and_consume_round_trip() {
        let approvals = store();
        let args = serde_json::json!({ "code": "print(1)" });
        let approval = approvals.issue("python_exec", &args, None).unwrap();

        approvals
            .validate_and_consume(approval.approval_id, "python_exec", &args)
            .unwrap();
    }

    #[test]
    fn unknown_approval_is_rejected() {
        let approvals = store();
        let err = approvals.validate_and_consume(
            ApprovalId::new(),
            "python_exec",
            &serde_json::json!({}),
        );
        assert!(matches!(
            err,
            Err(Error::ApprovalRequired(ApprovalRejection::UnknownApproval))
        ));
    }

    #[test]
    fn already_consumed_is_rejected() {
        let approvals = store();
        let args = serde_json::json!({ "code": "1" });
        let approval = approvals.issue("python_exec", &args, None).unwrap();
        approvals
            .validate_and_consume(approval.approval_id, "python_exec", &args)
            .unwrap();

        let err = approvals.validate_and_consume(approval.approval_id, "python_exec", &args);
        assert!(matches!(
            err,
            Err(Error::ApprovalRequired(ApprovalRejection::AlreadyConsumed))
        ));
    }

    #[test]
    fn tool_mismatch_is_rejected() {
        let approvals = store();
        let args = serde_json::json!({ "code": "1" });
        let approval = approvals.issue("python_exec", &args, None).unwrap();

        let err = approvals.validate_and_consume(approval.approval_id, "other_tool", &args);
        assert!(matches!(
            err,
            Err(Error::ApprovalRequired(ApprovalRejection::ToolMismatch))
        ));
    }

    #[test]
    fn args_hash_mismatch_is_rejected() {
        let approvals = store();
        let approval = approvals
            .issue("python_exec", &serde_json::json!({ "code": "1" }), None)
            .unwrap();

        let err = approvals.validate_and_consume(
            approval.approval_id,
            "python_exec",
            &serde_json::json!({ "code": "2" }),
        );
        assert!(matches!(
            err,
            Err(Error::ApprovalRequired(ApprovalRejection::ArgsHashMismatch))
        ));
    }

    #[test]
    fn expired_approval_is_rejected() {
        let approvals = store();
        let args = serde_json::json!({ "code": "1" });
        let approval = approvals.issue("python_exec", &args, Some(0)).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        let err = approvals.validate_and_consume(approval.approval_id, "python_exec", &args);
        assert!(matches!(
            err,
            Err(Error::ApprovalRequired(ApprovalRejection::Expired))
        ));
    }

    #[test]
    fn garbage_collect_marks_expired_pending_approvals() {
        let approvals = store();
        approvals
            .issue("python_exec", &serde_json::json!({ "code": "1" }), Some(0))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let updated = approvals.garbage_collect(Utc::now()).unwrap();
        assert_eq!(updated, 1);
    }
}
