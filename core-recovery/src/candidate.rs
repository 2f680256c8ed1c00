//! Recovery candidates
//!
//! A candidate is derived fresh on every scan from one session record and is
//! never persisted.

use bridge_traits::{LocalStore, SessionHandle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::validation::{loose_id, validate_session};

/// A storage backend holding persisted session records.
#[derive(Clone)]
pub struct RecoverySource {
    pub name: String,
    pub store: Arc<dyn LocalStore>,
    pub table: String,
}

impl RecoverySource {
    pub fn new(name: impl Into<String>, store: Arc<dyn LocalStore>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store,
            table: table.into(),
        }
    }
}

impl std::fmt::Debug for RecoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoverySource")
            .field("name", &self.name)
            .field("store", &"LocalStore { ... }")
            .field("table", &self.table)
            .finish()
    }
}

/// Where a candidate's record lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateOrigin {
    pub source: String,
    pub table: String,
    pub key: String,
}

/// A possibly recoverable interrupted session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryCandidate {
    /// Session id, or `source:key` when the record has none
    pub id: String,
    pub session_payload: Value,
    pub last_saved: Option<DateTime<Utc>>,
    pub origin: CandidateOrigin,
    pub is_corrupted: bool,
    pub corruption_reason: Option<String>,
    pub can_recover: bool,
    pub estimated_progress: f64,
}

impl RecoveryCandidate {
    pub fn from_record(origin: CandidateOrigin, record: Value) -> Self {
        match validate_session(&record) {
            Ok(shape) => Self {
                id: shape.id.clone(),
                last_saved: Some(shape.last_saved),
                is_corrupted: false,
                corruption_reason: None,
                can_recover: shape.is_resumable(),
                estimated_progress: shape.progress(),
                session_payload: record,
                origin,
            },
            Err(reason) => Self {
                id: loose_id(&record)
                    .unwrap_or_else(|| format!("{}:{}", origin.source, origin.key)),
                last_saved: None,
                is_corrupted: true,
                corruption_reason: Some(reason),
                can_recover: false,
                estimated_progress: 0.0,
                session_payload: record,
                origin,
            },
        }
    }
}

/// A session handed back to the session engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredSession {
    pub session_id: String,
    pub handle: SessionHandle,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecovery {
    pub session_id: String,
    pub message: String,
}

/// Outcome of [`RecoveryScanner::recover_all`](crate::RecoveryScanner::recover_all).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub recovered_sessions: Vec<RecoveredSession>,
    pub failed_recoveries: Vec<FailedRecovery>,
    /// Corrupted records deleted from their origin store
    pub corrupted_count: u32,
}

/// Outcome of [`RecoveryScanner::cleanup_older_than`](crate::RecoveryScanner::cleanup_older_than).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted: u32,
    pub by_source: BTreeMap<String, u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn origin() -> CandidateOrigin {
        CandidateOrigin {
            source: "local".to_string(),
            table: "active_sessions".to_string(),
            key: "k1".to_string(),
        }
    }

    #[test]
    fn test_paused_session_can_recover() {
        let candidate = RecoveryCandidate::from_record(
            origin(),
            json!({
                "id": "s1",
                "status": "paused",
                "lastSaved": "2024-05-01T10:00:00Z",
                "exercises": [{"sets": [{"completed": true}]}]
            }),
        );
        assert!(!candidate.is_corrupted);
        assert!(candidate.can_recover);
        assert_eq!(candidate.estimated_progress, 1.0);
    }

    #[test]
    fn test_not_started_session_is_valid_but_not_recoverable() {
        let candidate = RecoveryCandidate::from_record(
            origin(),
            json!({
                "id": "s1",
                "status": "not_started",
                "lastSaved": "2024-05-01T10:00:00Z",
                "exercises": []
            }),
        );
        assert!(!candidate.is_corrupted);
        assert!(!candidate.can_recover);
    }

    #[test]
    fn test_corrupted_record_without_id_uses_origin() {
        let candidate = RecoveryCandidate::from_record(origin(), json!({"status": "in_progress"}));
        assert!(candidate.is_corrupted);
        assert!(!candidate.can_recover);
        assert_eq!(candidate.id, "local:k1");
        assert!(candidate.corruption_reason.is_some());
    }
}
