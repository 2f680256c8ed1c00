//! Structural validation of persisted session records
//!
//! Expected shape:
//!
//! ```json
//! {
//!   "id": "s1",
//!   "status": "in_progress",
//!   "lastSaved": "2024-05-01T10:00:00Z",
//!   "exercises": [
//!     { "name": "Squat", "sets": [ { "reps": 5, "completed": true } ] }
//!   ]
//! }
//! ```
//!
//! `lastSaved` may also be Unix epoch milliseconds.

use chrono::{DateTime, Utc};
use core_sync::parse_timestamp;
use serde_json::Value;

pub const ID_FIELD: &str = "id";
pub const STATUS_FIELD: &str = "status";
pub const LAST_SAVED_FIELD: &str = "lastSaved";
pub const EXERCISES_FIELD: &str = "exercises";
pub const SETS_FIELD: &str = "sets";
pub const COMPLETED_FIELD: &str = "completed";

/// Statuses of sessions that ended normally.
const TERMINAL_STATUSES: &[&str] = &["completed", "cancelled", "abandoned"];

/// Statuses a session can be resumed from.
const RESUMABLE_STATUSES: &[&str] = &["in_progress", "paused"];

/// Facts extracted from a structurally valid session record.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionShape {
    pub id: String,
    pub status: String,
    pub last_saved: DateTime<Utc>,
    pub completed_sets: usize,
    pub total_sets: usize,
}

impl SessionShape {
    pub fn is_terminal(&self) -> bool {
        is_terminal_status(&self.status)
    }

    pub fn is_resumable(&self) -> bool {
        RESUMABLE_STATUSES.contains(&self.status.as_str())
    }

    /// Completed sets over all sets; 0 when the session has no sets.
    pub fn progress(&self) -> f64 {
        if self.total_sets == 0 {
            0.0
        } else {
            self.completed_sets as f64 / self.total_sets as f64
        }
    }
}

pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

/// Validate a session record, returning the reason it is malformed on failure.
pub fn validate_session(record: &Value) -> Result<SessionShape, String> {
    let fields = record
        .as_object()
        .ok_or_else(|| "Session record is not an object".to_string())?;

    let id = loose_id(record).ok_or_else(|| "Session id is missing or empty".to_string())?;

    let status = match fields.get(STATUS_FIELD) {
        Some(Value::String(status)) if !status.trim().is_empty() => status.clone(),
        Some(_) => return Err("Session status must be a non-empty string".to_string()),
        None => return Err("Session status is missing".to_string()),
    };

    let last_saved = match fields.get(LAST_SAVED_FIELD) {
        Some(value) => parse_timestamp(value)
            .ok_or_else(|| format!("Unreadable {} value: {}", LAST_SAVED_FIELD, value))?,
        None => return Err(format!("Session {} is missing", LAST_SAVED_FIELD)),
    };

    let exercises = fields
        .get(EXERCISES_FIELD)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("Session {} must be a list", EXERCISES_FIELD))?;

    let mut completed_sets = 0;
    let mut total_sets = 0;
    for (index, exercise) in exercises.iter().enumerate() {
        let sets = exercise
            .as_object()
            .ok_or_else(|| format!("Exercise {} is not an object", index))?
            .get(SETS_FIELD)
            .and_then(Value::as_array)
            .ok_or_else(|| format!("Exercise {} {} must be a list", index, SETS_FIELD))?;

        for (set_index, set) in sets.iter().enumerate() {
            let set = set
                .as_object()
                .ok_or_else(|| format!("Exercise {} set {} is not an object", index, set_index))?;
            total_sets += 1;
            if set.get(COMPLETED_FIELD).and_then(Value::as_bool) == Some(true) {
                completed_sets += 1;
            }
        }
    }

    Ok(SessionShape {
        id,
        status,
        last_saved,
        completed_sets,
        total_sets,
    })
}

/// Best-effort id of a record, valid or not.
pub fn loose_id(record: &Value) -> Option<String> {
    match record.get(ID_FIELD)? {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Best-effort status of a record, valid or not.
pub fn loose_status(record: &Value) -> Option<&str> {
    record.get(STATUS_FIELD).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Value {
        json!({
            "id": "s1",
            "status": "in_progress",
            "lastSaved": "2024-05-01T10:00:00Z",
            "exercises": [
                {"name": "Squat", "sets": [{"completed": true}, {"completed": false}]},
                {"name": "Row", "sets": [{"completed": true}, {}]}
            ]
        })
    }

    #[test]
    fn test_valid_session() {
        let shape = validate_session(&session()).unwrap();
        assert_eq!(shape.id, "s1");
        assert_eq!(shape.completed_sets, 2);
        assert_eq!(shape.total_sets, 4);
        assert_eq!(shape.progress(), 0.5);
        assert!(shape.is_resumable());
        assert!(!shape.is_terminal());
    }

    #[test]
    fn test_progress_without_sets_is_zero() {
        let mut record = session();
        record["exercises"] = json!([]);
        assert_eq!(validate_session(&record).unwrap().progress(), 0.0);
    }

    #[test]
    fn test_missing_id_is_corrupted() {
        let mut record = session();
        record.as_object_mut().unwrap().remove("id");
        assert!(validate_session(&record).is_err());
    }

    #[test]
    fn test_exercises_not_a_list_is_corrupted() {
        let mut record = session();
        record["exercises"] = json!({"name": "Squat"});
        assert!(validate_session(&record).is_err());
    }

    #[test]
    fn test_malformed_set_is_corrupted() {
        let mut record = session();
        record["exercises"][0]["sets"] = json!([{"completed": true}, 5]);
        let reason = validate_session(&record).unwrap_err();
        assert!(reason.contains("set 1"));
    }

    #[test]
    fn test_epoch_millis_last_saved() {
        let mut record = session();
        record["lastSaved"] = json!(1_714_557_600_000i64);
        let shape = validate_session(&record).unwrap();
        assert_eq!(shape.last_saved.timestamp_millis(), 1_714_557_600_000);
    }

    #[test]
    fn test_unreadable_last_saved_is_corrupted() {
        let mut record = session();
        record["lastSaved"] = json!("yesterday");
        assert!(validate_session(&record).is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        for status in ["completed", "cancelled", "abandoned"] {
            let mut record = session();
            record["status"] = json!(status);
            let shape = validate_session(&record).unwrap();
            assert!(shape.is_terminal());
            assert!(!shape.is_resumable());
        }
    }
}
