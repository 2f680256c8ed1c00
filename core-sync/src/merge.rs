//! Record Conflict Resolution
//!
//! Resolves a conflict between a record already in local storage and an
//! incoming record (from a snapshot restore or a remote pull).
//!
//! ## Strategies
//!
//! - **Replace**: the incoming record wins unconditionally
//! - **Merge**: shallow field overlay of incoming onto existing
//! - **KeepNewer**: the record with the later `updatedAt` wins
//!
//! Every caller in the workspace goes through [`MergeResolver::resolve`];
//! there is no other conflict logic.
//!
//! ## Usage
//!
//! ```
//! use core_sync::merge::{MergeResolver, MergeStrategy};
//! use serde_json::json;
//!
//! let existing = json!({"a": 1, "b": 2});
//! let merged = MergeResolver::resolve(MergeStrategy::Merge, Some(&existing), json!({"a": 3}));
//! assert_eq!(merged, json!({"a": 3, "b": 2}));
//! ```

use crate::error::SyncError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field compared by [`MergeStrategy::KeepNewer`].
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Merge strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Always take the incoming record
    #[default]
    Replace,

    /// Overlay incoming fields onto the existing record
    Merge,

    /// Take the incoming record only if its `updatedAt` is later
    KeepNewer,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Merge => "merge",
            Self::KeepNewer => "keep_newer",
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            "keep_newer" => Ok(Self::KeepNewer),
            _ => Err(SyncError::Config(format!("Unknown merge strategy: {}", s))),
        }
    }
}

/// Stateless record conflict resolver.
pub struct MergeResolver;

impl MergeResolver {
    /// Resolve `existing` against `incoming` using `strategy`.
    ///
    /// With no existing record every strategy returns `incoming`.
    pub fn resolve(strategy: MergeStrategy, existing: Option<&Value>, incoming: Value) -> Value {
        let Some(existing) = existing else {
            return incoming;
        };

        match strategy {
            MergeStrategy::Replace => incoming,
            MergeStrategy::Merge => overlay(existing, incoming),
            MergeStrategy::KeepNewer => {
                let existing_ts = existing.get(UPDATED_AT_FIELD).and_then(parse_timestamp);
                let incoming_ts = incoming.get(UPDATED_AT_FIELD).and_then(parse_timestamp);
                if incoming_wins(existing_ts, incoming_ts) {
                    incoming
                } else {
                    existing.clone()
                }
            }
        }
    }
}

/// Shallow overlay. Non-object records cannot be overlaid, so incoming wins.
fn overlay(existing: &Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Object(base), Value::Object(top)) => {
            let mut merged = base.clone();
            for (field, value) in top {
                merged.insert(field, value);
            }
            Value::Object(merged)
        }
        (_, incoming) => incoming,
    }
}

/// Whether a record stamped `incoming` should replace one stamped `existing`.
///
/// Only a strictly later timestamp wins. An unparseable incoming stamp never
/// wins; an unparseable existing stamp loses to any valid incoming one.
pub fn incoming_wins(existing: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> bool {
    match (existing, incoming) {
        (Some(existing), Some(incoming)) => incoming > existing,
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

/// Parse a record timestamp: RFC 3339 text or Unix epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replace_takes_incoming() {
        let result = MergeResolver::resolve(
            MergeStrategy::Replace,
            Some(&json!({"a": 1})),
            json!({"a": 2}),
        );
        assert_eq!(result, json!({"a": 2}));
    }

    #[test]
    fn test_merge_overlays_fields() {
        let result = MergeResolver::resolve(
            MergeStrategy::Merge,
            Some(&json!({"a": 1, "b": 2})),
            json!({"a": 3}),
        );
        assert_eq!(result, json!({"a": 3, "b": 2}));
    }

    #[test]
    fn test_merge_is_shallow() {
        let result = MergeResolver::resolve(
            MergeStrategy::Merge,
            Some(&json!({"stats": {"reps": 10, "sets": 3}})),
            json!({"stats": {"reps": 12}}),
        );
        assert_eq!(result, json!({"stats": {"reps": 12}}));
    }

    #[test]
    fn test_merge_with_non_object_existing() {
        let result = MergeResolver::resolve(MergeStrategy::Merge, Some(&json!([1, 2])), json!({"a": 1}));
        assert_eq!(result, json!({"a": 1}));
    }

    #[test]
    fn test_keep_newer_keeps_existing_when_incoming_older() {
        let existing = json!({"id": "w1", "updatedAt": "2024-03-02T10:00:00Z"});
        let incoming = json!({"id": "w1", "updatedAt": "2024-03-01T10:00:00Z"});

        let result = MergeResolver::resolve(MergeStrategy::KeepNewer, Some(&existing), incoming);
        assert_eq!(result, existing);
    }

    #[test]
    fn test_keep_newer_takes_newer_incoming() {
        let existing = json!({"id": "w1", "updatedAt": 1_700_000_000_000i64});
        let incoming = json!({"id": "w1", "updatedAt": 1_700_000_000_001i64, "reps": 5});

        let result =
            MergeResolver::resolve(MergeStrategy::KeepNewer, Some(&existing), incoming.clone());
        assert_eq!(result, incoming);
    }

    #[test]
    fn test_keep_newer_equal_timestamps_keep_existing() {
        let existing = json!({"v": 1, "updatedAt": "2024-03-02T10:00:00Z"});
        let incoming = json!({"v": 2, "updatedAt": "2024-03-02T10:00:00+00:00"});

        let result = MergeResolver::resolve(MergeStrategy::KeepNewer, Some(&existing), incoming);
        assert_eq!(result["v"], 1);
    }

    #[test]
    fn test_every_strategy_without_existing_takes_incoming() {
        for strategy in [
            MergeStrategy::Replace,
            MergeStrategy::Merge,
            MergeStrategy::KeepNewer,
        ] {
            let result = MergeResolver::resolve(strategy, None, json!({"a": 1}));
            assert_eq!(result, json!({"a": 1}), "strategy {}", strategy);
        }
    }

    #[test]
    fn test_incoming_wins_with_missing_stamps() {
        let ts = Utc.timestamp_millis_opt(1_000).single();
        assert!(incoming_wins(None, ts));
        assert!(!incoming_wins(ts, None));
        assert!(!incoming_wins(None, None));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let from_text = parse_timestamp(&json!("2024-01-01T00:00:00Z")).unwrap();
        let from_millis = parse_timestamp(&json!(1_704_067_200_000i64)).unwrap();
        assert_eq!(from_text, from_millis);

        assert!(parse_timestamp(&json!("yesterday")).is_none());
        assert!(parse_timestamp(&json!(null)).is_none());
    }

    #[test]
    fn test_strategy_serde_names() {
        assert_eq!(
            serde_json::to_value(MergeStrategy::KeepNewer).unwrap(),
            json!("keep_newer")
        );
        assert_eq!("merge".parse::<MergeStrategy>().unwrap(), MergeStrategy::Merge);
        assert!("newest".parse::<MergeStrategy>().is_err());
    }
}
