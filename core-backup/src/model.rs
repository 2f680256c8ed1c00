//! Snapshot data model

use chrono::{DateTime, Utc};
use core_runtime::config::DeviceInfo;
use core_sync::MergeStrategy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{Result, SnapshotError};

/// Version stamped into every snapshot payload.
pub const SNAPSHOT_DATA_VERSION: u32 = 1;

/// Reserved payload key; cannot be used as a category name.
pub const VERSION_KEY: &str = "version";

/// Type-safe snapshot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SnapshotError::InvalidSnapshotId(e.to_string()))
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Automatic,
    Manual,
    /// Source of a migration ticket
    Migration,
    /// Safety copy taken before a restore
    Recovery,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
            Self::Migration => "migration",
            Self::Recovery => "recovery",
        }
    }
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Expired,
}

/// Persisted description of a snapshot. Never changes once `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub id: SnapshotId,
    pub owner_id: String,
    pub kind: SnapshotKind,
    pub status: SnapshotStatus,
    /// Sorted, without duplicates
    pub categories: Vec<String>,
    /// Length of the canonical payload
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Hex SHA-256 of the canonical payload
    pub checksum: String,
    pub device_info: DeviceInfo,
}

impl SnapshotMetadata {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Snapshot payload: records per category plus a format version.
///
/// Serialized flat as `{"<category>": [records...], "version": 1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    #[serde(flatten)]
    pub categories: BTreeMap<String, Vec<Value>>,
    pub version: u32,
}

impl SnapshotData {
    pub fn new() -> Self {
        Self {
            categories: BTreeMap::new(),
            version: SNAPSHOT_DATA_VERSION,
        }
    }

    pub fn record_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }
}

impl Default for SnapshotData {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for [`SnapshotManager::restore`](crate::SnapshotManager::restore)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Categories to restore; `None` restores every category in the snapshot
    pub categories: Option<Vec<String>>,
    pub merge_strategy: MergeStrategy,
    /// Recompute the checksum before writing anything
    pub verify_integrity: bool,
    /// Take a `recovery` snapshot of the current state first (best effort)
    pub create_safety_snapshot: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            categories: None,
            merge_strategy: MergeStrategy::Replace,
            verify_integrity: true,
            create_safety_snapshot: false,
        }
    }
}

impl RestoreOptions {
    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn verify_integrity(mut self, verify: bool) -> Self {
        self.verify_integrity = verify;
        self
    }

    pub fn create_safety_snapshot(mut self, create: bool) -> Self {
        self.create_safety_snapshot = create;
        self
    }
}

/// Outcome of a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub snapshot_id: SnapshotId,
    pub categories: Vec<String>,
    pub records_written: u64,
    /// Records without a usable `id`
    pub records_skipped: u64,
    pub safety_snapshot_id: Option<SnapshotId>,
}

/// Snapshots deleted by a prune pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Past `expires_at`
    pub expired: u32,
    /// Oldest snapshots beyond the per-owner retention limit
    pub over_limit: u32,
    /// Expired migration tickets removed
    pub expired_tickets: u32,
}

impl PruneReport {
    pub fn total(&self) -> u32 {
        self.expired + self.over_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_data_serializes_flat() {
        let mut data = SnapshotData::new();
        data.categories
            .insert("workouts".to_string(), vec![json!({"id": "w1"})]);

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value, json!({"workouts": [{"id": "w1"}], "version": 1}));

        let back: SnapshotData = serde_json::from_value(value).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_metadata_uses_camel_case() {
        let now = Utc::now();
        let metadata = SnapshotMetadata {
            id: SnapshotId::new(),
            owner_id: "u1".to_string(),
            kind: SnapshotKind::Manual,
            status: SnapshotStatus::Completed,
            categories: vec!["workouts".to_string()],
            size_bytes: 200,
            created_at: now,
            expires_at: now,
            checksum: "abc".to_string(),
            device_info: DeviceInfo::new("d1", "ios", "1.0.0"),
        };

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["ownerId"], "u1");
        assert_eq!(value["sizeBytes"], 200);
        assert_eq!(value["kind"], "manual");
        assert_eq!(value["deviceInfo"]["deviceId"], "d1");
    }

    #[test]
    fn test_restore_options_builder() {
        let options = RestoreOptions::default()
            .categories(["workouts"])
            .merge_strategy(MergeStrategy::Merge);

        assert_eq!(options.categories, Some(vec!["workouts".to_string()]));
        assert!(options.verify_integrity);
        assert!(!options.create_safety_snapshot);
    }
}
