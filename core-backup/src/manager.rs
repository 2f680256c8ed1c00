//! # Snapshot Manager
//!
//! Builds, verifies, prunes and restores point-in-time snapshots of local data.
//!
//! ## Overview
//!
//! A snapshot copies every record of the requested categories (each category
//! is a [`LocalStore`] table) into one canonical payload. The payload's SHA-256
//! checksum and size are recorded in the snapshot metadata.
//!
//! ## Storage layout
//!
//! - `snapshot_metadata`: one [`SnapshotMetadata`] per snapshot, keyed by id
//! - `snapshot_payloads`: `{id, transform, payload}` keyed by id, where
//!   `payload` is the canonical text after the [`PayloadTransform`]
//!
//! Metadata is written after the payload, so a listed snapshot always has one.
//!
//! ## Exclusivity
//!
//! One build at a time per manager. A second `create` while one is running
//! fails with [`SnapshotError::Busy`]; it is not queued.
//!
//! ## Retention
//!
//! After each successful build, snapshots past `expires_at` are deleted, then
//! each owner's oldest snapshots beyond `retention_count`.

use crate::{
    canonical::{canonical_bytes, checksum},
    error::{Result, SnapshotError},
    model::{
        PruneReport, RestoreOptions, RestoreSummary, SnapshotData, SnapshotId, SnapshotKind,
        SnapshotMetadata, SnapshotStatus, VERSION_KEY,
    },
    transform::{IdentityTransform, PayloadTransform},
};
use bridge_traits::{Clock, LocalStore};
use chrono::Duration as ChronoDuration;
use core_async::task::spawn_blocking;
use core_runtime::config::DeviceInfo;
use core_runtime::events::{CoreEvent, EventBus, SnapshotEvent};
use core_sync::MergeResolver;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub const SNAPSHOT_METADATA_TABLE: &str = "snapshot_metadata";
pub const SNAPSHOT_PAYLOAD_TABLE: &str = "snapshot_payloads";

/// Record field holding the storage key when restoring.
const RECORD_ID_FIELD: &str = "id";
/// Record field rewritten when restoring into another owner.
const RECORD_OWNER_FIELD: &str = "ownerId";

/// Snapshot manager configuration
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Largest canonical payload accepted
    pub max_snapshot_size_bytes: u64,

    /// Snapshots kept per owner
    pub retention_count: usize,

    /// Days until a snapshot expires
    pub retention_days: u32,

    pub migration_ticket_ttl: Duration,

    /// Categories captured when a caller passes none
    pub all_categories: Vec<String>,

    /// Requests compression; needs a host-supplied transform
    pub compression_enabled: bool,

    /// Requests encryption; needs a host-supplied transform
    pub encryption_enabled: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_snapshot_size_bytes: 10 * 1024 * 1024,
            retention_count: 10,
            retention_days: 30,
            migration_ticket_ttl: Duration::from_secs(24 * 60 * 60),
            all_categories: vec![
                "workouts".to_string(),
                "exercises".to_string(),
                "achievements".to_string(),
                "goals".to_string(),
                "settings".to_string(),
            ],
            compression_enabled: false,
            encryption_enabled: false,
        }
    }
}

impl SnapshotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_snapshot_size_bytes == 0 {
            return Err(SnapshotError::Config(
                "max_snapshot_size_bytes must be greater than 0".to_string(),
            ));
        }
        if self.retention_count == 0 {
            return Err(SnapshotError::Config(
                "retention_count must be at least 1".to_string(),
            ));
        }
        if self.retention_days == 0 {
            return Err(SnapshotError::Config(
                "retention_days must be at least 1".to_string(),
            ));
        }
        if self.migration_ticket_ttl.is_zero() {
            return Err(SnapshotError::Config(
                "migration_ticket_ttl must be greater than zero".to_string(),
            ));
        }
        for category in &self.all_categories {
            validate_category(category)?;
        }
        Ok(())
    }
}

fn validate_category(category: &str) -> Result<()> {
    if category.trim().is_empty() || category == VERSION_KEY {
        return Err(SnapshotError::InvalidCategory(category.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPayload {
    id: SnapshotId,
    transform: String,
    payload: String,
}

/// Releases the build latch when a build ends, however it ends.
struct BuildLatch<'a>(&'a AtomicBool);

impl<'a> BuildLatch<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BuildLatch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Snapshot service; construct once and share behind an `Arc`.
pub struct SnapshotManager {
    pub(crate) config: SnapshotConfig,
    pub(crate) store: Arc<dyn LocalStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) device_info: DeviceInfo,
    pub(crate) event_bus: Arc<EventBus>,
    transform: Arc<dyn PayloadTransform>,
    building: AtomicBool,
}

impl SnapshotManager {
    pub fn new(
        config: SnapshotConfig,
        store: Arc<dyn LocalStore>,
        clock: Arc<dyn Clock>,
        device_info: DeviceInfo,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;

        if config.compression_enabled || config.encryption_enabled {
            warn!(
                compression = config.compression_enabled,
                encryption = config.encryption_enabled,
                "Payload compression/encryption requested without a transform; storing canonical text"
            );
        }

        Ok(Self {
            config,
            store,
            clock,
            device_info,
            event_bus,
            transform: Arc::new(IdentityTransform),
            building: AtomicBool::new(false),
        })
    }

    /// Use a host-supplied payload transform.
    pub fn with_transform(mut self, transform: Arc<dyn PayloadTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    /// Build and persist a snapshot of `categories` for `owner_id`.
    ///
    /// An empty `categories` slice captures `SnapshotConfig::all_categories`.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::Busy`] if another build is running
    /// - [`SnapshotError::SizeExceeded`] if the canonical payload is too large
    #[instrument(skip(self, categories), fields(owner_id = %owner_id, kind = %kind))]
    pub async fn create(
        &self,
        owner_id: &str,
        kind: SnapshotKind,
        categories: &[String],
    ) -> Result<SnapshotMetadata> {
        self.build(owner_id, kind, categories, None).await
    }

    /// Build a snapshot; the post-build prune never removes `retain`.
    async fn build(
        &self,
        owner_id: &str,
        kind: SnapshotKind,
        categories: &[String],
        retain: Option<SnapshotId>,
    ) -> Result<SnapshotMetadata> {
        let Some(_latch) = BuildLatch::acquire(&self.building) else {
            debug!("Snapshot build already in progress");
            return Err(SnapshotError::Busy);
        };

        if owner_id.trim().is_empty() {
            return Err(SnapshotError::Config("owner_id is required".to_string()));
        }

        let requested: &[String] = if categories.is_empty() {
            &self.config.all_categories
        } else {
            categories
        };
        let categories: BTreeSet<String> = requested.iter().cloned().collect();
        for category in &categories {
            validate_category(category)?;
        }

        let mut data = SnapshotData::new();
        for category in &categories {
            let records = self.store.get_all(category).await?;
            data.categories.insert(
                category.clone(),
                records.into_iter().map(|record| record.value).collect(),
            );
        }
        let record_count = data.record_count();

        let (canonical, digest) = spawn_blocking(move || -> Result<(Vec<u8>, String)> {
            let bytes = canonical_bytes(&data)?;
            let digest = checksum(&bytes);
            Ok((bytes, digest))
        })
        .await
        .map_err(|e| SnapshotError::Internal(format!("Checksum task failed: {}", e)))??;

        let size_bytes = canonical.len() as u64;
        if size_bytes > self.config.max_snapshot_size_bytes {
            warn!(
                size_bytes,
                limit = self.config.max_snapshot_size_bytes,
                "Snapshot too large"
            );
            return Err(SnapshotError::SizeExceeded {
                size: size_bytes,
                limit: self.config.max_snapshot_size_bytes,
            });
        }

        let text = String::from_utf8(canonical)
            .map_err(|e| SnapshotError::Internal(format!("Canonical payload is not UTF-8: {}", e)))?;

        let now = self.clock.now();
        let metadata = SnapshotMetadata {
            id: SnapshotId::new(),
            owner_id: owner_id.to_string(),
            kind,
            status: SnapshotStatus::Completed,
            categories: categories.into_iter().collect(),
            size_bytes,
            created_at: now,
            expires_at: now + ChronoDuration::days(i64::from(self.config.retention_days)),
            checksum: digest,
            device_info: self.device_info.clone(),
        };

        let stored = StoredPayload {
            id: metadata.id,
            transform: self.transform.name().to_string(),
            payload: self.transform.encode(text)?,
        };
        let key = metadata.id.to_string();
        self.store
            .put(SNAPSHOT_PAYLOAD_TABLE, &key, serde_json::to_value(&stored)?)
            .await?;

        if let Err(e) = self
            .store
            .put(SNAPSHOT_METADATA_TABLE, &key, serde_json::to_value(&metadata)?)
            .await
        {
            self.store.delete(SNAPSHOT_PAYLOAD_TABLE, &key).await.ok();
            return Err(e.into());
        }

        info!(
            snapshot_id = %metadata.id,
            size_bytes,
            records = record_count,
            "Snapshot created"
        );
        self.event_bus
            .emit(CoreEvent::Snapshot(SnapshotEvent::Created {
                snapshot_id: metadata.id.to_string(),
                owner_id: metadata.owner_id.clone(),
                kind: kind.as_str().to_string(),
                size_bytes,
                categories: metadata.categories.clone(),
            }))
            .ok();

        if let Err(e) = self.prune_retaining(retain).await {
            warn!(error = %e, "Prune after snapshot build failed");
        }

        Ok(metadata)
    }

    /// Restore a snapshot owned by `owner_id` into local storage.
    ///
    /// Writes are per record and not transactional; a failure part way
    /// through leaves earlier records written.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotFound`] if the snapshot does not exist
    /// - [`SnapshotError::Unauthorized`] if it belongs to another owner
    /// - [`SnapshotError::IntegrityMismatch`] if verification is on and the
    ///   payload no longer matches its checksum
    #[instrument(skip(self, options), fields(snapshot_id = %snapshot_id, owner_id = %owner_id))]
    pub async fn restore(
        &self,
        snapshot_id: SnapshotId,
        owner_id: &str,
        options: RestoreOptions,
    ) -> Result<RestoreSummary> {
        let metadata = self.get_metadata(snapshot_id).await?;
        ensure_owner(&metadata, owner_id)?;
        self.restore_into(&metadata, owner_id, &options).await
    }

    /// Restore `metadata` for `target_owner`, rewriting record owners if they differ.
    pub(crate) async fn restore_into(
        &self,
        metadata: &SnapshotMetadata,
        target_owner: &str,
        options: &RestoreOptions,
    ) -> Result<RestoreSummary> {
        if metadata.is_expired(self.clock.now()) {
            return Err(SnapshotError::Expired(format!("Snapshot {}", metadata.id)));
        }

        let text = self.load_payload(metadata.id).await?;

        if options.verify_integrity && !self.payload_matches(metadata, &text).await? {
            error!(snapshot_id = %metadata.id, "Snapshot checksum mismatch");
            self.event_bus
                .emit(CoreEvent::Snapshot(SnapshotEvent::IntegrityCheckFailed {
                    snapshot_id: metadata.id.to_string(),
                }))
                .ok();
            return Err(SnapshotError::IntegrityMismatch {
                snapshot_id: metadata.id.to_string(),
            });
        }

        let data: SnapshotData = serde_json::from_str(&text)
            .map_err(|e| SnapshotError::Corrupted(format!("Snapshot {}: {}", metadata.id, e)))?;

        let categories: Vec<String> = match &options.categories {
            Some(requested) => requested.clone(),
            None => metadata.categories.clone(),
        };

        let safety_snapshot_id = if options.create_safety_snapshot {
            match self
                .build(
                    target_owner,
                    SnapshotKind::Recovery,
                    &categories,
                    Some(metadata.id),
                )
                .await
            {
                Ok(safety) => Some(safety.id),
                Err(e) => {
                    warn!(error = %e, "Safety snapshot failed; continuing restore");
                    None
                }
            }
        } else {
            None
        };

        let rewrite_owner = target_owner != metadata.owner_id;
        let mut records_written = 0u64;
        let mut records_skipped = 0u64;

        for category in &categories {
            let Some(records) = data.categories.get(category) else {
                debug!(category = %category, "Category not in snapshot; skipping");
                continue;
            };

            for record in records {
                let Some(key) = record_key(record) else {
                    records_skipped += 1;
                    continue;
                };

                let mut incoming = record.clone();
                if rewrite_owner {
                    if let Some(fields) = incoming.as_object_mut() {
                        if fields.contains_key(RECORD_OWNER_FIELD) {
                            fields.insert(RECORD_OWNER_FIELD.to_string(), json!(target_owner));
                        }
                    }
                }

                let existing = self.store.get(category, &key).await?;
                let resolved =
                    MergeResolver::resolve(options.merge_strategy, existing.as_ref(), incoming);
                self.store.put(category, &key, resolved).await?;
                records_written += 1;
            }
        }

        info!(
            snapshot_id = %metadata.id,
            records_written,
            records_skipped,
            strategy = %options.merge_strategy,
            "Snapshot restored"
        );
        self.event_bus
            .emit(CoreEvent::Snapshot(SnapshotEvent::Restored {
                snapshot_id: metadata.id.to_string(),
                owner_id: target_owner.to_string(),
                records_written,
            }))
            .ok();

        Ok(RestoreSummary {
            snapshot_id: metadata.id,
            categories,
            records_written,
            records_skipped,
            safety_snapshot_id,
        })
    }

    /// Delete expired snapshots, then each owner's oldest beyond the retention limit.
    ///
    /// Snapshots referenced by an unexpired migration ticket are kept even
    /// when they fall outside the retention count.
    pub async fn prune(&self) -> Result<PruneReport> {
        self.prune_retaining(None).await
    }

    #[instrument(skip(self))]
    async fn prune_retaining(&self, retain: Option<SnapshotId>) -> Result<PruneReport> {
        let now = self.clock.now();
        let mut report = PruneReport::default();

        report.expired_tickets = self.cleanup_expired_tickets().await?;
        let mut protected: HashSet<SnapshotId> = self.ticketed_snapshots().await?;
        protected.extend(retain);

        let mut by_owner: HashMap<String, Vec<SnapshotMetadata>> = HashMap::new();
        for metadata in self.all_metadata().await? {
            if metadata.is_expired(now) {
                self.remove(metadata.id).await?;
                report.expired += 1;
            } else {
                by_owner
                    .entry(metadata.owner_id.clone())
                    .or_default()
                    .push(metadata);
            }
        }

        for snapshots in by_owner.values_mut() {
            if snapshots.len() <= self.config.retention_count {
                continue;
            }
            sort_newest_first(snapshots);
            for metadata in snapshots.drain(self.config.retention_count..) {
                if protected.contains(&metadata.id) {
                    debug!(snapshot_id = %metadata.id, "Keeping protected snapshot past retention");
                    continue;
                }
                self.remove(metadata.id).await?;
                report.over_limit += 1;
            }
        }

        if report.total() > 0 {
            info!(
                expired = report.expired,
                over_limit = report.over_limit,
                "Pruned snapshots"
            );
            self.event_bus
                .emit(CoreEvent::Snapshot(SnapshotEvent::Pruned {
                    expired: report.expired,
                    over_limit: report.over_limit,
                }))
                .ok();
        }

        Ok(report)
    }

    /// Snapshots of `owner_id`, newest first.
    pub async fn list(&self, owner_id: &str) -> Result<Vec<SnapshotMetadata>> {
        let mut snapshots: Vec<SnapshotMetadata> = self
            .all_metadata()
            .await?
            .into_iter()
            .filter(|m| m.owner_id == owner_id)
            .collect();
        sort_newest_first(&mut snapshots);
        Ok(snapshots)
    }

    pub async fn get_metadata(&self, snapshot_id: SnapshotId) -> Result<SnapshotMetadata> {
        let value = self
            .store
            .get(SNAPSHOT_METADATA_TABLE, &snapshot_id.to_string())
            .await?
            .ok_or_else(|| SnapshotError::NotFound(format!("Snapshot {}", snapshot_id)))?;

        serde_json::from_value(value)
            .map_err(|e| SnapshotError::Corrupted(format!("Snapshot {} metadata: {}", snapshot_id, e)))
    }

    #[instrument(skip(self), fields(snapshot_id = %snapshot_id, owner_id = %owner_id))]
    pub async fn delete(&self, snapshot_id: SnapshotId, owner_id: &str) -> Result<()> {
        let metadata = self.get_metadata(snapshot_id).await?;
        ensure_owner(&metadata, owner_id)?;
        self.remove(snapshot_id).await?;
        info!("Snapshot deleted");
        Ok(())
    }

    /// Recompute the checksum of a stored snapshot.
    ///
    /// Returns `Ok(false)` on mismatch or an undecodable payload.
    pub async fn verify(&self, snapshot_id: SnapshotId) -> Result<bool> {
        let metadata = self.get_metadata(snapshot_id).await?;
        let text = match self.load_payload(snapshot_id).await {
            Ok(text) => text,
            Err(SnapshotError::Corrupted(reason)) => {
                warn!(snapshot_id = %snapshot_id, reason = %reason, "Snapshot payload unreadable");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        self.payload_matches(&metadata, &text).await
    }

    async fn payload_matches(&self, metadata: &SnapshotMetadata, text: &str) -> Result<bool> {
        let bytes = text.as_bytes().to_vec();
        let digest = spawn_blocking(move || checksum(&bytes))
            .await
            .map_err(|e| SnapshotError::Internal(format!("Checksum task failed: {}", e)))?;
        Ok(digest == metadata.checksum)
    }

    async fn load_payload(&self, snapshot_id: SnapshotId) -> Result<String> {
        let value = self
            .store
            .get(SNAPSHOT_PAYLOAD_TABLE, &snapshot_id.to_string())
            .await?
            .ok_or_else(|| {
                SnapshotError::Corrupted(format!("Snapshot {} has no payload", snapshot_id))
            })?;

        let stored: StoredPayload = serde_json::from_value(value)
            .map_err(|e| SnapshotError::Corrupted(format!("Snapshot {} payload: {}", snapshot_id, e)))?;

        if stored.transform != self.transform.name() {
            return Err(SnapshotError::Corrupted(format!(
                "Snapshot {} was written with transform '{}' but '{}' is configured",
                snapshot_id,
                stored.transform,
                self.transform.name()
            )));
        }

        self.transform.decode(stored.payload)
    }

    async fn all_metadata(&self) -> Result<Vec<SnapshotMetadata>> {
        let records = self.store.get_all(SNAPSHOT_METADATA_TABLE).await?;
        let mut snapshots = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<SnapshotMetadata>(record.value) {
                Ok(metadata) => snapshots.push(metadata),
                Err(e) => warn!(key = %record.key, error = %e, "Skipping unreadable snapshot metadata"),
            }
        }
        Ok(snapshots)
    }

    async fn remove(&self, snapshot_id: SnapshotId) -> Result<()> {
        let key = snapshot_id.to_string();
        self.store.delete(SNAPSHOT_METADATA_TABLE, &key).await?;
        self.store.delete(SNAPSHOT_PAYLOAD_TABLE, &key).await?;
        debug!(snapshot_id = %snapshot_id, "Removed snapshot");
        Ok(())
    }
}

fn ensure_owner(metadata: &SnapshotMetadata, owner_id: &str) -> Result<()> {
    if metadata.owner_id != owner_id {
        warn!(snapshot_id = %metadata.id, "Snapshot access by non-owner rejected");
        return Err(SnapshotError::Unauthorized {
            snapshot_id: metadata.id.to_string(),
            owner_id: owner_id.to_string(),
        });
    }
    Ok(())
}

fn sort_newest_first(snapshots: &mut [SnapshotMetadata]) {
    snapshots.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.to_string().cmp(&a.id.to_string()))
    });
}

/// Storage key of a record: its `id` as text.
fn record_key(record: &Value) -> Option<String> {
    match record.get(RECORD_ID_FIELD)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::MemoryLocalStore;
    use bridge_traits::FixedClock;
    use chrono::Utc;
    use core_sync::MergeStrategy;

    fn manager(store: Arc<MemoryLocalStore>, clock: Arc<FixedClock>) -> SnapshotManager {
        SnapshotManager::new(
            SnapshotConfig::default(),
            store,
            clock,
            DeviceInfo::new("device-1", "ios", "1.0.0"),
            Arc::new(EventBus::default()),
        )
        .unwrap()
    }

    fn workouts() -> Vec<String> {
        vec!["workouts".to_string()]
    }

    #[test]
    fn test_config_rejects_reserved_category() {
        let config = SnapshotConfig {
            all_categories: vec!["version".to_string()],
            ..SnapshotConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SnapshotError::InvalidCategory(_))
        ));
    }

    #[test]
    fn test_record_key() {
        assert_eq!(record_key(&json!({"id": "w1"})).as_deref(), Some("w1"));
        assert_eq!(record_key(&json!({"id": 7})).as_deref(), Some("7"));
        assert_eq!(record_key(&json!({"id": ""})), None);
        assert_eq!(record_key(&json!({"name": "x"})), None);
    }

    #[tokio::test]
    async fn test_create_records_checksum_and_size() {
        let store = Arc::new(MemoryLocalStore::new());
        store.put("workouts", "w1", json!({"id": "w1"})).await.unwrap();
        let manager = manager(store, Arc::new(FixedClock::new(Utc::now())));

        let metadata = manager.create("u1", SnapshotKind::Manual, &workouts()).await.unwrap();

        let expected = canonical_bytes(&json!({"version": 1, "workouts": [{"id": "w1"}]})).unwrap();
        assert_eq!(metadata.size_bytes, expected.len() as u64);
        assert_eq!(metadata.checksum, checksum(&expected));
        assert_eq!(metadata.status, SnapshotStatus::Completed);
        assert!(manager.verify(metadata.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_payload() {
        let store = Arc::new(MemoryLocalStore::new());
        store
            .put("workouts", "w1", json!({"id": "w1", "notes": "x".repeat(512)}))
            .await
            .unwrap();
        let manager = SnapshotManager::new(
            SnapshotConfig {
                max_snapshot_size_bytes: 256,
                ..SnapshotConfig::default()
            },
            store.clone(),
            Arc::new(FixedClock::new(Utc::now())),
            DeviceInfo::default(),
            Arc::new(EventBus::default()),
        )
        .unwrap();

        let result = manager.create("u1", SnapshotKind::Manual, &workouts()).await;
        assert!(matches!(result, Err(SnapshotError::SizeExceeded { limit: 256, .. })));
        assert!(store.is_empty(SNAPSHOT_METADATA_TABLE).await);
        assert!(!manager.is_building());
    }

    #[tokio::test]
    async fn test_restore_rejects_other_owner() {
        let store = Arc::new(MemoryLocalStore::new());
        let manager = manager(store, Arc::new(FixedClock::new(Utc::now())));
        let metadata = manager.create("u1", SnapshotKind::Manual, &workouts()).await.unwrap();

        let result = manager
            .restore(metadata.id, "u2", RestoreOptions::default())
            .await;
        assert!(matches!(result, Err(SnapshotError::Unauthorized { .. })));

        let result = manager.delete(metadata.id, "u2").await;
        assert!(matches!(result, Err(SnapshotError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_restore_missing_snapshot() {
        let manager = manager(
            Arc::new(MemoryLocalStore::new()),
            Arc::new(FixedClock::new(Utc::now())),
        );

        let result = manager
            .restore(SnapshotId::new(), "u1", RestoreOptions::default())
            .await;
        assert!(matches!(result, Err(SnapshotError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_restore_skips_records_without_id() {
        let store = Arc::new(MemoryLocalStore::new());
        store.put("workouts", "w1", json!({"id": "w1"})).await.unwrap();
        store.put("workouts", "legacy", json!({"name": "no id"})).await.unwrap();
        let manager = manager(store.clone(), Arc::new(FixedClock::new(Utc::now())));
        let metadata = manager.create("u1", SnapshotKind::Manual, &workouts()).await.unwrap();

        let summary = manager
            .restore(metadata.id, "u1", RestoreOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.records_written, 1);
        assert_eq!(summary.records_skipped, 1);
    }

    #[tokio::test]
    async fn test_restore_with_merge_strategy() {
        let store = Arc::new(MemoryLocalStore::new());
        store
            .put("workouts", "w1", json!({"id": "w1", "reps": 10}))
            .await
            .unwrap();
        let manager = manager(store.clone(), Arc::new(FixedClock::new(Utc::now())));
        let metadata = manager.create("u1", SnapshotKind::Manual, &workouts()).await.unwrap();

        store
            .put("workouts", "w1", json!({"id": "w1", "reps": 12, "notes": "edited"}))
            .await
            .unwrap();

        manager
            .restore(
                metadata.id,
                "u1",
                RestoreOptions::default().merge_strategy(MergeStrategy::Merge),
            )
            .await
            .unwrap();

        assert_eq!(
            store.get("workouts", "w1").await.unwrap(),
            Some(json!({"id": "w1", "reps": 10, "notes": "edited"}))
        );
    }

    #[tokio::test]
    async fn test_safety_snapshot_is_taken() {
        let store = Arc::new(MemoryLocalStore::new());
        store.put("workouts", "w1", json!({"id": "w1"})).await.unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let manager = manager(store, clock.clone());
        let metadata = manager.create("u1", SnapshotKind::Manual, &workouts()).await.unwrap();
        clock.advance(ChronoDuration::seconds(1));

        let summary = manager
            .restore(
                metadata.id,
                "u1",
                RestoreOptions::default().create_safety_snapshot(true),
            )
            .await
            .unwrap();

        let safety_id = summary.safety_snapshot_id.unwrap();
        let safety = manager.get_metadata(safety_id).await.unwrap();
        assert_eq!(safety.kind, SnapshotKind::Recovery);
        assert_eq!(manager.list("u1").await.unwrap()[0].id, safety_id);
    }

    #[tokio::test]
    async fn test_prune_removes_expired() {
        let store = Arc::new(MemoryLocalStore::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let manager = manager(store, clock.clone());
        let old = manager.create("u1", SnapshotKind::Automatic, &workouts()).await.unwrap();

        clock.advance(ChronoDuration::days(31));
        let report = manager.prune().await.unwrap();

        assert_eq!(report.expired, 1);
        assert!(matches!(
            manager.get_metadata(old.id).await,
            Err(SnapshotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_of_expired_snapshot_fails() {
        let store = Arc::new(MemoryLocalStore::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let manager = manager(store, clock.clone());
        let metadata = manager.create("u1", SnapshotKind::Manual, &workouts()).await.unwrap();

        clock.advance(ChronoDuration::days(31));
        let result = manager
            .restore(metadata.id, "u1", RestoreOptions::default())
            .await;
        assert!(matches!(result, Err(SnapshotError::Expired(_))));
    }

    #[tokio::test]
    async fn test_delete_by_owner() {
        let store = Arc::new(MemoryLocalStore::new());
        let manager = manager(store.clone(), Arc::new(FixedClock::new(Utc::now())));
        let metadata = manager.create("u1", SnapshotKind::Manual, &workouts()).await.unwrap();

        manager.delete(metadata.id, "u1").await.unwrap();
        assert!(store.is_empty(SNAPSHOT_METADATA_TABLE).await);
        assert!(store.is_empty(SNAPSHOT_PAYLOAD_TABLE).await);
    }

    #[tokio::test]
    async fn test_empty_categories_capture_all() {
        let store = Arc::new(MemoryLocalStore::new());
        let manager = manager(store, Arc::new(FixedClock::new(Utc::now())));

        let metadata = manager.create("u1", SnapshotKind::Manual, &[]).await.unwrap();

        let mut expected = SnapshotConfig::default().all_categories;
        expected.sort();
        assert_eq!(metadata.categories, expected);
    }
}
