//! Migration tickets
//!
//! A ticket moves one owner's data to another identity (typically guest to
//! registered account). Issuing one takes a `migration` snapshot and returns an
//! opaque single-use token; redeeming it restores that snapshot for the new
//! owner with [`MergeStrategy::Replace`], rewriting `ownerId` on each record.
//!
//! Tickets are stored in the `migration_tickets` table keyed by token and are
//! deleted on redemption, whether or not the restore succeeds.

use crate::{
    canonical::{canonical_bytes, checksum},
    error::{Result, SnapshotError},
    manager::SnapshotManager,
    model::{RestoreOptions, RestoreSummary, SnapshotId, SnapshotKind},
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use core_runtime::events::{CoreEvent, SnapshotEvent};
use core_runtime::logging::token_prefix;
use core_sync::MergeStrategy;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

pub const MIGRATION_TICKET_TABLE: &str = "migration_tickets";

/// Random bytes in a ticket token.
const TOKEN_BYTES: usize = 32;
/// Token characters kept in logs.
const TOKEN_LOG_PREFIX: usize = 6;

/// Persisted migration ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationTicket {
    pub token: String,
    pub owner_id: String,
    pub snapshot_id: SnapshotId,
    pub expires_at: DateTime<Utc>,
    /// Checksum of the issuing device and issue time
    pub device_fingerprint: String,
}

impl MigrationTicket {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl SnapshotManager {
    /// Snapshot every category of `owner_id` and return a single-use ticket.
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn issue_migration_ticket(&self, owner_id: &str) -> Result<String> {
        let metadata = self
            .create(owner_id, SnapshotKind::Migration, &[])
            .await?;

        let now = self.clock.now();
        let ttl = ChronoDuration::from_std(self.config.migration_ticket_ttl)
            .map_err(|e| SnapshotError::Config(format!("migration_ticket_ttl: {}", e)))?;
        let fingerprint = checksum(&canonical_bytes(&json!({
            "device": self.device_info,
            "issuedAt": now,
        }))?);

        let ticket = MigrationTicket {
            token: generate_token(),
            owner_id: owner_id.to_string(),
            snapshot_id: metadata.id,
            expires_at: now + ttl,
            device_fingerprint: fingerprint,
        };

        self.store
            .put(
                MIGRATION_TICKET_TABLE,
                &ticket.token,
                serde_json::to_value(&ticket)?,
            )
            .await?;

        info!(
            token = %token_prefix(&ticket.token, TOKEN_LOG_PREFIX),
            snapshot_id = %ticket.snapshot_id,
            "Migration ticket issued"
        );
        self.event_bus
            .emit(CoreEvent::Snapshot(SnapshotEvent::MigrationTicketIssued {
                owner_id: ticket.owner_id.clone(),
                snapshot_id: ticket.snapshot_id.to_string(),
                expires_at: ticket.expires_at.timestamp_millis(),
            }))
            .ok();

        Ok(ticket.token)
    }

    /// Restore the ticket's snapshot for `new_owner_id` and consume the ticket.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotFound`] for an unknown or already redeemed token
    /// - [`SnapshotError::Expired`] past the ticket TTL (the ticket is removed)
    #[instrument(skip(self, token), fields(new_owner_id = %new_owner_id))]
    pub async fn redeem_migration_ticket(
        &self,
        token: &str,
        new_owner_id: &str,
    ) -> Result<RestoreSummary> {
        let shown = token_prefix(token, TOKEN_LOG_PREFIX);
        let value = self
            .store
            .get(MIGRATION_TICKET_TABLE, token)
            .await?
            .ok_or_else(|| SnapshotError::NotFound(format!("Migration ticket {}", shown)))?;

        let ticket: MigrationTicket = match serde_json::from_value(value) {
            Ok(ticket) => ticket,
            Err(e) => {
                self.store.delete(MIGRATION_TICKET_TABLE, token).await?;
                return Err(SnapshotError::Corrupted(format!(
                    "Migration ticket {}: {}",
                    shown, e
                )));
            }
        };

        if ticket.is_expired(self.clock.now()) {
            self.store.delete(MIGRATION_TICKET_TABLE, token).await?;
            warn!(token = %shown, "Migration ticket expired");
            return Err(SnapshotError::Expired(format!("Migration ticket {}", shown)));
        }

        let options = RestoreOptions::default().merge_strategy(MergeStrategy::Replace);
        let result = match self.get_metadata(ticket.snapshot_id).await {
            Ok(metadata) => self.restore_into(&metadata, new_owner_id, &options).await,
            Err(e) => Err(e),
        };

        self.store.delete(MIGRATION_TICKET_TABLE, token).await?;

        let success = result.is_ok();
        match &result {
            Ok(summary) => info!(
                token = %shown,
                records_written = summary.records_written,
                "Migration ticket redeemed"
            ),
            Err(e) => warn!(token = %shown, error = %e, "Migration ticket redemption failed"),
        }
        self.event_bus
            .emit(CoreEvent::Snapshot(SnapshotEvent::MigrationTicketRedeemed {
                new_owner_id: new_owner_id.to_string(),
                snapshot_id: ticket.snapshot_id.to_string(),
                success,
            }))
            .ok();

        result
    }

    /// Snapshot ids referenced by stored, unexpired tickets.
    pub(crate) async fn ticketed_snapshots(&self) -> Result<HashSet<SnapshotId>> {
        let now = self.clock.now();
        Ok(self
            .store
            .get_all(MIGRATION_TICKET_TABLE)
            .await?
            .into_iter()
            .filter_map(|record| serde_json::from_value::<MigrationTicket>(record.value).ok())
            .filter(|ticket| !ticket.is_expired(now))
            .map(|ticket| ticket.snapshot_id)
            .collect())
    }

    /// Delete expired or unreadable tickets. Returns how many were removed.
    pub async fn cleanup_expired_tickets(&self) -> Result<u32> {
        let now = self.clock.now();
        let mut removed = 0;

        for record in self.store.get_all(MIGRATION_TICKET_TABLE).await? {
            let expired = serde_json::from_value::<MigrationTicket>(record.value)
                .map(|ticket| ticket.is_expired(now))
                .unwrap_or(true);
            if expired {
                self.store.delete(MIGRATION_TICKET_TABLE, &record.key).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Removed expired migration tickets");
        }
        Ok(removed)
    }
}
