//! # Recovery Scanner
//!
//! Finds sessions interrupted by a crash or kill and hands them back to the
//! [`SessionEngine`].
//!
//! ## Flow
//!
//! 1. **Scan**: read every registered [`RecoverySource`], classify each record
//!    as valid or corrupted, drop sessions that ended normally and collapse
//!    duplicates across sources (latest `lastSaved` wins)
//! 2. **Recover**: start each recoverable session, then pause it so the user
//!    decides when to continue; failures are collected per session
//! 3. **Quarantine**: delete corrupted records from their origin store
//!
//! Meant to run once at process start. Not guarded against concurrent use.

use crate::candidate::{
    CandidateOrigin, CleanupReport, FailedRecovery, RecoveredSession, RecoveryCandidate,
    RecoveryReport, RecoverySource,
};
use crate::error::{RecoveryError, Result};
use crate::validation::{is_terminal_status, loose_status, validate_session};
use bridge_traits::{Clock, SessionEngine};
use chrono::Duration as ChronoDuration;
use core_runtime::events::{CoreEvent, EventBus, RecoveryEvent};
use core_sync::incoming_wins;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Recovery configuration
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Age after which session records are cleaned up at startup
    pub max_age_days: u32,

    /// Pause sessions right after they are rebuilt
    pub pause_after_restore: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_age_days: 7,
            pause_after_restore: true,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_age_days == 0 {
            return Err(RecoveryError::Config(
                "max_age_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct RecoveryScanner {
    config: RecoveryConfig,
    sources: Vec<RecoverySource>,
    engine: Arc<dyn SessionEngine>,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
}

impl RecoveryScanner {
    pub fn new(
        config: RecoveryConfig,
        sources: Vec<RecoverySource>,
        engine: Arc<dyn SessionEngine>,
        clock: Arc<dyn Clock>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;

        let mut names = HashSet::new();
        for source in &sources {
            if source.name.trim().is_empty() || source.table.trim().is_empty() {
                return Err(RecoveryError::Config(
                    "Recovery source name and table must not be empty".to_string(),
                ));
            }
            if !names.insert(source.name.as_str()) {
                return Err(RecoveryError::Config(format!(
                    "Duplicate recovery source '{}'",
                    source.name
                )));
            }
        }

        Ok(Self {
            config,
            sources,
            engine,
            clock,
            event_bus,
        })
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn sources(&self) -> &[RecoverySource] {
        &self.sources
    }

    /// Collect interrupted sessions from every source.
    ///
    /// Corrupted records are returned with `is_corrupted = true`. A source that
    /// cannot be read is logged and skipped.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<Vec<RecoveryCandidate>> {
        let mut candidates: Vec<RecoveryCandidate> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();

        for source in &self.sources {
            let records = match source.store.get_all(&source.table).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(source = %source.name, error = %e, "Session source unreadable; skipping");
                    continue;
                }
            };

            for record in records {
                if loose_status(&record.value).is_some_and(is_terminal_status) {
                    continue;
                }

                let origin = CandidateOrigin {
                    source: source.name.clone(),
                    table: source.table.clone(),
                    key: record.key,
                };
                let candidate = RecoveryCandidate::from_record(origin, record.value);

                if candidate.is_corrupted {
                    debug!(
                        source = %source.name,
                        id = %candidate.id,
                        reason = candidate.corruption_reason.as_deref().unwrap_or_default(),
                        "Corrupted session record"
                    );
                    candidates.push(candidate);
                    continue;
                }

                match by_id.get(&candidate.id) {
                    Some(&index) => {
                        if incoming_wins(candidates[index].last_saved, candidate.last_saved) {
                            debug!(id = %candidate.id, source = %source.name, "Newer duplicate session replaces earlier one");
                            candidates[index] = candidate;
                        }
                    }
                    None => {
                        by_id.insert(candidate.id.clone(), candidates.len());
                        candidates.push(candidate);
                    }
                }
            }
        }

        let recoverable = candidates.iter().filter(|c| c.can_recover).count() as u32;
        let corrupted = candidates.iter().filter(|c| c.is_corrupted).count() as u32;
        info!(
            candidates = candidates.len(),
            recoverable, corrupted, "Recovery scan completed"
        );
        self.event_bus
            .emit(CoreEvent::Recovery(RecoveryEvent::ScanCompleted {
                candidates: candidates.len() as u32,
                recoverable,
                corrupted,
            }))
            .ok();

        Ok(candidates)
    }

    /// Rebuild every recoverable session and quarantine corrupted records.
    #[instrument(skip(self))]
    pub async fn recover_all(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for candidate in self.scan().await? {
            if candidate.is_corrupted {
                match self.quarantine(&candidate).await {
                    Ok(true) => report.corrupted_count += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(id = %candidate.id, error = %e, "Failed to delete corrupted session record")
                    }
                }
                continue;
            }
            if !candidate.can_recover {
                continue;
            }

            match self.reconstruct(&candidate).await {
                Ok(session) => report.recovered_sessions.push(session),
                Err(e) => report.failed_recoveries.push(FailedRecovery {
                    session_id: candidate.id.clone(),
                    message: e.to_string(),
                }),
            }
        }

        if report.corrupted_count > 0 {
            self.event_bus
                .emit(CoreEvent::Recovery(RecoveryEvent::CorruptedQuarantined {
                    count: report.corrupted_count,
                }))
                .ok();
        }

        info!(
            recovered = report.recovered_sessions.len(),
            failed = report.failed_recoveries.len(),
            corrupted = report.corrupted_count,
            "Recovery sweep finished"
        );
        Ok(report)
    }

    /// Rebuild a single session by id.
    ///
    /// Returns `None` when the session is absent, corrupted, not resumable or
    /// the session engine fails.
    #[instrument(skip(self))]
    pub async fn recover_one(&self, session_id: &str) -> Option<RecoveredSession> {
        let candidates = match self.scan().await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Recovery scan failed");
                return None;
            }
        };

        let candidate = candidates
            .into_iter()
            .find(|c| c.id == session_id && !c.is_corrupted && c.can_recover)?;

        self.reconstruct(&candidate).await.ok()
    }

    /// Delete session records saved more than `days` days ago.
    ///
    /// Records that fail validation have no trustworthy age and are always
    /// deleted.
    #[instrument(skip(self))]
    pub async fn cleanup_older_than(&self, days: u32) -> Result<CleanupReport> {
        let cutoff = self.clock.now() - ChronoDuration::days(i64::from(days));
        let mut report = CleanupReport::default();

        for source in &self.sources {
            let records = match source.store.get_all(&source.table).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(source = %source.name, error = %e, "Session source unreadable; skipping cleanup");
                    continue;
                }
            };

            let mut deleted = 0;
            for record in records {
                let stale = match validate_session(&record.value) {
                    Ok(shape) => shape.last_saved < cutoff,
                    Err(_) => true,
                };
                if !stale {
                    continue;
                }
                match source.store.delete(&source.table, &record.key).await {
                    Ok(()) => deleted += 1,
                    Err(e) => {
                        warn!(source = %source.name, key = %record.key, error = %e, "Failed to delete stale session record")
                    }
                }
            }

            if deleted > 0 {
                report.by_source.insert(source.name.clone(), deleted);
                report.deleted += deleted;
            }
        }

        info!(deleted = report.deleted, older_than_days = days, "Session cleanup finished");
        self.event_bus
            .emit(CoreEvent::Recovery(RecoveryEvent::CleanedUp {
                deleted: report.deleted,
                older_than_days: days,
            }))
            .ok();

        Ok(report)
    }

    async fn reconstruct(&self, candidate: &RecoveryCandidate) -> Result<RecoveredSession> {
        let handle = match self
            .engine
            .start_session(candidate.session_payload.clone())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(session_id = %candidate.id, error = %e, "Session reconstruction failed");
                self.event_bus
                    .emit(CoreEvent::Recovery(RecoveryEvent::RecoveryFailed {
                        session_id: candidate.id.clone(),
                        message: e.to_string(),
                    }))
                    .ok();
                return Err(RecoveryError::SessionEngine(e.to_string()));
            }
        };

        let mut paused = false;
        if self.config.pause_after_restore {
            match self.engine.pause_session(&handle).await {
                Ok(()) => paused = true,
                Err(e) => warn!(session_id = %candidate.id, error = %e, "Recovered session could not be paused"),
            }
        }

        info!(session_id = %candidate.id, handle = %handle, paused, "Session recovered");
        self.event_bus
            .emit(CoreEvent::Recovery(RecoveryEvent::SessionRecovered {
                session_id: candidate.id.clone(),
                handle: handle.to_string(),
            }))
            .ok();

        Ok(RecoveredSession {
            session_id: candidate.id.clone(),
            handle,
            paused,
        })
    }

    /// Delete a corrupted record. `Ok(false)` when its source is unknown.
    async fn quarantine(&self, candidate: &RecoveryCandidate) -> Result<bool> {
        let Some(source) = self
            .sources
            .iter()
            .find(|s| s.name == candidate.origin.source)
        else {
            return Ok(false);
        };

        source
            .store
            .delete(&candidate.origin.table, &candidate.origin.key)
            .await?;
        warn!(
            source = %source.name,
            id = %candidate.id,
            reason = candidate.corruption_reason.as_deref().unwrap_or_default(),
            "Deleted corrupted session record"
        );
        Ok(true)
    }
}
