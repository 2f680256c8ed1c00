//! Automatic snapshot scheduler
//!
//! Takes an `automatic` snapshot of all categories for one owner on a fixed
//! interval. A tick that lands while another build is running is skipped.

use crate::error::SnapshotError;
use crate::manager::SnapshotManager;
use crate::model::SnapshotKind;
use core_async::sync::CancellationToken;
use core_async::task::JoinHandle;
use core_async::time::{interval, Duration, MissedTickBehavior};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SnapshotScheduler {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SnapshotScheduler {
    pub fn spawn(manager: Arc<SnapshotManager>, owner_id: impl Into<String>, every: Duration) -> Self {
        let owner_id = owner_id.into();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = core_async::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            info!(owner_id = %owner_id, interval_secs = every.as_secs(), "Automatic snapshots scheduled");
            loop {
                core_async::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        match manager.create(&owner_id, SnapshotKind::Automatic, &[]).await {
                            Ok(metadata) => debug!(snapshot_id = %metadata.id, "Automatic snapshot taken"),
                            Err(SnapshotError::Busy) => debug!("Snapshot build in progress; skipping tick"),
                            Err(e) => warn!(error = %e, "Automatic snapshot failed"),
                        }
                    }
                }
            }
            debug!("Snapshot scheduler stopped");
        });

        Self { token, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub async fn shutdown(self) {
        self.token.cancel();
        self.handle.await.ok();
    }
}
