//! Drain triggers
//!
//! Background loops that request a drain from the [`SyncCoordinator`]:
//! - a periodic timer (`SyncConfig::drain_interval`)
//! - connectivity restored (offline -> online transition)
//! - the app leaving the foreground
//!
//! Requests made while a drain is running are dropped by the coordinator.

use crate::coordinator::SyncCoordinator;
use bridge_traits::{LifecycleObserver, NetworkMonitor};
use core_async::sync::CancellationToken;
use core_async::task::JoinHandle;
use core_async::time::{interval, MissedTickBehavior};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle to the running trigger loops.
pub struct SyncTriggers {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SyncTriggers {
    /// Start the trigger loops.
    ///
    /// The timer always runs; the connectivity and lifecycle listeners only
    /// run when the corresponding bridge is provided and can be subscribed to.
    pub async fn spawn(
        coordinator: Arc<SyncCoordinator>,
        network_monitor: Option<Arc<dyn NetworkMonitor>>,
        lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    ) -> Self {
        let token = CancellationToken::new();
        let mut handles = Vec::new();

        handles.push(core_async::spawn(run_timer(
            Arc::clone(&coordinator),
            token.clone(),
        )));

        if let Some(monitor) = network_monitor {
            let initially_online = monitor.is_connected().await;
            match monitor.subscribe_changes().await {
                Ok(mut changes) => {
                    let coordinator = Arc::clone(&coordinator);
                    let token = token.clone();
                    handles.push(core_async::spawn(async move {
                        let mut online = initially_online;
                        loop {
                            core_async::select! {
                                _ = token.cancelled() => break,
                                next = changes.next() => {
                                    let Some(info) = next else { break };
                                    let now_online = info.is_connected();
                                    if now_online && !online {
                                        info!("Connectivity restored; requesting drain");
                                        coordinator.request_drain();
                                    }
                                    online = now_online;
                                }
                            }
                        }
                        debug!("Connectivity trigger stopped");
                    }));
                }
                Err(e) => warn!(error = %e, "Connectivity changes unavailable; trigger disabled"),
            }
        }

        if let Some(observer) = lifecycle_observer {
            match observer.subscribe_changes().await {
                Ok(mut changes) => {
                    let coordinator = Arc::clone(&coordinator);
                    let token = token.clone();
                    handles.push(core_async::spawn(async move {
                        loop {
                            core_async::select! {
                                _ = token.cancelled() => break,
                                next = changes.next() => {
                                    let Some(state) = next else { break };
                                    if state.is_backgrounding() {
                                        info!(state = ?state, "App backgrounded; requesting drain");
                                        coordinator.request_drain();
                                    }
                                }
                            }
                        }
                        debug!("Lifecycle trigger stopped");
                    }));
                }
                Err(e) => warn!(error = %e, "Lifecycle changes unavailable; trigger disabled"),
            }
        }

        Self { token, handles }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop every trigger loop and wait for them to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        for handle in self.handles {
            handle.await.ok();
        }
    }
}

async fn run_timer(coordinator: Arc<SyncCoordinator>, token: CancellationToken) {
    let mut ticker = interval(coordinator.config().drain_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        core_async::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                coordinator.request_drain();
            }
        }
    }
    debug!("Drain timer stopped");
}
