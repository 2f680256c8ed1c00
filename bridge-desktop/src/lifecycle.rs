//! Lifecycle observer for desktop hosts

use async_trait::async_trait;
use bridge_traits::{
    background::{LifecycleChangeStream, LifecycleObserver, LifecycleState},
    error::Result,
};
use core_async::sync::{broadcast, watch};
use tracing::debug;

/// Desktop lifecycle observer.
///
/// Desktop apps have no OS-enforced lifecycle, so the host window layer
/// reports focus/minimize transitions through [`notify`](Self::notify).
/// Starts in [`LifecycleState::Foreground`].
pub struct DesktopLifecycleObserver {
    state: watch::Sender<LifecycleState>,
    changes: broadcast::Sender<LifecycleState>,
}

impl DesktopLifecycleObserver {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Foreground);
        let (changes, _) = broadcast::channel(16);
        Self { state, changes }
    }

    /// Record a lifecycle transition reported by the host.
    pub fn notify(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Lifecycle transition");
            // No subscribers is fine
            self.changes.send(next).ok();
        }
    }
}

impl Default for DesktopLifecycleObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LifecycleObserver for DesktopLifecycleObserver {
    async fn get_state(&self) -> Result<LifecycleState> {
        Ok(*self.state.borrow())
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>> {
        Ok(Box::new(DesktopLifecycleChangeStream {
            receiver: self.changes.subscribe(),
        }))
    }
}

struct DesktopLifecycleChangeStream {
    receiver: broadcast::Receiver<LifecycleState>,
}

#[async_trait]
impl LifecycleChangeStream for DesktopLifecycleChangeStream {
    async fn next(&mut self) -> Option<LifecycleState> {
        loop {
            match self.receiver.recv().await {
                Ok(state) => return Some(state),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
