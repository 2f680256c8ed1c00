//! Application Lifecycle Abstraction
//!
//! Foreground/background transitions. Backgrounding is the last reliable
//! moment to flush the outbound queue before the OS may suspend the process.

use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Application is in the foreground and active
    Foreground,
    /// Application is in the background
    Background,
    /// Application is being suspended
    Suspended,
}

impl LifecycleState {
    /// Whether the app is leaving the foreground.
    pub fn is_backgrounding(&self) -> bool {
        matches!(self, Self::Background | Self::Suspended)
    }
}

/// Lifecycle observer trait
///
/// # Platform Support
///
/// - **iOS**: UIApplication lifecycle notifications
/// - **Android**: Activity/Application lifecycle callbacks
/// - **Desktop**: Window focus/minimize events (host-driven)
/// - **Web**: Page Visibility API
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{LifecycleObserver, LifecycleState};
///
/// async fn watch(observer: &dyn LifecycleObserver) -> Result<()> {
///     let mut stream = observer.subscribe_changes().await?;
///     while let Some(state) = stream.next().await {
///         if state.is_backgrounding() {
///             flush_queue().await;
///         }
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
    /// Get current lifecycle state
    async fn get_state(&self) -> Result<LifecycleState>;

    /// Subscribe to lifecycle state changes
    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>>;
}

/// Stream of lifecycle state changes
#[async_trait]
pub trait LifecycleChangeStream: Send {
    /// Get the next lifecycle state update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<LifecycleState>;
}
