//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the snapshot/sync/recovery engine
//! and the environment it runs in. The engine never touches a storage engine,
//! a network stack or OS lifecycle hooks directly; every such capability is
//! injected through one of these traits.
//!
//! ## Traits
//!
//! ### Storage
//! - [`LocalStore`](storage::LocalStore) - Keyed table storage on the device
//! - [`RemoteStore`](storage::RemoteStore) - Upsert/delete against the remote backend
//!
//! ### Sessions
//! - [`SessionEngine`](session::SessionEngine) - Rebuilds and pauses interrupted sessions
//!
//! ### Platform signals
//! - [`NetworkMonitor`](network::NetworkMonitor) - Online check and connectivity changes
//! - [`LifecycleObserver`](background::LifecycleObserver) - Foreground/background transitions
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//! | iOS      | host-injected       |
//! | Android  | host-injected       |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and report retryable remote
//! failures as [`BridgeError::Unreachable`](error::BridgeError::Unreachable).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod background;
pub mod error;
pub mod network;
pub mod session;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use background::{LifecycleChangeStream, LifecycleObserver, LifecycleState};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use session::{SessionEngine, SessionHandle};
pub use storage::{LocalStore, RemoteStore, StoredRecord};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
