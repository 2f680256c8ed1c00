//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `LocalStore` backed by SQLite via `sqlx` ([`SqliteLocalStore`]) or by an
//!   in-process map ([`MemoryLocalStore`], also the test double of choice)
//! - `NetworkMonitor` using a TCP reachability probe
//! - `LifecycleObserver` driven by the host window events
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, SqliteLocalStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(SqliteLocalStore::open_default().await.unwrap());
//!     let monitor = Arc::new(DesktopNetworkMonitor::new());
//!     // Inject into CoreConfig::builder()
//! }
//! ```

mod lifecycle;
mod memory;
mod network;
mod sqlite;

pub use lifecycle::DesktopLifecycleObserver;
pub use memory::MemoryLocalStore;
pub use network::DesktopNetworkMonitor;
pub use sqlite::SqliteLocalStore;
