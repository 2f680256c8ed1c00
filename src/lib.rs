//! Workspace umbrella crate.
//!
//! Exposes the shared feature flags that map to the individual workspace
//! crates so host applications can depend on `fitness-core-workspace` and pick
//! the desktop adapters without wiring each crate by hand.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreError, CoreService};
