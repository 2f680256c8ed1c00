//! Async abstraction layer for the fitness sync core.
//!
//! Every engine crate (`core-sync`, `core-backup`, `core-recovery`, ...) goes
//! through this crate for task spawning, timers and synchronization
//! primitives instead of naming Tokio directly. Keeping the runtime behind one
//! seam means a host embedding the core only has to agree on a single
//! executor contract.
//!
//! # Modules
//!
//! - `task`: Task spawning and blocking offload
//! - `time`: Sleep, intervals and timeouts
//! - `sync`: Locks, channels and cancellation
//! - `runtime`: Runtime handles and a `block_on` helper
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

/// Future combinators used by the engine crates (batch fan-out, boxing).
pub mod future {
    pub use futures::future::{join_all, BoxFuture, FutureExt};
}

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
pub use tokio::select;
