//! Synchronization primitives.
//!
//! All primitives are async-aware (`tokio::sync`) and `Send + Sync`, so they
//! can be held across `.await` points and shared between spawned tasks.
//! `CancellationToken` comes from `tokio-util` and is what background loops
//! (drain triggers, snapshot scheduling) watch for shutdown.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{Mutex, RwLock};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let rwlock = RwLock::new(vec![1, 2, 3]);
//!     assert_eq!(rwlock.read().await.len(), 3);
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;
