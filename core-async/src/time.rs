//! Time-related abstractions backed by `tokio::time`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(5)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(5));
//! }
//! ```

pub use tokio::time::{
    interval, sleep, sleep_until, timeout, Interval, MissedTickBehavior, Sleep, Timeout,
};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
