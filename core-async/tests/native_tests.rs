//! Integration tests for core-async on native platforms.
//!
//! Exercise the primitives the engine crates lean on: background loops that
//! stop on a `CancellationToken`, interval timers, batch fan-out with
//! `join_all`, blocking offload for hashing and broadcast event delivery.

use core_async::future::join_all;
use core_async::sync::{broadcast, mpsc, CancellationToken, Mutex};
use core_async::time::{interval, sleep, timeout, Duration, Instant, MissedTickBehavior};
use core_async::{select, task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_spawned_loop_stops_on_cancel() {
    let token = CancellationToken::new();
    let ticks = Arc::new(AtomicUsize::new(0));

    let handle = {
        let token = token.clone();
        let ticks = ticks.clone();
        task::spawn(async move {
            let mut ticker = interval(Duration::from_millis(5));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        ticks.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        })
    };

    sleep(Duration::from_millis(40)).await;
    token.cancel();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("loop did not stop")
        .unwrap();

    let seen = ticks.load(Ordering::SeqCst);
    assert!(seen >= 2);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), seen);
}

#[tokio::test]
async fn test_first_interval_tick_is_immediate() {
    let mut ticker = interval(Duration::from_secs(60));
    let start = Instant::now();
    ticker.tick().await;
    assert!(start.elapsed() < Duration::from_millis(50));

    let second = timeout(Duration::from_millis(20), ticker.tick()).await;
    assert!(second.is_err());
}

#[tokio::test]
async fn test_join_all_runs_groups_concurrently() {
    let start = Instant::now();
    let groups = (0..5).map(|i| async move {
        sleep(Duration::from_millis(30)).await;
        i * 2
    });

    let results = join_all(groups).await;

    assert_eq!(results, vec![0, 2, 4, 6, 8]);
    assert!(start.elapsed() < Duration::from_millis(120));
}

#[tokio::test]
async fn test_spawn_blocking_returns_value() {
    let payload = vec![7u8; 4096];
    let sum = task::spawn_blocking(move || payload.iter().map(|b| *b as u64).sum::<u64>())
        .await
        .unwrap();
    assert_eq!(sum, 7 * 4096);
}

#[tokio::test]
async fn test_broadcast_reaches_every_subscriber() {
    let (tx, mut first) = broadcast::channel::<&'static str>(8);
    let mut second = tx.subscribe();

    assert_eq!(tx.send("drain_completed").unwrap(), 2);
    assert_eq!(first.recv().await.unwrap(), "drain_completed");
    assert_eq!(second.recv().await.unwrap(), "drain_completed");

    drop(first);
    drop(second);
    assert!(tx.send("nobody listening").is_err());
}

#[tokio::test]
async fn test_mutex_serializes_sequence_assignment() {
    let counter = Arc::new(Mutex::new(0u64));
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let counter = counter.clone();
            task::spawn(async move {
                let mut guard = counter.lock().await;
                *guard += 1;
                *guard
            })
        })
        .collect();

    let mut assigned = Vec::new();
    for handle in handles {
        assigned.push(handle.await.unwrap());
    }
    assigned.sort_unstable();

    assert_eq!(assigned, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_mpsc_stream_ends_when_sender_dropped() {
    let (tx, mut rx) = mpsc::channel(4);

    task::spawn(async move {
        for online in [false, true] {
            tx.send(online).await.unwrap();
        }
    });

    let mut seen = Vec::new();
    while let Some(online) = rx.recv().await {
        seen.push(online);
    }
    assert_eq!(seen, vec![false, true]);
}

#[test]
fn test_block_on_outside_runtime() {
    let value = core_async::runtime::block_on(async {
        sleep(Duration::from_millis(1)).await;
        "ready"
    })
    .unwrap();
    assert_eq!(value, "ready");
}
