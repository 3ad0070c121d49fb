//! Tests for queue delivery semantics.
//!
//! Validates deduplication, exclusive processing, delayed adds, and shutdown.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use crate::queue::{RateLimitingQueue, WorkQueue};
use crate::rate_limit::ExponentialFailureRateLimiter;

fn queue() -> RateLimitingQueue {
    RateLimitingQueue::new(
        "test",
        Arc::new(ExponentialFailureRateLimiter::new(
            Duration::from_millis(5),
            Duration::from_secs(1),
        )),
    )
}

async fn next(queue: &RateLimitingQueue) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(1), queue.get())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn test_duplicate_adds_collapse() {
    let queue = queue();
    queue.add("default/a");
    queue.add("default/a");
    queue.add("default/a");
    assert_eq!(queue.len(), 1);

    assert_eq!(next(&queue).await.as_deref(), Some("default/a"));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_fifo_order_across_keys() {
    let queue = queue();
    queue.add("a");
    queue.add("b");
    queue.add("a");
    queue.add("c");

    assert_eq!(next(&queue).await.as_deref(), Some("a"));
    assert_eq!(next(&queue).await.as_deref(), Some("b"));
    assert_eq!(next(&queue).await.as_deref(), Some("c"));
}

#[tokio::test]
async fn test_key_added_while_processing_is_redelivered_after_done() {
    let queue = queue();
    queue.add("a");
    let key = next(&queue).await.unwrap();

    queue.add("a");
    // Processing keys are held back from other workers.
    assert!(queue.is_empty());
    assert_eq!(queue.processing_len(), 1);

    queue.done(&key);
    assert_eq!(queue.len(), 1);
    assert_eq!(next(&queue).await.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_done_without_readd_does_not_requeue() {
    let queue = queue();
    queue.add("a");
    let key = next(&queue).await.unwrap();
    queue.done(&key);

    assert!(queue.is_empty());
    assert_eq!(queue.processing_len(), 0);
}

#[tokio::test]
async fn test_waiting_get_is_woken_by_add() {
    let queue = queue();
    let waiter = tokio::spawn({
        let queue = queue.clone();
        async move { queue.get().await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.add("a");

    let got = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_shutdown_drains_then_returns_none() {
    let queue = queue();
    queue.add("a");
    queue.shut_down();
    queue.add("b");

    assert!(queue.is_shutting_down());
    assert_eq!(next(&queue).await.as_deref(), Some("a"));
    assert_eq!(queue.get().await, None);
}

#[tokio::test]
async fn test_shutdown_wakes_all_waiters() {
    let queue = queue();
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.shut_down();

    for waiter in waiters {
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
    }
}

#[tokio::test(start_paused = true)]
async fn test_add_after_delivers_once_delay_elapses() {
    let queue = queue();
    queue.add_after("a", Duration::from_secs(5));
    assert!(queue.is_empty());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(queue.is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_add_after_keeps_earliest_deadline() {
    let queue = queue();
    queue.add_after("a", Duration::from_secs(10));
    queue.add_after("a", Duration::from_secs(1));
    queue.add_after("a", Duration::from_secs(20));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(queue.len(), 1);
    let key = queue.get().await.unwrap();
    queue.done(&key);

    // The superseded wake-ups never fire.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_add_after_zero_is_immediate() {
    let queue = queue();
    queue.add_after("a", Duration::ZERO);
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_add_rate_limited_backs_off_and_forget_resets() {
    let queue = queue();
    queue.add_rate_limited("a");
    queue.add_rate_limited("a");
    assert_eq!(queue.num_requeues("a"), 2);

    tokio::time::sleep(Duration::from_millis(6)).await;
    assert_eq!(queue.len(), 1);

    queue.forget("a");
    assert_eq!(queue.num_requeues("a"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_delays() {
    let queue = queue();
    queue.add_after("a", Duration::from_secs(1));
    queue.shut_down();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(queue.get().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_key_is_processed_concurrently() {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let queue = queue();
    let in_flight = Arc::new(parking_lot::Mutex::new(HashSet::<String>::new()));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let in_flight = Arc::clone(&in_flight);
            let overlaps = Arc::clone(&overlaps);
            let handled = Arc::clone(&handled);
            tokio::spawn(async move {
                while let Some(key) = queue.get().await {
                    if !in_flight.lock().insert(key.clone()) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    in_flight.lock().remove(&key);
                    handled.fetch_add(1, Ordering::SeqCst);
                    queue.done(&key);
                }
            })
        })
        .collect();

    for round in 0..50 {
        queue.add(&format!("k{}", round % 3));
        tokio::task::yield_now().await;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    queue.shut_down();
    futures::future::join_all(workers).await;

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert!(handled.load(Ordering::SeqCst) >= 3);
}
