//! Integration tests for the deferred upload queue.
//!
//! Timing follows the default configuration: 5s debounce, batches of 10,
//! 200ms between creations and 1s before the next batch.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use krd_integration_tests::{Stores, advance_ms, image, queue_config};
use krd_storefront::config::{StorefrontConfig, UploadQueueConfig};
use krd_storefront::services::{QueueEvent, UploadQueue};
use krd_storefront::state::AppState;

fn queue(stores: &Stores) -> UploadQueue {
    UploadQueue::new(queue_config(), stores.documents.clone())
}

// =============================================================================
// Batching
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_twenty_five_records_drain_in_three_batches() {
    let stores = Stores::new();
    let queue = queue(&stores);
    for i in 0..25 {
        queue.enqueue(image(&format!("img-{i:02}.jpg")));
    }
    assert_eq!(queue.status().queue_length, 25);
    assert!(queue.status().oldest_enqueued_at.is_some());

    // Debounce (5s) plus nine 200ms gaps.
    advance_ms(6_850).await;
    assert_eq!(stores.memory.calls().create, 10);
    assert_eq!(queue.status().queue_length, 15);

    // Second batch: starts 1s after the first, takes another 1.8s.
    advance_ms(2_850).await;
    assert_eq!(stores.memory.calls().create, 20);

    advance_ms(2_000).await;
    assert_eq!(stores.memory.calls().create, 25);
    assert_eq!(queue.status().queue_length, 0);
    assert_eq!(queue.status().oldest_enqueued_at, None);
}

#[tokio::test(start_paused = true)]
async fn test_records_are_created_in_enqueue_order() {
    let stores = Stores::new();
    let queue = queue(&stores);
    let mut events = queue.subscribe();
    for name in ["first.jpg", "second.jpg", "third.jpg"] {
        queue.enqueue(image(name));
    }

    queue.force_flush().await;

    let mut created = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::Created { file_name, .. } = event {
            created.push(file_name);
        }
    }
    assert_eq!(created, ["first.jpg", "second.jpg", "third.jpg"]);
}

#[tokio::test(start_paused = true)]
async fn test_force_flush_respects_cap_and_cancels_debounce() {
    let stores = Stores::new();
    let queue = queue(&stores);
    for i in 0..25 {
        queue.enqueue(image(&format!("img-{i}.jpg")));
    }

    queue.force_flush().await;
    assert_eq!(stores.memory.calls().create, 10);
    assert_eq!(queue.status().queue_length, 15);

    // The follow-up batch runs on the drain delay, not the debounce window.
    advance_ms(1_000 + 1_900).await;
    assert_eq!(stores.memory.calls().create, 20);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_single_failure_is_retried_on_next_batch() {
    let stores = Stores::new();
    let queue = queue(&stores);
    stores.memory.fail_create_calls([2]);
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        queue.enqueue(image(name));
    }

    queue.force_flush().await;
    assert_eq!(stores.memory.documents("images").len(), 2);
    assert_eq!(queue.status().queue_length, 1);
    assert_eq!(queue.queued()[0].record.file_name, "b.jpg");

    advance_ms(1_100).await;
    assert_eq!(stores.memory.documents("images").len(), 3);
    assert_eq!(stores.memory.calls().create, 4);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_failure_ends_in_dead_letter() {
    let stores = Stores::new();
    let queue = UploadQueue::new(
        UploadQueueConfig {
            max_attempts: 3,
            ..queue_config()
        },
        stores.documents.clone(),
    );
    stores.memory.fail_create_calls([1, 3, 4]);
    queue.enqueue(image("cursed.jpg"));
    queue.enqueue(image("fine.jpg"));

    // Call 2 is fine.jpg; cursed.jpg retries on the drain delay.
    advance_ms(5_000 + 200 + 1_000 + 1_000 + 500).await;

    let status = queue.status();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.dead_lettered, 1);
    let dead = queue.dead_letters();
    assert_eq!(dead[0].record.file_name, "cursed.jpg");
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(stores.memory.documents("images").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_outage_keeps_records_until_store_returns() {
    let stores = Stores::new();
    let queue = queue(&stores);
    for i in 0..4 {
        queue.enqueue(image(&format!("img-{i}.jpg")));
    }
    stores.memory.set_unavailable(true);

    advance_ms(6_000).await;
    assert_eq!(queue.status().queue_length, 4);
    assert_eq!(queue.queued()[0].attempts, 0);

    stores.memory.set_unavailable(false);
    queue.enqueue(image("img-4.jpg"));
    advance_ms(6_000).await;
    assert_eq!(stores.memory.documents("images").len(), 5);
}

// =============================================================================
// Application state
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_app_state_queue_writes_to_shared_store() {
    let stores = Stores::new();
    let config = StorefrontConfig::from_lookup(|_| None).unwrap();
    let state = AppState::new(config, stores.documents.clone(), stores.local.clone());

    state.uploads().enqueue(image("a.jpg"));
    assert_eq!(state.uploads().drain().await, 0);

    assert!(Arc::ptr_eq(state.documents(), &stores.documents));
    assert_eq!(stores.memory.documents("images").len(), 1);
}
