//! Retry bound, backoff schedule, retention expiry, auth handling and drain
//! coalescing, driven by a manual clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use vd_core::{SecretId, UploadState};
use vd_queue::RetryPolicy;

const MS: Duration = Duration::from_millis(1);

#[tokio::test]
async fn attempts_are_bounded_and_spaced_by_backoff() {
    let uploader = ScriptedUploader::always(Outcome::Transport);
    let (queue, clock) = memory_queue(uploader.clone(), RetryPolicy::default());
    queue
        .enqueue(text_file("a.txt", "x"), &SecretId::new("s"), &master_key())
        .await
        .unwrap();

    let first = queue.drain().await.unwrap().unwrap();
    assert_eq!(first.pending, 1);
    assert_eq!(uploader.call_count(), 1);

    for (i, gap_ms) in [1_000u64, 2_000, 4_000, 8_000].into_iter().enumerate() {
        clock.advance(Duration::from_millis(gap_ms) - MS);
        queue.drain().await.unwrap();
        assert_eq!(uploader.call_count(), i + 1, "retried before backoff elapsed");

        clock.advance(MS);
        queue.drain().await.unwrap();
        assert_eq!(uploader.call_count(), i + 2);
    }

    let entry = only_entry(&queue).await;
    assert_eq!(entry.upload_state, UploadState::Failed);
    assert_eq!(entry.attempt_count, 5);

    let stamps: Vec<u64> = uploader.calls().iter().map(|c| c.at_ms.unwrap()).collect();
    let gaps: Vec<u64> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps, vec![1_000, 2_000, 4_000, 8_000]);

    clock.advance(Duration::from_secs(3_600));
    let summary = queue.drain().await.unwrap().unwrap();
    assert_eq!(summary.total, 0);
    assert_eq!(uploader.call_count(), 5, "failed entries are never retried");
}

#[tokio::test]
async fn final_attempt_failure_is_reported() {
    let policy = RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    };
    let (queue, clock) = memory_queue(ScriptedUploader::always(Outcome::Reject(503)), policy);
    queue
        .enqueue(text_file("a.txt", "x"), &SecretId::new("s"), &master_key())
        .await
        .unwrap();

    let first = queue.drain().await.unwrap().unwrap();
    assert_eq!((first.pending, first.failed), (1, 0));

    clock.advance(Duration::from_secs(1));
    let second = queue.drain().await.unwrap().unwrap();
    assert_eq!((second.pending, second.failed), (0, 1));
}

#[tokio::test]
async fn stale_entry_is_skipped_without_a_request() {
    let uploader = ScriptedUploader::always(Outcome::Transport);
    let (queue, clock) = memory_queue(uploader.clone(), RetryPolicy::default());
    queue
        .enqueue(text_file("a.txt", "x"), &SecretId::new("s"), &master_key())
        .await
        .unwrap();
    queue.drain().await.unwrap();
    assert_eq!(uploader.call_count(), 1);

    clock.advance(Duration::from_secs(24 * 60 * 60) + MS);
    let summary = queue.drain().await.unwrap().unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(uploader.call_count(), 1, "no network call for a skipped entry");
    assert_eq!(only_entry(&queue).await.upload_state, UploadState::Skipped);
}

#[tokio::test]
async fn untried_entry_does_not_expire() {
    let uploader = ScriptedUploader::always(Outcome::Accept);
    let (queue, clock) = memory_queue(uploader.clone(), RetryPolicy::default());
    queue
        .enqueue(text_file("a.txt", "x"), &SecretId::new("s"), &master_key())
        .await
        .unwrap();

    clock.advance(Duration::from_secs(10 * 24 * 60 * 60));
    let summary = queue.drain().await.unwrap().unwrap();
    assert_eq!(summary.completed, 1);
}

#[tokio::test]
async fn unauthorized_stops_the_pass_without_spending_attempts() {
    let uploader = ScriptedUploader::new(vec![Outcome::Unauthorized], Outcome::Accept);
    let (queue, _clock) = memory_queue(uploader.clone(), RetryPolicy::default());
    let secret = SecretId::new("s");
    for name in ["a.txt", "b.txt"] {
        queue
            .enqueue(text_file(name, name), &secret, &master_key())
            .await
            .unwrap();
    }

    let summary = queue.drain().await.unwrap().unwrap();
    assert!(summary.auth_required);
    assert_eq!(summary.pending, 2);
    assert_eq!(summary.completed, 0);
    assert_eq!(uploader.call_count(), 1, "second entry not attempted");
    for entry in queue.entries().await {
        assert_eq!(entry.upload_state, UploadState::Encrypted);
        assert_eq!(entry.attempt_count, 0);
    }

    let summary = queue.drain().await.unwrap().unwrap();
    assert!(!summary.auth_required);
    assert_eq!(summary.completed, 2);
}

#[tokio::test]
async fn checksum_mismatch_is_retried() {
    let uploader = ScriptedUploader::new(vec![Outcome::ChecksumMismatch], Outcome::Accept);
    let (queue, clock) = memory_queue(uploader.clone(), RetryPolicy::default());
    queue
        .enqueue(text_file("a.txt", "x"), &SecretId::new("s"), &master_key())
        .await
        .unwrap();

    assert_eq!(queue.drain().await.unwrap().unwrap().pending, 1);
    assert_eq!(queue.next_due_in().await, Some(Duration::from_secs(1)));

    clock.advance(Duration::from_secs(1));
    assert_eq!(queue.drain().await.unwrap().unwrap().completed, 1);
    assert_eq!(queue.next_due_in().await, None);
}

#[tokio::test]
async fn overlapping_drains_never_double_upload() {
    let uploader = GatedUploader::new();
    let (queue, _clock) = memory_queue(uploader.clone(), RetryPolicy::default());
    let queue = Arc::new(queue);
    queue
        .enqueue(text_file("a.txt", "x"), &SecretId::new("s"), &master_key())
        .await
        .unwrap();

    let running = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.drain().await })
    };
    uploader.entered.notified().await;

    assert!(
        queue.drain().await.unwrap().is_none(),
        "second drain coalesces into the running one"
    );

    uploader.gate.add_permits(8);
    let summary = running.await.unwrap().unwrap().unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.total, 1);
    assert_eq!(uploader.calls().len(), 1);
}

#[tokio::test]
async fn drain_requested_mid_pass_picks_up_new_entries() {
    let uploader = GatedUploader::new();
    let (queue, _clock) = memory_queue(uploader.clone(), RetryPolicy::default());
    let queue = Arc::new(queue);
    let secret = SecretId::new("s");
    queue
        .enqueue(text_file("a.txt", "x"), &secret, &master_key())
        .await
        .unwrap();

    let running = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.drain().await })
    };
    uploader.entered.notified().await;

    queue
        .enqueue(text_file("b.txt", "y"), &secret, &master_key())
        .await
        .unwrap();
    assert!(queue.drain().await.unwrap().is_none());

    uploader.gate.add_permits(8);
    let summary = running.await.unwrap().unwrap().unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(uploader.calls().len(), 2);
    assert!(queue.entries().await.is_empty());
}
