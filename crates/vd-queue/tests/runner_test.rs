//! Background runner: wake-ups, summaries, auth pause and shutdown.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use common::*;
use vd_core::SecretId;
use vd_queue::{DrainSummary, MemoryQueueStore, QueueRunner, RetryPolicy, UploadQueue};

async fn wait_for_calls(uploader: &ScriptedUploader, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while uploader.call_count() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("uploader was not called in time");
}

#[tokio::test]
async fn wake_triggers_drain_and_reports_summary() {
    let uploader = ScriptedUploader::always(Outcome::Accept);
    let queue = Arc::new(UploadQueue::new(
        MemoryQueueStore::new(),
        uploader.clone(),
        RetryPolicy::default(),
    ));
    let summaries = Arc::new(AtomicUsize::new(0));

    let runner = QueueRunner::new(queue.clone(), Duration::from_secs(3_600)).on_summary({
        let summaries = summaries.clone();
        Box::new(move |s: &DrainSummary| {
            summaries.fetch_add(s.completed, Ordering::SeqCst);
        })
    });
    let waker = runner.waker();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(runner.run(shutdown_rx));

    queue
        .enqueue(text_file("a.txt", "x"), &SecretId::new("s"), &master_key())
        .await
        .unwrap();
    waker.notify_one();

    wait_for_calls(&uploader, 1).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(uploader.call_count(), 1);
    assert_eq!(summaries.load(Ordering::SeqCst), 1);
    assert!(queue.entries().await.is_empty());
}

#[tokio::test]
async fn auth_failure_pauses_until_woken() {
    let uploader = ScriptedUploader::always(Outcome::Unauthorized);
    let queue = Arc::new(UploadQueue::new(
        MemoryQueueStore::new(),
        uploader.clone(),
        RetryPolicy::default(),
    ));
    queue
        .enqueue(text_file("a.txt", "x"), &SecretId::new("s"), &master_key())
        .await
        .unwrap();

    let runner = QueueRunner::new(queue.clone(), Duration::from_millis(20));
    let waker = runner.waker();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(runner.run(shutdown_rx));

    wait_for_calls(&uploader, 1).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(uploader.call_count(), 1, "no retries while re-login is pending");

    waker.notify_one();
    wait_for_calls(&uploader, 2).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}
