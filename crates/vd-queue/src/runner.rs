//! Background drain loop.
//!
//! Drains on a fixed interval, earlier when a retry becomes due, and
//! immediately when woken (connectivity restored, re-login, new file queued).
//! After a pass that ended in an auth failure, the timer is ignored and the
//! runner waits for an explicit wake.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info};

use crate::processor::{DrainSummary, UploadQueue};
use crate::store::QueueStore;

/// Called with the summary of every completed drain.
pub type SummaryFn = Box<dyn Fn(&DrainSummary) + Send + Sync>;

/// Floor on the wait between passes, so a zero backoff cannot spin.
const MIN_WAIT: Duration = Duration::from_millis(50);

pub struct QueueRunner<S: QueueStore> {
    queue: Arc<UploadQueue<S>>,
    interval: Duration,
    wake: Arc<Notify>,
    on_summary: Option<SummaryFn>,
}

impl<S: QueueStore> QueueRunner<S> {
    pub fn new(queue: Arc<UploadQueue<S>>, interval: Duration) -> Self {
        Self {
            queue,
            interval,
            wake: Arc::new(Notify::new()),
            on_summary: None,
        }
    }

    pub fn on_summary(mut self, f: SummaryFn) -> Self {
        self.on_summary = Some(f);
        self
    }

    /// Handle that triggers an immediate drain.
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "queue runner started");
        let mut auth_paused = false;

        loop {
            if !auth_paused {
                match self.queue.drain().await {
                    Ok(Some(summary)) => {
                        auth_paused = summary.auth_required;
                        if let Some(f) = &self.on_summary {
                            f(&summary);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!("drain failed: {e}"),
                }
            }

            let wait = if auth_paused {
                None
            } else {
                Some(
                    self.queue
                        .next_due_in()
                        .await
                        .map_or(self.interval, |due| due.min(self.interval))
                        .max(MIN_WAIT),
                )
            };

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("queue runner: shutdown signal received");
                    break;
                }
                _ = self.wake.notified() => {
                    debug!("queue runner woken");
                    auth_paused = false;
                }
                _ = sleep_or_forever(wait) => {}
            }
        }
    }
}

async fn sleep_or_forever(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
