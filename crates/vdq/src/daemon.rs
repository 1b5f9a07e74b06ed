//! Daemon mode: background drain loop, session watcher, reconnect watcher,
//! metrics endpoint.
//!
//! While a request failure has marked the backend unreachable, the daemon
//! checks it every `RECHECK_INTERVAL` and drains as soon as it answers again.
//!
//! Signals:
//!   SIGHUP          - drain now (send after logging in again)
//!   SIGTERM/SIGINT  - finish the current pass and exit

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use vd_core::config::VdConfig;
use vd_net::{Connectivity, SessionEvent};
use vd_queue::{DrainSummary, QueueRunner};

use crate::metrics::{self, HealthState, QueueMetrics};
use crate::setup;

const RECHECK_INTERVAL: Duration = Duration::from_secs(15);

pub async fn run(config: VdConfig) -> Result<()> {
    let services = setup::build(&config)?;

    let recovered = services
        .queue
        .recover()
        .await
        .context("recovering interrupted uploads")?;
    let entries = services.queue.entries().await.len();
    info!(entries, recovered, "queue store opened");

    // Metrics
    let mut registry = Registry::default();
    let queue_metrics = QueueMetrics::register(&mut registry);
    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let state = HealthState {
            registry: Arc::new(registry),
        };
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(addr, state).await {
                error!("metrics server exited: {e}");
            }
        });
    }

    // Session expiry watcher
    let mut events = services.session.subscribe();
    let session_metrics = queue_metrics.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Expired) => {
                    session_metrics.record_session_expired();
                    warn!("uploads paused: log in again, then send SIGHUP to resume");
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Drain loop
    let interval = Duration::from_secs(config.daemon.drain_interval_secs.max(1));
    let runner = QueueRunner::new(services.queue.clone(), interval).on_summary({
        let m = queue_metrics.clone();
        Box::new(move |summary: &DrainSummary| m.record_drain(summary))
    });
    let waker = runner.waker();

    // Reconnect watcher
    let connectivity = services.connectivity.clone();
    let client = services.client.clone();
    let reconnect_waker = waker.clone();
    tokio::spawn(async move {
        let mut recheck = tokio::time::interval(RECHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = connectivity.restored() => {
                    info!("backend reachable again, draining now");
                    reconnect_waker.notify_one();
                }
                _ = recheck.tick() => {
                    if !connectivity.is_online() {
                        client.check_reachable().await;
                    }
                }
            }
        }
    });
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let runner_task = tokio::spawn(runner.run(shutdown_rx));

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("registering SIGHUP handler")?;

    info!(interval_secs = interval.as_secs(), "vdq daemon running");
    loop {
        tokio::select! {
            _ = sigterm.recv() => { info!("received SIGTERM"); break; }
            _ = sigint.recv() => { info!("received SIGINT"); break; }
            _ = sighup.recv() => {
                info!("received SIGHUP, draining now");
                waker.notify_one();
            }
        }
    }

    let _ = shutdown_tx.send(());
    let _ = runner_task.await;

    info!("vdq daemon exiting cleanly");
    Ok(())
}
