//! One-shot operator commands.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vd_core::config::VdConfig;
use vd_core::{EntryId, QueueEntry, SecretId, UploadState};
use vd_crypto::KeyCustody;
use vd_queue::{Clock, DrainSummary, RetryPolicy, SharedFile, SystemClock};

use crate::setup;

// ── enqueue ──────────────────────────────────────────────────────────────────

pub async fn enqueue(config: &VdConfig, paths: &[PathBuf], secret: &str, mime: &str) -> Result<()> {
    let services = setup::build(config)?;
    let custody = setup::custody(config)?;
    let secret_id = SecretId::new(secret);

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("not a file path: {}", path.display()))?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        files.push(SharedFile::new(name, mime, bytes));
    }
    let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();

    let master_key = custody
        .master_key(&secret_id)
        .await
        .context("deriving master key")?;
    let results = services
        .queue
        .enqueue_batch(files, &secret_id, &master_key)
        .await;
    drop(master_key);

    let mut failures = 0;
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(id) => println!("  queued  {name}  {id}"),
            Err(e) => {
                failures += 1;
                eprintln!("  error   {name}: {e}");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} file(s) could not be queued", names.len());
    }
    println!("{} file(s) queued for secret {secret_id}", names.len());
    Ok(())
}

// ── drain ────────────────────────────────────────────────────────────────────

pub async fn drain(config: &VdConfig) -> Result<()> {
    let services = setup::build(config)?;
    match services.queue.drain().await? {
        Some(summary) => {
            print_summary(&summary);
            if summary.auth_required {
                bail!("session expired: log in again, then rerun `vdq drain`");
            }
        }
        None => println!("a drain is already running"),
    }
    Ok(())
}

fn print_summary(s: &DrainSummary) {
    println!("drain summary:");
    println!("  completed: {}", s.completed);
    println!("  failed:    {}", s.failed);
    println!("  skipped:   {}", s.skipped);
    println!("  pending:   {}", s.pending);
    println!("  total:     {}", s.total);
}

// ── status ───────────────────────────────────────────────────────────────────

pub async fn status(config: &VdConfig) -> Result<()> {
    let entries = setup::snapshot(config)?;

    if entries.is_empty() {
        println!("queue is empty");
        return Ok(());
    }

    println!(
        "{:<36}  {:<9}  {:>8}  {:>9}  {:<16}  name",
        "id", "state", "attempts", "size", "secret"
    );
    for entry in &entries {
        println!("{}", status_line(entry));
    }

    let mut by_state: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &entries {
        *by_state.entry(entry.upload_state.as_str()).or_default() += 1;
    }
    let counts: Vec<String> = by_state
        .iter()
        .map(|(state, n)| format!("{state}: {n}"))
        .collect();
    println!();
    println!("{} entries ({})", entries.len(), counts.join(", "));

    let policy = RetryPolicy::from(&config.queue);
    if let Some(due) = next_due_in(&entries, &policy, SystemClock.now_ms()) {
        println!("next retry in {:.1}s", due.as_secs_f64());
    }
    Ok(())
}

fn next_due_in(entries: &[QueueEntry], policy: &RetryPolicy, now_ms: u64) -> Option<Duration> {
    entries
        .iter()
        .filter(|e| e.upload_state == UploadState::Encrypted)
        .map(|e| policy.next_attempt_at_ms(e).saturating_sub(now_ms))
        .min()
        .map(Duration::from_millis)
}

fn status_line(entry: &QueueEntry) -> String {
    format!(
        "{:<36}  {:<9}  {:>8}  {:>9}  {:<16}  {}",
        entry.id,
        entry.upload_state,
        entry.attempt_count,
        fmt_bytes(entry.metadata.plaintext_size),
        entry.secret_id,
        entry.metadata.name
    )
}

// ── requeue / discard ────────────────────────────────────────────────────────

pub async fn requeue(config: &VdConfig, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let services = setup::build(config)?;
    let entry = services.queue.requeue(&id).await?;
    println!("requeued {} ({})", entry.id, entry.metadata.name);
    Ok(())
}

pub async fn discard(config: &VdConfig, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let services = setup::build(config)?;
    let entry = services.queue.discard(&id).await?;
    println!(
        "discarded {} ({}, was {})",
        entry.id, entry.metadata.name, entry.upload_state
    );
    Ok(())
}

fn parse_id(id: &str) -> Result<EntryId> {
    EntryId::parse(id).with_context(|| format!("invalid entry id: {id}"))
}

// ── config show ──────────────────────────────────────────────────────────────

pub fn config_show(config: &VdConfig, path: &Path) -> Result<()> {
    println!("# {}", path.display());
    print!(
        "{}",
        toml::to_string_pretty(config).context("serializing config")?
    );
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
