//! Folder watching.
//!
//! File-system events are coalesced per path by `notify-debouncer-mini`,
//! handed to the async side through an mpsc channel, and ingested one document
//! at a time. Before a document is ingested its size must stop changing, so a
//! slow copy into the folder is not read half-written.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tokio::sync::{mpsc, watch as flag};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::ingest::{DocumentFilter, IngestPipeline, ScanSummary};
use crate::models::IngestOutcome;

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub debounce: Duration,
    pub settle_poll: Duration,
    pub settle_timeout: Duration,
}

impl WatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: Duration::from_millis(config.ingest.debounce_ms),
            settle_poll: Duration::from_millis(config.ingest.settle_poll_ms),
            settle_timeout: Duration::from_millis(config.ingest.settle_timeout_ms),
        }
    }
}

/// Result of waiting for a file to stop growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// Two consecutive size readings matched.
    Stable(u64),
    /// Still changing at the deadline.
    TimedOut,
    /// The file disappeared.
    Vanished,
}

/// Poll the size of `path` every `poll` until two consecutive readings agree
/// or `timeout` elapses.
pub async fn wait_for_settle(path: &Path, poll: Duration, timeout: Duration) -> Settle {
    let deadline = Instant::now() + timeout;
    let Some(mut last) = file_size(path).await else {
        return Settle::Vanished;
    };

    loop {
        if Instant::now() >= deadline {
            return Settle::TimedOut;
        }
        tokio::time::sleep(poll).await;

        let Some(current) = file_size(path).await else {
            return Settle::Vanished;
        };
        if current == last {
            return Settle::Stable(current);
        }
        debug!(path = %path.display(), size = current, "file still changing");
        last = current;
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Scan the folder once, then ingest changes until Ctrl-C.
pub async fn watch(
    pipeline: &IngestPipeline,
    filter: &DocumentFilter,
    settings: &WatchSettings,
) -> Result<()> {
    std::fs::create_dir_all(filter.root())?;
    let stop = stop_on_ctrl_c().await;

    // Watch before scanning so changes made during the scan are queued.
    let (tx, rx) = mpsc::channel(128);
    let mut debouncer = new_debouncer(settings.debounce, move |res: DebounceEventResult| match res {
        Ok(events) => {
            for ev in events {
                // Receiver gone means the loop has shut down.
                if tx.blocking_send(ev.path).is_err() {
                    return;
                }
            }
        }
        Err(e) => warn!(error = ?e, "watch error"),
    })?;

    let mode = if filter.recursive() {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    debouncer.watcher().watch(filter.root(), mode)?;
    info!(dir = %filter.root().display(), "watching for new or updated documents (Ctrl-C to stop)");

    run_until_stopped(pipeline, filter, settings, rx, stop).await?;

    info!("watcher stopped");
    Ok(())
}

/// Flag raised by the first Ctrl-C. The handler is installed before this
/// returns.
async fn stop_on_ctrl_c() -> flag::Receiver<bool> {
    let (tx, rx) = flag::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested, finishing current document");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for Ctrl-C");
                tx.closed().await;
            }
        }
    });
    tokio::task::yield_now().await;
    rx
}

/// Initial scan of the folder, then the event loop. Once `stop` reads `true`
/// no further document is started; the one in flight completes.
pub async fn run_until_stopped(
    pipeline: &IngestPipeline,
    filter: &DocumentFilter,
    settings: &WatchSettings,
    events: mpsc::Receiver<PathBuf>,
    mut stop: flag::Receiver<bool>,
) -> Result<ScanSummary> {
    let summary = pipeline.scan_while(filter, || !*stop.borrow()).await?;
    info!(
        seen = summary.seen,
        ingested = summary.ingested,
        up_to_date = summary.up_to_date,
        unreadable = summary.unreadable,
        failed = summary.failed,
        remaining = summary.remaining,
        "initial scan complete"
    );
    if *stop.borrow() {
        return Ok(summary);
    }

    process_events(pipeline, filter, settings, events, async move {
        // A dropped sender also ends the loop.
        let _ = stop.wait_for(|stopped| *stopped).await;
    })
    .await;
    Ok(summary)
}

/// Ingest paths from `events` sequentially until the channel closes or
/// `shutdown` resolves. A document already being ingested runs to completion.
pub async fn process_events<F>(
    pipeline: &IngestPipeline,
    filter: &DocumentFilter,
    settings: &WatchSettings,
    mut events: mpsc::Receiver<PathBuf>,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            next = events.recv() => {
                let Some(path) = next else { break };
                handle_path(pipeline, filter, settings, &path).await;
            }
        }
    }
}

async fn handle_path(
    pipeline: &IngestPipeline,
    filter: &DocumentFilter,
    settings: &WatchSettings,
    path: &Path,
) {
    if !filter.matches(path) {
        debug!(path = %path.display(), "ignoring non-matching path");
        return;
    }

    match wait_for_settle(path, settings.settle_poll, settings.settle_timeout).await {
        Settle::Vanished => {
            debug!(path = %path.display(), "file gone before ingest");
            return;
        }
        Settle::TimedOut => {
            warn!(path = %path.display(), "file still changing after settle timeout, ingesting anyway");
        }
        Settle::Stable(_) => {}
    }

    match pipeline.ingest(path).await {
        Ok(IngestOutcome::Ingested(report)) => {
            info!(path = %path.display(), added = report.added, "processed change");
        }
        Ok(_) => {}
        Err(e) => error!(path = %path.display(), error = %e, "failed to ingest document"),
    }
}
