//! Index overview for `askdocs status`.
//!
//! Shows what is indexed and when each document was last ingested. Never
//! contacts the model runtime, so it works while Ollama is down.

use std::io::Write;

use anyhow::Result;

use crate::config::Config;
use crate::index::VectorIndex;
use crate::ingest::{PruneSummary, ScanSummary};
use crate::state::StateStore;

/// Print the status summary for an opened index.
pub async fn write_status<W: Write>(
    out: &mut W,
    config: &Config,
    index: &dyn VectorIndex,
) -> Result<()> {
    let chunks = index.count().await?;
    let documents = index.filenames().await?;
    let state = StateStore::new(config.paths.state_path()).load()?;

    let index_path = config.paths.index_path();
    let db_size = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

    writeln!(out, "askdocs status")?;
    writeln!(out, "==============")?;
    writeln!(out)?;
    writeln!(out, "  Index:       {}", index_path.display())?;
    writeln!(out, "  Size:        {}", format_bytes(db_size))?;
    writeln!(out, "  Collection:  {}", index.collection())?;
    writeln!(out, "  Documents:   {}", documents.len())?;
    writeln!(out, "  Chunks:      {}", chunks)?;
    writeln!(out)?;
    writeln!(out, "  Docs folder: {}", config.paths.docs_dir.display())?;
    writeln!(out, "  Embed model: {}", config.model.embed_model)?;
    writeln!(out, "  Chat model:  {}", config.model.chat_model)?;
    writeln!(out, "  Runtime:     {}", config.model.url)?;

    if !state.is_empty() {
        writeln!(out)?;
        writeln!(out, "  {:<40} {}", "DOCUMENT", "LAST INGESTED")?;
        writeln!(out, "  {}", "-".repeat(60))?;
        for (filename, mtime) in &state {
            writeln!(out, "  {:<40} {}", filename, format_ts_relative(*mtime as i64))?;
        }
    }

    writeln!(out)?;
    Ok(())
}

pub fn write_scan_summary<W: Write>(out: &mut W, summary: &ScanSummary) -> Result<()> {
    writeln!(
        out,
        "{} document(s): {} ingested ({} chunks added), {} up to date, {} unreadable, {} failed",
        summary.seen,
        summary.ingested,
        summary.chunks_added,
        summary.up_to_date,
        summary.unreadable,
        summary.failed
    )?;
    if summary.remaining > 0 {
        writeln!(out, "stopped early: {} document(s) not processed", summary.remaining)?;
    }
    Ok(())
}

pub fn write_prune_summary<W: Write>(out: &mut W, summary: &PruneSummary) -> Result<()> {
    writeln!(
        out,
        "pruned {} missing document(s): {} chunk(s) and {} state entr{} removed",
        summary.documents_removed,
        summary.chunks_removed,
        summary.state_entries_removed,
        if summary.state_entries_removed == 1 { "y" } else { "ies" }
    )?;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Unix timestamp as a relative time ("3 hours ago"), or a date when old.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
