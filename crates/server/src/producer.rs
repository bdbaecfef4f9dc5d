//! JSONL producer feeding scraped items into the pipelines.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use streamvault_core::{EnqueueError, ScrapedItem};

use crate::pipelines::Pipelines;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProducerStats {
    pub lines: u64,
    pub routed: u64,
    pub invalid: u64,
    pub unrouted: u64,
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<Result<ScrapedItem, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Read items until EOF, routing each by its `media_type`.
///
/// Stops early when the pipelines are closed.
pub async fn run<R>(reader: R, pipelines: &Pipelines) -> std::io::Result<ProducerStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ProducerStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        stats.lines += 1;
        let item = match parse_line(&line) {
            None => continue,
            Some(Ok(item)) => item,
            Some(Err(e)) => {
                warn!(line = stats.lines, error = %e, "Skipping malformed input line");
                stats.invalid += 1;
                continue;
            }
        };

        let Some(kind) = item.media_type else {
            warn!(line = stats.lines, "Skipping item without media_type");
            stats.unrouted += 1;
            continue;
        };

        match pipelines.route(kind, item).await {
            Ok(()) => {
                debug!(line = stats.lines, pipeline = %kind, "Item routed");
                stats.routed += 1;
            }
            Err(EnqueueError::Closed(_)) => {
                info!("Pipelines closed, producer stopping");
                break;
            }
            Err(EnqueueError::Full(_)) => {
                // enqueue_wait only reports Closed
                stats.unrouted += 1;
            }
        }
    }

    info!(
        lines = stats.lines,
        routed = stats.routed,
        invalid = stats.invalid,
        unrouted = stats.unrouted,
        "Producer finished"
    );
    Ok(stats)
}
