// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line ingest for the serve process.
//!
//! Reads one scan record per line, optionally echoes the raw line so
//! processes can be chained, and feeds the assembler. Every completed sweep
//! is published to the live feed as a `scan` event.

use std::sync::Arc;

use log::{debug, info, warn};
use spectrum_sweep::{Broadcaster, ScanRecord};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::spectrum::SharedSpectrum;

/// Event name for a freshly completed sweep.
pub const SCAN_EVENT: &str = "scan";

/// Ingest settings.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// Added to every record's frequencies (Hz).
    pub offset: f64,
}

/// Counters reported when ingest finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub rejected: u64,
    pub sweeps: u64,
    pub assembly_errors: u64,
}

/// Read records from `reader` until EOF or cancellation.
///
/// Raw lines go to `forward` when set. Malformed lines and assembly errors
/// are logged and skipped.
pub async fn run<R, W>(
    reader: R,
    mut forward: Option<W>,
    config: IngestConfig,
    spectrum: SharedSpectrum,
    feed: Broadcaster<Arc<str>>,
    cancel_token: CancellationToken,
) -> Result<IngestStats, Box<dyn std::error::Error + Send + Sync>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = IngestStats::default();

    loop {
        let line = tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Ingest cancelled");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("Input closed");
            break;
        };
        stats.lines += 1;

        if let Some(out) = forward.as_mut() {
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
        }

        if line.trim().is_empty() {
            continue;
        }

        let mut record: ScanRecord = match line.parse() {
            Ok(record) => record,
            Err(e) => {
                stats.rejected += 1;
                warn!("Skipping malformed line {}: {}", stats.lines, e);
                continue;
            }
        };
        record.shift(config.offset);

        let completed = match spectrum.push(record) {
            Ok(completed) => completed,
            Err(e) => {
                stats.assembly_errors += 1;
                warn!("Discarding partial sweep: {}", e);
                continue;
            }
        };

        for sweep in completed {
            stats.sweeps += 1;
            debug!(
                "Sweep {} complete: {} bins, {:.3}-{:.3} MHz",
                sweep.timestamp,
                sweep.bins.len(),
                sweep.start_frequency / 1e6,
                sweep.end_frequency / 1e6
            );
            match serde_json::to_string(sweep.as_ref()) {
                Ok(json) => feed.publish(SCAN_EVENT, Arc::from(json)),
                Err(e) => warn!("Failed to encode sweep {}: {}", sweep.timestamp, e),
            }
        }
    }

    info!(
        "Ingest finished: {} lines, {} rejected, {} sweeps, {} assembly errors",
        stats.lines, stats.rejected, stats.sweeps, stats.assembly_errors
    );
    Ok(stats)
}
