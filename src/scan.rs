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

//! The acquisition process.
//!
//! Drives a receiver through its hop plan and writes one scan record per
//! line. Records are also assembled locally so every completed sweep can be
//! summarized in the log.

use std::time::Duration;

use log::{info, warn};
use spectrum_sweep::{Decibel, Frequency, HistoryConfig, HopConfig, HopController, Receiver, Sweep};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::spectrum::SpectrumState;

/// Records buffered between the hop thread and the writer.
const RECORD_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Stop after this many completed sweeps.
    pub sweeps: Option<u64>,
    /// Sweeps in the moving average used for the log summary.
    pub average_depth: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            sweeps: None,
            average_depth: spectrum_sweep::average::DEFAULT_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub records: u64,
    pub sweeps: u64,
    pub timeouts: u64,
    pub short_reads: u64,
}

/// Acquire until cancelled, the sweep limit is reached or the receiver fails.
pub async fn run<R, W>(
    receiver: R,
    hop_config: HopConfig,
    options: ScanOptions,
    mut out: W,
    cancel_token: CancellationToken,
) -> Result<ScanStats, Box<dyn std::error::Error + Send + Sync>>
where
    R: Receiver + 'static,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel(RECORD_QUEUE);
    let handle = tokio::task::spawn_blocking(move || HopController::spawn(receiver, hop_config, tx)).await??;

    // Only the newest sweep is needed for the summary
    let spectrum = SpectrumState::new(
        HistoryConfig {
            max_duration: Some(Duration::ZERO),
        },
        options.average_depth,
    );
    let mut stats = ScanStats::default();

    let written: std::io::Result<()> = loop {
        let record = tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Scan cancelled");
                break Ok(());
            }
            record = rx.recv() => record,
        };
        let Some(record) = record else {
            break Ok(());
        };
        stats.records += 1;

        let line = format!("{record}\n");
        if let Err(e) = out.write_all(line.as_bytes()).await {
            break Err(e);
        }
        if let Err(e) = out.flush().await {
            break Err(e);
        }

        let completed = match spectrum.push(record) {
            Ok(completed) => completed,
            Err(e) => {
                warn!("Sweep discarded: {}", e);
                continue;
            }
        };
        if let Some(sweep) = completed.last() {
            stats.sweeps += completed.len() as u64;
            log_summary(sweep, spectrum.peak());
            if options.sweeps.is_some_and(|limit| stats.sweeps >= limit) {
                info!("Captured {} sweeps", stats.sweeps);
                break Ok(());
            }
        }
    };

    drop(rx);
    stats.timeouts = handle.timeouts();
    stats.short_reads = handle.short_reads();
    let stopped = tokio::task::spawn_blocking(move || handle.stop()).await?;

    written?;
    stopped?;

    info!(
        "Scan finished: {} records, {} sweeps, {} timeouts, {} short reads",
        stats.records, stats.sweeps, stats.timeouts, stats.short_reads
    );
    Ok(stats)
}

fn log_summary(sweep: &Sweep, peak: Option<(f64, f32)>) {
    let time = sweep.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
    match peak {
        Some((frequency, db)) => info!(
            "{} {} - {}: peak {} at {}",
            time,
            Frequency(sweep.start_frequency),
            Frequency(sweep.end_frequency),
            Decibel(db),
            Frequency(frequency)
        ),
        None => info!(
            "{} {} - {}: no bins",
            time,
            Frequency(sweep.start_frequency),
            Frequency(sweep.end_frequency)
        ),
    }
}
