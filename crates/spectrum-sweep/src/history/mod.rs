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

//! Sweep assembly and bounded sweep history.
//!
//! [`SweepAssembler`] stitches consecutive same-timestamp hops into sweeps.
//! It does not know the hop count up front: the first sweep is collected
//! until the timestamp changes, and its hop count becomes the expected count
//! for every later sweep. Because of that the first sweep is reported
//! complete one push late, by the record that starts the second sweep.
//! [`SweepAssembler::push`] hands back every sweep it completed, so nothing
//! is lost when that late report and a single-hop sweep coincide.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use thiserror::Error;

use crate::record::{ContiguityError, ScanRecord, Sweep};

/// Why a record could not be assembled. The partial sweep is discarded.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("too many hops received for timestamp {timestamp}")]
    TooManyHops { timestamp: DateTime<Utc> },

    #[error("too few hops received for timestamp {timestamp} ({received} of {expected})")]
    TooFewHops {
        timestamp: DateTime<Utc>,
        received: u32,
        expected: u32,
    },

    #[error(transparent)]
    Contiguity(#[from] ContiguityError),
}

/// Configuration for the sweep history.
#[derive(Debug, Clone, Default)]
pub struct HistoryConfig {
    /// Keep sweeps at most this much older than the newest one.
    /// `None` keeps everything.
    pub max_duration: Option<Duration>,
}

/// Turns a stream of hop records into completed sweeps.
pub struct SweepAssembler {
    hop: u32,
    expected_hops: u32,
    pending: Option<ScanRecord>,
    sweeps: VecDeque<Arc<Sweep>>,
    max_duration: Option<TimeDelta>,
}

impl std::fmt::Debug for SweepAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepAssembler")
            .field("hop", &self.hop)
            .field("expected_hops", &self.expected_hops)
            .field("sweeps", &self.sweeps.len())
            .field("max_duration", &self.max_duration)
            .finish_non_exhaustive()
    }
}

impl SweepAssembler {
    /// Create a new assembler with an empty history.
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            hop: 0,
            expected_hops: 0,
            pending: None,
            sweeps: VecDeque::new(),
            max_duration: config.max_duration.and_then(|d| TimeDelta::from_std(d).ok()),
        }
    }

    /// Feed the next record, in arrival order.
    ///
    /// Returns the sweeps completed by this call, oldest first; empty while a
    /// sweep is still being collected. The newest one is also
    /// [`head`](Self::head). Two sweeps come back at once only when a
    /// single-hop layout is learned. On error the partial sweep is dropped
    /// and assembly carries on with the next record.
    pub fn push(&mut self, record: ScanRecord) -> Result<Vec<Arc<Sweep>>, AssemblyError> {
        self.hop += 1;

        if self.sweeps.is_empty() {
            return self.learn(record);
        }

        let Some(pending) = self.pending.as_mut() else {
            if self
                .sweeps
                .back()
                .is_some_and(|head| head.timestamp == record.timestamp)
            {
                return Err(AssemblyError::TooManyHops {
                    timestamp: record.timestamp,
                });
            }

            self.hop = 1;
            self.pending = Some(record);
            return Ok(self.complete_if_full().into_iter().collect());
        };

        let current = pending.timestamp;

        if current == record.timestamp && self.hop > self.expected_hops {
            self.pending = None;
            return Err(AssemblyError::TooManyHops { timestamp: current });
        }

        if current != record.timestamp && self.hop <= self.expected_hops {
            // The new record opens the next sweep.
            let received = self.hop - 1;
            self.hop = 1;
            self.pending = Some(record);
            return Err(AssemblyError::TooFewHops {
                timestamp: current,
                received,
                expected: self.expected_hops,
            });
        }

        if let Err(e) = pending.append(record) {
            self.pending = None;
            return Err(e.into());
        }

        Ok(self.complete_if_full().into_iter().collect())
    }

    /// Before the first sweep: count hops until the timestamp changes.
    fn learn(&mut self, record: ScanRecord) -> Result<Vec<Arc<Sweep>>, AssemblyError> {
        match self.pending.as_mut() {
            None => {
                self.hop = 1;
                self.expected_hops = 1;
                self.pending = Some(record);
                Ok(Vec::new())
            }
            Some(pending) if pending.timestamp == record.timestamp => {
                if let Err(e) = pending.append(record) {
                    self.pending = None;
                    return Err(e.into());
                }
                self.expected_hops += 1;
                Ok(Vec::new())
            }
            Some(_) => {
                let mut completed = Vec::with_capacity(2);
                if let Some(first) = self.pending.replace(record) {
                    let first = Arc::new(first);
                    self.sweeps.push_back(Arc::clone(&first));
                    completed.push(first);
                }
                self.hop = 1;
                info!("Sweep layout learned: {} hops per sweep", self.expected_hops);

                // A single-hop layout completes the record that just arrived too.
                completed.extend(self.complete_if_full());
                self.prune();
                Ok(completed)
            }
        }
    }

    fn complete_if_full(&mut self) -> Option<Arc<Sweep>> {
        if self.hop < self.expected_hops {
            return None;
        }
        let sweep = self.pending.take()?;

        debug!(
            "Sweep {} complete: {} bins, {:.3}-{:.3} MHz",
            sweep.timestamp,
            sweep.bins.len(),
            sweep.start_frequency / 1e6,
            sweep.end_frequency / 1e6
        );
        let sweep = Arc::new(sweep);
        self.sweeps.push_back(Arc::clone(&sweep));
        self.prune();
        Some(sweep)
    }

    fn prune(&mut self) {
        let Some(limit) = self.max_duration else {
            return;
        };
        let Some(newest) = self.sweeps.back().map(|s| s.timestamp) else {
            return;
        };

        while self
            .sweeps
            .front()
            .is_some_and(|oldest| newest - oldest.timestamp > limit)
        {
            self.sweeps.pop_front();
        }
    }

    /// Most recently completed sweep.
    #[must_use]
    pub fn head(&self) -> Option<&Arc<Sweep>> {
        self.sweeps.back()
    }

    /// Oldest sweep still retained.
    #[must_use]
    pub fn tail(&self) -> Option<&Arc<Sweep>> {
        self.sweeps.front()
    }

    /// Retained sweeps, oldest first.
    #[must_use]
    pub fn sweeps(&self) -> Vec<Arc<Sweep>> {
        self.sweeps.iter().cloned().collect()
    }

    /// Hops per sweep, known once the first sweep has completed.
    #[must_use]
    pub fn expected_hops(&self) -> Option<u32> {
        if self.sweeps.is_empty() {
            None
        } else {
            Some(self.expected_hops)
        }
    }

    /// Number of retained sweeps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sweeps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sweeps.is_empty()
    }
}
