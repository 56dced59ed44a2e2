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

//! Sweep history and running average shared between ingest and the feed.

use std::sync::{Arc, PoisonError, RwLock};

use spectrum_sweep::{AssemblyError, HistoryConfig, ScanRecord, Sweep, SweepAssembler, TemporalAverager};

/// Assembled sweeps plus their moving average.
///
/// Only the ingest task writes; feed handlers take short read locks.
#[derive(Debug)]
pub struct SpectrumState {
    history: RwLock<SweepAssembler>,
    averager: RwLock<TemporalAverager>,
}

pub type SharedSpectrum = Arc<SpectrumState>;

impl SpectrumState {
    #[must_use]
    pub fn new(history: HistoryConfig, average_depth: usize) -> Self {
        Self {
            history: RwLock::new(SweepAssembler::new(history)),
            averager: RwLock::new(TemporalAverager::new(average_depth)),
        }
    }

    #[must_use]
    pub fn shared(history: HistoryConfig, average_depth: usize) -> SharedSpectrum {
        Arc::new(Self::new(history, average_depth))
    }

    /// Feed one hop record through the assembler.
    ///
    /// Returns the sweeps that just completed, oldest first, after folding
    /// each into the average.
    pub fn push(&self, record: ScanRecord) -> Result<Vec<Arc<Sweep>>, AssemblyError> {
        let completed = self
            .history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record)?;

        if !completed.is_empty() {
            let mut averager = self.averager.write().unwrap_or_else(PoisonError::into_inner);
            for sweep in &completed {
                averager.update(&sweep.bins);
            }
        }
        Ok(completed)
    }

    /// Snapshot of the retained sweeps, oldest first.
    #[must_use]
    pub fn sweeps(&self) -> Vec<Arc<Sweep>> {
        self.history.read().unwrap_or_else(PoisonError::into_inner).sweeps()
    }

    #[must_use]
    pub fn head(&self) -> Option<Arc<Sweep>> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .head()
            .cloned()
    }

    #[must_use]
    pub fn expected_hops(&self) -> Option<u32> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .expected_hops()
    }

    /// Averaged bins paired with the latest sweep's frequencies.
    #[must_use]
    pub fn spectrum(&self) -> Vec<(f64, f32)> {
        let Some(head) = self.head() else {
            return Vec::new();
        };
        self.averager
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .spectrum(&head)
    }

    /// Strongest averaged bin as `(frequency, dB)`.
    #[must_use]
    pub fn peak(&self) -> Option<(f64, f32)> {
        self.spectrum()
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// The whole history as a JSON array.
    pub fn history_json(&self) -> Result<String, serde_json::Error> {
        let sweeps = self.sweeps();
        let sweeps: Vec<&Sweep> = sweeps.iter().map(AsRef::as_ref).collect();
        serde_json::to_string(&sweeps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn hop(secs: u32, start: f64, bins: &[f32]) -> ScanRecord {
        ScanRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, secs).unwrap(),
            start_frequency: start,
            end_frequency: start + 1.0e6,
            sample_rate: 1.0e6,
            sample_count: bins.len(),
            bins: bins.to_vec(),
        }
    }

    #[test]
    fn test_completed_sweep_updates_average() {
        let state = SpectrumState::new(HistoryConfig::default(), 1);

        assert!(state.push(hop(0, 99.0e6, &[-40.0, -20.0])).unwrap().is_empty());
        assert!(state.push(hop(0, 100.0e6, &[-30.0, -10.0])).unwrap().is_empty());
        assert!(state.spectrum().is_empty());

        let completed = state.push(hop(1, 99.0e6, &[-41.0, -21.0])).unwrap();
        assert_eq!(completed.len(), 1);
        let sweep = &completed[0];
        assert_eq!(sweep.bins, vec![-40.0, -20.0, -30.0, -10.0]);
        assert_eq!(state.expected_hops(), Some(2));

        let spectrum = state.spectrum();
        assert_eq!(spectrum.len(), 4);
        assert_eq!(spectrum[0], (99.25e6, -40.0));
        assert_eq!(state.peak(), Some((100.75e6, -10.0)));
    }

    #[test]
    fn test_history_json() {
        let state = SpectrumState::new(HistoryConfig::default(), 1);
        assert_eq!(state.history_json().unwrap(), "[]");

        state.push(hop(0, 99.0e6, &[-1.5])).unwrap();
        state.push(hop(1, 99.0e6, &[-2.5])).unwrap();

        let json: serde_json::Value = serde_json::from_str(&state.history_json().unwrap()).unwrap();
        let sweeps = json.as_array().unwrap();
        // Single-hop layout: the second record completes on arrival
        assert_eq!(sweeps.len(), 2);
        assert_eq!(sweeps[0]["bins"], serde_json::json!([-1.5]));
        assert_eq!(sweeps[1]["bins"], serde_json::json!([-2.5]));
        assert_eq!(sweeps[0]["start_frequency"], serde_json::json!(99.0e6));
    }

    #[test]
    fn test_single_hop_layout_averages_every_sweep() {
        let state = SpectrumState::new(HistoryConfig::default(), 2);

        state.push(hop(0, 99.0e6, &[-40.0])).unwrap();
        let completed = state.push(hop(1, 99.0e6, &[-20.0])).unwrap();

        assert_eq!(completed.len(), 2);
        assert_eq!(state.spectrum(), vec![(99.5e6, -30.0)]);
    }

    #[test]
    fn test_assembly_errors_pass_through() {
        let state = SpectrumState::new(HistoryConfig::default(), 1);
        state.push(hop(0, 99.0e6, &[-1.0])).unwrap();

        let overlapping = hop(0, 99.5e6, &[-1.0]);
        assert!(matches!(state.push(overlapping), Err(AssemblyError::Contiguity(_))));
    }
}
