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

//! Moving average of the last few sweeps, per bin.

use log::debug;

use crate::record::Sweep;

/// Default number of sweeps averaged.
pub const DEFAULT_DEPTH: usize = 10;

/// Fixed-depth moving average over successive bin vectors.
///
/// The ring starts out full of zeros, so the average ramps up over the first
/// `depth` updates. Non-finite bins (silence comes out as `-inf`) count as
/// `0 dB`.
#[derive(Debug, Clone)]
pub struct TemporalAverager {
    depth: usize,
    ring: Vec<Vec<f32>>,
    next: usize,
    sum: Vec<f64>,
    average: Vec<f32>,
}

impl Default for TemporalAverager {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

impl TemporalAverager {
    /// Create a new averager over `depth` sweeps (at least one).
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            ring: Vec::new(),
            next: 0,
            sum: Vec::new(),
            average: Vec::new(),
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Fold in the next sweep's bins.
    ///
    /// A vector of a different length than the previous one means the
    /// receiver layout changed; the averager starts over at that length.
    pub fn update(&mut self, bins: &[f32]) {
        if bins.len() != self.sum.len() {
            if !self.sum.is_empty() {
                debug!(
                    "Bin count changed from {} to {}, resetting average",
                    self.sum.len(),
                    bins.len()
                );
            }
            self.reset(bins.len());
        }

        let slot = &mut self.ring[self.next];
        for (i, &value) in bins.iter().enumerate() {
            let value = if value.is_finite() { value } else { 0.0 };
            self.sum[i] += f64::from(value) - f64::from(slot[i]);
            slot[i] = value;
            self.average[i] = (self.sum[i] / self.depth as f64) as f32;
        }

        self.next = (self.next + 1) % self.depth;
    }

    fn reset(&mut self, len: usize) {
        self.ring = vec![vec![0.0; len]; self.depth];
        self.next = 0;
        self.sum = vec![0.0; len];
        self.average = vec![0.0; len];
    }

    /// Current average, one value per bin.
    #[must_use]
    pub fn average(&self) -> &[f32] {
        &self.average
    }

    /// Pair each averaged bin with its centre frequency, using `sweep` for
    /// the frequency layout.
    #[must_use]
    pub fn spectrum(&self, sweep: &Sweep) -> Vec<(f64, f32)> {
        sweep.frequencies().zip(self.average.iter().copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record;

    #[test]
    fn test_constant_input_converges_in_one_cycle() {
        let mut averager = TemporalAverager::new(10);

        for _ in 0..9 {
            averager.update(&[-40.0, 20.0]);
        }
        assert!(averager.average()[0] > -40.0);

        averager.update(&[-40.0, 20.0]);
        assert_eq!(averager.average(), &[-40.0, 20.0]);

        averager.update(&[-40.0, 20.0]);
        assert_eq!(averager.average(), &[-40.0, 20.0]);
    }

    #[test]
    fn test_oldest_value_leaves_the_window() {
        let mut averager = TemporalAverager::new(2);

        averager.update(&[10.0]);
        averager.update(&[20.0]);
        assert_eq!(averager.average(), &[15.0]);

        averager.update(&[40.0]);
        assert_eq!(averager.average(), &[30.0]);
    }

    #[test]
    fn test_non_finite_counts_as_zero() {
        let mut averager = TemporalAverager::new(1);

        averager.update(&[f32::NEG_INFINITY, f32::NAN, 3.0]);
        assert_eq!(averager.average(), &[0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_length_change_resets() {
        let mut averager = TemporalAverager::new(2);
        averager.update(&[8.0, 8.0]);

        averager.update(&[4.0, 4.0, 4.0]);
        assert_eq!(averager.average(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_spectrum_pairs_frequencies() {
        let mut averager = TemporalAverager::new(1);
        let sweep = record(0, 100.0, 104.0, &[1.0, 2.0, 3.0, 4.0]);
        averager.update(&sweep.bins);

        assert_eq!(
            averager.spectrum(&sweep),
            vec![(100.5, 1.0), (101.5, 2.0), (102.5, 3.0), (103.5, 4.0)]
        );
    }

    #[test]
    fn test_zero_depth_is_clamped() {
        assert_eq!(TemporalAverager::new(0).depth(), 1);
    }
}
