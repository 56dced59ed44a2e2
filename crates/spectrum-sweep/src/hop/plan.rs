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

/// Frequency layout of one sweep.
///
/// `hops` extra steps give `hops + 1` captures of width `sample_rate`,
/// laid side by side and centred on `center_frequency`. Every edge is
/// computed as `lower_edge + sample_rate * k`, so hop `h`'s upper edge and
/// hop `h + 1`'s lower edge are the same `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HopPlan {
    center_frequency: f64,
    sample_rate: f64,
    hops: u32,
}

impl HopPlan {
    /// Create a new plan. `hops == 0` means a single capture.
    #[must_use]
    pub fn new(center_frequency: f64, sample_rate: f64, hops: u32) -> Self {
        Self {
            center_frequency,
            sample_rate,
            hops,
        }
    }

    #[must_use]
    pub fn center_frequency(&self) -> f64 {
        self.center_frequency
    }

    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of captures per sweep (`hops + 1`).
    #[must_use]
    pub fn hop_count(&self) -> u32 {
        self.hops + 1
    }

    #[must_use]
    pub fn total_bandwidth(&self) -> f64 {
        self.sample_rate * f64::from(self.hop_count())
    }

    /// Lower edge of the whole sweep.
    #[must_use]
    pub fn start_frequency(&self) -> f64 {
        self.edge(0)
    }

    /// Upper edge of the whole sweep.
    #[must_use]
    pub fn end_frequency(&self) -> f64 {
        self.edge(self.hop_count())
    }

    fn edge(&self, k: u32) -> f64 {
        self.center_frequency - self.total_bandwidth() / 2.0 + self.sample_rate * f64::from(k)
    }

    /// Frequency the receiver is tuned to for hop `hop`.
    #[must_use]
    pub fn target(&self, hop: u32) -> f64 {
        self.center_frequency - self.total_bandwidth() / 2.0
            + self.sample_rate / 2.0
            + self.sample_rate * f64::from(hop)
    }

    /// `(start, end)` of the band captured by hop `hop`.
    #[must_use]
    pub fn range(&self, hop: u32) -> (f64, f64) {
        (self.edge(hop), self.edge(hop + 1))
    }

    /// Hop that follows `hop`, wrapping back to 0 after the last one.
    #[must_use]
    pub fn next(&self, hop: u32) -> u32 {
        (hop + 1) % self.hop_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_hop_layout() {
        let plan = HopPlan::new(100.0e6, 1.0e6, 3);

        assert_eq!(plan.hop_count(), 4);
        assert_eq!(plan.total_bandwidth(), 4.0e6);
        assert_eq!(plan.target(0), 98.5e6);
        assert_eq!(plan.target(3), 101.5e6);
        assert_eq!(plan.range(0), (98.0e6, 99.0e6));
        assert_eq!(plan.range(3), (101.0e6, 102.0e6));
        assert_eq!(plan.start_frequency(), 98.0e6);
        assert_eq!(plan.end_frequency(), 102.0e6);
    }

    #[test]
    fn test_single_capture() {
        let plan = HopPlan::new(433.92e6, 2.4e6, 0);

        assert_eq!(plan.hop_count(), 1);
        assert_eq!(plan.target(0), 433.92e6);
        assert_eq!(plan.next(0), 0);
    }

    #[test]
    fn test_hop_index_wraps() {
        let plan = HopPlan::new(100.0e6, 1.0e6, 2);
        let order: Vec<u32> = std::iter::successors(Some(0), |&h| Some(plan.next(h)))
            .take(7)
            .collect();

        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_adjacent_edges_are_identical() {
        // Awkward rate that does not divide evenly into the centre.
        let plan = HopPlan::new(144.390_1e6, 2.048_123e6, 9);

        for hop in 0..plan.hop_count() - 1 {
            assert_eq!(plan.range(hop).1, plan.range(hop + 1).0);
        }
    }
}
