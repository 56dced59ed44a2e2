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

//! Scan records: one hop's power spectrum, and the merge rules that turn
//! consecutive hops into a wideband sweep.
//!
//! The text form used between processes lives in [`codec`].

mod codec;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while parsing a scan line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for field '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Reasons two records cannot be joined into one.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContiguityError {
    #[error("refusing to append scans with different timestamps ({current} vs {next})")]
    TimestampMismatch {
        current: DateTime<Utc>,
        next: DateTime<Utc>,
    },

    #[error("refusing to append scans with different sample rates ({current} Hz vs {next} Hz)")]
    SampleRateMismatch { current: f64, next: f64 },

    #[error("refusing to append non-sequential scans: next starts at {next_start} Hz before {end} Hz")]
    Overlap { end: f64, next_start: f64 },
}

/// Power spectrum of one hop, or of a whole sweep once hops are merged.
///
/// `bins` are in dB and ordered by ascending frequency, one per FFT cell,
/// so `bins.len()` equals the FFT size times the number of merged hops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Wall-clock time of the sweep this hop belongs to (whole seconds).
    #[serde(rename = "date_time")]
    pub timestamp: DateTime<Utc>,
    /// Lower edge in Hz.
    pub start_frequency: f64,
    /// Upper edge in Hz.
    pub end_frequency: f64,
    /// Receiver sample rate in Hz.
    pub sample_rate: f64,
    /// Raw samples captured for the hop. Informational only.
    #[serde(skip)]
    pub sample_count: usize,
    /// Power per frequency cell in dB.
    pub bins: Vec<f32>,
}

/// A record that has absorbed every hop expected for its timestamp.
pub type Sweep = ScanRecord;

impl ScanRecord {
    /// Append the next hop of the same sweep.
    ///
    /// `next` must share the timestamp and sample rate and must not start
    /// below this record's upper edge. On error `self` is left untouched.
    #[allow(clippy::float_cmp, reason = "both rates are read back from the same receiver")]
    pub fn append(&mut self, next: ScanRecord) -> Result<(), ContiguityError> {
        if self.timestamp != next.timestamp {
            return Err(ContiguityError::TimestampMismatch {
                current: self.timestamp,
                next: next.timestamp,
            });
        }

        if self.sample_rate != next.sample_rate {
            return Err(ContiguityError::SampleRateMismatch {
                current: self.sample_rate,
                next: next.sample_rate,
            });
        }

        if next.start_frequency < self.end_frequency {
            return Err(ContiguityError::Overlap {
                end: self.end_frequency,
                next_start: next.start_frequency,
            });
        }

        self.end_frequency = next.end_frequency;
        self.bins.extend(next.bins);

        Ok(())
    }

    /// Move both edges by a fixed offset, e.g. to undo an upconverter.
    pub fn shift(&mut self, offset: f64) {
        self.start_frequency += offset;
        self.end_frequency += offset;
    }

    /// Frequency span covered by the record.
    #[must_use]
    pub fn bandwidth(&self) -> f64 {
        self.end_frequency - self.start_frequency
    }

    /// Width of one bin in Hz, or `None` for a record without bins.
    #[must_use]
    pub fn bin_width(&self) -> Option<f64> {
        if self.bins.is_empty() {
            None
        } else {
            Some(self.bandwidth() / self.bins.len() as f64)
        }
    }

    /// Centre frequency of every bin, in bin order.
    pub fn frequencies(&self) -> impl Iterator<Item = f64> + '_ {
        let width = self.bin_width().unwrap_or(0.0);
        (0..self.bins.len()).map(move |i| self.start_frequency + width * (i as f64 + 0.5))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, secs).unwrap()
    }

    pub(crate) fn record(secs: u32, start: f64, end: f64, bins: &[f32]) -> ScanRecord {
        ScanRecord {
            timestamp: at(secs),
            start_frequency: start,
            end_frequency: end,
            sample_rate: end - start,
            sample_count: bins.len(),
            bins: bins.to_vec(),
        }
    }

    #[test]
    fn test_append_contiguous() {
        let mut first = record(0, 98.0e6, 99.0e6, &[1.0, 2.0]);
        first
            .append(record(0, 99.0e6, 100.0e6, &[3.0, 4.0]))
            .unwrap();

        assert_eq!(first.start_frequency, 98.0e6);
        assert_eq!(first.end_frequency, 100.0e6);
        assert_eq!(first.bins, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_append_allows_gap() {
        let mut first = record(0, 98.0e6, 99.0e6, &[1.0]);
        assert!(first.append(record(0, 99.5e6, 100.5e6, &[2.0])).is_ok());
        assert_eq!(first.end_frequency, 100.5e6);
    }

    #[test]
    fn test_append_rejects_different_timestamp() {
        let mut first = record(0, 98.0e6, 99.0e6, &[1.0]);
        let err = first
            .append(record(1, 99.0e6, 100.0e6, &[2.0]))
            .unwrap_err();

        assert!(matches!(err, ContiguityError::TimestampMismatch { .. }));
        assert_eq!(first.bins, vec![1.0]);
        assert_eq!(first.end_frequency, 99.0e6);
    }

    #[test]
    fn test_append_rejects_different_sample_rate() {
        let mut first = record(0, 98.0e6, 99.0e6, &[1.0]);
        let err = first
            .append(record(0, 99.0e6, 101.0e6, &[2.0]))
            .unwrap_err();

        assert!(matches!(err, ContiguityError::SampleRateMismatch { .. }));
        assert_eq!(first.bins.len(), 1);
    }

    #[test]
    fn test_append_rejects_backward_overlap() {
        let mut first = record(0, 98.0e6, 99.0e6, &[1.0]);
        let err = first
            .append(record(0, 98.5e6, 99.5e6, &[2.0]))
            .unwrap_err();

        assert_eq!(
            err,
            ContiguityError::Overlap {
                end: 99.0e6,
                next_start: 98.5e6
            }
        );
        assert_eq!(first.bins.len(), 1);
    }

    #[test]
    fn test_shift_and_frequencies() {
        let mut scan = record(0, 0.0, 4.0, &[0.0; 4]);
        scan.shift(100.0);

        assert_eq!(scan.bin_width(), Some(1.0));
        let freqs: Vec<f64> = scan.frequencies().collect();
        assert_eq!(freqs, vec![100.5, 101.5, 102.5, 103.5]);
    }

    #[test]
    fn test_json_field_names() {
        let scan = record(0, 1.0, 2.0, &[-3.5]);
        let json = serde_json::to_value(&scan).unwrap();

        assert!(json.get("date_time").is_some());
        assert!(json.get("sample_count").is_none());
        assert_eq!(json["start_frequency"], 1.0);
        assert_eq!(json["bins"][0], -3.5);
    }
}
