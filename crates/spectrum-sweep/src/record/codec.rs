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

//! Comma-separated line form of a [`ScanRecord`].
//!
//! Line format:
//! ```text
//! <date>, <time>, <start_hz>, <end_hz>, <sample_rate>, <sample_count>, <bin0>, <bin1>, ...
//! ```
//!
//! Dates are `%Y-%m-%d`, times `%H:%M:%S` (UTC). Whitespace around each
//! field is ignored.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use super::{ParseError, ScanRecord};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Pull one named field out of the split line and parse it.
fn field<T: FromStr>(parts: &[&str], index: usize, name: &'static str) -> Result<T, ParseError> {
    let raw = parts.get(index).ok_or(ParseError::MissingField(name))?;
    raw.parse::<T>().ok().ok_or_else(|| ParseError::InvalidValue {
        field: name,
        value: (*raw).to_string(),
    })
}

impl FromStr for ScanRecord {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.trim().split(',').map(str::trim).collect();

        let date = parts.first().copied().unwrap_or_default();
        if date.is_empty() {
            return Err(ParseError::MissingField("date"));
        }
        let time = parts.get(1).ok_or(ParseError::MissingField("time"))?;

        let stamp = format!("{date} {time}");
        let timestamp = NaiveDateTime::parse_from_str(&stamp, &format!("{DATE_FORMAT} {TIME_FORMAT}"))
            .ok()
            .ok_or(ParseError::InvalidValue {
                field: "timestamp",
                value: stamp,
            })?
            .and_utc();

        let start_frequency = field::<f64>(&parts, 2, "start_frequency")?;
        let end_frequency = field::<f64>(&parts, 3, "end_frequency")?;
        let sample_rate = field::<f64>(&parts, 4, "sample_rate")?;
        let sample_count = field::<usize>(&parts, 5, "sample_count")?;

        let bins = parts[6.min(parts.len())..]
            .iter()
            .map(|raw| {
                raw.parse::<f32>().ok().ok_or_else(|| ParseError::InvalidValue {
                    field: "bin",
                    value: (*raw).to_string(),
                })
            })
            .collect::<Result<Vec<f32>, ParseError>>()?;

        Ok(Self {
            timestamp,
            start_frequency,
            end_frequency,
            sample_rate,
            sample_count,
            bins,
        })
    }
}

impl fmt::Display for ScanRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.timestamp.format(DATE_FORMAT),
            self.timestamp.format(TIME_FORMAT),
            self.start_frequency,
            self.end_frequency,
            self.sample_rate,
            self.sample_count,
        )?;
        for bin in &self.bins {
            write!(f, ", {bin:.2}")?;
        }
        Ok(())
    }
}
