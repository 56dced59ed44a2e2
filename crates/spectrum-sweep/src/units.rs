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

//! Human-readable frequencies and power levels for logs and summaries.

use std::fmt;

const MULTIPLE_PREFIXES: [&str; 9] = ["", "k", "M", "G", "T", "P", "E", "Z", "Y"];
const SUBMULTIPLE_PREFIXES: [&str; 9] = ["", "m", "µ", "n", "p", "f", "a", "z", "y"];

/// Format `value` with an SI prefix and two decimals, e.g. `100.00MHz`.
#[must_use]
pub fn format_si(value: f64, unit: &str) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value:.2}{unit}");
    }

    #[allow(clippy::cast_possible_truncation, reason = "log10 of a finite f64 fits in i32")]
    let power = value.abs().log10().floor() as i32;
    let group = (power / 3).clamp(-8, 8);

    let prefix = if group >= 0 {
        MULTIPLE_PREFIXES[group.unsigned_abs() as usize]
    } else {
        SUBMULTIPLE_PREFIXES[group.unsigned_abs() as usize]
    };
    let scaled = value / 10f64.powi(group * 3);

    format!("{scaled:.2}{prefix}{unit}")
}

/// A frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Frequency(pub f64);

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_si(self.0, "Hz"))
    }
}

/// A power level in dB.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Decibel(pub f32);

impl fmt::Display for Decibel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}dB", self.0)
    }
}
