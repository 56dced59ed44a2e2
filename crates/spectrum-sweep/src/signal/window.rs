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

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Taper applied to each hop before the FFT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// `0.5 - 0.5 * cos(2 * pi * i / (n - 1))`.
    #[default]
    Hann,
    /// No windowing.
    Rectangular,
}

impl Window {
    /// Weight of sample `index` in a block of `len` samples.
    #[must_use]
    pub fn weight(self, index: usize, len: usize) -> f32 {
        match self {
            Self::Rectangular => 1.0,
            Self::Hann if len < 2 => 1.0,
            Self::Hann => {
                let phase = 2.0 * PI * index as f64 / (len - 1) as f64;
                (0.5 - 0.5 * phase.cos()) as f32
            }
        }
    }

    /// All weights for a block of `len` samples.
    #[must_use]
    pub fn weights(self, len: usize) -> Vec<f32> {
        (0..len).map(|i| self.weight(i, len)).collect()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hann => write!(f, "hann"),
            Self::Rectangular => write!(f, "rectangular"),
        }
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hann" | "hanning" => Ok(Self::Hann),
            "rectangular" | "rect" | "none" => Ok(Self::Rectangular),
            other => Err(format!("unknown window '{other}' (expected hann or rectangular)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_depends_on_index() {
        // Odd length so the two middle samples are not mirror images.
        let weights = Window::Hann.weights(65);
        for pair in weights.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_hann_shape() {
        let weights = Window::Hann.weights(9);
        assert!(weights[0].abs() < 1e-6);
        assert!(weights[8].abs() < 1e-6);
        assert!((weights[4] - 1.0).abs() < 1e-6);
        assert!((weights[2] - weights[6]).abs() < 1e-6);
    }

    #[test]
    fn test_rectangular_is_flat() {
        assert!(Window::Rectangular.weights(16).iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_single_sample_block() {
        assert_eq!(Window::Hann.weights(1), vec![1.0]);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Hann".parse::<Window>(), Ok(Window::Hann));
        assert_eq!("none".parse::<Window>(), Ok(Window::Rectangular));
        assert!("blackman".parse::<Window>().is_err());
        assert_eq!(Window::Rectangular.to_string(), "rectangular");
    }
}
