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

//! Application configuration management.
//!
//! Stored defaults for the acquisition and serving processes, persisted as
//! TOML through `confy`. Command-line flags override these per run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use spectrum_sweep::{BroadcastConfig, HistoryConfig, HopConfig, Window};

const APP_NAME: &str = "sweepscope";
const CONFIG_NAME: &str = "config";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Centre of the sweep in Hz
    #[serde(default = "default_frequency")]
    pub frequency: f64,

    /// Requested receiver sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Extra hops beyond the first capture
    #[serde(default)]
    pub hops: u32,

    /// Complex samples per capture (FFT size)
    #[serde(default = "default_samples_per_hop")]
    pub samples_per_hop: usize,

    /// Samples discarded after each retune
    #[serde(default = "default_settle_samples")]
    pub settle_samples: usize,

    /// Receiver read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Window applied before the FFT
    #[serde(default)]
    pub window: Window,

    /// How much sweep history the feed keeps, in seconds (0 keeps everything)
    #[serde(default = "default_history_secs")]
    pub history_secs: u64,

    /// Number of sweeps in the moving average
    #[serde(default = "default_average_depth")]
    pub average_depth: usize,

    /// Address the live feed listens on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Port the live feed listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Events buffered per feed client before dropping
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Page title reported by the feed
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_frequency() -> f64 {
    100.0e6
}

fn default_sample_rate() -> f64 {
    1.0e6
}

fn default_samples_per_hop() -> usize {
    512
}

fn default_settle_samples() -> usize {
    2048
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_history_secs() -> u64 {
    3600
}

fn default_average_depth() -> usize {
    spectrum_sweep::average::DEFAULT_DEPTH
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    21753
}

fn default_queue_size() -> usize {
    16
}

fn default_title() -> String {
    "Spectrum".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            sample_rate: default_sample_rate(),
            hops: 0,
            samples_per_hop: default_samples_per_hop(),
            settle_samples: default_settle_samples(),
            read_timeout_ms: default_read_timeout_ms(),
            window: Window::default(),
            history_secs: default_history_secs(),
            average_depth: default_average_depth(),
            listen_address: default_listen_address(),
            port: default_port(),
            queue_size: default_queue_size(),
            title: default_title(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Hop controller settings derived from this configuration.
    #[must_use]
    pub fn hop_config(&self) -> HopConfig {
        HopConfig {
            center_frequency: self.frequency,
            sample_rate: self.sample_rate,
            hops: self.hops,
            samples_per_hop: self.samples_per_hop,
            settle_samples: self.settle_samples,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            window: self.window,
            ..HopConfig::default()
        }
    }

    /// History bound derived from this configuration.
    #[must_use]
    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            max_duration: (self.history_secs > 0).then(|| Duration::from_secs(self.history_secs)),
        }
    }

    #[must_use]
    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            queue_size: self.queue_size,
        }
    }

    /// `address:port` for the feed listener.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }
}
