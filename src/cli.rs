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

//! Command-line interface. Unset flags fall back to the stored configuration.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use spectrum_sweep::Window;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[clap(
    name = "sweepscope",
    author,
    version,
    about = "Hop a narrowband receiver across a wide band and serve the assembled sweeps"
)]
pub struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire sweeps and write one scan record per line
    Scan(ScanArgs),
    /// Read scan records from stdin and serve them as a live feed
    Serve(ServeArgs),
    /// List the sample rates the receiver supports
    Rates(ReceiverArgs),
    /// Show the configuration file and the values in effect
    Config {
        /// Overwrite the stored configuration with defaults
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ReceiverArgs {
    /// Use the synthetic receiver instead of hardware
    #[arg(long, help_heading = "Receiver")]
    pub demo: bool,

    /// RTL-SDR device index
    #[arg(long, default_value_t = 0, help_heading = "Receiver")]
    pub device: u32,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub receiver: ReceiverArgs,

    // ── Sweep ──────────────────────────────────────────────────────
    /// Centre frequency in Hz
    #[arg(short = 'F', long, help_heading = "Sweep")]
    pub frequency: Option<f64>,

    /// Sample rate in Hz
    #[arg(short = 'R', long, help_heading = "Sweep")]
    pub sample_rate: Option<f64>,

    /// Extra hops beyond the first capture
    #[arg(short = 'S', long, help_heading = "Sweep")]
    pub hops: Option<u32>,

    /// Samples per hop (FFT size)
    #[arg(long, help_heading = "Sweep")]
    pub samples: Option<usize>,

    /// Samples discarded after each retune
    #[arg(long, help_heading = "Sweep")]
    pub settle: Option<usize>,

    /// Receiver read timeout in milliseconds
    #[arg(long, help_heading = "Sweep")]
    pub timeout_ms: Option<u64>,

    /// Window applied before the FFT (hann, rectangular)
    #[arg(long, help_heading = "Sweep")]
    pub window: Option<Window>,

    // ── Output ─────────────────────────────────────────────────────
    /// Write records to this file instead of stdout
    #[arg(long, help_heading = "Output")]
    pub dump: Option<PathBuf>,

    /// Stop after this many completed sweeps
    #[arg(long, help_heading = "Output")]
    pub sweeps: Option<u64>,

    /// Sweeps averaged for the log summary
    #[arg(long, help_heading = "Output")]
    pub average: Option<usize>,
}

impl ScanArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(frequency) = self.frequency {
            config.frequency = frequency;
        }
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(hops) = self.hops {
            config.hops = hops;
        }
        if let Some(samples) = self.samples {
            config.samples_per_hop = samples;
        }
        if let Some(settle) = self.settle {
            config.settle_samples = settle;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.read_timeout_ms = timeout_ms;
        }
        if let Some(window) = self.window {
            config.window = window;
        }
        if let Some(average) = self.average {
            config.average_depth = average;
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    // ── Input ──────────────────────────────────────────────────────
    /// Echo every input line to stdout
    #[arg(long, help_heading = "Input")]
    pub forward: bool,

    /// Frequency offset in Hz added to every record (up/down-converter)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true, help_heading = "Input")]
    pub offset: f64,

    // ── Feed ───────────────────────────────────────────────────────
    /// Listen address
    #[arg(short, long, help_heading = "Feed")]
    pub address: Option<String>,

    /// Listen port
    #[arg(short, long, help_heading = "Feed")]
    pub port: Option<u16>,

    /// Seconds of sweep history to keep (0 keeps everything)
    #[arg(long, help_heading = "Feed")]
    pub history: Option<u64>,

    /// Sweeps in the moving average
    #[arg(long, help_heading = "Feed")]
    pub average: Option<usize>,

    /// Events buffered per client before dropping
    #[arg(long, help_heading = "Feed")]
    pub queue: Option<usize>,

    /// Feed title
    #[arg(long, help_heading = "Feed")]
    pub title: Option<String>,
}

impl ServeArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(address) = &self.address {
            config.listen_address.clone_from(address);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(history) = self.history {
            config.history_secs = history;
        }
        if let Some(average) = self.average {
            config.average_depth = average;
        }
        if let Some(queue) = self.queue {
            config.queue_size = queue;
        }
        if let Some(title) = &self.title {
            config.title.clone_from(title);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_flags_override_config() {
        let cli = Cli::parse_from([
            "sweepscope", "scan", "--demo", "-F", "433.92e6", "-S", "3", "--window", "rect",
        ]);
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };

        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert!(args.receiver.demo);
        assert_eq!(config.frequency, 433.92e6);
        assert_eq!(config.hops, 3);
        assert_eq!(config.window, Window::Rectangular);
        assert_eq!(config.sample_rate, 1.0e6);
    }

    #[test]
    fn test_serve_negative_offset() {
        let cli = Cli::parse_from(["sweepscope", "-vv", "serve", "--offset", "-125e6", "--port", "8080"]);
        assert_eq!(cli.verbose, 2);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(args.offset, -125.0e6);
        assert_eq!(config.port, 8080);
        assert_eq!(config.listen_address, "0.0.0.0");
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
