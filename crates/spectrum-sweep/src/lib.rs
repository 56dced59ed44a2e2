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

//! Wideband spectrum sweeps from a narrowband receiver.
//!
//! A tuner that only sees a few MHz at a time is hopped across adjacent
//! bands; every hop is turned into a power spectrum and the hops of one
//! sweep are stitched back together. The crate is split into layers that
//! can be used on their own:
//!
//! - **Receiver layer**: the [`Receiver`] trait a tuner driver implements
//! - **Hop layer**: [`HopController`] drives a receiver on its own thread and
//!   emits one [`ScanRecord`] per hop
//! - **Signal layer**: [`SignalTransform`] (window, FFT, centring, dB)
//! - **Record layer**: [`ScanRecord`], its merge rules and its one-line text form
//! - **History layer**: [`SweepAssembler`] rebuilds sweeps from hop records and
//!   keeps a time-bounded history
//! - **Averaging**: [`TemporalAverager`] smooths successive sweeps
//! - **Fan-out**: [`Broadcaster`] delivers events to any number of slow or fast
//!   consumers without blocking the producer
//!
//! # Quick Start
//!
//! ```no_run
//! use spectrum_sweep::{HistoryConfig, HopConfig, HopController, Receiver, SweepAssembler};
//! use tokio::sync::mpsc;
//!
//! # fn run(receiver: impl Receiver + 'static) -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, mut rx) = mpsc::channel(64);
//! let hopper = HopController::spawn(
//!     receiver,
//!     HopConfig {
//!         center_frequency: 100.0e6,
//!         sample_rate: 1.0e6,
//!         hops: 3,
//!         ..Default::default()
//!     },
//!     tx,
//! )?;
//!
//! let mut history = SweepAssembler::new(HistoryConfig::default());
//! while let Some(record) = rx.blocking_recv() {
//!     for sweep in history.push(record).unwrap_or_default() {
//!         println!("{} bins from {} Hz", sweep.bins.len(), sweep.start_frequency);
//!     }
//! }
//! hopper.wait()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Record Layer Only
//!
//! ```
//! use spectrum_sweep::ScanRecord;
//!
//! let line = "2024-01-01, 12:00:00, 98000000, 99000000, 1000000, 4, -40.00, -38.50";
//! let mut scan: ScanRecord = line.parse().unwrap();
//! let next: ScanRecord = "2024-01-01, 12:00:00, 99000000, 100000000, 1000000, 4, -41.00"
//!     .parse()
//!     .unwrap();
//!
//! scan.append(next).unwrap();
//! assert_eq!(scan.end_frequency, 100.0e6);
//! assert_eq!(scan.bins.len(), 3);
//! ```

pub mod average;
pub mod broadcast;
pub mod history;
pub mod hop;
pub mod receiver;
pub mod record;
pub mod signal;
pub mod units;

pub use average::TemporalAverager;
pub use broadcast::{BroadcastConfig, Broadcaster, Event, Subscriber, Subscription};
pub use history::{AssemblyError, HistoryConfig, SweepAssembler};
pub use hop::{HopConfig, HopController, HopError, HopHandle, HopPlan};
pub use receiver::{Receiver, ReceiverError};
pub use record::{ContiguityError, ParseError, ScanRecord, Sweep};
pub use signal::{HopSignals, IqBuffer, SignalError, SignalTransform, Spectral, Window};
pub use units::{Decibel, Frequency};
