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

//! Concrete receivers for the hop controller.
//!
//! - [`DemoReceiver`] synthesizes tones and noise so the whole pipeline runs
//!   without a dongle
//! - [`RtlSdrReceiver`] drives an RTL-SDR (enable the `hardware` feature)

pub mod demo_receiver;
pub mod rtlsdr_receiver;

pub use demo_receiver::DemoReceiver;
pub use rtlsdr_receiver::RtlSdrReceiver;

/// Sample rates an RTL2832U tuner handles reliably, in Hz.
pub const RTL_SAMPLE_RATES: [f64; 13] = [
    250_000.0, 960_000.0, 1_024_000.0, 1_200_000.0, 1_440_000.0, 1_600_000.0, 1_800_000.0,
    1_920_000.0, 2_048_000.0, 2_400_000.0, 2_560_000.0, 2_880_000.0, 3_200_000.0,
];

/// Whether the RTL2832U can run at `rate` Hz at all.
///
/// The chip accepts 225-300 kHz and 900 kHz-3.2 MHz.
#[must_use]
pub fn rtl_rate_in_range(rate: f64) -> bool {
    (225_001.0..=300_000.0).contains(&rate) || (900_001.0..=3_200_000.0).contains(&rate)
}
