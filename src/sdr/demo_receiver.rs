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

//! Synthetic receiver for running without hardware.
//!
//! Produces a handful of fixed carriers plus a noise floor, mixed down to
//! whatever frequency the hop controller tunes to. Carriers outside the tuned
//! band are simply absent from that hop, so a multi-hop sweep shows each one
//! in the right place.

use std::f64::consts::PI;
use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use spectrum_sweep::{Receiver, ReceiverError};

use super::{rtl_rate_in_range, RTL_SAMPLE_RATES};

/// A synthetic carrier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    /// Absolute frequency in Hz.
    pub frequency: f64,
    /// Peak amplitude as a fraction of full scale (0.0 - 1.0).
    pub amplitude: f64,
}

/// Receiver that synthesizes I/Q instead of reading a device.
#[derive(Debug)]
pub struct DemoReceiver {
    tones: Vec<Tone>,
    /// Gaussian noise per I/Q component; `None` for a clean signal.
    noise: Option<Normal<f64>>,
    frequency: f64,
    sample_rate: f64,
    /// Sample clock, keeps carrier phase continuous across reads.
    clock: u64,
    rng: StdRng,
    pace: bool,
    open: bool,
}

impl Default for DemoReceiver {
    fn default() -> Self {
        Self::new(
            vec![
                Tone {
                    frequency: 99.1e6,
                    amplitude: 0.4,
                },
                Tone {
                    frequency: 100.3e6,
                    amplitude: 0.6,
                },
                Tone {
                    frequency: 101.7e6,
                    amplitude: 0.25,
                },
            ],
            0.02,
        )
    }
}

impl DemoReceiver {
    /// Create a receiver emitting `tones` over a Gaussian noise floor whose
    /// standard deviation is `noise` (fraction of full scale).
    #[must_use]
    pub fn new(tones: Vec<Tone>, noise: f64) -> Self {
        let noise = if noise > 0.0 {
            match Normal::new(0.0, noise) {
                Ok(dist) => Some(dist),
                Err(e) => {
                    warn!("Ignoring noise level {}: {}", noise, e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            tones,
            noise,
            frequency: 0.0,
            sample_rate: 0.0,
            clock: 0,
            rng: StdRng::from_entropy(),
            pace: false,
            open: true,
        }
    }

    /// Use a fixed seed so the noise is reproducible.
    #[must_use]
    pub fn seeded(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Sleep for as long as real hardware would take to deliver each read.
    #[must_use]
    pub fn paced(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    fn sample(&mut self) -> (i8, i8) {
        let t = self.clock as f64 / self.sample_rate;
        self.clock += 1;

        let (mut i_sample, mut q_sample) = match &self.noise {
            Some(dist) => (dist.sample(&mut self.rng), dist.sample(&mut self.rng)),
            None => (0.0, 0.0),
        };

        for tone in &self.tones {
            let offset = tone.frequency - self.frequency;
            if offset.abs() >= self.sample_rate / 2.0 {
                continue;
            }
            let phase = 2.0 * PI * offset * t;
            i_sample += tone.amplitude * phase.cos();
            q_sample += tone.amplitude * phase.sin();
        }

        (to_i8(i_sample), to_i8(q_sample))
    }
}

fn to_i8(value: f64) -> i8 {
    (value * 127.0).round().clamp(-128.0, 127.0) as i8
}

impl Receiver for DemoReceiver {
    fn configure(&mut self, frequency: f64, sample_rate: f64) -> Result<f64, ReceiverError> {
        if !self.open {
            return Err(ReceiverError::Configure("receiver is closed".to_string()));
        }
        if !rtl_rate_in_range(sample_rate) {
            return Err(ReceiverError::Unsupported(format!(
                "sample rate {sample_rate} Hz is outside the tuner's range"
            )));
        }
        if frequency <= 0.0 {
            return Err(ReceiverError::Configure(format!(
                "cannot tune to {frequency} Hz"
            )));
        }

        if (self.sample_rate - sample_rate).abs() > f64::EPSILON {
            info!("Demo receiver running at {:.3} MHz", sample_rate / 1e6);
        }
        debug!("Demo receiver tuned to {:.3} MHz", frequency / 1e6);

        self.frequency = frequency;
        self.sample_rate = sample_rate;
        Ok(sample_rate)
    }

    fn read_raw(&mut self, sample_count: usize, timeout: Duration) -> Result<Vec<i8>, ReceiverError> {
        if !self.open || self.sample_rate <= 0.0 {
            return Err(ReceiverError::Read("receiver is not configured".to_string()));
        }

        if self.pace {
            let capture = Duration::from_secs_f64(sample_count as f64 / self.sample_rate);
            if capture > timeout {
                std::thread::sleep(timeout);
                return Err(ReceiverError::Timeout(timeout));
            }
            std::thread::sleep(capture);
        }

        let mut raw = Vec::with_capacity(sample_count * 2);
        for _ in 0..sample_count {
            let (i_sample, q_sample) = self.sample();
            raw.push(i_sample);
            raw.push(q_sample);
        }
        Ok(raw)
    }

    fn supported_sample_rates(&self) -> Vec<f64> {
        RTL_SAMPLE_RATES.to_vec()
    }

    fn close(&mut self) -> Result<(), ReceiverError> {
        info!("Demo receiver closed after {} samples", self.clock);
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectrum_sweep::{SignalTransform, Window};

    fn single_tone(frequency: f64) -> DemoReceiver {
        DemoReceiver::new(
            vec![Tone {
                frequency,
                amplitude: 0.5,
            }],
            0.0,
        )
    }

    fn peak(bins: &[f32]) -> usize {
        bins.iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_read_length() {
        let mut receiver = DemoReceiver::default();
        receiver.configure(100.0e6, 1.0e6).unwrap();

        let raw = receiver.read_raw(256, Duration::from_millis(100)).unwrap();
        assert_eq!(raw.len(), 512);
    }

    #[test]
    fn test_tone_lands_on_its_bin() {
        // 1 MHz over 64 bins: 15625 Hz per bin, +250 kHz is 16 bins above centre
        let mut receiver = single_tone(100.25e6);
        receiver.configure(100.0e6, 1.0e6).unwrap();
        let raw = receiver.read_raw(64, Duration::from_millis(100)).unwrap();

        let transform = SignalTransform::new(64, Window::Rectangular);
        let bins = transform.process_raw(&raw).unwrap();

        assert_eq!(peak(&bins), 32 + 16);
    }

    #[test]
    fn test_out_of_band_tone_is_absent() {
        let mut receiver = single_tone(105.0e6);
        receiver.configure(100.0e6, 1.0e6).unwrap();
        let raw = receiver.read_raw(32, Duration::from_millis(100)).unwrap();

        assert!(raw.iter().all(|&value| value == 0));
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let read = |seed| {
            let mut receiver = DemoReceiver::new(Vec::new(), 0.1).seeded(seed);
            receiver.configure(100.0e6, 1.0e6).unwrap();
            receiver.read_raw(128, Duration::from_millis(100)).unwrap()
        };

        let first = read(7);
        assert_eq!(first, read(7));
        assert!(first.iter().any(|&value| value != 0));
    }

    #[test]
    fn test_rejects_unsupported_rate() {
        let mut receiver = DemoReceiver::default();
        assert!(matches!(
            receiver.configure(100.0e6, 500_000.0),
            Err(ReceiverError::Unsupported(_))
        ));
    }

    #[test]
    fn test_closed_receiver_fails() {
        let mut receiver = DemoReceiver::default();
        receiver.configure(100.0e6, 1.0e6).unwrap();
        receiver.close().unwrap();

        assert!(receiver.read_raw(16, Duration::from_millis(10)).is_err());
        assert!(receiver.configure(100.0e6, 1.0e6).is_err());
    }

    #[test]
    fn test_paced_read_times_out() {
        let mut receiver = DemoReceiver::default().paced(true);
        receiver.configure(100.0e6, 1.0e6).unwrap();

        // 100k samples at 1 MHz is 100 ms, far beyond a 1 ms timeout
        assert_eq!(
            receiver.read_raw(100_000, Duration::from_millis(1)),
            Err(ReceiverError::Timeout(Duration::from_millis(1)))
        );
    }
}
