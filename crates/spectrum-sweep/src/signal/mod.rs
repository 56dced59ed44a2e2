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

//! Per-hop signal transform.
//!
//! Raw interleaved 8-bit I/Q is decoded, windowed, run through a forward FFT,
//! reordered so DC sits in the middle, and converted to power in dB:
//!
//! ```text
//! i8 I/Q -> Complex<f32> -> window -> FFT -> shift -> 10*log10(|X|^2)
//! ```
//!
//! A sweep is never transformed as one block. Each hop is transformed on its
//! own and the shifted results are concatenated in hop order, which is what
//! [`HopSignals`] does.

mod window;

pub use window::Window;

use std::fmt;
use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use thiserror::Error;

/// Errors from the signal transform.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("block has {actual} samples but the transform was planned for {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Something that can be viewed in the frequency domain.
pub trait Spectral {
    /// Centred frequency-domain view, one complex value per output bin.
    fn frequency_domain(&self, transform: &SignalTransform) -> Result<Vec<Complex<f32>>, SignalError>;

    /// Number of complex samples (and therefore output bins).
    fn size(&self) -> usize;
}

/// Decode interleaved signed 8-bit I/Q pairs. A trailing unpaired byte is ignored.
#[must_use]
pub fn decode_iq(raw: &[i8]) -> Vec<Complex<f32>> {
    raw.chunks_exact(2)
        .map(|pair| Complex::new(f32::from(pair[0]), f32::from(pair[1])))
        .collect()
}

/// Rotate FFT output so the zero-frequency cell lands at index `n / 2`.
#[must_use]
pub fn fft_shift<T: Copy>(data: &[T]) -> Vec<T> {
    let n = data.len();
    (0..n).map(|i| data[(i + n / 2) % n]).collect()
}

/// Power of each cell in dB. Silent cells come out as `-inf`.
#[must_use]
pub fn power_db(spectrum: &[Complex<f32>]) -> Vec<f32> {
    spectrum.iter().map(|x| 10.0 * x.norm_sqr().log10()).collect()
}

/// One hop's worth of complex samples.
#[derive(Debug, Clone, PartialEq)]
pub struct IqBuffer {
    samples: Vec<Complex<f32>>,
}

impl IqBuffer {
    /// Create a buffer from already decoded samples.
    #[must_use]
    pub fn new(samples: Vec<Complex<f32>>) -> Self {
        Self { samples }
    }

    /// Create a buffer from raw interleaved I/Q bytes.
    #[must_use]
    pub fn from_interleaved(raw: &[i8]) -> Self {
        Self::new(decode_iq(raw))
    }

    #[must_use]
    pub fn samples(&self) -> &[Complex<f32>] {
        &self.samples
    }
}

impl Spectral for IqBuffer {
    fn frequency_domain(&self, transform: &SignalTransform) -> Result<Vec<Complex<f32>>, SignalError> {
        transform.centered(&self.samples)
    }

    fn size(&self) -> usize {
        self.samples.len()
    }
}

/// The ordered hops of one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HopSignals {
    hops: Vec<IqBuffer>,
}

impl HopSignals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next hop in frequency order.
    pub fn push(&mut self, hop: IqBuffer) {
        self.hops.push(hop);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

impl FromIterator<IqBuffer> for HopSignals {
    fn from_iter<I: IntoIterator<Item = IqBuffer>>(iter: I) -> Self {
        Self {
            hops: iter.into_iter().collect(),
        }
    }
}

impl Spectral for HopSignals {
    fn frequency_domain(&self, transform: &SignalTransform) -> Result<Vec<Complex<f32>>, SignalError> {
        let mut view = Vec::with_capacity(self.size());
        for hop in &self.hops {
            view.extend(hop.frequency_domain(transform)?);
        }
        Ok(view)
    }

    fn size(&self) -> usize {
        self.hops.iter().map(Spectral::size).sum()
    }
}

/// Planned FFT plus window weights for one block size.
///
/// Planning happens once in [`SignalTransform::new`]; the transform is
/// immutable afterwards and can be shared between threads.
#[derive(Clone)]
pub struct SignalTransform {
    size: usize,
    window: Window,
    weights: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for SignalTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTransform")
            .field("size", &self.size)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl SignalTransform {
    /// Create a new transform for blocks of `size` complex samples.
    #[must_use]
    pub fn new(size: usize, window: Window) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        Self {
            size,
            window,
            weights: window.weights(size),
            fft,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn window(&self) -> Window {
        self.window
    }

    /// Window, FFT and shift one block.
    pub fn centered(&self, samples: &[Complex<f32>]) -> Result<Vec<Complex<f32>>, SignalError> {
        if samples.len() != self.size {
            return Err(SignalError::SizeMismatch {
                expected: self.size,
                actual: samples.len(),
            });
        }

        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .zip(&self.weights)
            .map(|(&sample, &weight)| sample * weight)
            .collect();
        self.fft.process(&mut buffer);

        Ok(fft_shift(&buffer))
    }

    /// Full transform of any [`Spectral`] signal to dB bins.
    pub fn bins<S: Spectral + ?Sized>(&self, signal: &S) -> Result<Vec<f32>, SignalError> {
        Ok(power_db(&signal.frequency_domain(self)?))
    }

    /// Full transform of one hop of raw interleaved I/Q.
    pub fn process_raw(&self, raw: &[i8]) -> Result<Vec<f32>, SignalError> {
        self.bins(&IqBuffer::from_interleaved(raw))
    }
}
