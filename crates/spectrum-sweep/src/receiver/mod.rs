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

//! Receiver capability consumed by the hop controller.
//!
//! Implement [`Receiver`] to plug in a tuner. All calls are blocking and are
//! only ever made from the hop controller's own thread.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a receiver driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReceiverError {
    #[error("failed to open receiver: {0}")]
    Open(String),

    #[error("failed to configure receiver: {0}")]
    Configure(String),

    #[error("failed to read samples: {0}")]
    Read(String),

    #[error("timed out after {0:?} waiting for samples")]
    Timeout(Duration),

    #[error("failed to close receiver: {0}")]
    Close(String),

    #[error("unsupported setting: {0}")]
    Unsupported(String),
}

impl ReceiverError {
    /// Whether the hop controller can carry on after this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// A tunable narrowband receiver producing interleaved signed 8-bit I/Q.
pub trait Receiver: Send {
    /// Tune to `frequency` and request `sample_rate` (both Hz).
    ///
    /// Returns the sample rate the device actually settled on.
    fn configure(&mut self, frequency: f64, sample_rate: f64) -> Result<f64, ReceiverError>;

    /// Read `sample_count` complex samples (`2 * sample_count` bytes of I/Q).
    ///
    /// Returns [`ReceiverError::Timeout`] if nothing arrives within `timeout`.
    fn read_raw(&mut self, sample_count: usize, timeout: Duration) -> Result<Vec<i8>, ReceiverError>;

    /// Sample rates the device accepts, in Hz.
    fn supported_sample_rates(&self) -> Vec<f64>;

    /// Release the device.
    fn close(&mut self) -> Result<(), ReceiverError>;
}

impl<R: Receiver + ?Sized> Receiver for Box<R> {
    fn configure(&mut self, frequency: f64, sample_rate: f64) -> Result<f64, ReceiverError> {
        (**self).configure(frequency, sample_rate)
    }

    fn read_raw(&mut self, sample_count: usize, timeout: Duration) -> Result<Vec<i8>, ReceiverError> {
        (**self).read_raw(sample_count, timeout)
    }

    fn supported_sample_rates(&self) -> Vec<f64> {
        (**self).supported_sample_rates()
    }

    fn close(&mut self) -> Result<(), ReceiverError> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeouts_are_transient() {
        assert!(ReceiverError::Timeout(Duration::from_millis(5)).is_transient());
        assert!(!ReceiverError::Read("usb".to_string()).is_transient());
        assert!(!ReceiverError::Configure("pll".to_string()).is_transient());
    }
}
