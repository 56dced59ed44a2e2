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

//! RTL-SDR hardware receiver.
//!
//! The device handle lives on its own thread for its whole life and is driven
//! through a command channel, so the receiver itself can be moved onto the
//! hop controller's thread. Read timeouts are enforced on the reply channel.
//! Enable the `hardware` feature to compile with RTL-SDR support.

#[cfg(feature = "hardware")]
use std::sync::mpsc;
use std::time::Duration;

use spectrum_sweep::{Receiver, ReceiverError};

#[cfg(feature = "hardware")]
use super::rtl_rate_in_range;
use super::RTL_SAMPLE_RATES;

/// How long opening the device may take before giving up.
#[cfg(feature = "hardware")]
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Convert unsigned RTL-SDR samples (centred on 127.5) to signed.
#[cfg(any(feature = "hardware", test))]
#[must_use]
#[allow(clippy::cast_possible_wrap, reason = "flipping the top bit re-centres 0..=255 on zero")]
pub fn recenter(raw: &[u8]) -> Vec<i8> {
    raw.iter().map(|&value| (value ^ 0x80) as i8).collect()
}

#[cfg(feature = "hardware")]
enum Command {
    Configure {
        frequency: u32,
        sample_rate: u32,
        reply: mpsc::Sender<Result<f64, ReceiverError>>,
    },
    Read {
        bytes: usize,
        reply: mpsc::Sender<Result<Vec<u8>, ReceiverError>>,
    },
    Close(mpsc::Sender<Result<(), ReceiverError>>),
}

/// An RTL-SDR dongle.
#[cfg(feature = "hardware")]
pub struct RtlSdrReceiver {
    device_index: u32,
    commands: Option<mpsc::Sender<Command>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(feature = "hardware")]
impl std::fmt::Debug for RtlSdrReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtlSdrReceiver")
            .field("device_index", &self.device_index)
            .field("open", &self.commands.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "hardware")]
impl RtlSdrReceiver {
    /// Open device `device_index` with automatic gain.
    pub fn open(device_index: u32) -> Result<Self, ReceiverError> {
        log::info!("Opening RTL-SDR device {}...", device_index);

        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), ReceiverError>>();

        let thread = std::thread::Builder::new()
            .name(format!("rtlsdr-{device_index}"))
            .spawn(move || device_thread(device_index, &init_tx, &command_rx))
            .map_err(|e| ReceiverError::Open(format!("failed to spawn device thread: {e}")))?;

        match init_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ReceiverError::Timeout(OPEN_TIMEOUT));
            }
        }

        Ok(Self {
            device_index,
            commands: Some(command_tx),
            thread: Some(thread),
        })
    }

    fn send(&self, command: Command) -> Result<(), ReceiverError> {
        self.commands
            .as_ref()
            .ok_or_else(|| ReceiverError::Read("device is closed".to_string()))?
            .send(command)
            .map_err(|_| ReceiverError::Read("device thread exited".to_string()))
    }
}

#[cfg(feature = "hardware")]
fn device_thread(
    device_index: u32,
    init_tx: &mpsc::Sender<Result<(), ReceiverError>>,
    commands: &mpsc::Receiver<Command>,
) {
    #[allow(clippy::cast_possible_wrap, reason = "device indices are tiny")]
    let mut device = match rtlsdr::open(device_index as i32) {
        Ok(device) => device,
        Err(e) => {
            log::error!("Failed to open RTL-SDR device {}: {}", device_index, e);
            let _ = init_tx.send(Err(ReceiverError::Open(format!(
                "RTL-SDR device {device_index}: {e}"
            ))));
            return;
        }
    };

    // false = automatic gain
    if let Err(e) = device.set_tuner_gain_mode(false) {
        let _ = init_tx.send(Err(ReceiverError::Configure(format!("failed to set gain mode: {e}"))));
        return;
    }

    log::info!("RTL-SDR device {} opened", device_index);
    let _ = init_tx.send(Ok(()));

    while let Ok(command) = commands.recv() {
        match command {
            Command::Configure {
                frequency,
                sample_rate,
                reply,
            } => {
                let result = device
                    .set_center_freq(frequency)
                    .map_err(|e| ReceiverError::Configure(format!("failed to set center frequency: {e}")))
                    .and_then(|()| {
                        device
                            .set_sample_rate(sample_rate)
                            .map_err(|e| ReceiverError::Configure(format!("failed to set sample rate: {e}")))
                    })
                    .and_then(|()| {
                        device
                            .reset_buffer()
                            .map_err(|e| ReceiverError::Configure(format!("failed to reset buffer: {e}")))
                    })
                    .and_then(|()| {
                        device
                            .get_sample_rate()
                            .map_err(|e| ReceiverError::Configure(format!("failed to read back sample rate: {e}")))
                    })
                    .and_then(|actual| checked_sample_rate(actual, sample_rate));
                let _ = reply.send(result);
            }
            Command::Read { bytes, reply } => {
                let result = device
                    .read_sync(bytes)
                    .map_err(|e| ReceiverError::Read(e.to_string()));
                let _ = reply.send(result);
            }
            Command::Close(reply) => {
                // Dropping the handle releases the USB interface
                drop(device);
                log::info!("RTL-SDR device {} closed", device_index);
                let _ = reply.send(Ok(()));
                return;
            }
        }
    }

    log::debug!("RTL-SDR device {} command channel closed", device_index);
}

/// Rate the device settled on after asking for `requested`.
///
/// librtlsdr reports 0 when it cannot read the rate back.
#[cfg(any(feature = "hardware", test))]
fn checked_sample_rate(actual: u32, requested: u32) -> Result<f64, ReceiverError> {
    if actual == 0 {
        return Err(ReceiverError::Configure(format!(
            "device did not report a sample rate after requesting {requested} Hz"
        )));
    }
    if actual != requested {
        log::debug!("RTL-SDR adjusted sample rate {} Hz to {} Hz", requested, actual);
    }
    Ok(f64::from(actual))
}

#[cfg(feature = "hardware")]
impl Receiver for RtlSdrReceiver {
    fn configure(&mut self, frequency: f64, sample_rate: f64) -> Result<f64, ReceiverError> {
        if !rtl_rate_in_range(sample_rate) {
            return Err(ReceiverError::Unsupported(format!(
                "sample rate {sample_rate} Hz is outside the tuner's range"
            )));
        }
        if !(1.0..=f64::from(u32::MAX)).contains(&frequency) {
            return Err(ReceiverError::Configure(format!(
                "frequency {frequency} Hz is out of range for RTL-SDR"
            )));
        }

        #[allow(clippy::cast_sign_loss, reason = "both values were range checked above")]
        let (frequency, sample_rate) = (frequency.round() as u32, sample_rate.round() as u32);

        let (reply, result) = mpsc::channel();
        self.send(Command::Configure {
            frequency,
            sample_rate,
            reply,
        })?;
        result
            .recv()
            .map_err(|_| ReceiverError::Configure("device thread exited".to_string()))?
    }

    fn read_raw(&mut self, sample_count: usize, timeout: Duration) -> Result<Vec<i8>, ReceiverError> {
        let (reply, result) = mpsc::channel();
        self.send(Command::Read {
            bytes: sample_count * 2,
            reply,
        })?;

        match result.recv_timeout(timeout) {
            Ok(Ok(raw)) => Ok(recenter(&raw)),
            Ok(Err(e)) => Err(e),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ReceiverError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ReceiverError::Read("device thread exited".to_string()))
            }
        }
    }

    fn supported_sample_rates(&self) -> Vec<f64> {
        RTL_SAMPLE_RATES.to_vec()
    }

    fn close(&mut self) -> Result<(), ReceiverError> {
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };

        let (reply, result) = mpsc::channel();
        let closed = if commands.send(Command::Close(reply)).is_ok() {
            result
                .recv()
                .unwrap_or_else(|_| Err(ReceiverError::Close("device thread exited".to_string())))
        } else {
            Ok(())
        };

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        closed
    }
}

#[cfg(feature = "hardware")]
impl Drop for RtlSdrReceiver {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("RTL-SDR device {} did not close cleanly: {}", self.device_index, e);
        }
    }
}

/// Stub receiver when the hardware feature is disabled.
#[cfg(not(feature = "hardware"))]
#[derive(Debug)]
pub struct RtlSdrReceiver {
    _private: (),
}

#[cfg(not(feature = "hardware"))]
impl RtlSdrReceiver {
    /// Open an RTL-SDR device (always fails without the hardware feature).
    pub fn open(device_index: u32) -> Result<Self, ReceiverError> {
        log::warn!("RTL-SDR hardware support not compiled (enable 'hardware' feature)");
        Err(ReceiverError::Unsupported(format!(
            "cannot open RTL-SDR device {device_index}: hardware support not compiled (enable 'hardware' feature)"
        )))
    }
}

#[cfg(not(feature = "hardware"))]
impl Receiver for RtlSdrReceiver {
    fn configure(&mut self, _frequency: f64, _sample_rate: f64) -> Result<f64, ReceiverError> {
        Err(ReceiverError::Unsupported("hardware support not compiled".to_string()))
    }

    fn read_raw(&mut self, _sample_count: usize, _timeout: Duration) -> Result<Vec<i8>, ReceiverError> {
        Err(ReceiverError::Unsupported("hardware support not compiled".to_string()))
    }

    fn supported_sample_rates(&self) -> Vec<f64> {
        RTL_SAMPLE_RATES.to_vec()
    }

    fn close(&mut self) -> Result<(), ReceiverError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recenter() {
        assert_eq!(recenter(&[0, 127, 128, 255]), vec![-128, -1, 0, 127]);
    }

    #[test]
    fn test_reported_sample_rate_wins() {
        assert_eq!(checked_sample_rate(2_400_000, 2_400_000), Ok(2_400_000.0));
        assert_eq!(checked_sample_rate(1_024_001, 1_024_000), Ok(1_024_001.0));
        assert!(matches!(
            checked_sample_rate(0, 1_024_000),
            Err(ReceiverError::Configure(_))
        ));
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_open_without_hardware_support() {
        assert!(matches!(
            RtlSdrReceiver::open(0),
            Err(ReceiverError::Unsupported(_))
        ));
    }
}
