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

//! Hop controller.
//!
//! Drives a [`Receiver`] through the captures of a [`HopPlan`] on a dedicated
//! thread, transforms each capture and emits one [`ScanRecord`] per hop.
//! Receiver calls block, so the controller never runs on the async runtime.
//! Records are handed over with `try_send`, polling while the consumer is
//! behind so a stop request is still noticed.

mod plan;

pub use plan::HopPlan;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::receiver::{Receiver, ReceiverError};
use crate::record::ScanRecord;
use crate::signal::{SignalTransform, Window};

/// Longest single sleep while waiting for the next sweep slot.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Sleep between attempts to hand a record to a full channel.
const SEND_RETRY: Duration = Duration::from_millis(5);

/// How the hop task ended, when it did not end cleanly.
#[derive(Debug, Error)]
pub enum HopError {
    #[error(transparent)]
    Receiver(#[from] ReceiverError),

    #[error("hop controller thread panicked")]
    Panicked,
}

/// Configuration for a hop controller.
#[derive(Debug, Clone)]
pub struct HopConfig {
    /// Centre of the whole sweep in Hz.
    pub center_frequency: f64,
    /// Requested sample rate in Hz. The rate the receiver reports back is used.
    pub sample_rate: f64,
    /// Extra hops beyond the first capture.
    pub hops: u32,
    /// Complex samples per capture, which is also the FFT size.
    pub samples_per_hop: usize,
    /// Samples read and thrown away after every retune.
    pub settle_samples: usize,
    /// Timeout for each receiver read.
    pub read_timeout: Duration,
    /// Window applied before the FFT.
    pub window: Window,
    /// Minimum time between the starts of two sweeps.
    pub min_sweep_interval: Duration,
}

impl Default for HopConfig {
    fn default() -> Self {
        Self {
            center_frequency: 100.0e6,
            sample_rate: 1.0e6,
            hops: 0,
            samples_per_hop: 512,
            settle_samples: 2048,
            read_timeout: Duration::from_millis(100),
            window: Window::Hann,
            min_sweep_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default)]
struct HopStats {
    records: AtomicU64,
    timeouts: AtomicU64,
    short_reads: AtomicU64,
}

/// Spawns hop controllers.
#[derive(Debug)]
pub struct HopController;

impl HopController {
    /// Start hopping on a new thread.
    ///
    /// The receiver is configured for the first hop before this returns, so a
    /// device that cannot be tuned fails here rather than on the thread.
    /// Records go to `records`; when that channel closes the controller stops.
    pub fn spawn<R>(
        receiver: R,
        config: HopConfig,
        records: mpsc::Sender<ScanRecord>,
    ) -> Result<HopHandle, ReceiverError>
    where
        R: Receiver + 'static,
    {
        if config.samples_per_hop == 0 {
            return Err(ReceiverError::Unsupported(
                "samples per hop must be greater than zero".to_string(),
            ));
        }
        if config.sample_rate.is_nan() || config.sample_rate <= 0.0 {
            return Err(ReceiverError::Unsupported(format!(
                "sample rate must be positive, got {}",
                config.sample_rate
            )));
        }

        let cancel = CancellationToken::new();
        let stats = Arc::new(HopStats::default());
        let (init_tx, init_rx) = std_mpsc::channel::<Result<HopPlan, ReceiverError>>();
        let (done_tx, done_rx) = std_mpsc::channel::<Result<(), HopError>>();

        let worker_cancel = cancel.clone();
        let worker_stats = Arc::clone(&stats);
        let thread = thread::Builder::new()
            .name("hop-controller".to_string())
            .spawn(move || {
                let mut receiver = receiver;
                let plan = match configure_first_hop(&mut receiver, &config) {
                    Ok(plan) => plan,
                    Err(e) => {
                        if let Err(close_err) = receiver.close() {
                            warn!("Failed to close receiver after setup error: {}", close_err);
                        }
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(plan));

                let worker = HopWorker {
                    transform: SignalTransform::new(config.samples_per_hop, config.window),
                    receiver,
                    plan,
                    config,
                    records,
                    cancel: worker_cancel,
                    stats: worker_stats,
                };
                let _ = done_tx.send(worker.run());
            })
            .map_err(|e| ReceiverError::Open(format!("failed to spawn hop thread: {e}")))?;

        let plan = match init_rx.recv() {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(ReceiverError::Open(
                    "hop thread exited during setup".to_string(),
                ));
            }
        };

        info!(
            "Hopping {} x {:.3} MHz from {:.3} MHz to {:.3} MHz",
            plan.hop_count(),
            plan.sample_rate() / 1e6,
            plan.start_frequency() / 1e6,
            plan.end_frequency() / 1e6
        );

        Ok(HopHandle {
            plan,
            cancel,
            done_rx,
            thread: Some(thread),
            stats,
        })
    }
}

fn configure_first_hop<R: Receiver>(receiver: &mut R, config: &HopConfig) -> Result<HopPlan, ReceiverError> {
    let requested = HopPlan::new(config.center_frequency, config.sample_rate, config.hops);
    let actual_rate = receiver.configure(requested.target(0), config.sample_rate)?;

    #[allow(clippy::float_cmp, reason = "any difference at all means the device rounded the rate")]
    let rounded = actual_rate != config.sample_rate;
    if rounded {
        info!(
            "Receiver settled on {} Hz (requested {} Hz)",
            actual_rate, config.sample_rate
        );
    }

    Ok(HopPlan::new(config.center_frequency, actual_rate, config.hops))
}

/// Handle to a running hop controller.
///
/// Dropping the handle cancels the controller without waiting for it.
pub struct HopHandle {
    plan: HopPlan,
    cancel: CancellationToken,
    done_rx: std_mpsc::Receiver<Result<(), HopError>>,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<HopStats>,
}

impl std::fmt::Debug for HopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HopHandle")
            .field("plan", &self.plan)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl HopHandle {
    /// Layout actually in use, built from the sample rate the receiver reported.
    #[must_use]
    pub fn plan(&self) -> &HopPlan {
        &self.plan
    }

    /// Token that stops the controller when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Records handed to the consumer so far.
    #[must_use]
    pub fn records_sent(&self) -> u64 {
        self.stats.records.load(Ordering::Relaxed)
    }

    /// Hops skipped because the receiver timed out.
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.stats.timeouts.load(Ordering::Relaxed)
    }

    /// Hops skipped because the receiver returned too few samples.
    #[must_use]
    pub fn short_reads(&self) -> u64 {
        self.stats.short_reads.load(Ordering::Relaxed)
    }

    /// Whether the controller thread has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.thread {
            Some(thread) => thread.is_finished(),
            None => true,
        }
    }

    /// Ask the controller to stop and block until it has.
    ///
    /// The current hop is finished and the receiver closed first. Returns the
    /// controller's final result.
    pub fn stop(self) -> Result<(), HopError> {
        self.cancel.cancel();
        self.wait()
    }

    /// Block until the controller ends on its own.
    pub fn wait(mut self) -> Result<(), HopError> {
        let result = self.done_rx.recv().unwrap_or(Err(HopError::Panicked));

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(HopError::Panicked);
            }
        }

        result
    }
}

impl Drop for HopHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Delivery {
    Sent,
    Closed,
    Cancelled,
}

struct HopWorker<R> {
    receiver: R,
    plan: HopPlan,
    transform: SignalTransform,
    config: HopConfig,
    records: mpsc::Sender<ScanRecord>,
    cancel: CancellationToken,
    stats: Arc<HopStats>,
}

impl<R: Receiver> HopWorker<R> {
    fn run(mut self) -> Result<(), HopError> {
        let result = self.hop_loop();

        if let Err(e) = self.receiver.close() {
            if result.is_ok() {
                return Err(e.into());
            }
            warn!("Failed to close receiver: {}", e);
        }

        result
    }

    fn hop_loop(&mut self) -> Result<(), HopError> {
        let mut previous = None;
        let mut hop = 0;

        loop {
            if hop == 0 {
                let Some(sweep_start) = self.wait_for_sweep_slot(previous) else {
                    info!("Hop controller cancelled");
                    return Ok(());
                };
                previous = Some(sweep_start);
            } else if self.cancel.is_cancelled() {
                info!("Hop controller cancelled");
                return Ok(());
            }

            let Some((_, timestamp)) = previous else {
                return Ok(());
            };

            match self.capture(hop, timestamp) {
                Ok(Some(record)) => match self.send_record(record) {
                    Delivery::Sent => {
                        self.stats.records.fetch_add(1, Ordering::Relaxed);
                    }
                    Delivery::Closed => {
                        info!("Record consumer went away, stopping hop controller");
                        return Ok(());
                    }
                    Delivery::Cancelled => {
                        info!("Hop controller cancelled with a record undelivered");
                        return Ok(());
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    error!("Hop {} failed: {}", hop, e);
                    return Err(e.into());
                }
            }

            hop = self.plan.next(hop);
        }
    }

    /// Hand `record` to the consumer, waiting while its queue is full.
    fn send_record(&self, mut record: ScanRecord) -> Delivery {
        loop {
            match self.records.try_send(record) {
                Ok(()) => return Delivery::Sent,
                Err(TrySendError::Closed(_)) => return Delivery::Closed,
                Err(TrySendError::Full(returned)) => {
                    if self.cancel.is_cancelled() {
                        return Delivery::Cancelled;
                    }
                    record = returned;
                    thread::sleep(SEND_RETRY);
                }
            }
        }
    }

    /// Wait until a new sweep may start: the minimum interval has passed and
    /// the wall clock has moved to a new second. `None` when cancelled.
    fn wait_for_sweep_slot(
        &self,
        previous: Option<(Instant, DateTime<Utc>)>,
    ) -> Option<(Instant, DateTime<Utc>)> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            let now = Instant::now();
            let stamp = Utc::now().trunc_subsecs(0);

            let Some((started, last_stamp)) = previous else {
                return Some((now, stamp));
            };

            let elapsed = now.duration_since(started);
            if elapsed >= self.config.min_sweep_interval && stamp != last_stamp {
                return Some((now, stamp));
            }

            let remaining = self.config.min_sweep_interval.saturating_sub(elapsed);
            thread::sleep(remaining.clamp(Duration::from_millis(10), SLEEP_SLICE));
        }
    }

    /// Tune, settle, read and transform one hop. `Ok(None)` means the hop was skipped.
    fn capture(&mut self, hop: u32, timestamp: DateTime<Utc>) -> Result<Option<ScanRecord>, ReceiverError> {
        let sample_rate = self
            .receiver
            .configure(self.plan.target(hop), self.plan.sample_rate())?;

        if self.config.settle_samples > 0 {
            match self
                .receiver
                .read_raw(self.config.settle_samples, self.config.read_timeout)
            {
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    self.skip_on_timeout(hop, &e);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        let raw = match self
            .receiver
            .read_raw(self.config.samples_per_hop, self.config.read_timeout)
        {
            Ok(raw) => raw,
            Err(e) if e.is_transient() => {
                self.skip_on_timeout(hop, &e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let bins = match self.transform.process_raw(&raw) {
            Ok(bins) => bins,
            Err(e) => {
                warn!("Hop {} skipped: {}", hop, e);
                self.stats.short_reads.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        let (start_frequency, end_frequency) = self.plan.range(hop);
        debug!(
            "Hop {} captured {:.3}-{:.3} MHz",
            hop,
            start_frequency / 1e6,
            end_frequency / 1e6
        );

        Ok(Some(ScanRecord {
            timestamp,
            start_frequency,
            end_frequency,
            sample_rate,
            sample_count: raw.len() / 2,
            bins,
        }))
    }

    fn skip_on_timeout(&self, hop: u32, e: &ReceiverError) {
        let total = self.stats.timeouts.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("Hop {} skipped: {} ({} timeouts so far)", hop, e, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Probe {
        tuned: Mutex<Vec<f64>>,
        reads: AtomicU64,
        closed: AtomicU64,
    }

    /// Receiver that returns a constant signal and can be told to misbehave.
    struct MockReceiver {
        probe: Arc<Probe>,
        fail_configure: bool,
        /// 1-based read number that times out.
        timeout_on_read: Option<u64>,
        /// 1-based read number from which reads fail.
        fail_from_read: Option<u64>,
    }

    impl MockReceiver {
        fn new(probe: &Arc<Probe>) -> Self {
            Self {
                probe: Arc::clone(probe),
                fail_configure: false,
                timeout_on_read: None,
                fail_from_read: None,
            }
        }
    }

    impl Receiver for MockReceiver {
        fn configure(&mut self, frequency: f64, sample_rate: f64) -> Result<f64, ReceiverError> {
            if self.fail_configure {
                return Err(ReceiverError::Configure("PLL not locked".to_string()));
            }
            self.probe.tuned.lock().unwrap().push(frequency);
            Ok(sample_rate)
        }

        fn read_raw(&mut self, sample_count: usize, timeout: Duration) -> Result<Vec<i8>, ReceiverError> {
            let n = self.probe.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.timeout_on_read == Some(n) {
                return Err(ReceiverError::Timeout(timeout));
            }
            if self.fail_from_read.is_some_and(|from| n >= from) {
                return Err(ReceiverError::Read("device unplugged".to_string()));
            }
            Ok(vec![10; sample_count * 2])
        }

        fn supported_sample_rates(&self) -> Vec<f64> {
            vec![1.0e6]
        }

        fn close(&mut self) -> Result<(), ReceiverError> {
            self.probe.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn four_hop_config() -> HopConfig {
        HopConfig {
            center_frequency: 100.0e6,
            sample_rate: 1.0e6,
            hops: 3,
            samples_per_hop: 16,
            settle_samples: 0,
            read_timeout: Duration::from_millis(10),
            window: Window::Hann,
            min_sweep_interval: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_emits_one_record_per_hop() {
        let probe = Arc::new(Probe::default());
        let (tx, mut rx) = mpsc::channel(16);
        let handle = HopController::spawn(MockReceiver::new(&probe), four_hop_config(), tx).unwrap();

        let records: Vec<ScanRecord> = (0..4).map(|_| rx.blocking_recv().unwrap()).collect();
        handle.stop().unwrap();

        let edges: Vec<(f64, f64)> = records
            .iter()
            .map(|r| (r.start_frequency, r.end_frequency))
            .collect();
        assert_eq!(
            edges,
            vec![
                (98.0e6, 99.0e6),
                (99.0e6, 100.0e6),
                (100.0e6, 101.0e6),
                (101.0e6, 102.0e6)
            ]
        );
        assert!(records.iter().all(|r| r.timestamp == records[0].timestamp));
        assert!(records.iter().all(|r| r.bins.len() == 16 && r.sample_count == 16));
        assert!(records.iter().all(|r| r.sample_rate == 1.0e6));

        let tuned = probe.tuned.lock().unwrap();
        assert_eq!(&tuned[..5], &[98.5e6, 98.5e6, 99.5e6, 100.5e6, 101.5e6]);
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_records_merge_into_one_sweep() {
        let probe = Arc::new(Probe::default());
        let (tx, mut rx) = mpsc::channel(16);
        let handle = HopController::spawn(MockReceiver::new(&probe), four_hop_config(), tx).unwrap();

        let mut sweep = rx.blocking_recv().unwrap();
        for _ in 0..3 {
            sweep.append(rx.blocking_recv().unwrap()).unwrap();
        }
        handle.stop().unwrap();

        assert_eq!(sweep.bins.len(), 64);
        assert_eq!(sweep.bandwidth(), 4.0e6);
    }

    #[test]
    fn test_spawn_reports_configure_failure() {
        let probe = Arc::new(Probe::default());
        let mut receiver = MockReceiver::new(&probe);
        receiver.fail_configure = true;
        let (tx, _rx) = mpsc::channel(4);

        let err = HopController::spawn(receiver, four_hop_config(), tx).unwrap_err();

        assert!(matches!(err, ReceiverError::Configure(_)));
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejects_empty_capture() {
        let probe = Arc::new(Probe::default());
        let (tx, _rx) = mpsc::channel(4);
        let config = HopConfig {
            samples_per_hop: 0,
            ..four_hop_config()
        };

        let err = HopController::spawn(MockReceiver::new(&probe), config, tx).unwrap_err();
        assert!(matches!(err, ReceiverError::Unsupported(_)));
    }

    #[test]
    fn test_read_failure_ends_task() {
        let probe = Arc::new(Probe::default());
        let mut receiver = MockReceiver::new(&probe);
        receiver.fail_from_read = Some(3);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = HopController::spawn(receiver, four_hop_config(), tx).unwrap();

        assert!(rx.blocking_recv().is_some());
        assert!(rx.blocking_recv().is_some());
        assert!(rx.blocking_recv().is_none());

        let err = handle.wait().unwrap_err();
        assert!(matches!(err, HopError::Receiver(ReceiverError::Read(_))));
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_skips_hop() {
        let probe = Arc::new(Probe::default());
        let mut receiver = MockReceiver::new(&probe);
        receiver.timeout_on_read = Some(2);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = HopController::spawn(receiver, four_hop_config(), tx).unwrap();

        let first = rx.blocking_recv().unwrap();
        let second = rx.blocking_recv().unwrap();
        let third = rx.blocking_recv().unwrap();

        assert_eq!(first.start_frequency, 98.0e6);
        assert_eq!(second.start_frequency, 100.0e6);
        assert_eq!(third.start_frequency, 101.0e6);
        assert_eq!(handle.timeouts(), 1);
        assert!(handle.stop().is_ok());
    }

    #[test]
    fn test_short_read_skips_hop() {
        struct ShortReceiver(Arc<Probe>);

        impl Receiver for ShortReceiver {
            fn configure(&mut self, _frequency: f64, sample_rate: f64) -> Result<f64, ReceiverError> {
                Ok(sample_rate)
            }

            fn read_raw(&mut self, sample_count: usize, _timeout: Duration) -> Result<Vec<i8>, ReceiverError> {
                let n = self.0.reads.fetch_add(1, Ordering::SeqCst);
                let len = if n == 0 { sample_count } else { sample_count * 2 };
                Ok(vec![1; len])
            }

            fn supported_sample_rates(&self) -> Vec<f64> {
                Vec::new()
            }

            fn close(&mut self) -> Result<(), ReceiverError> {
                Ok(())
            }
        }

        let probe = Arc::new(Probe::default());
        let (tx, mut rx) = mpsc::channel(16);
        let handle = HopController::spawn(ShortReceiver(Arc::clone(&probe)), four_hop_config(), tx).unwrap();

        let first = rx.blocking_recv().unwrap();
        assert_eq!(first.start_frequency, 99.0e6);
        assert_eq!(handle.short_reads(), 1);
        handle.stop().unwrap();
    }

    #[test]
    fn test_consumer_drop_stops_controller() {
        let probe = Arc::new(Probe::default());
        let (tx, rx) = mpsc::channel(1);
        let handle = HopController::spawn(MockReceiver::new(&probe), four_hop_config(), tx).unwrap();

        drop(rx);

        assert!(handle.wait().is_ok());
        assert!(probe.closed.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_stop_is_acknowledged_while_consumer_stalls() {
        let probe = Arc::new(Probe::default());
        let (tx, rx) = mpsc::channel(1);
        let config = HopConfig {
            min_sweep_interval: Duration::ZERO,
            ..four_hop_config()
        };
        let handle = HopController::spawn(MockReceiver::new(&probe), config, tx).unwrap();

        // Let the queue fill while nothing reads from it
        while handle.records_sent() == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));

        let (stopped_tx, stopped_rx) = std_mpsc::channel();
        thread::spawn(move || {
            let _ = stopped_tx.send(handle.stop());
        });

        let result = stopped_rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert!(result.is_ok());
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
        drop(rx);
    }

    #[test]
    fn test_stop_is_acknowledged_while_waiting_for_next_sweep() {
        let probe = Arc::new(Probe::default());
        let (tx, mut rx) = mpsc::channel(16);
        let config = HopConfig {
            hops: 0,
            min_sweep_interval: Duration::from_secs(3600),
            ..four_hop_config()
        };
        let handle = HopController::spawn(MockReceiver::new(&probe), config, tx).unwrap();

        assert!(rx.blocking_recv().is_some());
        assert!(!handle.is_finished());

        let started = Instant::now();
        handle.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }
}
