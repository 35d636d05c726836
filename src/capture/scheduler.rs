//! Capture scheduler
//!
//! Drives the periodic capture → encode → send chain at a fixed cadence.
//! Cadence is "at most every N ms", never "queued bursts": when a tick
//! fires while a capture is still in flight, the tick is skipped entirely.
//! The busy guard is a single `AtomicBool` (skip, don't wait) and is the
//! sole mechanism enforcing at-most-one-in-flight capture. The guard and
//! cancellation token belong to one run of the scheduler; a stop/start
//! cycle gets fresh ones, so a chain straddling the restart can neither
//! clear the new run's guard nor deliver its stale frame.
//!
//! `stop` cancels the timer immediately but never aborts an in-flight
//! chain; the chain completes and its frame is discarded if the scheduler
//! has since stopped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::device::DeviceCapture;
use crate::capture::encoder::FrameEncoder;
use crate::channel::streaming::StreamingChannel;
use crate::config::MIN_CAPTURE_INTERVAL;

/// Scheduler statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Ticks that completed the full capture chain
    pub ticks_completed: u64,
    /// Ticks skipped because a capture was still in flight
    pub ticks_skipped: u64,
    /// Capture attempts that failed
    pub capture_errors: u64,
    /// Frames dropped by the encoder
    pub encode_errors: u64,
    /// Frames discarded because the scheduler stopped mid-chain
    pub frames_discarded: u64,
}

/// Inner statistics with atomic counters
#[derive(Default)]
struct SchedulerStatsInner {
    ticks_completed: AtomicU64,
    ticks_skipped: AtomicU64,
    capture_errors: AtomicU64,
    encode_errors: AtomicU64,
    frames_discarded: AtomicU64,
}

impl SchedulerStatsInner {
    fn to_stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Cadence-controlled capture loop
pub struct CaptureScheduler {
    device: Arc<Mutex<DeviceCapture>>,
    channel: Arc<StreamingChannel>,
    running: Arc<AtomicBool>,
    cancel: std::sync::Mutex<Option<CancellationToken>>,
    stats: Arc<SchedulerStatsInner>,
}

impl CaptureScheduler {
    /// Create a scheduler over the shared device and channel
    pub fn new(device: Arc<Mutex<DeviceCapture>>, channel: Arc<StreamingChannel>) -> Self {
        Self {
            device,
            channel,
            running: Arc::new(AtomicBool::new(false)),
            cancel: std::sync::Mutex::new(None),
            stats: Arc::new(SchedulerStatsInner::default()),
        }
    }

    /// Whether the periodic timer is armed
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Statistics snapshot
    pub fn stats(&self) -> SchedulerStats {
        self.stats.to_stats()
    }

    /// Begin periodic ticking at the given cadence
    ///
    /// No-op if already started. Intervals below [`MIN_CAPTURE_INTERVAL`]
    /// are clamped. The first tick fires one full interval after start.
    pub fn start(&self, interval: Duration) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Scheduler already running; start ignored");
            return;
        }

        let interval = interval.max(MIN_CAPTURE_INTERVAL);
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = Some(token.clone());

        info!("Capture scheduler started ({:?} cadence)", interval);

        let device = Arc::clone(&self.device);
        let channel = Arc::clone(&self.channel);
        let stats = Arc::clone(&self.stats);
        // Fresh guard per run; a chain left over from a previous run can
        // neither clear this run's guard nor pass its discard check
        let busy = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if token.is_cancelled() {
                    break;
                }

                // Busy guard: a tick that lands mid-capture is skipped,
                // never queued
                if busy
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    stats.ticks_skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let device = Arc::clone(&device);
                let channel = Arc::clone(&channel);
                let busy = Arc::clone(&busy);
                let chain_token = token.clone();
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    Self::run_chain(&device, &channel, &chain_token, &stats).await;
                    busy.store(false, Ordering::SeqCst);
                });
            }
            debug!("Scheduler tick loop finished");
        });
    }

    /// Cancel the periodic timer
    ///
    /// An in-flight capture is allowed to finish; its frame is discarded.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
        info!("Capture scheduler stopped");
    }

    /// One tick: capture → encode → send, strictly sequential. Any failure
    /// ends the tick early without affecting the next scheduled tick.
    async fn run_chain(
        device: &Mutex<DeviceCapture>,
        channel: &StreamingChannel,
        token: &CancellationToken,
        stats: &SchedulerStatsInner,
    ) {
        let raw = {
            let mut device = device.lock().await;
            device.capture_once().await
        };
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                stats.capture_errors.fetch_add(1, Ordering::Relaxed);
                debug!("Tick skipped: {}", e);
                return;
            }
        };

        let frame = match FrameEncoder::encode(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                stats.encode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Frame dropped: {}", e);
                return;
            }
        };

        // This run was stopped while the capture was in flight
        if token.is_cancelled() {
            stats.frames_discarded.fetch_add(1, Ordering::Relaxed);
            debug!("Discarding frame captured after stop");
            return;
        }

        channel.send_frame(frame).await;
        stats.ticks_completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::{CameraBackend, CameraFacing, CameraHandle, DeviceDescriptor};
    use crate::channel::transport::{Transport, TransportSink, TransportStream};
    use crate::config::ReconnectPolicy;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    struct TestBackend {
        capture_delay: Duration,
        captures: Arc<AtomicUsize>,
    }

    struct TestHandle {
        capture_delay: Duration,
        captures: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CameraBackend for TestBackend {
        async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
            Ok(vec![DeviceDescriptor::new("cam0", "Test", CameraFacing::Back)])
        }

        async fn open(&self, _descriptor: &DeviceDescriptor) -> Result<Box<dyn CameraHandle>> {
            Ok(Box::new(TestHandle {
                capture_delay: self.capture_delay,
                captures: Arc::clone(&self.captures),
            }))
        }
    }

    #[async_trait]
    impl CameraHandle for TestHandle {
        async fn capture(&mut self) -> Result<Vec<u8>> {
            if !self.capture_delay.is_zero() {
                tokio::time::sleep(self.capture_delay).await;
            }
            self.captures.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0xAB; 16])
        }

        async fn close(&mut self) {}
    }

    struct CountingTransport {
        received: Arc<AtomicUsize>,
    }

    struct CountingSink {
        received: Arc<AtomicUsize>,
    }

    struct PendingStream {
        _keep: mpsc::UnboundedSender<String>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn connect(&self, _url: &str) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>)> {
            let (tx, rx) = mpsc::unbounded_channel();
            Ok((
                Box::new(CountingSink {
                    received: Arc::clone(&self.received),
                }),
                Box::new(PendingStream { _keep: tx, rx }),
            ))
        }
    }

    #[async_trait]
    impl TransportSink for CountingSink {
        async fn send_text(&mut self, _text: String) -> Result<()> {
            self.received.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    #[async_trait]
    impl TransportStream for PendingStream {
        async fn next_text(&mut self) -> Option<Result<String>> {
            self.rx.recv().await.map(Ok)
        }
    }

    async fn pipeline(
        capture_delay: Duration,
    ) -> (CaptureScheduler, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let captures = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));

        let backend = Box::new(TestBackend {
            capture_delay,
            captures: Arc::clone(&captures),
        });
        let mut device = DeviceCapture::new(backend).await.unwrap();
        device.open(0).await.unwrap();

        let channel = Arc::new(StreamingChannel::new(
            Box::new(CountingTransport {
                received: Arc::clone(&received),
            }),
            "ws://test",
            ReconnectPolicy::disabled(),
        ));
        channel.connect().await.unwrap();

        let scheduler = CaptureScheduler::new(Arc::new(Mutex::new(device)), channel);
        (scheduler, captures, received)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_bounds_capture_attempts() {
        let (scheduler, captures, _) = pipeline(Duration::ZERO).await;
        scheduler.start(Duration::from_millis(500));

        // 5 intervals plus slack: at most 5 attempts, at least 4
        tokio::time::sleep(Duration::from_millis(2600)).await;
        scheduler.stop();

        let n = captures.load(Ordering::SeqCst);
        assert!(n <= 5, "at most 5 attempts, got {n}");
        assert!(n >= 4, "scheduler must not stall, got {n}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_tick_is_skipped_not_queued() {
        // Capture takes over two intervals; intervening ticks must skip
        let (scheduler, captures, _) = pipeline(Duration::from_millis(1200)).await;
        scheduler.start(Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(2100)).await;
        scheduler.stop();
        // Let the in-flight chain finish
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let n = captures.load(Ordering::SeqCst);
        assert!(n <= 2, "overlapping ticks must be skipped, got {n}");
        assert!(scheduler.stats().ticks_skipped >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let (scheduler, captures, _) = pipeline(Duration::ZERO).await;
        scheduler.start(Duration::from_millis(500));
        scheduler.start(Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        scheduler.stop();

        // A doubled timer would capture four times here
        assert!(captures.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_frame() {
        let (scheduler, captures, received) = pipeline(Duration::from_millis(200)).await;
        scheduler.start(Duration::from_millis(500));

        // First tick at 500ms starts a 200ms capture; stop mid-capture
        tokio::time::sleep(Duration::from_millis(600)).await;
        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(captures.load(Ordering::SeqCst), 1, "in-flight capture completes");
        assert_eq!(received.load(Ordering::SeqCst), 0, "its frame is discarded");
        assert_eq!(scheduler.stats().frames_discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_straddling_restart_is_discarded() {
        // A capture in flight across a stop/start cycle must not deliver
        // its stale frame or clear the restarted run's busy guard
        let (scheduler, _captures, received) = pipeline(Duration::from_millis(800)).await;
        scheduler.start(Duration::from_millis(500));

        // First tick at 500ms starts a capture finishing at 1300ms;
        // restart while it is in flight
        tokio::time::sleep(Duration::from_millis(600)).await;
        scheduler.stop();
        scheduler.start(Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(2000)).await;
        scheduler.stop();
        // Let any chain still in flight finish
        tokio::time::sleep(Duration::from_millis(1000)).await;

        // Only the restarted run delivers; the straddling chain's frame
        // is discarded
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert!(scheduler.stats().frames_discarded >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_stop() {
        let (scheduler, captures, _) = pipeline(Duration::ZERO).await;
        scheduler.start(Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        scheduler.stop();
        let before = captures.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(captures.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_clamped_to_minimum() {
        let (scheduler, captures, _) = pipeline(Duration::ZERO).await;
        scheduler.start(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(1010)).await;
        scheduler.stop();

        // At 10ms cadence this would be ~100 captures; clamped to 250ms it is at most 4
        assert!(captures.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_does_not_stop_the_loop() {
        // Device with no open handle: every capture fails
        let captures = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));
        let backend = Box::new(TestBackend {
            capture_delay: Duration::ZERO,
            captures: Arc::clone(&captures),
        });
        let device = DeviceCapture::new(backend).await.unwrap();
        let channel = Arc::new(StreamingChannel::new(
            Box::new(CountingTransport {
                received: Arc::clone(&received),
            }),
            "ws://test",
            ReconnectPolicy::disabled(),
        ));
        let scheduler = CaptureScheduler::new(Arc::new(Mutex::new(device)), channel);

        scheduler.start(Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(1600)).await;
        scheduler.stop();

        assert!(scheduler.stats().capture_errors >= 3);
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }
}
