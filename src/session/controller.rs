//! Session controller
//!
//! Top-level lifecycle and state aggregation for one streaming session.
//! Acquisition order at initialization is enumerate → open → connect;
//! teardown runs the reverse (stop scheduler → dispose channel → close
//! device), each step idempotent and independently safe.
//!
//! Failure posture: a missing or broken camera leaves the session in an
//! observable camera-unavailable state, and a failed initial connect
//! leaves the channel observably `Disconnected`. Neither crashes the
//! session or the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::capture::{CameraBackend, CaptureScheduler, DeviceCapture, SchedulerStats};
use crate::channel::{ChannelState, ChannelStats, PredictionBatch, StreamingChannel, Transport};
use crate::config::SessionConfig;
use crate::error::{Result, StreamError};
use crate::session::lifecycle::LifecycleEvent;

/// Owner and orchestrator of the capture-and-streaming pipeline
///
/// The camera handle and the channel connection are owned here
/// exclusively; the scheduler borrows both through `Arc` for the duration
/// of the session only.
pub struct SessionController {
    device: Arc<Mutex<DeviceCapture>>,
    channel: Arc<StreamingChannel>,
    scheduler: CaptureScheduler,
    config: SessionConfig,
    device_count: usize,
    camera_ready_tx: watch::Sender<bool>,
    /// Streaming was active when the last suspend arrived
    resume_streaming: AtomicBool,
    disposed: AtomicBool,
}

impl SessionController {
    /// Build a session: enumerate devices, open the first one, connect the
    /// channel
    ///
    /// Never fails outright. Enumeration or open failures leave
    /// `camera_ready() == false`; a connect failure is logged and the
    /// channel reconnects or stays observably disconnected.
    pub async fn initialize(
        backend: Box<dyn CameraBackend>,
        transport: Box<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        let (device, camera_ready) = match DeviceCapture::new(backend).await {
            Ok(mut device) => {
                let ready = if device.device_count() == 0 {
                    warn!("No camera devices available");
                    false
                } else {
                    match device.open(0).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("Failed to open camera 0: {}", e);
                            false
                        }
                    }
                };
                (device, ready)
            }
            Err(e) => {
                warn!("Camera enumeration failed: {}", e);
                (DeviceCapture::without_devices(Box::new(NullBackend)), false)
            }
        };

        let device_count = device.device_count();
        let device = Arc::new(Mutex::new(device));

        let channel = Arc::new(StreamingChannel::new(
            transport,
            config.server_url.clone(),
            config.reconnect.clone(),
        ));
        if let Err(e) = channel.connect().await {
            warn!("Initial connect failed: {}", e);
        }

        let scheduler = CaptureScheduler::new(Arc::clone(&device), Arc::clone(&channel));
        let (camera_ready_tx, _) = watch::channel(camera_ready);

        info!(
            "Session initialized: {} device(s), camera_ready={}",
            device_count, camera_ready
        );

        Self {
            device,
            channel,
            scheduler,
            config,
            device_count,
            camera_ready_tx,
            resume_streaming: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Observable state (presentation boundary)
    // ------------------------------------------------------------------

    /// Whether a camera handle is available for capture
    pub fn camera_ready(&self) -> bool {
        *self.camera_ready_tx.borrow()
    }

    /// Observable camera availability
    pub fn camera_ready_watch(&self) -> watch::Receiver<bool> {
        self.camera_ready_tx.subscribe()
    }

    /// Whether the capture loop is running
    pub fn is_streaming(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Current channel state
    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Observable channel state
    pub fn channel_state_watch(&self) -> watch::Receiver<ChannelState> {
        self.channel.state_watch()
    }

    /// Observable latest prediction batch; each update replaces the value
    /// atomically
    pub fn predictions(&self) -> watch::Receiver<Option<PredictionBatch>> {
        self.channel.predictions()
    }

    /// Number of enumerated camera devices
    pub fn device_count(&self) -> usize {
        self.device_count
    }

    /// Index of the active (or last active) camera
    pub async fn active_device_index(&self) -> usize {
        self.device.lock().await.active_index()
    }

    /// Channel statistics snapshot
    pub fn channel_stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    /// Scheduler statistics snapshot
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Start or stop streaming
    ///
    /// Affects only the scheduler; camera and channel lifetimes are
    /// untouched. A no-op while the camera is unavailable; no timer is
    /// ever armed without a device to capture from.
    pub fn toggle_streaming(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if !self.camera_ready() {
            warn!("Ignoring toggle: camera unavailable");
            return;
        }
        if self.scheduler.is_running() {
            self.scheduler.stop();
        } else {
            self.scheduler.start(self.config.effective_interval());
        }
        info!("Streaming {}", if self.is_streaming() { "started" } else { "stopped" });
    }

    /// Switch to the next camera, round-robin
    ///
    /// Stops streaming, swaps the handle close-before-open, and resumes
    /// streaming if it was active. Holding the device lock across the swap
    /// keeps any concurrent tick from observing a handle mid-transition.
    pub async fn switch_device(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StreamError::ChannelClosed);
        }
        if self.device_count < 2 {
            return Err(StreamError::device_open(
                "device switch requires at least two cameras",
            ));
        }

        let was_streaming = self.scheduler.is_running();
        if was_streaming {
            self.scheduler.stop();
        }

        // Lock waits for an in-flight capture to finish before the swap
        let mut device = self.device.lock().await;
        device.close().await;
        let next = device.next_index();
        match device.open(next).await {
            Ok(()) => {
                self.camera_ready_tx.send_replace(true);
                info!("Switched to camera {}", next);
            }
            Err(e) => {
                warn!("Failed to open camera {}: {}", next, e);
                self.camera_ready_tx.send_replace(false);
                return Err(e);
            }
        }
        drop(device);

        if was_streaming {
            self.scheduler.start(self.config.effective_interval());
        }
        Ok(())
    }

    /// React to a host foreground/background transition
    ///
    /// Suspend stops streaming and releases the camera; the channel stays
    /// connected. Resume reopens the previously active camera and restarts
    /// streaming if it was active before the suspend.
    pub async fn handle_lifecycle(&self, event: LifecycleEvent) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        match event {
            LifecycleEvent::Suspended => {
                self.resume_streaming
                    .store(self.scheduler.is_running(), Ordering::SeqCst);
                self.scheduler.stop();
                self.device.lock().await.close().await;
                self.camera_ready_tx.send_replace(false);
                info!("Session suspended; camera released");
            }
            LifecycleEvent::Resumed => {
                if self.device_count == 0 {
                    return;
                }
                let reopened = {
                    let mut device = self.device.lock().await;
                    device.reopen().await
                };
                match reopened {
                    Ok(()) => {
                        self.camera_ready_tx.send_replace(true);
                        if self.resume_streaming.swap(false, Ordering::SeqCst) {
                            self.scheduler.start(self.config.effective_interval());
                        }
                        info!("Session resumed");
                    }
                    Err(e) => {
                        warn!("Failed to reopen camera on resume: {}", e);
                        self.camera_ready_tx.send_replace(false);
                    }
                }
            }
        }
    }

    /// Tear the session down in reverse acquisition order: scheduler,
    /// channel, camera. Idempotent.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scheduler.stop();
        self.channel.dispose().await;
        self.device.lock().await.close().await;
        self.camera_ready_tx.send_replace(false);
        info!("Session disposed");
    }
}

/// Stand-in backend for sessions whose enumeration failed
struct NullBackend;

#[async_trait::async_trait]
impl CameraBackend for NullBackend {
    async fn enumerate(&self) -> Result<Vec<crate::capture::DeviceDescriptor>> {
        Ok(Vec::new())
    }

    async fn open(
        &self,
        _descriptor: &crate::capture::DeviceDescriptor,
    ) -> Result<Box<dyn crate::capture::CameraHandle>> {
        Err(StreamError::device_open("camera unavailable"))
    }
}
