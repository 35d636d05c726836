//! Camera device ownership
//!
//! [`DeviceCapture`] owns at most one open camera handle and is the only
//! component allowed to open or close one. The host camera stack sits
//! behind the [`CameraBackend`] trait so that Android/iOS/desktop stacks
//! (and test mocks) plug in without touching the pipeline.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Result, StreamError};

/// Camera facing direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    /// Front-facing camera (selfie)
    Front,
    /// Back-facing camera (main)
    Back,
    /// External USB camera
    External,
}

impl Default for CameraFacing {
    fn default() -> Self {
        Self::Back
    }
}

/// Description of one camera on the device
///
/// Enumerated once at session startup; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Platform-opaque device identifier
    pub id: String,
    /// Human-readable camera name
    pub name: String,
    /// Facing direction
    pub facing: CameraFacing,
}

impl DeviceDescriptor {
    /// Create a descriptor
    pub fn new(id: impl Into<String>, name: impl Into<String>, facing: CameraFacing) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            facing,
        }
    }
}

/// Host camera stack abstraction
///
/// Implemented per platform. Enumeration happens once per session; `open`
/// hands out an exclusive [`CameraHandle`].
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Enumerate all currently available camera devices
    async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open the described device and return an exclusive handle
    async fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn CameraHandle>>;
}

/// An open camera device
///
/// `capture` produces one still image per call. `close` is idempotent;
/// dropping an unclosed handle must also release the device.
#[async_trait]
pub trait CameraHandle: Send {
    /// Capture a single still image as raw encoded bytes (JPEG)
    async fn capture(&mut self) -> Result<Vec<u8>>;

    /// Release the underlying device
    async fn close(&mut self);
}

/// Exclusive owner of the active camera handle
///
/// Holds the enumerated device list, the active index, and at most one
/// open handle. Switching devices always fully releases the old handle
/// before opening the new one.
pub struct DeviceCapture {
    backend: Box<dyn CameraBackend>,
    devices: Vec<DeviceDescriptor>,
    active_index: usize,
    handle: Option<Box<dyn CameraHandle>>,
}

impl DeviceCapture {
    /// Enumerate devices and build a capture owner with no open handle
    ///
    /// Fails with `DeviceEnumeration` if the platform denies camera access.
    pub async fn new(backend: Box<dyn CameraBackend>) -> Result<Self> {
        let devices = backend.enumerate().await?;
        info!("Enumerated {} camera device(s)", devices.len());
        Ok(Self {
            backend,
            devices,
            active_index: 0,
            handle: None,
        })
    }

    /// Build a capture owner over a backend that yielded no devices
    ///
    /// Used when enumeration fails: the session stays alive in a
    /// camera-unavailable state instead of crashing.
    pub fn without_devices(backend: Box<dyn CameraBackend>) -> Self {
        Self {
            backend,
            devices: Vec::new(),
            active_index: 0,
            handle: None,
        }
    }

    /// Enumerated devices, in platform order
    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Number of available devices
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Index of the active (or last active) device
    pub fn active_index(&self) -> usize {
        self.active_index
    }

    /// Whether a handle is currently open
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Open the device at `index`, releasing any previously open handle first
    pub async fn open(&mut self, index: usize) -> Result<()> {
        let descriptor = self
            .devices
            .get(index)
            .cloned()
            .ok_or_else(|| StreamError::device_open(format!("no device at index {index}")))?;

        // Close-before-open: never two handles alive at once
        self.close().await;

        debug!("Opening camera {} ({})", index, descriptor.name);
        let handle = self.backend.open(&descriptor).await?;
        self.handle = Some(handle);
        self.active_index = index;
        Ok(())
    }

    /// Reopen whichever device was last active
    pub async fn reopen(&mut self) -> Result<()> {
        self.open(self.active_index).await
    }

    /// Index of the next device, round-robin
    pub fn next_index(&self) -> usize {
        (self.active_index + 1) % self.devices.len().max(1)
    }

    /// Capture a single still image from the open handle
    ///
    /// Fails with `Capture` if no handle is open (released mid-call) or the
    /// device reports an error. Callers treat this as a skipped tick, never
    /// as a crash.
    pub async fn capture_once(&mut self) -> Result<Vec<u8>> {
        match self.handle.as_mut() {
            Some(handle) => handle.capture().await,
            None => Err(StreamError::capture("no open device handle")),
        }
    }

    /// Release the open handle, if any. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close().await;
            debug!("Camera handle released");
        }
    }
}

impl Drop for DeviceCapture {
    fn drop(&mut self) {
        if self.handle.is_some() {
            // Handle drop releases the device; log so leaked-open bugs show up
            warn!("DeviceCapture dropped with an open handle");
        }
    }
}
