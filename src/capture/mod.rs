//! Capture pipeline
//!
//! Everything between the camera hardware and the streaming channel:
//!
//! - [`device`]: device enumeration and exclusive handle ownership
//! - [`encoder`]: raw capture bytes to transport payload
//! - [`scheduler`]: cadence-controlled capture loop with busy guard
//!
//! The capture side never talks to the network directly; the scheduler
//! hands encoded frames to the channel and forgets about them.

pub mod device;
pub mod encoder;
pub mod scheduler;

pub use device::{CameraBackend, CameraFacing, CameraHandle, DeviceCapture, DeviceDescriptor};
pub use encoder::{EncodedFrame, FrameEncoder};
pub use scheduler::{CaptureScheduler, SchedulerStats};
