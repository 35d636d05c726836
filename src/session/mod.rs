//! Session orchestration
//!
//! [`SessionController`] is the single owner of the capture pipeline:
//! it wires DeviceCapture, CaptureScheduler and StreamingChannel together,
//! reacts to host lifecycle transitions, and exposes current prediction
//! state for the presentation layer. The presentation layer reads
//! observables and calls `toggle_streaming` / `switch_device`; it never
//! touches the camera or the channel directly.

pub mod controller;
pub mod lifecycle;

pub use controller::SessionController;
pub use lifecycle::LifecycleEvent;
