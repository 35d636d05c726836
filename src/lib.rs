//! clearpath-core
//!
//! Frame capture and streaming core for the ClearPath hazard detection
//! client. Captures still frames from a camera at a fixed cadence, streams
//! them over a persistent WebSocket connection to the inference backend,
//! and exposes the returned predictions with minimal perceived latency.
//!
//! ## Architecture
//!
//! - `capture`: device ownership, frame encoding, cadence-controlled
//!   capture loop
//! - `channel`: persistent connection, wire formats, bounded reconnect
//! - `session`: top-level orchestration, host lifecycle, observable state
//! - `config`: tuneable constants and session configuration
//!
//! Data flows one way: the scheduler ticks, captures one frame, encodes
//! it, and hands it to the channel; prediction batches flow back through
//! a latest-value-wins observable. The presentation layer (screens,
//! overlays, voice output) consumes observables and calls
//! `toggle_streaming` / `switch_device`; it never owns pipeline resources.
//!
//! ## Example
//!
//! ```rust,no_run
//! use clearpath_core::channel::WsTransport;
//! use clearpath_core::config::SessionConfig;
//! use clearpath_core::session::SessionController;
//! # use clearpath_core::capture::CameraBackend;
//!
//! async fn run(backend: Box<dyn CameraBackend>) {
//!     let config = SessionConfig::for_url("ws://detector.local:8000/ws/predict");
//!     let session = SessionController::initialize(
//!         backend,
//!         Box::new(WsTransport::new()),
//!         config,
//!     )
//!     .await;
//!
//!     session.toggle_streaming();
//!     let mut predictions = session.predictions();
//!     while predictions.changed().await.is_ok() {
//!         if let Some(batch) = predictions.borrow().clone() {
//!             println!("top: {:?} ({:.0} ms)", batch.predictions.first(), batch.latency_ms);
//!         }
//!     }
//! }
//! ```

// Re-export commonly used types
pub use channel::{ChannelState, PredictionBatch};
pub use error::{Result, StreamError};
pub use session::{LifecycleEvent, SessionController};

// Public modules
pub mod capture;
pub mod channel;
pub mod config;
pub mod error;
pub mod session;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
