//! Streaming channel
//!
//! Persistent bidirectional connection to the inference backend:
//!
//! - [`message`]: wire formats, decoded at the channel boundary
//! - [`transport`]: WebSocket transport behind a trait seam
//! - [`streaming`]: connection lifecycle, frame send, prediction receive,
//!   bounded reconnect
//!
//! Frames go out as JSON text `{"frame": "<base64>"}`; predictions come
//! back as `{"predictions": [...], "latency_ms": ...}`. Unknown inbound
//! shapes are ignored, never asserted on.

pub mod message;
pub mod streaming;
pub mod transport;

pub use message::{Prediction, PredictionBatch, ServerMessage};
pub use streaming::{ChannelState, ChannelStats, StreamingChannel};
pub use transport::{Transport, TransportSink, TransportStream, WsTransport};
