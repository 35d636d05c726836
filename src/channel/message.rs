//! Wire formats
//!
//! Text-frame JSON in both directions, matching the backend's WebSocket
//! protocol:
//!
//! - Client → Server: `{"frame": "<base64-encoded JPEG bytes>"}`
//! - Server → Client: `{"predictions": [...], "latency_ms": <float>}`
//!   or `{"error": "<message>"}`
//!
//! Inbound messages are decoded into a tagged variant at the channel
//! boundary; shapes that carry no `predictions` key are treated as
//! [`ServerMessage::Unknown`] and ignored, keeping the client forward
//! compatible with new server message types.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::EncodedFrame;
use crate::error::Result;

/// One predicted label with its confidence (0–100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Class label, e.g. "potholes"
    pub label: String,
    /// Confidence percentage, 0–100
    pub confidence: f64,
}

/// One inference result set plus its round-trip latency
///
/// The latest batch fully replaces the previous one; the core keeps no
/// history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBatch {
    /// Predictions in server order, highest confidence first
    pub predictions: Vec<Prediction>,
    /// Server-measured inference latency in milliseconds
    #[serde(default)]
    pub latency_ms: f64,
}

/// Decoded inbound server message
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A prediction batch for the most recent frame
    Predictions(PredictionBatch),
    /// Server-side processing error; logged and otherwise ignored
    Error {
        /// Error description from the backend
        error: String,
    },
    /// Anything else; ignored without complaint
    Unknown(serde_json::Value),
}

impl ServerMessage {
    /// Decode one inbound text frame
    ///
    /// Returns `None` for text that is not JSON at all. Valid JSON of an
    /// unrecognized shape decodes as [`ServerMessage::Unknown`].
    pub fn decode(text: &str) -> Option<ServerMessage> {
        match serde_json::from_str(text) {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!("Discarding non-JSON server message: {}", e);
                None
            }
        }
    }
}

/// Outbound frame message
#[derive(Debug, Serialize)]
struct FrameMessage<'a> {
    frame: &'a str,
}

/// Serialize an encoded frame into its outbound text message
pub fn encode_frame_message(frame: &EncodedFrame) -> Result<String> {
    Ok(serde_json::to_string(&FrameMessage {
        frame: &frame.payload,
    })?)
}
