//! Frame encoding
//!
//! Converts raw capture bytes into the transport payload: base64 text,
//! as the inference backend expects inside its JSON frame message.
//! Pure and stateless; a failed encode drops one frame and leaves the
//! capture cadence untouched.

use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::MAX_FRAME_BYTES;
use crate::error::{Result, StreamError};

/// One encoded frame, ready for the channel
///
/// Created per capture tick and consumed immediately by `send_frame`;
/// never retained or queued.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Base64-encoded image bytes
    pub payload: String,
    /// Monotonic capture timestamp
    pub captured_at: Instant,
}

/// Stateless raw-bytes to transport-payload encoder
pub struct FrameEncoder;

impl FrameEncoder {
    /// Encode raw image bytes into a transport-ready frame
    ///
    /// Rejects empty captures and frames over [`MAX_FRAME_BYTES`]; both
    /// indicate a broken capture rather than a representable image.
    pub fn encode(raw: &[u8]) -> Result<EncodedFrame> {
        if raw.is_empty() {
            return Err(StreamError::encoding("empty capture buffer"));
        }
        if raw.len() > MAX_FRAME_BYTES {
            return Err(StreamError::encoding(format!(
                "frame of {} bytes exceeds limit of {} bytes",
                raw.len(),
                MAX_FRAME_BYTES
            )));
        }

        Ok(EncodedFrame {
            payload: STANDARD.encode(raw),
            captured_at: Instant::now(),
        })
    }
}
