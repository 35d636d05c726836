//! Streaming channel lifecycle
//!
//! [`StreamingChannel`] owns one persistent connection to the inference
//! backend and multiplexes frame-send with prediction-receive. Two
//! contracts shape everything here:
//!
//! - `send_frame` never blocks and never errors for "not connected": a
//!   frame sent while the channel is not `Open` is silently dropped.
//!   Freshness beats completeness for a live feed.
//! - Only the latest [`PredictionBatch`] is retained. Inbound batches are
//!   published through a `watch` channel, so a slow consumer observes
//!   coalesced state, never a growing queue.
//!
//! On an unexpected disconnect of an established connection the channel
//! reconnects on its own with bounded, jittered backoff; once the policy
//! is exhausted it stays `Disconnected` until `connect` is called again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::EncodedFrame;
use crate::channel::message::{encode_frame_message, PredictionBatch, ServerMessage};
use crate::channel::transport::{Transport, TransportSink, TransportStream};
use crate::config::ReconnectPolicy;
use crate::error::{Result, StreamError};

/// Connection state of a streaming channel
///
/// Legal transitions: Disconnected → Connecting → Open → {Disconnected,
/// Closed}; a reconnect goes Disconnected → Connecting again. Closed is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection; a connect or reconnect may follow
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Connected; frames flow out, predictions flow in
    Open,
    /// Disposed; the channel will never be used again
    Closed,
}

/// Channel statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    /// Frames handed to the transport
    pub frames_sent: u64,
    /// Frames dropped because the channel was not open
    pub frames_dropped: u64,
    /// Prediction batches received
    pub batches_received: u64,
    /// Server-reported processing errors
    pub server_errors: u64,
    /// Successful automatic reconnects
    pub reconnects: u64,
}

/// Inner statistics with atomic counters
#[derive(Default)]
struct ChannelStatsInner {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    batches_received: AtomicU64,
    server_errors: AtomicU64,
    reconnects: AtomicU64,
}

impl ChannelStatsInner {
    fn to_stats(&self) -> ChannelStats {
        ChannelStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Persistent connection to the inference backend
///
/// Owned exclusively by the session controller; shared with the capture
/// scheduler through an `Arc` for the duration of the session only.
pub struct StreamingChannel {
    transport: Box<dyn Transport>,
    url: String,
    reconnect: ReconnectPolicy,
    state_tx: watch::Sender<ChannelState>,
    batch_tx: watch::Sender<Option<PredictionBatch>>,
    sink: Mutex<Option<Box<dyn TransportSink>>>,
    reader_cancel: std::sync::Mutex<Option<CancellationToken>>,
    stats: ChannelStatsInner,
}

impl StreamingChannel {
    /// Create a channel for the given backend URL. No connection is made
    /// until [`connect`](Self::connect).
    pub fn new(transport: Box<dyn Transport>, url: impl Into<String>, reconnect: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Disconnected);
        let (batch_tx, _) = watch::channel(None);
        Self {
            transport,
            url: url.into(),
            reconnect,
            state_tx,
            batch_tx,
            sink: Mutex::new(None),
            reader_cancel: std::sync::Mutex::new(None),
            stats: ChannelStatsInner::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    /// Observable state; the receiver is notified on every transition
    pub fn state_watch(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    /// Observable latest prediction batch
    ///
    /// `None` until the first batch arrives. Each new batch fully replaces
    /// the previous value; a reader never observes a partial update.
    pub fn predictions(&self) -> watch::Receiver<Option<PredictionBatch>> {
        self.batch_tx.subscribe()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> ChannelStats {
        self.stats.to_stats()
    }

    fn set_state(&self, state: ChannelState) {
        let previous = *self.state_tx.borrow();
        if previous == state {
            return;
        }
        // Closed is terminal: a connect or reconnect racing dispose() must
        // not revive the channel
        if previous == ChannelState::Closed {
            debug!("Ignoring state change to {:?} after disposal", state);
            return;
        }
        debug!("Channel state: {:?} -> {:?}", previous, state);
        self.state_tx.send_replace(state);
    }

    /// Establish the connection and start the inbound reader
    ///
    /// Transitions Disconnected → Connecting → Open. On failure the state
    /// falls back to Disconnected and the error is returned; the caller
    /// decides whether to retry. No-op when already open or when a connect
    /// is in progress; fails with `ChannelClosed` after `dispose`.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        match self.state() {
            ChannelState::Closed => return Err(StreamError::ChannelClosed),
            ChannelState::Open => return Ok(()),
            ChannelState::Connecting => {
                debug!("Connect already in progress");
                return Ok(());
            }
            ChannelState::Disconnected => {}
        }

        self.set_state(ChannelState::Connecting);
        let (sink, stream) = match self.transport.connect(&self.url).await {
            Ok(halves) => halves,
            Err(e) => {
                self.set_state(ChannelState::Disconnected);
                return Err(e);
            }
        };

        // dispose() may have raced the handshake
        if self.state() == ChannelState::Closed {
            let mut sink = sink;
            sink.close().await;
            return Err(StreamError::ChannelClosed);
        }

        self.install_connection(sink, stream).await;
        info!("Channel connected to {}", self.url);
        Ok(())
    }

    /// Store the sink and spawn a fresh reader task for the stream
    async fn install_connection(
        self: &Arc<Self>,
        sink: Box<dyn TransportSink>,
        stream: Box<dyn TransportStream>,
    ) {
        if let Some(mut old) = self.sink.lock().await.replace(sink) {
            old.close().await;
        }

        let token = CancellationToken::new();
        {
            let mut guard = self.reader_cancel.lock().unwrap();
            if let Some(old) = guard.replace(token.clone()) {
                old.cancel();
            }
        }

        self.set_state(ChannelState::Open);

        let channel = Arc::clone(self);
        tokio::spawn(async move {
            channel.reader_task(stream, token).await;
        });
    }

    /// Send one encoded frame
    ///
    /// A deliberate no-op unless the channel is `Open`: streaming must
    /// never block or queue unboundedly behind a slow or absent
    /// connection.
    pub async fn send_frame(&self, frame: EncodedFrame) {
        if self.state() != ChannelState::Open {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Frame dropped: channel not open");
            return;
        }

        let text = match encode_frame_message(&frame) {
            Ok(text) => text,
            Err(e) => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Frame dropped: {}", e);
                return;
            }
        };

        let mut sink = self.sink.lock().await;
        match sink.as_mut() {
            Some(s) => match s.send_text(text).await {
                Ok(()) => {
                    self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // Mid-session send failure surfaces as a state change,
                    // never as an error to the capture loop
                    warn!("Frame send failed: {}", e);
                    self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    *sink = None;
                    self.set_state(ChannelState::Disconnected);
                }
            },
            None => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Close the connection and release all channel resources
    ///
    /// Idempotent and safe to call from any state. After disposal no
    /// further prediction updates are published.
    pub async fn dispose(&self) {
        if self.state() == ChannelState::Closed {
            return;
        }
        self.set_state(ChannelState::Closed);

        if let Some(token) = self.reader_cancel.lock().unwrap().take() {
            token.cancel();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            sink.close().await;
        }
        info!("Channel disposed");
    }

    /// Inbound reader: decodes messages and publishes prediction batches.
    /// Owns the reconnect loop for its connection's lifetime.
    async fn reader_task(self: Arc<Self>, mut stream: Box<dyn TransportStream>, token: CancellationToken) {
        loop {
            let message = tokio::select! {
                _ = token.cancelled() => break,
                message = stream.next_text() => message,
            };

            match message {
                Some(Ok(text)) => self.handle_message(&text),
                Some(Err(e)) => {
                    warn!("Channel read error: {}", e);
                    match self.try_reconnect(&token).await {
                        Some(new_stream) => stream = new_stream,
                        None => break,
                    }
                }
                None => {
                    if token.is_cancelled() {
                        break;
                    }
                    info!("Server closed the connection");
                    match self.try_reconnect(&token).await {
                        Some(new_stream) => stream = new_stream,
                        None => break,
                    }
                }
            }
        }
        debug!("Reader task finished");
    }

    fn handle_message(&self, text: &str) {
        match ServerMessage::decode(text) {
            Some(ServerMessage::Predictions(batch)) => {
                self.stats.batches_received.fetch_add(1, Ordering::Relaxed);
                self.batch_tx.send_replace(Some(batch));
            }
            Some(ServerMessage::Error { error }) => {
                self.stats.server_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Server error: {}", error);
            }
            Some(ServerMessage::Unknown(value)) => {
                debug!("Ignoring unknown server message: {}", value);
            }
            None => {}
        }
    }

    /// Bounded, jittered reconnect. Returns the new stream on success;
    /// `None` once the policy is exhausted or the channel is disposed.
    async fn try_reconnect(self: &Arc<Self>, token: &CancellationToken) -> Option<Box<dyn TransportStream>> {
        self.sink.lock().await.take();
        self.set_state(ChannelState::Disconnected);

        for attempt in 0..self.reconnect.max_attempts {
            let delay = self.reconnect.delay_for(attempt);
            debug!("Reconnect attempt {} in {:?}", attempt + 1, delay);
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            if self.state() == ChannelState::Closed {
                return None;
            }

            self.set_state(ChannelState::Connecting);
            match self.transport.connect(&self.url).await {
                Ok((sink, stream)) => {
                    // dispose() may have landed while the dial was in
                    // flight
                    if token.is_cancelled() || self.state() == ChannelState::Closed {
                        let mut sink = sink;
                        sink.close().await;
                        return None;
                    }
                    *self.sink.lock().await = Some(sink);
                    self.set_state(ChannelState::Open);
                    self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                    info!("Channel reconnected (attempt {})", attempt + 1);
                    return Some(stream);
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt + 1, e);
                    self.set_state(ChannelState::Disconnected);
                }
            }
        }

        warn!("Reconnect attempts exhausted; channel stays disconnected");
        None
    }
}
