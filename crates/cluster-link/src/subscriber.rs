//! Channel subscriber
//!
//! A subscriber owns one frame source. A background task takes frames off the
//! source and buffers them according to the channel's [`QueuePolicy`]; the
//! event loop waits on [`ChannelSubscriber::readable`] and then drains every
//! buffered frame in arrival order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cluster_core::RawMessage;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::config::{ChannelConfig, ChannelKind, QueuePolicy};
use crate::transport::{FrameSource, TransportError, ZmqSource};

/// Unread frames between the receive task and the event loop
struct FrameBuffer {
    kind: ChannelKind,
    policy: QueuePolicy,
    frames: Mutex<VecDeque<RawMessage>>,
    ready: Notify,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl FrameBuffer {
    fn new(kind: ChannelKind, policy: QueuePolicy) -> Self {
        Self {
            kind,
            policy,
            frames: Mutex::new(VecDeque::with_capacity(policy.capacity())),
            ready: Notify::new(),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, frame: RawMessage) {
        self.received.fetch_add(1, Ordering::Relaxed);
        {
            let mut frames = self.frames.lock();
            match self.policy {
                QueuePolicy::LatestOnly => {
                    if let Some(stale) = frames.pop_front() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(channel = %self.kind, payload = %stale.payload, "Replacing unread frame");
                    }
                    frames.push_back(frame);
                }
                QueuePolicy::Queued { depth } => {
                    if frames.len() >= depth {
                        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(channel = %self.kind, depth, dropped, "Queue full, dropping frame");
                        return;
                    }
                    frames.push_back(frame);
                }
            }
        }
        self.ready.notify_one();
    }

    fn drain(&self) -> Vec<RawMessage> {
        self.frames.lock().drain(..).collect()
    }

    fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

/// Subscriber for one telemetry channel
pub struct ChannelSubscriber {
    kind: ChannelKind,
    endpoint: String,
    buffer: Arc<FrameBuffer>,
    receiver: JoinHandle<()>,
}

impl ChannelSubscriber {
    /// Subscribe to a ZeroMQ publisher described by `config`.
    ///
    /// Connection happens in the background; a failure is logged and leaves
    /// the subscriber idle.
    pub fn connect(kind: ChannelKind, config: &ChannelConfig) -> Self {
        let source = ZmqSource::new(config.endpoint.clone(), config.policy);
        Self::spawn(kind, config.policy, source)
    }

    /// Subscribe through an arbitrary frame source
    pub fn spawn<S>(kind: ChannelKind, policy: QueuePolicy, source: S) -> Self
    where
        S: FrameSource + 'static,
    {
        let endpoint = source.endpoint().to_string();
        let buffer = Arc::new(FrameBuffer::new(kind, policy));
        let receiver = tokio::spawn(receive_loop(kind, source, buffer.clone()));

        info!(channel = %kind, %endpoint, ?policy, "Channel subscriber started");

        Self {
            kind,
            endpoint,
            buffer,
            receiver,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn policy(&self) -> QueuePolicy {
        self.buffer.policy
    }

    /// Wait until at least one frame is buffered.
    ///
    /// Cancel safe; used as a `select!` branch.
    pub async fn readable(&self) {
        loop {
            let notified = self.buffer.ready.notified();
            if !self.buffer.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Take every buffered frame, oldest first, without waiting
    pub fn drain(&self) -> Vec<RawMessage> {
        self.buffer.drain()
    }

    /// Frames taken off the socket so far
    pub fn received(&self) -> u64 {
        self.buffer.received.load(Ordering::Relaxed)
    }

    /// Frames discarded by the queue policy so far
    pub fn dropped(&self) -> u64 {
        self.buffer.dropped.load(Ordering::Relaxed)
    }

    /// Whether the receive task has stopped (closed or failed source)
    pub fn is_finished(&self) -> bool {
        self.receiver.is_finished()
    }
}

impl Drop for ChannelSubscriber {
    fn drop(&mut self) {
        self.receiver.abort();
        info!(channel = %self.kind, endpoint = %self.endpoint, "Channel subscriber stopped");
    }
}

async fn receive_loop<S: FrameSource>(kind: ChannelKind, mut source: S, buffer: Arc<FrameBuffer>) {
    if let Err(e) = source.open().await {
        warn!(
            channel = %kind,
            endpoint = %source.endpoint(),
            error = %e,
            "Channel unavailable, subscriber idle"
        );
        return;
    }

    loop {
        match source.recv().await {
            Ok(frame) => {
                trace!(channel = %kind, payload = %frame.payload, "Frame received");
                buffer.push(frame);
            }
            Err(TransportError::ConnectionClosed) => {
                info!(channel = %kind, endpoint = %source.endpoint(), "Channel closed");
                break;
            }
            Err(e) => {
                warn!(channel = %kind, error = %e, "Receive failed, subscriber stopped");
                break;
            }
        }
    }
}
