//! ZeroMQ SUB adapter

use async_trait::async_trait;
use cluster_core::RawMessage;
use tracing::{info, warn};
use zeromq::{Socket, SocketRecv, SubSocket, ZmqMessage};

use super::{FrameSource, TransportError};
use crate::config::QueuePolicy;

/// Subscribes to every topic on one ZeroMQ publisher
pub struct ZmqSource {
    endpoint: String,
    policy: QueuePolicy,
    socket: Option<SubSocket>,
}

impl ZmqSource {
    pub fn new(endpoint: impl Into<String>, policy: QueuePolicy) -> Self {
        Self {
            endpoint: endpoint.into(),
            policy,
            socket: None,
        }
    }

    /// Socket tuning matching the queue policy.
    ///
    /// The pure-Rust socket has no high-water-mark, conflate or linger knobs,
    /// so each one is reported and the subscriber buffer enforces the policy.
    fn apply_tuning(&self) {
        let mut options = vec![format!("rcvhwm={}", self.policy.capacity()), "linger=0".to_string()];
        if self.policy == QueuePolicy::LatestOnly {
            options.push("conflate=1".to_string());
        }

        for option in options {
            let err = TransportError::UnsupportedOption(option);
            warn!(endpoint = %self.endpoint, error = %err, "Skipping socket tuning");
        }
    }
}

#[async_trait]
impl FrameSource for ZmqSource {
    async fn open(&mut self) -> Result<(), TransportError> {
        let mut socket = SubSocket::new();
        self.apply_tuning();

        socket
            .connect(&self.endpoint)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", self.endpoint, e)))?;

        // Empty prefix: every message on the publisher
        socket
            .subscribe("")
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        info!(endpoint = %self.endpoint, "Subscribed");
        self.socket = Some(socket);
        Ok(())
    }

    async fn recv(&mut self) -> Result<RawMessage, TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::ConnectionClosed)?;
        let message = socket
            .recv()
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        Ok(RawMessage::new(frame_text(message)))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Join all parts of a message into one text frame, replacing invalid UTF-8
fn frame_text(message: ZmqMessage) -> String {
    message
        .into_vec()
        .iter()
        .map(|part| String::from_utf8_lossy(part))
        .collect()
}
