//! Frame source trait

use async_trait::async_trait;
use cluster_core::RawMessage;

use super::TransportError;

/// Transport-agnostic source of raw text frames
///
/// Implementations do not interpret payloads; they hand each frame up as
/// received.
#[async_trait]
pub trait FrameSource: Send {
    /// Connect and subscribe.
    ///
    /// Socket tuning that the transport cannot apply is logged and skipped;
    /// only a failure to connect or subscribe is an error.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Wait for the next frame
    async fn recv(&mut self) -> Result<RawMessage, TransportError>;

    /// Endpoint this source reads from, for logging
    fn endpoint(&self) -> &str;
}
