//! In-memory frame source for testing

use async_trait::async_trait;
use cluster_core::{encode, ParsedFields, RawMessage};
use tokio::sync::mpsc;

use super::{FrameSource, TransportError};

/// Publishing end of a mock channel
#[derive(Clone)]
pub struct MockPublisher {
    tx: mpsc::UnboundedSender<String>,
}

impl MockPublisher {
    /// Send a raw frame; returns false once the source is gone
    pub fn publish(&self, frame: impl Into<String>) -> bool {
        self.tx.send(frame.into()).is_ok()
    }

    /// Encode and send a field map
    pub fn publish_fields(&self, fields: &ParsedFields) -> bool {
        self.publish(encode(fields))
    }
}

/// Receiving end of a mock channel
pub struct MockSource {
    endpoint: String,
    rx: mpsc::UnboundedReceiver<String>,
    fail_open: bool,
    opened: bool,
}

impl MockSource {
    /// Create a connected publisher/source pair
    pub fn pair(endpoint: impl Into<String>) -> (MockPublisher, MockSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = MockSource {
            endpoint: endpoint.into(),
            rx,
            fail_open: false,
            opened: false,
        };
        (MockPublisher { tx }, source)
    }

    /// Make `open` fail, as an unreachable endpoint would
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

#[async_trait]
impl FrameSource for MockSource {
    async fn open(&mut self) -> Result<(), TransportError> {
        if self.fail_open {
            return Err(TransportError::ConnectionFailed(format!(
                "{}: mock connection refused",
                self.endpoint
            )));
        }
        self.opened = true;
        Ok(())
    }

    async fn recv(&mut self) -> Result<RawMessage, TransportError> {
        if !self.opened {
            return Err(TransportError::ConnectionClosed);
        }
        self.rx
            .recv()
            .await
            .map(RawMessage::new)
            .ok_or(TransportError::ConnectionClosed)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let (publisher, mut source) = MockSource::pair("mock://critical");
        source.open().await.unwrap();

        assert!(publisher.publish("speed:1000;"));
        let fields: ParsedFields = [("lane", "2")].into_iter().collect();
        assert!(publisher.publish_fields(&fields));

        assert_eq!(source.recv().await.unwrap().payload, "speed:1000;");
        assert_eq!(source.recv().await.unwrap().payload, "lane:2;");
    }

    #[tokio::test]
    async fn test_closed_when_publisher_dropped() {
        let (publisher, mut source) = MockSource::pair("mock://critical");
        source.open().await.unwrap();
        drop(publisher);
        assert!(matches!(
            source.recv().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_failing_open() {
        let (_publisher, source) = MockSource::pair("mock://critical");
        let mut source = source.failing_open();
        assert!(matches!(
            source.open().await,
            Err(TransportError::ConnectionFailed(_))
        ));
    }
}
