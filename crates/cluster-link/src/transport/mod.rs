//! Frame sources for the telemetry channels
//!
//! - ZeroMQ SUB adapter for the vehicle publishers
//! - Mock adapter for tests
//!
//! # Example
//!
//! ```ignore
//! use cluster_link::transport::{FrameSource, ZmqSource};
//! use cluster_link::QueuePolicy;
//!
//! let mut source = ZmqSource::new("tcp://127.0.0.1:5555", QueuePolicy::LatestOnly);
//! source.open().await?;
//! let frame = source.recv().await?;
//! ```

mod adapter;
pub mod mock;
pub mod zmq;

pub use adapter::FrameSource;
pub use mock::{MockPublisher, MockSource};
pub use zmq::ZmqSource;

pub use crate::error::TransportError;
