//! cluster-link - Telemetry channels for the instrument cluster
//!
//! Subscribes to the critical and non-critical ZeroMQ publishers, buffers
//! frames per channel, and runs the event loop that feeds them through the
//! `cluster-core` reconciler.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ClusterRuntime                        │
//! │                                                          │
//! │  ┌────────────────────┐      ┌────────────────────┐      │
//! │  │ ChannelSubscriber  │      │ ChannelSubscriber  │      │
//! │  │ (critical :5555)   │      │ (non-critical:5556)│      │
//! │  └─────────┬──────────┘      └─────────┬──────────┘      │
//! │            │ drain                     │ drain           │
//! │            └───────────┬───────────────┘                 │
//! │                        ▼                                 │
//! │   SyntheticFeed ──▶ StateReconciler ──▶ VehicleState     │
//! │                     (sign hide timer)                    │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod runtime;
pub mod subscriber;
pub mod transport;

pub use config::{ChannelConfig, ChannelKind, ClusterConfig, QueuePolicy};
pub use error::{ConfigError, TransportError};
pub use runtime::ClusterRuntime;
pub use subscriber::ChannelSubscriber;
pub use transport::{FrameSource, MockPublisher, MockSource, ZmqSource};

pub use cluster_core::{FieldChange, StateWatch, VehicleSnapshot, VehicleState};
