//! cluster-core - Telemetry decoding and vehicle state for the instrument cluster
//!
//! This crate holds everything between a raw text frame and the values the
//! display shows. It does no I/O; the channel plumbing lives in
//! `cluster-link`.
//!
//! ```text
//!   RawMessage ──decode──▶ ParsedFields ──apply──▶ StateReconciler
//!                                 ▲                     │
//!                  SyntheticFeed ─┘        SignDisplayState (hide timer)
//!                                                        │
//!                                                        ▼
//!                                    VehicleState ──▶ StateWatch (readers)
//! ```

pub mod codec;
pub mod reconciler;
pub mod sign;
pub mod state;
pub mod synthetic;

pub use codec::{decode, encode, ParsedFields, RawMessage};
pub use reconciler::{display_speed, keys, StateReconciler};
pub use sign::{Sign, SignDisplayState, SignTransition, DEFAULT_HIDE_AFTER};
pub use state::{
    DrivingMode, FieldChange, LaneSide, SignType, StateWatch, VehicleSnapshot, VehicleState,
};
pub use synthetic::SyntheticFeed;
