//! Observable vehicle state
//!
//! [`VehicleState`] is the single snapshot the display reads from. It has one
//! writer (the reconciler) and any number of readers. Every setter compares
//! the new value with the stored one and only stores it, and only publishes a
//! [`FieldChange`], when the two differ.

use std::fmt;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

/// Capacity of the field change bus
const CHANGE_BUS_CAPACITY: usize = 256;

/// Driving mode shown on the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DrivingMode {
    #[default]
    #[serde(rename = "MAN")]
    Manual,
    #[serde(rename = "AUTO")]
    Auto,
}

impl DrivingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrivingMode::Manual => "MAN",
            DrivingMode::Auto => "AUTO",
        }
    }
}

impl fmt::Display for DrivingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side the vehicle is drifting towards when a lane alert is raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneSide {
    #[default]
    Left,
    Right,
}

impl fmt::Display for LaneSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneSide::Left => f.write_str("left"),
            LaneSide::Right => f.write_str("right"),
        }
    }
}

/// Kind of advisory sign currently on display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignType {
    #[default]
    None,
    SpeedLimit,
    Stop,
    Crosswalk,
    Yield,
}

impl SignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignType::None => "NONE",
            SignType::SpeedLimit => "SPEED_LIMIT",
            SignType::Stop => "STOP",
            SignType::Crosswalk => "CROSSWALK",
            SignType::Yield => "YIELD",
        }
    }
}

impl fmt::Display for SignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of every vehicle field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSnapshot {
    /// km/h scaled by 10
    pub speed: i32,
    pub battery: i32,
    pub charging: bool,
    pub odometer: i32,
    pub driving_mode: DrivingMode,
    pub lane_alert: bool,
    pub lane_deviation_side: LaneSide,
    pub object_alert: bool,
    pub emergency_brake_active: bool,
    pub speed_limit_signal: i32,
    pub speed_limit_visible: bool,
    pub sign_type: SignType,
    pub sign_value: String,
    pub sign_visible: bool,
    pub last_speed_limit: i32,
}

impl Default for VehicleSnapshot {
    fn default() -> Self {
        Self {
            speed: 0,
            battery: 100,
            charging: false,
            odometer: 0,
            driving_mode: DrivingMode::Manual,
            lane_alert: false,
            lane_deviation_side: LaneSide::Left,
            object_alert: false,
            emergency_brake_active: false,
            speed_limit_signal: 50,
            speed_limit_visible: false,
            sign_type: SignType::None,
            sign_value: String::new(),
            sign_visible: false,
            last_speed_limit: 0,
        }
    }
}

/// Notification raised when a single field takes a new value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    Speed(i32),
    Battery(i32),
    Charging(bool),
    Odometer(i32),
    DrivingMode(DrivingMode),
    LaneAlert(bool),
    LaneDeviationSide(LaneSide),
    ObjectAlert(bool),
    EmergencyBrakeActive(bool),
    SpeedLimitSignal(i32),
    SpeedLimitVisible(bool),
    SignType(SignType),
    SignValue(String),
    SignVisible(bool),
    LastSpeedLimit(i32),
}

impl FieldChange {
    /// Name of the field this change belongs to
    pub fn field(&self) -> &'static str {
        match self {
            FieldChange::Speed(_) => "speed",
            FieldChange::Battery(_) => "battery",
            FieldChange::Charging(_) => "charging",
            FieldChange::Odometer(_) => "odometer",
            FieldChange::DrivingMode(_) => "drivingMode",
            FieldChange::LaneAlert(_) => "laneAlert",
            FieldChange::LaneDeviationSide(_) => "laneDeviationSide",
            FieldChange::ObjectAlert(_) => "objectAlert",
            FieldChange::EmergencyBrakeActive(_) => "emergencyBrakeActive",
            FieldChange::SpeedLimitSignal(_) => "speedLimitSignal",
            FieldChange::SpeedLimitVisible(_) => "speedLimitVisible",
            FieldChange::SignType(_) => "signType",
            FieldChange::SignValue(_) => "signValue",
            FieldChange::SignVisible(_) => "signVisible",
            FieldChange::LastSpeedLimit(_) => "lastSpeedLimit",
        }
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldChange::Speed(v)
            | FieldChange::Battery(v)
            | FieldChange::Odometer(v)
            | FieldChange::SpeedLimitSignal(v)
            | FieldChange::LastSpeedLimit(v) => write!(f, "{}={}", self.field(), v),
            FieldChange::Charging(v)
            | FieldChange::LaneAlert(v)
            | FieldChange::ObjectAlert(v)
            | FieldChange::EmergencyBrakeActive(v)
            | FieldChange::SpeedLimitVisible(v)
            | FieldChange::SignVisible(v) => write!(f, "{}={}", self.field(), v),
            FieldChange::DrivingMode(v) => write!(f, "{}={}", self.field(), v),
            FieldChange::LaneDeviationSide(v) => write!(f, "{}={}", self.field(), v),
            FieldChange::SignType(v) => write!(f, "{}={}", self.field(), v),
            FieldChange::SignValue(v) => write!(f, "{}={:?}", self.field(), v),
        }
    }
}

/// Canonical vehicle state with change notification
pub struct VehicleState {
    snapshot: watch::Sender<VehicleSnapshot>,
    changes: broadcast::Sender<FieldChange>,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleState {
    pub fn new() -> Self {
        Self::with_snapshot(VehicleSnapshot::default())
    }

    /// Start from an explicit set of values
    pub fn with_snapshot(initial: VehicleSnapshot) -> Self {
        let (snapshot, _) = watch::channel(initial);
        let (changes, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self { snapshot, changes }
    }

    /// Create a reader that can poll values and await changes
    pub fn watch(&self) -> StateWatch {
        StateWatch {
            snapshot: self.snapshot.subscribe(),
            changes: self.changes.subscribe(),
        }
    }

    /// Subscribe to field change notifications only
    pub fn subscribe(&self) -> broadcast::Receiver<FieldChange> {
        self.changes.subscribe()
    }

    /// Copy of all current values
    pub fn snapshot(&self) -> VehicleSnapshot {
        self.snapshot.borrow().clone()
    }

    // ---- getters ----

    pub fn speed(&self) -> i32 {
        self.snapshot.borrow().speed
    }

    pub fn battery(&self) -> i32 {
        self.snapshot.borrow().battery
    }

    pub fn charging(&self) -> bool {
        self.snapshot.borrow().charging
    }

    pub fn odometer(&self) -> i32 {
        self.snapshot.borrow().odometer
    }

    pub fn driving_mode(&self) -> DrivingMode {
        self.snapshot.borrow().driving_mode
    }

    pub fn lane_alert(&self) -> bool {
        self.snapshot.borrow().lane_alert
    }

    pub fn lane_deviation_side(&self) -> LaneSide {
        self.snapshot.borrow().lane_deviation_side
    }

    pub fn object_alert(&self) -> bool {
        self.snapshot.borrow().object_alert
    }

    pub fn emergency_brake_active(&self) -> bool {
        self.snapshot.borrow().emergency_brake_active
    }

    pub fn speed_limit_signal(&self) -> i32 {
        self.snapshot.borrow().speed_limit_signal
    }

    pub fn speed_limit_visible(&self) -> bool {
        self.snapshot.borrow().speed_limit_visible
    }

    pub fn sign_type(&self) -> SignType {
        self.snapshot.borrow().sign_type
    }

    pub fn sign_value(&self) -> String {
        self.snapshot.borrow().sign_value.clone()
    }

    pub fn sign_visible(&self) -> bool {
        self.snapshot.borrow().sign_visible
    }

    pub fn last_speed_limit(&self) -> i32 {
        self.snapshot.borrow().last_speed_limit
    }

    // ---- setters: each returns whether the stored value changed ----

    pub fn set_speed(&self, value: i32) -> bool {
        self.update(|s| &mut s.speed, value, FieldChange::Speed)
    }

    pub fn set_battery(&self, value: i32) -> bool {
        self.update(|s| &mut s.battery, value, FieldChange::Battery)
    }

    pub fn set_charging(&self, value: bool) -> bool {
        self.update(|s| &mut s.charging, value, FieldChange::Charging)
    }

    pub fn set_odometer(&self, value: i32) -> bool {
        self.update(|s| &mut s.odometer, value, FieldChange::Odometer)
    }

    pub fn set_driving_mode(&self, value: DrivingMode) -> bool {
        self.update(|s| &mut s.driving_mode, value, FieldChange::DrivingMode)
    }

    pub fn set_lane_alert(&self, value: bool) -> bool {
        self.update(|s| &mut s.lane_alert, value, FieldChange::LaneAlert)
    }

    pub fn set_lane_deviation_side(&self, value: LaneSide) -> bool {
        self.update(
            |s| &mut s.lane_deviation_side,
            value,
            FieldChange::LaneDeviationSide,
        )
    }

    pub fn set_object_alert(&self, value: bool) -> bool {
        self.update(|s| &mut s.object_alert, value, FieldChange::ObjectAlert)
    }

    pub fn set_emergency_brake_active(&self, value: bool) -> bool {
        self.update(
            |s| &mut s.emergency_brake_active,
            value,
            FieldChange::EmergencyBrakeActive,
        )
    }

    pub fn set_speed_limit_signal(&self, value: i32) -> bool {
        self.update(
            |s| &mut s.speed_limit_signal,
            value,
            FieldChange::SpeedLimitSignal,
        )
    }

    pub fn set_speed_limit_visible(&self, value: bool) -> bool {
        self.update(
            |s| &mut s.speed_limit_visible,
            value,
            FieldChange::SpeedLimitVisible,
        )
    }

    pub fn set_sign_type(&self, value: SignType) -> bool {
        self.update(|s| &mut s.sign_type, value, FieldChange::SignType)
    }

    pub fn set_sign_value(&self, value: impl Into<String>) -> bool {
        self.update(|s| &mut s.sign_value, value.into(), FieldChange::SignValue)
    }

    pub fn set_sign_visible(&self, value: bool) -> bool {
        self.update(|s| &mut s.sign_visible, value, FieldChange::SignVisible)
    }

    pub fn set_last_speed_limit(&self, value: i32) -> bool {
        self.update(
            |s| &mut s.last_speed_limit,
            value,
            FieldChange::LastSpeedLimit,
        )
    }

    /// Store `value` in the selected field if it differs, then publish one
    /// change notification.
    fn update<T, F>(&self, field: F, value: T, change: fn(T) -> FieldChange) -> bool
    where
        T: PartialEq + Clone,
        F: FnOnce(&mut VehicleSnapshot) -> &mut T,
    {
        let changed = self.snapshot.send_if_modified(|snapshot| {
            let slot = field(snapshot);
            if *slot == value {
                return false;
            }
            *slot = value.clone();
            true
        });

        if changed {
            // No subscribers is fine, the snapshot already holds the value
            let _ = self.changes.send(change(value));
        }

        changed
    }
}

/// Read side of [`VehicleState`]
pub struct StateWatch {
    snapshot: watch::Receiver<VehicleSnapshot>,
    changes: broadcast::Receiver<FieldChange>,
}

impl StateWatch {
    /// Current values
    pub fn current(&self) -> VehicleSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait for the next field change.
    ///
    /// Returns `None` once the state has been dropped. A reader that falls
    /// behind skips the changes it missed; [`current`](Self::current) still
    /// holds the latest values.
    pub async fn next_change(&mut self) -> Option<FieldChange> {
        loop {
            match self.changes.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "State watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take every change that is already queued without waiting
    pub fn pending_changes(&mut self) -> Vec<FieldChange> {
        let mut out = Vec::new();
        loop {
            match self.changes.try_recv() {
                Ok(change) => out.push(change),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }
}
