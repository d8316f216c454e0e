//! Reconciliation of decoded fields into the vehicle state
//!
//! Either channel may carry any key. Each key present in a frame is applied
//! on its own, so a field that fails to parse never blocks the others.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::codec::ParsedFields;
use crate::sign::{Sign, SignDisplayState, SignTransition, DEFAULT_HIDE_AFTER};
use crate::state::{DrivingMode, LaneSide, VehicleState};

/// Field keys understood by the reconciler
pub mod keys {
    pub const SPEED: &str = "speed";
    pub const BATTERY: &str = "battery";
    pub const CHARGING: &str = "charging";
    pub const LANE: &str = "lane";
    pub const OBSTACLE: &str = "obs";
    pub const SIGN: &str = "sign";
    pub const MODE: &str = "mode";
    pub const ODOMETER: &str = "odo";
}

/// Convert a wheel speed in mm/s to the display value (km/h x 10).
///
/// 1 mm/s is 0.0036 km/h. The product is truncated toward zero (the float
/// cast saturates at the `i32` range), so `750` displays as `26`.
pub fn display_speed(mm_per_sec: i32) -> i32 {
    (f64::from(mm_per_sec) * 0.0036 * 10.0) as i32
}

/// Applies decoded frames to [`VehicleState`] and owns the sign display timer
pub struct StateReconciler {
    state: VehicleState,
    sign: SignDisplayState,
    hide_after: Duration,
}

impl StateReconciler {
    pub fn new(state: VehicleState) -> Self {
        Self {
            state,
            sign: SignDisplayState::Idle,
            hide_after: DEFAULT_HIDE_AFTER,
        }
    }

    /// Override how long a sign stays up after its last event
    pub fn with_hide_after(mut self, hide_after: Duration) -> Self {
        self.hide_after = hide_after;
        self
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn sign_state(&self) -> &SignDisplayState {
        &self.sign
    }

    /// When the sign hide timer fires, if one is pending
    pub fn sign_deadline(&self) -> Option<Instant> {
        self.sign.deadline()
    }

    /// Apply every recognised key in `fields`, as received at `now`
    pub fn apply(&mut self, fields: &ParsedFields, now: Instant) {
        trace!(fields = %fields, "Applying fields");

        if fields.contains(keys::SPEED) {
            let raw = fields.get_int(keys::SPEED, 0);
            self.state.set_speed(display_speed(raw));
        }

        if fields.contains(keys::BATTERY) {
            self.state.set_battery(fields.get_int(keys::BATTERY, 0));
        }

        if fields.contains(keys::CHARGING) {
            self.state
                .set_charging(fields.get_int(keys::CHARGING, 0) == 1);
        }

        if fields.contains(keys::LANE) {
            self.apply_lane(fields.get_int(keys::LANE, 0));
        }

        if fields.contains(keys::OBSTACLE) {
            let obstacle = fields.get_int(keys::OBSTACLE, 0);
            self.state.set_object_alert(obstacle > 0);
            self.state.set_emergency_brake_active(obstacle == 2);
        }

        if let Some(token) = fields.get(keys::SIGN) {
            self.apply_sign(token, now);
        }

        if fields.contains(keys::MODE) {
            let mode = match fields.get_int(keys::MODE, 0) {
                1 => DrivingMode::Auto,
                _ => DrivingMode::Manual,
            };
            self.state.set_driving_mode(mode);
        }

        if fields.contains(keys::ODOMETER) {
            self.state.set_odometer(fields.get_int(keys::ODOMETER, 0));
        }
    }

    /// Hide the sign if its deadline has passed at `now`.
    ///
    /// Returns `true` when the display was cleared.
    pub fn expire_sign(&mut self, now: Instant) -> bool {
        if !self.sign.expire(now) {
            return false;
        }

        debug!("Sign display expired");
        self.state.set_speed_limit_visible(false);
        self.state.set_sign_visible(false);
        true
    }

    fn apply_lane(&self, lane: i32) {
        let side = match lane {
            1 => LaneSide::Left,
            2 => LaneSide::Right,
            _ => {
                self.state.set_lane_alert(false);
                return;
            }
        };
        self.state.set_lane_alert(true);
        self.state.set_lane_deviation_side(side);
    }

    fn apply_sign(&mut self, token: &str, now: Instant) {
        let Some(sign) = Sign::parse(token) else {
            debug!(token, "Ignoring unknown sign");
            return;
        };

        // A deadline that passed before this event hides first, so the sign
        // is shown again rather than prolonged
        self.expire_sign(now);

        let transition = self.sign.on_sign(sign.clone(), now, self.hide_after);
        match transition {
            SignTransition::Prolonged => {
                trace!(sign = %sign.value, "Sign display prolonged");
                return;
            }
            SignTransition::Shown | SignTransition::Replaced => {
                debug!(kind = %sign.kind, value = %sign.value, ?transition, "Sign displayed");
            }
        }

        match sign.limit() {
            Some(limit) => {
                self.state.set_speed_limit_signal(limit);
                self.state.set_speed_limit_visible(true);
                self.state.set_last_speed_limit(limit);
            }
            None => {
                self.state.set_speed_limit_visible(false);
            }
        }

        self.state.set_sign_type(sign.kind);
        self.state.set_sign_value(sign.value);
        self.state.set_sign_visible(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::state::{FieldChange, SignType, StateWatch};

    fn reconciler() -> (StateReconciler, StateWatch) {
        let reconciler = StateReconciler::new(VehicleState::new());
        let watch = reconciler.state().watch();
        (reconciler, watch)
    }

    fn apply(reconciler: &mut StateReconciler, frame: &str, now: Instant) {
        reconciler.apply(&decode(frame), now);
    }

    #[test]
    fn test_display_speed() {
        assert_eq!(display_speed(1000), 36);
        assert_eq!(display_speed(750), 26);
        assert_eq!(display_speed(1500), 53);
        assert_eq!(display_speed(3000), 107);
        assert_eq!(display_speed(4750), 170);
        assert_eq!(display_speed(100), 3);
        assert_eq!(display_speed(27778), 1000);
        assert_eq!(display_speed(0), 0);
        assert_eq!(display_speed(-1000), -36);
        assert_eq!(display_speed(i32::MAX), 77309411);
    }

    #[test]
    fn test_speed_and_direct_fields() {
        let (mut r, _) = reconciler();
        apply(&mut r, "speed:1000;battery:150;odo:-7;", Instant::now());

        let state = r.state();
        assert_eq!(state.speed(), 36);
        assert_eq!(state.battery(), 150);
        assert_eq!(state.odometer(), -7);
    }

    #[test]
    fn test_unparseable_integer_falls_back_to_zero() {
        let (mut r, _) = reconciler();
        apply(&mut r, "speed:1000;", Instant::now());
        apply(&mut r, "speed:fast;", Instant::now());
        assert_eq!(r.state().speed(), 0);
    }

    #[test]
    fn test_charging() {
        let (mut r, _) = reconciler();
        let now = Instant::now();
        apply(&mut r, "charging:1", now);
        assert!(r.state().charging());
        apply(&mut r, "charging:2", now);
        assert!(!r.state().charging());
        apply(&mut r, "charging:1", now);
        apply(&mut r, "charging:yes", now);
        assert!(!r.state().charging());
    }

    #[test]
    fn test_lane() {
        let (mut r, _) = reconciler();
        let now = Instant::now();

        apply(&mut r, "lane:1", now);
        assert!(r.state().lane_alert());
        assert_eq!(r.state().lane_deviation_side(), LaneSide::Left);

        apply(&mut r, "lane:2", now);
        assert!(r.state().lane_alert());
        assert_eq!(r.state().lane_deviation_side(), LaneSide::Right);

        apply(&mut r, "lane:0", now);
        assert!(!r.state().lane_alert());
        // side is left as it was
        assert_eq!(r.state().lane_deviation_side(), LaneSide::Right);

        apply(&mut r, "lane:2", now);
        apply(&mut r, "lane:9", now);
        assert!(!r.state().lane_alert());
    }

    #[test]
    fn test_obstacle() {
        let (mut r, _) = reconciler();
        let now = Instant::now();

        apply(&mut r, "obs:1", now);
        assert!(r.state().object_alert());
        assert!(!r.state().emergency_brake_active());

        apply(&mut r, "obs:2", now);
        assert!(r.state().object_alert());
        assert!(r.state().emergency_brake_active());

        apply(&mut r, "obs:0", now);
        assert!(!r.state().object_alert());
        assert!(!r.state().emergency_brake_active());
    }

    #[test]
    fn test_mode() {
        let (mut r, _) = reconciler();
        let now = Instant::now();
        apply(&mut r, "mode:1", now);
        assert_eq!(r.state().driving_mode(), DrivingMode::Auto);
        apply(&mut r, "mode:3", now);
        assert_eq!(r.state().driving_mode(), DrivingMode::Manual);
    }

    #[test]
    fn test_speed_limit_sign_shown() {
        let (mut r, mut watch) = reconciler();
        apply(&mut r, "sign:80", Instant::now());

        assert_eq!(
            watch.pending_changes(),
            vec![
                FieldChange::SpeedLimitSignal(80),
                FieldChange::SpeedLimitVisible(true),
                FieldChange::LastSpeedLimit(80),
                FieldChange::SignType(SignType::SpeedLimit),
                FieldChange::SignValue("80".into()),
                FieldChange::SignVisible(true),
            ]
        );
        assert!(r.sign_deadline().is_some());
    }

    #[test]
    fn test_same_sign_prolongs_without_notifications() {
        let (mut r, mut watch) = reconciler();
        let t0 = Instant::now();
        apply(&mut r, "sign:80", t0);
        watch.pending_changes();

        let t1 = t0 + Duration::from_secs(4);
        apply(&mut r, "sign:80", t1);

        assert!(watch.pending_changes().is_empty());
        assert_eq!(r.sign_deadline(), Some(t1 + DEFAULT_HIDE_AFTER));
        assert!(r.state().sign_visible());
        assert_eq!(r.state().sign_type(), SignType::SpeedLimit);
        assert_eq!(r.state().sign_value(), "80");

        // first deadline passes, sign still up
        assert!(!r.expire_sign(t0 + DEFAULT_HIDE_AFTER));
        assert!(r.state().sign_visible());
    }

    #[test]
    fn test_named_sign_replaces_speed_limit() {
        let (mut r, _) = reconciler();
        let now = Instant::now();
        apply(&mut r, "sign:80", now);
        apply(&mut r, "sign:stop", now);

        let state = r.state();
        assert_eq!(state.sign_type(), SignType::Stop);
        assert_eq!(state.sign_value(), "STOP");
        assert!(state.sign_visible());
        assert!(!state.speed_limit_visible());
        assert_eq!(state.last_speed_limit(), 80);
    }

    #[test]
    fn test_unknown_sign_has_no_effect() {
        let (mut r, mut watch) = reconciler();
        apply(&mut r, "sign:unknown", Instant::now());

        assert!(watch.pending_changes().is_empty());
        assert!(r.sign_state().is_idle());
        assert_eq!(r.sign_deadline(), None);
    }

    #[test]
    fn test_unknown_sign_does_not_block_other_fields() {
        let (mut r, _) = reconciler();
        apply(&mut r, "sign:moose;mode:1;odo:42", Instant::now());
        assert_eq!(r.state().driving_mode(), DrivingMode::Auto);
        assert_eq!(r.state().odometer(), 42);
    }

    #[test]
    fn test_unknown_sign_keeps_pending_timer() {
        let (mut r, _) = reconciler();
        let t0 = Instant::now();
        apply(&mut r, "sign:yield", t0);
        apply(&mut r, "sign:???", t0 + Duration::from_secs(5));
        assert_eq!(r.sign_deadline(), Some(t0 + DEFAULT_HIDE_AFTER));
    }

    #[test]
    fn test_expiry_hides_sign() {
        let (mut r, mut watch) = reconciler();
        let t0 = Instant::now();
        apply(&mut r, "sign:50", t0);
        watch.pending_changes();

        assert!(r.expire_sign(t0 + DEFAULT_HIDE_AFTER));
        assert_eq!(
            watch.pending_changes(),
            vec![
                FieldChange::SpeedLimitVisible(false),
                FieldChange::SignVisible(false),
            ]
        );
        assert!(r.sign_state().is_idle());
        // type/value stay as last shown
        assert_eq!(r.state().sign_value(), "50");
    }

    #[test]
    fn test_same_sign_past_deadline_without_expiry_is_shown_again() {
        let (mut r, mut watch) = reconciler();
        let t0 = Instant::now();
        apply(&mut r, "sign:80", t0);
        watch.pending_changes();

        // the hide timer has not run yet when the next event arrives
        let t1 = t0 + Duration::from_secs(7);
        apply(&mut r, "sign:80", t1);

        assert_eq!(
            watch.pending_changes(),
            vec![
                FieldChange::SpeedLimitVisible(false),
                FieldChange::SignVisible(false),
                FieldChange::SpeedLimitVisible(true),
                FieldChange::SignVisible(true),
            ]
        );
        assert_eq!(r.sign_deadline(), Some(t1 + DEFAULT_HIDE_AFTER));
        assert!(r.state().sign_visible());
    }

    #[test]
    fn test_same_sign_after_expiry_is_shown_again() {
        let (mut r, _) = reconciler();
        let t0 = Instant::now();
        apply(&mut r, "sign:crosswalk", t0);
        r.expire_sign(t0 + DEFAULT_HIDE_AFTER);

        apply(&mut r, "sign:crosswalk", t0 + Duration::from_secs(7));
        assert!(r.state().sign_visible());
        assert_eq!(r.state().sign_type(), SignType::Crosswalk);
    }

    #[test]
    fn test_custom_hide_interval() {
        let mut r =
            StateReconciler::new(VehicleState::new()).with_hide_after(Duration::from_millis(250));
        let t0 = Instant::now();
        r.apply(&decode("sign:yield"), t0);
        assert_eq!(r.sign_deadline(), Some(t0 + Duration::from_millis(250)));
    }
}
