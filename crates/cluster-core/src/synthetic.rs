//! Synthetic telemetry for running the cluster without a vehicle
//!
//! Each tick yields one [`ParsedFields`] snapshot that goes through the same
//! reconciliation path as live frames. Speed and battery follow sine waves;
//! the other fields change on their own, slower counters.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::ParsedFields;
use crate::reconciler::keys;

/// Default tick period
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(500);

const SPEED_STEP: f64 = 0.1;
const BATTERY_STEP: f64 = 0.05;
const LANE_EVERY: u32 = 20;
const SIGN_EVERY: u32 = 5;
const MODE_EVERY: u32 = 40;
const CHARGING_EVERY: u32 = 20;

const SIGN_TOKENS: [&str; 5] = ["50", "80", "stop", "crosswalk", "yield"];

/// Generator for synthetic field snapshots
#[derive(Debug)]
pub struct SyntheticFeed {
    rng: StdRng,
    speed_angle: f64,
    battery_angle: f64,
    lane_counter: u32,
    sign_counter: u32,
    mode_counter: u32,
    charging_counter: u32,
    auto_mode: bool,
    charging: bool,
    odometer: i32,
}

impl Default for SyntheticFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticFeed {
    /// Feed seeded from system entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible feed
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            speed_angle: 0.0,
            battery_angle: 0.0,
            lane_counter: 0,
            sign_counter: 0,
            mode_counter: 0,
            charging_counter: 0,
            auto_mode: false,
            charging: false,
            odometer: 0,
        }
    }

    /// Produce the next snapshot
    pub fn next_fields(&mut self) -> ParsedFields {
        let mut fields = ParsedFields::new();

        let speed_kmh = (100.0 + 100.0 * self.speed_angle.sin()).round() as i32;
        self.speed_angle += SPEED_STEP;
        let speed_mm_s = (f64::from(speed_kmh) / 0.0036).round() as i32;
        fields.insert(keys::SPEED, speed_mm_s.to_string());

        if tick(&mut self.lane_counter, LANE_EVERY) {
            let lane = self.rng.gen_range(1..=2);
            fields.insert(keys::LANE, lane.to_string());
            if self.rng.gen_range(0..3) == 0 {
                let obstacle = self.rng.gen_range(1..=2);
                fields.insert(keys::OBSTACLE, obstacle.to_string());
            }
        }

        if tick(&mut self.sign_counter, SIGN_EVERY) {
            let token = SIGN_TOKENS[self.rng.gen_range(0..SIGN_TOKENS.len())];
            fields.insert(keys::SIGN, token);
        }

        if tick(&mut self.mode_counter, MODE_EVERY) {
            self.auto_mode = !self.auto_mode;
            fields.insert(keys::MODE, flag(self.auto_mode));
        }

        let battery = (50.0 + 50.0 * self.battery_angle.sin()).round() as i32;
        self.battery_angle += BATTERY_STEP;
        fields.insert(keys::BATTERY, battery.to_string());

        if tick(&mut self.charging_counter, CHARGING_EVERY) {
            self.charging = !self.charging;
            fields.insert(keys::CHARGING, flag(self.charging));
        }

        self.odometer = self.odometer.saturating_add(speed_kmh / 10);
        fields.insert(keys::ODOMETER, self.odometer.to_string());

        fields
    }
}

/// Advance `counter`; true (and reset) every `every` calls
fn tick(counter: &mut u32, every: u32) -> bool {
    *counter += 1;
    if *counter >= every {
        *counter = 0;
        return true;
    }
    false
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}
