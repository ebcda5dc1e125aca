//! Probabilities and ranges that drive the stochastic parts of the engine.

use serde::{Deserialize, Serialize};

/// Chance per tick that a new disruption is placed.
pub const DISRUPTION_CHANCE: f64 = 0.15;
/// Disruption window length in minutes.
pub const DISRUPTION_MINUTES: UniformRange = UniformRange::new(10, 60);
/// Chance per train per tick of a breakdown starting.
pub const BREAKDOWN_CHANCE: f64 = 0.05;
/// Breakdown length in minutes.
pub const BREAKDOWN_MINUTES: UniformRange = UniformRange::new(5, 20);
/// Chance per train per tick that single-track priority arbitration runs.
pub const PRIORITY_DELAY_CHANCE: f64 = 0.2;
/// Chance per train per tick that the speed restriction flag flips.
pub const RESTRICTION_TOGGLE_CHANCE: f64 = 0.1;
/// Chance that a fresh journey is eligible to start restricted.
pub const INITIAL_RESTRICTION_CHANCE: f64 = 0.2;
/// Share of the initial-restriction roll that actually sets the flag.
pub const INITIAL_RESTRICTION_SHARE: f64 = 0.5;
/// Signal headway reported in snapshots, in seconds.
pub const HEADWAY_SECONDS: UniformRange = UniformRange::new(60, 300);
/// How far the initial fleet's departure times are backdated, in minutes.
pub const DEPARTURE_BACKDATE_MINUTES: UniformRange = UniformRange::new(15, 45);
/// Consist length in metres.
pub const TRAIN_LENGTH_M: UniformRange = UniformRange::new(150, 400);
/// Delay figure reported on `Delay` events, in minutes.
pub const EVENT_DELAY_MINUTES: UniformRange = UniformRange::new(5, 60);

/// Speed factor for delayed or waiting trains.
pub const DELAYED_SPEED_FACTOR: f64 = 0.7;
/// Speed factor on a section with a high-severity disruption.
pub const HIGH_SEVERITY_SPEED_FACTOR: f64 = 0.4;
/// Speed factor for trains under a speed restriction.
pub const RESTRICTED_SPEED_FACTOR: f64 = 0.6;
/// Priority at or above which a signal reports an override.
pub const PRIORITY_OVERRIDE_THRESHOLD: u8 = 5;

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformRange {
    /// Lower bound.
    pub min: u32,
    /// Upper bound.
    pub max: u32,
}

impl UniformRange {
    /// Range `[min, max]`.
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Draw from the range.
    pub fn sample(self, rng: &mut dyn crate::rng::RandomSource) -> u32 {
        rng.between(self.min, self.max)
    }
}

/// Overridable copy of the constants above.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub disruption_chance: f64,
    pub disruption_minutes: UniformRange,
    pub breakdown_chance: f64,
    pub breakdown_minutes: UniformRange,
    pub priority_delay_chance: f64,
    pub restriction_toggle_chance: f64,
    pub initial_restriction_chance: f64,
    pub headway_seconds: UniformRange,
    pub departure_backdate_minutes: UniformRange,
    pub train_length_m: UniformRange,
    pub event_delay_minutes: UniformRange,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            disruption_chance: DISRUPTION_CHANCE,
            disruption_minutes: DISRUPTION_MINUTES,
            breakdown_chance: BREAKDOWN_CHANCE,
            breakdown_minutes: BREAKDOWN_MINUTES,
            priority_delay_chance: PRIORITY_DELAY_CHANCE,
            restriction_toggle_chance: RESTRICTION_TOGGLE_CHANCE,
            initial_restriction_chance: INITIAL_RESTRICTION_CHANCE,
            headway_seconds: HEADWAY_SECONDS,
            departure_backdate_minutes: DEPARTURE_BACKDATE_MINUTES,
            train_length_m: TRAIN_LENGTH_M,
            event_delay_minutes: EVENT_DELAY_MINUTES,
        }
    }
}

impl Tuning {
    /// Every per-tick random event switched off. Range draws still happen.
    pub fn quiet() -> Self {
        Self {
            disruption_chance: 0.0,
            breakdown_chance: 0.0,
            priority_delay_chance: 0.0,
            restriction_toggle_chance: 0.0,
            initial_restriction_chance: 0.0,
            ..Self::default()
        }
    }
}
