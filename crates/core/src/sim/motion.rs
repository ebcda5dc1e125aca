//! Per-train motion and status state machine.
//!
//! Each tick a train may break down, be held by a disruption or by traffic,
//! or move. Crossing a section boundary hands over to routing. Lookup misses
//! leave the train where it is for the tick.

use chrono::Duration;
use tracing::{debug, info};

use crate::{
    models::{Disruption, Severity, Train, TrainStatus},
    network::Section,
    rng::RandomSource,
    sim::{
        routing::RoutingContext,
        tuning::{
            Tuning, DELAYED_SPEED_FACTOR, HIGH_SEVERITY_SPEED_FACTOR, RESTRICTED_SPEED_FACTOR,
        },
    },
};

/// Everything the state machine reads besides the train itself.
#[derive(Clone, Copy)]
pub struct MotionContext<'a> {
    /// Network, disruptions, occupancy and the tick instant.
    pub routing: RoutingContext<'a>,
    /// Probabilities and ranges.
    pub tuning: &'a Tuning,
}

/// Result of [`advance_train`].
#[derive(Debug, Clone, PartialEq)]
pub enum MotionOutcome {
    /// Current section could not be resolved; nothing changed.
    Unresolved,
    /// A breakdown is in force.
    BrokenDown,
    /// Held by a disruption on the current section.
    HeldByDisruption,
    /// Held behind another train on a single-track section.
    HeldByTraffic,
    /// Moved within the current section.
    Moved {
        /// Metres covered this tick.
        distance_m: f64,
    },
    /// Crossed into another section.
    EnteredSection {
        /// Section now occupied.
        section_id: String,
    },
    /// Reached the destination station.
    Arrived,
    /// Stopped at a boundary with nowhere to go.
    NoRoute,
}

/// Multiplier applied to the train's assigned speed.
///
/// Delayed and waiting trains run at 70%, cancelled trains do not move. A
/// high-severity disruption then cuts speed to 40%; otherwise a speed
/// restriction cuts it to 60%.
pub fn speed_factor(status: TrainStatus, severity: Option<Severity>, restricted: bool) -> f64 {
    let mut factor = match status {
        TrainStatus::Cancelled => 0.0,
        TrainStatus::Delayed => DELAYED_SPEED_FACTOR,
        status if status.is_waiting() => DELAYED_SPEED_FACTOR,
        _ => 1.0,
    };
    if severity == Some(Severity::High) {
        factor *= HIGH_SEVERITY_SPEED_FACTOR;
    } else if restricted {
        factor *= RESTRICTED_SPEED_FACTOR;
    }
    factor
}

/// Speed the train actually runs at on `section`, capped by line speed.
pub fn effective_speed_kmh(train: &Train, section: &Section, disruption: Option<&Disruption>) -> f64 {
    let factor = speed_factor(
        train.status,
        disruption.map(|d| d.severity),
        train.restricted_speed,
    );
    (f64::from(train.max_speed_kmh) * factor).min(section.max_speed_kmh)
}

/// Metres covered at `speed_kmh` over `elapsed_minutes`.
pub fn distance_m(speed_kmh: f64, elapsed_minutes: f64) -> f64 {
    speed_kmh / 60.0 * elapsed_minutes * 1000.0
}

/// Run the movement half of the state machine for one tick.
pub fn advance_train(
    train: &mut Train,
    ctx: &MotionContext<'_>,
    elapsed_minutes: f64,
    rng: &mut dyn RandomSource,
) -> MotionOutcome {
    let routing = &ctx.routing;
    let now = routing.now;
    let Some(section) = routing.network.section(train.section_id()) else {
        debug!(train = %train.train_id, section = %train.section_id(), "Unknown section; train held");
        return MotionOutcome::Unresolved;
    };

    if rng.chance(ctx.tuning.breakdown_chance) {
        let minutes = ctx.tuning.breakdown_minutes.sample(rng);
        train.breakdown_until = Some(now + Duration::minutes(i64::from(minutes)));
        info!(train = %train.train_id, minutes, "Breakdown");
    }

    if let Some(until) = train.breakdown_until {
        if now < until {
            return MotionOutcome::BrokenDown;
        }
        train.breakdown_until = None;
    }

    if routing.disruptions.is_disrupted(&section.id, now) {
        train.status = TrainStatus::WaitingDisrupted;
        return MotionOutcome::HeldByDisruption;
    }

    if section.is_single_track() {
        let occupants = routing.occupancy.occupants(&section.id);
        if occupants.len() > 1 && occupants.first() != Some(&train.train_id) {
            train.status = TrainStatus::WaitingTraffic;
            return MotionOutcome::HeldByTraffic;
        }
    }

    let speed = effective_speed_kmh(train, section, routing.disruptions.get(&section.id));
    let distance = distance_m(speed, elapsed_minutes.max(0.0));
    let position = train.current_location.position_m + distance;
    let length = section.length_m();

    if position < length {
        train.current_location.position_m = position;
        if train.status.is_waiting() {
            train.status = TrainStatus::OnTime;
        }
        return MotionOutcome::Moved { distance_m: distance };
    }

    if let Some(next) =
        routing.next_section(&section.id, &train.destination_station, train.direction)
    {
        // Overflow never runs past the end of the entered section.
        train.current_location.section_id = next.id.clone();
        train.current_location.position_m = (position - length).min(next.length_m());
        train.status = TrainStatus::OnTime;
        return MotionOutcome::EnteredSection {
            section_id: next.id.clone(),
        };
    }

    train.current_location.position_m = length;
    if section.arrival_station(train.direction) == train.destination_station {
        train.status = TrainStatus::Arrived;
        train.arrival_time = Some(now);
        info!(
            train = %train.train_id,
            destination = %train.destination_station,
            journey = train.journey_count,
            "Arrived"
        );
        MotionOutcome::Arrived
    } else {
        train.status = TrainStatus::WaitingNoRoute;
        MotionOutcome::NoRoute
    }
}

/// With the configured chance, mark the train `Delayed` if it shares a
/// single-track section with a higher-priority train.
///
/// Re-rolled every tick, so a train can flip between `Delayed` and other
/// statuses indefinitely. Returns whether the train was marked.
pub fn apply_priority_delay(
    train: &mut Train,
    ctx: &MotionContext<'_>,
    priority_of: impl Fn(&str) -> Option<u8>,
    rng: &mut dyn RandomSource,
) -> bool {
    if !rng.chance(ctx.tuning.priority_delay_chance) {
        return false;
    }
    let routing = &ctx.routing;
    let Some(section) = routing.network.section(train.section_id()) else {
        return false;
    };
    if !section.is_single_track() {
        return false;
    }
    let occupants = routing.occupancy.occupants(&section.id);
    if occupants.len() < 2 {
        return false;
    }

    let mut ranked: Vec<(&str, u8)> = occupants
        .iter()
        .filter_map(|id| priority_of(id).map(|priority| (id.as_str(), priority)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let yields = ranked
        .iter()
        .skip(1)
        .any(|(id, _)| *id == train.train_id);
    if yields {
        train.status = TrainStatus::Delayed;
    }
    yields
}

/// With the configured chance, flip the speed restriction flag.
pub fn maybe_toggle_restriction(train: &mut Train, tuning: &Tuning, rng: &mut dyn RandomSource) -> bool {
    if rng.chance(tuning.restriction_toggle_chance) {
        train.restricted_speed = !train.restricted_speed;
        true
    } else {
        false
    }
}

/// Full per-tick update for a train that has not arrived: motion followed by
/// priority arbitration and the restriction toggle. A train that arrives this
/// tick keeps its `Arrived` status; a train on an unknown section is left
/// untouched.
pub fn update_train(
    train: &mut Train,
    ctx: &MotionContext<'_>,
    priority_of: impl Fn(&str) -> Option<u8>,
    elapsed_minutes: f64,
    rng: &mut dyn RandomSource,
) -> MotionOutcome {
    let outcome = advance_train(train, ctx, elapsed_minutes, rng);
    if outcome == MotionOutcome::Unresolved {
        return outcome;
    }
    if outcome != MotionOutcome::Arrived {
        apply_priority_delay(train, ctx, priority_of, rng);
    }
    maybe_toggle_restriction(train, ctx.tuning, rng);
    outcome
}
