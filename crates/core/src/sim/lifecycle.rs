//! Train creation and journey turnover.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::{
    models::{Direction, Location, Train, TrainKind, TrainStatus},
    network::Network,
    rng::{pick, pick_weighted, RandomSource},
    sim::tuning::{Tuning, INITIAL_RESTRICTION_SHARE},
};

/// Fleet identifier for the `index`-th train (1-based), e.g. `TR001`.
pub fn fleet_id(index: usize) -> String {
    format!("TR{index:03}")
}

struct Journey {
    kind: TrainKind,
    priority: u8,
    max_speed_kmh: u32,
    length_m: u32,
    direction: Direction,
    destination: String,
    section_id: String,
    restricted: bool,
}

fn draw_journey(network: &Network, tuning: &Tuning, rng: &mut dyn RandomSource) -> Journey {
    let (kind, priority, max_speed_kmh) =
        match pick_weighted(rng, &network.train_types, |spec| spec.weight) {
            Some(spec) => (
                spec.kind,
                spec.priority,
                rng.between(spec.speed_range_kmh.0, spec.speed_range_kmh.1),
            ),
            None => (TrainKind::Local, 1, 100),
        };
    let length_m = tuning.train_length_m.sample(rng);
    let direction = pick(rng, &Direction::ALL)
        .copied()
        .unwrap_or(Direction::Forward);
    let template = network.departures.for_direction(direction);
    let destination = pick(rng, &template.destinations)
        .cloned()
        .unwrap_or_default();
    let restricted =
        rng.chance(tuning.initial_restriction_chance) && rng.chance(INITIAL_RESTRICTION_SHARE);

    Journey {
        kind,
        priority,
        max_speed_kmh,
        length_m,
        direction,
        destination,
        section_id: template.section_id.clone(),
        restricted,
    }
}

fn build_train(
    train_id: String,
    journey: Journey,
    position_m: f64,
    departure_time: DateTime<Utc>,
    journey_count: u32,
) -> Train {
    Train {
        train_id,
        kind: journey.kind,
        priority: journey.priority,
        max_speed_kmh: journey.max_speed_kmh,
        length_m: journey.length_m,
        direction: journey.direction,
        destination_station: journey.destination,
        current_location: Location {
            section_id: journey.section_id,
            position_m,
        },
        status: TrainStatus::OnTime,
        departure_time,
        arrival_time: None,
        restricted_speed: journey.restricted,
        breakdown_until: None,
        journey_count,
    }
}

/// Create a train for the initial fleet: random journey, random offset into
/// the starting section, departure backdated into the past.
pub fn initialize_train(
    train_id: &str,
    network: &Network,
    tuning: &Tuning,
    now: DateTime<Utc>,
    rng: &mut dyn RandomSource,
) -> Train {
    let journey = draw_journey(network, tuning, rng);
    let (low, high) = network
        .departures
        .for_direction(journey.direction)
        .initial_offset_m;
    let position_m = f64::from(rng.between(low, high));
    let backdate = tuning.departure_backdate_minutes.sample(rng);
    let departure = now - Duration::minutes(i64::from(backdate));
    build_train(train_id.to_string(), journey, position_m, departure, 1)
}

/// Start the next journey for an arrived train. Keeps the id and bumps the
/// journey counter.
pub fn respawn(
    arrived: &Train,
    network: &Network,
    tuning: &Tuning,
    now: DateTime<Utc>,
    rng: &mut dyn RandomSource,
) -> Train {
    let journey = draw_journey(network, tuning, rng);
    let position_m = network
        .departures
        .for_direction(journey.direction)
        .respawn_offset_m;
    info!(
        train = %arrived.train_id,
        direction = %journey.direction,
        destination = %journey.destination,
        "Starting new journey"
    );
    build_train(
        arrived.train_id.clone(),
        journey,
        position_m,
        now,
        arrived.journey_count + 1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;

    #[test]
    fn fleet_ids_are_zero_padded() {
        assert_eq!(fleet_id(1), "TR001");
        assert_eq!(fleet_id(42), "TR042");
    }

    #[test]
    fn initial_trains_respect_templates() {
        let network = Network::default();
        let tuning = Tuning::default();
        let mut rng = SimRng::from_seed_u64(21);
        let now = Utc::now();

        for index in 1..=200 {
            let train = initialize_train(&fleet_id(index), &network, &tuning, now, &mut rng);
            let template = network.departures.for_direction(train.direction);
            assert_eq!(train.section_id(), template.section_id);
            assert!(template.destinations.contains(&train.destination_station));
            let (low, high) = template.initial_offset_m;
            let position = train.current_location.position_m;
            assert!(position >= f64::from(low) && position <= f64::from(high));
            assert!((150..=400).contains(&train.length_m));
            assert!(train.departure_time < now);
            assert_eq!(train.status, TrainStatus::OnTime);
            assert_eq!(train.journey_count, 1);

            let Some(spec) = network.train_type(train.kind) else {
                panic!("unknown train type");
            };
            assert_eq!(train.priority, spec.priority);
            let (min, max) = spec.speed_range_kmh;
            assert!((min..=max).contains(&train.max_speed_kmh));

            if train.direction == Direction::Forward {
                assert_ne!(train.destination_station, "STN_A");
            }
        }
    }

    #[test]
    fn initial_restriction_follows_tuning() {
        let network = Network::default();
        let mut rng = SimRng::from_seed_u64(17);
        let now = Utc::now();

        let quiet = Tuning::quiet();
        assert!((1..=100).all(|index| {
            !initialize_train(&fleet_id(index), &network, &quiet, now, &mut rng).restricted_speed
        }));

        let eager = Tuning {
            initial_restriction_chance: 1.0,
            ..Tuning::quiet()
        };
        let restricted = (1..=400)
            .filter(|index| {
                initialize_train(&fleet_id(*index), &network, &eager, now, &mut rng)
                    .restricted_speed
            })
            .count();
        // Roughly INITIAL_RESTRICTION_SHARE of 400.
        assert!((120..=280).contains(&restricted), "restricted {restricted}");
    }

    #[test]
    fn respawn_starts_fresh_journey() {
        let network = Network::default();
        let tuning = Tuning::default();
        let mut rng = SimRng::from_seed_u64(8);
        let now = Utc::now();
        let mut arrived = initialize_train("TR007", &network, &tuning, now, &mut rng);
        arrived.status = TrainStatus::Arrived;
        arrived.arrival_time = Some(now);
        arrived.breakdown_until = Some(now + Duration::minutes(3));

        let later = now + Duration::minutes(1);
        let next = respawn(&arrived, &network, &tuning, later, &mut rng);
        assert_eq!(next.train_id, "TR007");
        assert_eq!(next.journey_count, 2);
        assert_eq!(next.status, TrainStatus::OnTime);
        assert_eq!(next.arrival_time, None);
        assert_eq!(next.breakdown_until, None);
        assert_eq!(next.departure_time, later);
        assert_eq!(next.current_location.position_m, 0.0);
    }
}
