//! The simulation aggregate and its tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    models::{Train, TrainStatus},
    network::Network,
    rng::RandomSource,
    sim::{
        disruption::{DisruptionChanges, Disruptions},
        lifecycle::{fleet_id, initialize_train, respawn},
        motion::{update_train, MotionContext, MotionOutcome},
        occupancy::Occupancy,
        routing::RoutingContext,
        tuning::Tuning,
    },
};

/// Summary of one call to [`SimulationState::advance`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// The fleet was created by this call.
    pub populated: bool,
    /// Minutes applied to every train.
    pub elapsed_minutes: f64,
    /// Disruptions created and cleared.
    pub disruptions: DisruptionChanges,
    /// Trains that started a new journey.
    pub respawned: Vec<String>,
    /// Trains that reached their destination.
    pub arrived: Vec<String>,
}

/// All mutable simulation state.
///
/// Trains are keyed by id so iteration, and therefore occupancy order, is
/// sorted. Occupancy is rebuilt from the trains and has no other writer.
#[derive(Debug, Clone)]
pub struct SimulationState {
    trains: BTreeMap<String, Train>,
    disruptions: Disruptions,
    occupancy: Occupancy,
    initialized: bool,
    start_time: DateTime<Utc>,
    last_update_time: DateTime<Utc>,
}

impl SimulationState {
    /// Fresh, unpopulated state.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            trains: BTreeMap::new(),
            disruptions: Disruptions::default(),
            occupancy: Occupancy::default(),
            initialized: false,
            start_time: now,
            last_update_time: now,
        }
    }

    /// Trains keyed by id.
    pub fn trains(&self) -> &BTreeMap<String, Train> {
        &self.trains
    }

    /// Look up a train.
    pub fn train(&self, train_id: &str) -> Option<&Train> {
        self.trains.get(train_id)
    }

    /// Active disruptions.
    pub fn disruptions(&self) -> &Disruptions {
        &self.disruptions
    }

    /// Occupancy as of the last tick.
    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    /// Whether the fleet has been created.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// When this state was created.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Instant of the last advance.
    pub fn last_update_time(&self) -> DateTime<Utc> {
        self.last_update_time
    }

    /// Trains not arrived or cancelled.
    pub fn active_train_count(&self) -> usize {
        self.trains
            .values()
            .filter(|train| train.status.occupies_track())
            .count()
    }

    pub(crate) fn disruptions_mut(&mut self) -> &mut Disruptions {
        &mut self.disruptions
    }

    #[cfg(test)]
    pub(crate) fn place_train(&mut self, train: Train) {
        self.trains.insert(train.train_id.clone(), train);
        self.initialized = true;
        self.occupancy = Occupancy::rebuild(self.trains.values());
    }

    /// Advance to `now`.
    ///
    /// The first call creates the fleet. Later calls apply the time elapsed
    /// since the previous call in one step: disruptions, then occupancy, then
    /// each train in id order. Arrived trains start a new journey instead of
    /// moving.
    pub fn advance(
        &mut self,
        network: &Network,
        tuning: &Tuning,
        fleet_size: usize,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
    ) -> TickReport {
        if !self.initialized {
            info!(count = fleet_size, "Initializing fleet");
            for index in 1..=fleet_size {
                let train_id = fleet_id(index);
                let train = initialize_train(&train_id, network, tuning, now, rng);
                self.trains.insert(train_id, train);
            }
            self.initialized = true;
            self.last_update_time = now;
            self.occupancy = Occupancy::rebuild(self.trains.values());
            return TickReport {
                populated: true,
                ..TickReport::default()
            };
        }

        // A stale instant never moves the last update backwards.
        let now = now.max(self.last_update_time);
        let elapsed_minutes =
            (now - self.last_update_time).num_milliseconds() as f64 / 60_000.0;
        let mut report = TickReport {
            elapsed_minutes,
            disruptions: self.disruptions.advance(network, now, rng, tuning),
            ..TickReport::default()
        };

        self.occupancy = Occupancy::rebuild(self.trains.values());

        let ids: Vec<String> = self.trains.keys().cloned().collect();
        for train_id in ids {
            let Some(current) = self.trains.get(&train_id) else {
                continue;
            };

            let updated = if current.status == TrainStatus::Arrived {
                report.respawned.push(train_id.clone());
                respawn(current, network, tuning, now, rng)
            } else {
                let mut train = current.clone();
                let ctx = MotionContext {
                    routing: RoutingContext {
                        network,
                        disruptions: &self.disruptions,
                        occupancy: &self.occupancy,
                        now,
                    },
                    tuning,
                };
                let trains = &self.trains;
                let outcome = update_train(
                    &mut train,
                    &ctx,
                    |other| trains.get(other).map(|t| t.priority),
                    elapsed_minutes,
                    rng,
                );
                if outcome == MotionOutcome::Arrived {
                    report.arrived.push(train_id.clone());
                }
                train
            };
            self.trains.insert(train_id, updated);
        }

        self.occupancy = Occupancy::rebuild(self.trains.values());
        self.last_update_time = now;
        debug!(
            elapsed_minutes,
            trains = self.trains.len(),
            disruptions = self.disruptions.len(),
            "Tick complete"
        );
        report
    }
}
