//! Thread-safe handle around the simulation state.
//!
//! Every query advances the simulation to "now" before answering, so time
//! only moves when somebody asks. All operations on a [`Simulation`] take a
//! single lock for their full duration and read the clock while holding it;
//! clones share the same state.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    error::SimError,
    models::{Disruption, DisruptionKind, Severity},
    network::Network,
    rng::{RandomSource, SimRng},
    sim::{
        snapshot::{
            self, DisruptionsView, FleetSummary, HealthReport, Snapshot, StateView,
        },
        state::{SimulationState, TickReport},
        tuning::Tuning,
    },
};

/// Fleet size used when nothing else is configured.
pub const DEFAULT_FLEET_SIZE: usize = 10;

struct Inner {
    state: SimulationState,
    rng: Box<dyn RandomSource>,
}

impl Inner {
    fn advance(&mut self, ctx: &Shared, now: DateTime<Utc>) -> TickReport {
        self.state.advance(
            &ctx.network,
            &ctx.tuning,
            ctx.fleet_size,
            now,
            self.rng.as_mut(),
        )
    }

    /// Advance and return the instant the state now reflects.
    fn advance_to(&mut self, ctx: &Shared, now: DateTime<Utc>) -> DateTime<Utc> {
        self.advance(ctx, now);
        self.state.last_update_time()
    }
}

struct Shared {
    network: Network,
    tuning: Tuning,
    fleet_size: usize,
    clock: Arc<dyn Clock>,
}

/// Cloneable handle to a running simulation.
#[derive(Clone)]
pub struct Simulation {
    inner: Arc<Mutex<Inner>>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("fleet_size", &self.shared.fleet_size)
            .field("sections", &self.shared.network.sections.len())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Start configuring a simulation.
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::default()
    }

    /// Simulation described by an [`AppConfig`], using the system clock.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let network = config.network()?;
        Self::builder()
            .network(network)
            .tuning(config.tuning.clone())
            .fleet_size(config.fleet_size)
            .seed(config.seed)
            .build()
            .context("Failed to start simulation")
    }

    /// Network the simulation runs on.
    pub fn network(&self) -> &Network {
        &self.shared.network
    }

    /// Probabilities and ranges in effect.
    pub fn tuning(&self) -> &Tuning {
        &self.shared.tuning
    }

    /// Number of trains created on initialization.
    pub fn fleet_size(&self) -> usize {
        self.shared.fleet_size
    }

    /// Advance to now and report what happened.
    pub fn advance(&self) -> TickReport {
        let mut inner = self.inner.lock();
        let now = self.shared.clock.now();
        inner.advance(&self.shared, now)
    }

    /// Advance to now and return the per-train snapshot.
    pub fn advance_and_snapshot(&self) -> Result<Snapshot, SimError> {
        let mut inner = self.inner.lock();
        let now = self.shared.clock.now();
        let now = inner.advance_to(&self.shared, now);
        let Inner { state, rng } = &mut *inner;
        snapshot::assemble(
            state,
            &self.shared.network,
            &self.shared.tuning,
            now,
            rng.as_mut(),
        )
    }

    /// Advance to now and return the raw state.
    pub fn get_state(&self) -> StateView {
        self.query(|state, _| snapshot::state_view(state))
    }

    /// Advance to now and return active disruptions.
    pub fn get_disruptions(&self) -> DisruptionsView {
        self.query(snapshot::disruptions_view)
    }

    /// Advance to now and return a liveness summary.
    pub fn health(&self) -> HealthReport {
        self.query(snapshot::health)
    }

    /// Advance to now and return fleet breakdowns.
    pub fn summary(&self) -> FleetSummary {
        self.query(snapshot::summary)
    }

    /// Replace the state with a fresh, uninitialized one. The next query
    /// creates a new fleet.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let now = self.shared.clock.now();
        inner.state = SimulationState::new(now);
        info!("Simulation reset");
    }

    /// Read the state under the lock without advancing it.
    pub fn inspect<R>(&self, f: impl FnOnce(&SimulationState) -> R) -> R {
        f(&self.inner.lock().state)
    }

    /// Install a disruption on `section_id` starting now.
    pub fn inject_disruption(
        &self,
        section_id: &str,
        kind: DisruptionKind,
        severity: Severity,
        minutes: u32,
    ) -> Result<Disruption, SimError> {
        let mut inner = self.inner.lock();
        let now = self.shared.clock.now();
        let disruption = Disruption {
            section_id: section_id.to_string(),
            kind,
            start_time: now,
            end_time: now + Duration::minutes(i64::from(minutes)),
            duration_minutes: minutes,
            severity,
        };
        inner
            .state
            .disruptions_mut()
            .insert(&self.shared.network, disruption.clone())?;
        Ok(disruption)
    }

    fn query<R>(&self, view: impl FnOnce(&SimulationState, DateTime<Utc>) -> R) -> R {
        let mut inner = self.inner.lock();
        let now = self.shared.clock.now();
        let now = inner.advance_to(&self.shared, now);
        view(&inner.state, now)
    }
}

/// Configures and validates a [`Simulation`].
pub struct SimulationBuilder {
    network: Option<Network>,
    tuning: Tuning,
    fleet_size: usize,
    seed: Option<u64>,
    rng: Option<Box<dyn RandomSource>>,
    clock: Arc<dyn Clock>,
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self {
            network: None,
            tuning: Tuning::default(),
            fleet_size: DEFAULT_FLEET_SIZE,
            seed: None,
            rng: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl SimulationBuilder {
    /// Topology to run on. Defaults to the built-in network.
    pub fn network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    /// Probabilities and ranges. Defaults to [`Tuning::default`].
    pub fn tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Trains created on initialization.
    pub fn fleet_size(mut self, fleet_size: usize) -> Self {
        self.fleet_size = fleet_size;
        self
    }

    /// Seed for the built-in generator; `None` draws from entropy.
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Custom random source. Takes precedence over [`Self::seed`].
    pub fn rng(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Validate the network and create the handle. The fleet is created
    /// lazily by the first query.
    pub fn build(self) -> Result<Simulation, SimError> {
        let network = self.network.unwrap_or_default();
        network.validate()?;
        let rng = match self.rng {
            Some(rng) => rng,
            None => Box::new(SimRng::from_optional_seed(self.seed)),
        };
        let state = SimulationState::new(self.clock.now());
        info!(
            fleet_size = self.fleet_size,
            sections = network.sections.len(),
            seeded = self.seed.is_some(),
            "Simulation ready"
        );

        Ok(Simulation {
            inner: Arc::new(Mutex::new(Inner { state, rng })),
            shared: Arc::new(Shared {
                network,
                tuning: self.tuning,
                fleet_size: self.fleet_size,
                clock: self.clock,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, models::TrainStatus};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn quiet_sim(seed: u64) -> anyhow::Result<(Simulation, ManualClock)> {
        let clock = ManualClock::new(start());
        let sim = Simulation::builder()
            .tuning(Tuning::quiet())
            .seed(Some(seed))
            .clock(clock.clone())
            .build()?;
        Ok((sim, clock))
    }

    /// Manual clock whose next read can be parked until the test lets it go.
    #[derive(Clone)]
    struct GatedClock {
        time: ManualClock,
        armed: Arc<std::sync::atomic::AtomicBool>,
        barrier: Arc<std::sync::Barrier>,
    }

    impl GatedClock {
        fn new(start: DateTime<Utc>) -> Self {
            Self {
                time: ManualClock::new(start),
                armed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
                barrier: Arc::new(std::sync::Barrier::new(2)),
            }
        }

        fn arm(&self) {
            self.armed.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl Clock for GatedClock {
        fn now(&self) -> DateTime<Utc> {
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                // Entered, then held until released.
                self.barrier.wait();
                self.barrier.wait();
            }
            self.time.now()
        }
    }

    #[test]
    fn interleaved_callers_never_count_time_twice() -> anyhow::Result<()> {
        let clock = GatedClock::new(start());
        let sim = Simulation::builder()
            .tuning(Tuning::quiet())
            .seed(Some(13))
            .clock(clock.clone())
            .build()?;
        sim.advance();

        clock.arm();
        let first = {
            let sim = sim.clone();
            std::thread::spawn(move || sim.advance())
        };
        clock.barrier.wait();
        clock.time.advance_minutes(1);
        let second = {
            let sim = sim.clone();
            std::thread::spawn(move || sim.advance())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        clock.barrier.wait();

        let mut applied = 0.0;
        for handle in [first, second] {
            match handle.join() {
                Ok(report) => applied += report.elapsed_minutes,
                Err(_) => panic!("caller panicked"),
            }
        }
        assert!((applied - 1.0).abs() < 1e-9);
        let after_one = start() + Duration::minutes(1);
        assert_eq!(sim.inspect(|state| state.last_update_time()), after_one);

        clock.time.advance_minutes(9);
        let report = sim.advance();
        assert!((report.elapsed_minutes - 9.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn first_query_creates_fleet_on_time() -> anyhow::Result<()> {
        let (sim, _clock) = quiet_sim(1)?;
        assert!(!sim.inspect(|state| state.is_initialized()));

        let snapshot = sim.advance_and_snapshot()?;
        assert_eq!(snapshot.payload.len(), DEFAULT_FLEET_SIZE);
        for bundle in &snapshot.payload {
            assert_eq!(bundle.train.status, TrainStatus::OnTime);
            assert!(bundle.train.current_location.position_m <= bundle.section.length_km * 1000.0);
        }
        assert_eq!(snapshot.system_status.active_disruptions, 0);
        Ok(())
    }

    #[test]
    fn queries_at_the_same_instant_do_not_move_trains() -> anyhow::Result<()> {
        let (sim, _clock) = quiet_sim(2)?;
        let first = sim.get_state();
        let second = sim.get_state();
        assert_eq!(first.trains, second.trains);
        Ok(())
    }

    #[test]
    fn elapsed_time_moves_trains() -> anyhow::Result<()> {
        let (sim, clock) = quiet_sim(3)?;
        let before = sim.get_state();
        clock.advance_minutes(1);
        let after = sim.get_state();

        let moved = before.trains.iter().any(|(id, train)| {
            after
                .trains
                .get(id)
                .map(|later| later.current_location != train.current_location)
                .unwrap_or(false)
        });
        assert!(moved);
        assert_eq!(after.last_update, clock.now());
        Ok(())
    }

    #[test]
    fn reset_discards_fleet() -> anyhow::Result<()> {
        let (sim, _clock) = quiet_sim(4)?;
        sim.advance();
        sim.inject_disruption("SEC_3", DisruptionKind::TrackWork, Severity::Low, 30)?;
        sim.reset();

        sim.inspect(|state| {
            assert!(!state.is_initialized());
            assert!(state.trains().is_empty());
            assert!(state.disruptions().is_empty());
            assert!(state.occupancy().is_empty());
        });

        let health = sim.health();
        assert_eq!(health.total_trains, DEFAULT_FLEET_SIZE);
        assert_eq!(health.active_disruptions, 0);
        Ok(())
    }

    #[test]
    fn injected_disruption_expires() -> anyhow::Result<()> {
        let (sim, clock) = quiet_sim(5)?;
        sim.advance();
        let disruption =
            sim.inject_disruption("SEC_2", DisruptionKind::SignalFailure, Severity::High, 15)?;
        assert_eq!(disruption.end_time - disruption.start_time, Duration::minutes(15));

        let view = sim.get_disruptions();
        assert_eq!(view.affected_sections, 1);
        assert!(view.active_disruptions.get("SEC_2").is_some());

        clock.advance_minutes(15);
        assert_eq!(sim.get_disruptions().affected_sections, 0);
        Ok(())
    }

    #[test]
    fn injection_rejects_invalid_requests() -> anyhow::Result<()> {
        let (sim, _clock) = quiet_sim(6)?;
        sim.inject_disruption("SEC_1", DisruptionKind::Emergency, Severity::Medium, 20)?;

        assert!(matches!(
            sim.inject_disruption("SEC_1", DisruptionKind::Maintenance, Severity::Low, 10),
            Err(SimError::SectionAlreadyDisrupted(_))
        ));
        assert!(matches!(
            sim.inject_disruption("SEC_99", DisruptionKind::Maintenance, Severity::Low, 10),
            Err(SimError::UnknownSection(_))
        ));
        assert!(matches!(
            sim.inject_disruption("SEC_4", DisruptionKind::Maintenance, Severity::Low, 0),
            Err(SimError::EmptyDisruptionWindow(_))
        ));
        Ok(())
    }

    #[test]
    fn long_runs_complete_journeys() -> anyhow::Result<()> {
        let (sim, clock) = quiet_sim(7)?;
        sim.advance();
        for _ in 0..20 {
            clock.advance_minutes(30);
            let report = sim.advance();
            assert!(report.elapsed_minutes > 29.9);
        }

        let summary = sim.summary();
        assert_eq!(summary.total_trains, DEFAULT_FLEET_SIZE);
        let finished = sim.inspect(|state| {
            state
                .trains()
                .values()
                .any(|train| train.journey_count > 1 || train.status == TrainStatus::Arrived)
        });
        assert!(finished);
        Ok(())
    }

    #[test]
    fn identical_seeds_give_identical_snapshots() -> anyhow::Result<()> {
        let (a, clock_a) = quiet_sim(11)?;
        let (b, clock_b) = quiet_sim(11)?;
        for _ in 0..5 {
            assert_eq!(a.advance_and_snapshot()?, b.advance_and_snapshot()?);
            clock_a.advance_minutes(2);
            clock_b.advance_minutes(2);
        }
        Ok(())
    }

    #[test]
    fn clones_share_state_across_threads() -> anyhow::Result<()> {
        let sim = Simulation::builder().seed(Some(12)).fleet_size(6).build()?;
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sim = sim.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let _ = sim.advance_and_snapshot();
                    }
                })
            })
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                panic!("worker panicked");
            }
        }
        assert_eq!(sim.inspect(|state| state.trains().len()), 6);
        Ok(())
    }

    #[test]
    fn invalid_network_is_rejected() {
        let mut network = Network::default();
        network.stations.clear();
        assert!(matches!(
            Simulation::builder().network(network).build(),
            Err(SimError::Network(_))
        ));
    }
}
