//! Externally visible views of the simulation.
//!
//! Field names follow the dashboard's wire format.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::SimError,
    models::{Direction, Disruption, Train, TrainKind, TrainStatus},
    network::{Network, Section, TrackType},
    rng::RandomSource,
    sim::{
        disruption::Disruptions,
        occupancy::Occupancy,
        state::SimulationState,
        tuning::{Tuning, PRIORITY_OVERRIDE_THRESHOLD},
    },
};

/// Static section attributes plus live status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionView {
    pub section_id: String,
    pub start_station: String,
    pub end_station: String,
    pub length_km: f64,
    pub capacity: u32,
    pub max_speed_kmh: f64,
    pub track_type: TrackType,
    pub is_disrupted: bool,
    pub occupancy_count: usize,
}

/// Whether a signal block holds any train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockOccupancy {
    Occupied,
    Free,
}

/// How the block's signal is worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Automatic,
    Manual,
}

/// Signal block covering a section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalView {
    pub block_id: String,
    pub section_id: String,
    pub occupancy_status: BlockOccupancy,
    pub occupying_trains: usize,
    pub signal_type: SignalType,
    /// Cosmetic; redrawn for every snapshot.
    pub headway_time_s: u32,
    pub priority_override: bool,
}

/// Highest-precedence condition affecting a train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "Section Disruption")]
    SectionDisruption,
    Breakdown,
    Delay,
    Restriction,
    None,
}

/// Event attached to a train bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    pub event_type: EventKind,
    pub train_id: String,
    pub section_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub disruption_details: Option<Disruption>,
    pub delay_duration_min: u32,
}

/// Train plus the section, signal and event it relates to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainBundle {
    pub train: Train,
    pub section: SectionView,
    pub signal: SignalView,
    pub event: EventView,
}

/// Network-wide counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub active_disruptions: usize,
    pub disrupted_sections: Vec<String>,
    pub section_occupancy: BTreeMap<String, usize>,
}

/// One point-in-time view of the whole fleet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: DateTime<Utc>,
    pub payload: Vec<TrainBundle>,
    pub system_status: SystemStatus,
}

/// Raw state without bundles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateView {
    pub trains: BTreeMap<String, Train>,
    pub section_occupancy: Occupancy,
    pub disruptions: Disruptions,
    pub initialized: bool,
    pub last_update: DateTime<Utc>,
}

/// Active disruptions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisruptionsView {
    pub active_disruptions: Disruptions,
    pub affected_sections: usize,
    pub timestamp: DateTime<Utc>,
}

/// Liveness summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub total_trains: usize,
    pub active_trains: usize,
    pub active_disruptions: usize,
    pub disrupted_sections: Vec<String>,
}

/// Fleet breakdowns for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSummary {
    pub total_trains: usize,
    pub status_breakdown: BTreeMap<TrainStatus, usize>,
    pub type_breakdown: BTreeMap<TrainKind, usize>,
    pub direction_breakdown: BTreeMap<Direction, usize>,
    pub destination_breakdown: BTreeMap<String, usize>,
    pub active_disruptions: usize,
    pub section_occupancy: BTreeMap<String, usize>,
    pub timestamp: DateTime<Utc>,
    pub system_uptime_minutes: f64,
}

/// Block id for a section: `SEC_3` becomes `BLK_301`.
pub fn block_id(section_id: &str) -> String {
    let suffix = section_id.strip_prefix("SEC_").unwrap_or(section_id);
    format!("BLK_{suffix}01")
}

/// Section view for `section`.
pub fn section_view(section: &Section, state: &SimulationState, now: DateTime<Utc>) -> SectionView {
    SectionView {
        section_id: section.id.clone(),
        start_station: section.start.clone(),
        end_station: section.end.clone(),
        length_km: section.length_km,
        capacity: section.capacity,
        max_speed_kmh: section.max_speed_kmh,
        track_type: section.track_type,
        is_disrupted: state.disruptions().is_disrupted(&section.id, now),
        occupancy_count: state.occupancy().count(&section.id),
    }
}

/// Signal view for `section`.
pub fn signal_view(
    section: &Section,
    state: &SimulationState,
    tuning: &Tuning,
    rng: &mut dyn RandomSource,
) -> SignalView {
    let occupants = state.occupancy().occupants(&section.id);
    let priority_override = occupants.iter().any(|id| {
        state
            .train(id)
            .map(|train| train.priority >= PRIORITY_OVERRIDE_THRESHOLD)
            .unwrap_or(false)
    });
    SignalView {
        block_id: block_id(&section.id),
        section_id: section.id.clone(),
        occupancy_status: if occupants.is_empty() {
            BlockOccupancy::Free
        } else {
            BlockOccupancy::Occupied
        },
        occupying_trains: occupants.len(),
        signal_type: if section.capacity > 1 {
            SignalType::Automatic
        } else {
            SignalType::Manual
        },
        headway_time_s: tuning.headway_seconds.sample(rng),
        priority_override,
    }
}

/// Event view: disruption, then breakdown, then delay, then restriction.
pub fn event_view(
    train: &Train,
    section: &Section,
    state: &SimulationState,
    tuning: &Tuning,
    now: DateTime<Utc>,
    rng: &mut dyn RandomSource,
) -> EventView {
    let disruption = state.disruptions().get(&section.id);
    let event_type = if disruption.is_some() {
        EventKind::SectionDisruption
    } else if train.breakdown_until.is_some() {
        EventKind::Breakdown
    } else if train.status == TrainStatus::Delayed {
        EventKind::Delay
    } else if train.restricted_speed {
        EventKind::Restriction
    } else {
        EventKind::None
    };
    let delay_duration_min = if event_type == EventKind::Delay {
        tuning.event_delay_minutes.sample(rng)
    } else {
        0
    };

    EventView {
        event_type,
        train_id: train.train_id.clone(),
        section_id: section.id.clone(),
        timestamp: (event_type != EventKind::None).then_some(now),
        disruption_details: disruption.cloned(),
        delay_duration_min,
    }
}

/// Network-wide counters.
pub fn system_status(state: &SimulationState) -> SystemStatus {
    SystemStatus {
        active_disruptions: state.disruptions().len(),
        disrupted_sections: state.disruptions().section_ids(),
        section_occupancy: state.occupancy().counts(),
    }
}

/// Build the full snapshot. A train on a section the network does not know
/// is an internal inconsistency and fails the whole snapshot.
pub fn assemble(
    state: &SimulationState,
    network: &Network,
    tuning: &Tuning,
    now: DateTime<Utc>,
    rng: &mut dyn RandomSource,
) -> Result<Snapshot, SimError> {
    let mut payload = Vec::with_capacity(state.trains().len());
    for train in state.trains().values() {
        let section = network.section(train.section_id()).ok_or_else(|| {
            SimError::Inconsistent(format!(
                "train {} is on unknown section {}",
                train.train_id,
                train.section_id()
            ))
        })?;
        payload.push(TrainBundle {
            train: train.clone(),
            section: section_view(section, state, now),
            signal: signal_view(section, state, tuning, rng),
            event: event_view(train, section, state, tuning, now, rng),
        });
    }

    Ok(Snapshot {
        kind: "train_snapshot",
        timestamp: now,
        payload,
        system_status: system_status(state),
    })
}

/// Clone of the raw state.
pub fn state_view(state: &SimulationState) -> StateView {
    StateView {
        trains: state.trains().clone(),
        section_occupancy: state.occupancy().clone(),
        disruptions: state.disruptions().clone(),
        initialized: state.is_initialized(),
        last_update: state.last_update_time(),
    }
}

/// Active disruptions at `now`.
pub fn disruptions_view(state: &SimulationState, now: DateTime<Utc>) -> DisruptionsView {
    DisruptionsView {
        active_disruptions: state.disruptions().clone(),
        affected_sections: state.disruptions().len(),
        timestamp: now,
    }
}

/// Liveness summary at `now`.
pub fn health(state: &SimulationState, now: DateTime<Utc>) -> HealthReport {
    HealthReport {
        status: "healthy",
        timestamp: now,
        total_trains: state.trains().len(),
        active_trains: state.active_train_count(),
        active_disruptions: state.disruptions().len(),
        disrupted_sections: state.disruptions().section_ids(),
    }
}

/// Fleet breakdowns at `now`.
pub fn summary(state: &SimulationState, now: DateTime<Utc>) -> FleetSummary {
    let mut status_breakdown = BTreeMap::new();
    let mut type_breakdown = BTreeMap::new();
    let mut direction_breakdown: BTreeMap<Direction, usize> =
        Direction::ALL.iter().map(|direction| (*direction, 0)).collect();
    let mut destination_breakdown = BTreeMap::new();

    for train in state.trains().values() {
        *status_breakdown.entry(train.status).or_insert(0) += 1;
        *type_breakdown.entry(train.kind).or_insert(0) += 1;
        *direction_breakdown.entry(train.direction).or_insert(0) += 1;
        *destination_breakdown
            .entry(train.destination_station.clone())
            .or_insert(0) += 1;
    }

    FleetSummary {
        total_trains: state.trains().len(),
        status_breakdown,
        type_breakdown,
        direction_breakdown,
        destination_breakdown,
        active_disruptions: state.disruptions().len(),
        section_occupancy: state.occupancy().counts(),
        timestamp: now,
        system_uptime_minutes: (now - state.start_time()).num_milliseconds().max(0) as f64
            / 60_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{DisruptionKind, Severity},
        rng::SimRng,
        sim::test_support::train_on,
    };
    use chrono::Duration;

    fn section<'a>(network: &'a Network, id: &str) -> &'a Section {
        match network.section(id) {
            Some(section) => section,
            None => panic!("missing section {id}"),
        }
    }

    #[test]
    fn block_ids_follow_section_suffix() {
        assert_eq!(block_id("SEC_3"), "BLK_301");
        assert_eq!(block_id("YARD"), "BLK_YARD01");
    }

    #[test]
    fn signal_reflects_occupancy_and_priority() {
        let network = Network::default();
        let mut rng = SimRng::from_seed_u64(1);
        let mut state = SimulationState::new(Utc::now());
        let mut express = train_on("TR001", "SEC_2", 0.0);
        express.priority = 5;
        state.place_train(express);

        let tuning = Tuning::default();
        let signal = signal_view(section(&network, "SEC_2"), &state, &tuning, &mut rng);
        assert_eq!(signal.block_id, "BLK_201");
        assert_eq!(signal.occupancy_status, BlockOccupancy::Occupied);
        assert_eq!(signal.occupying_trains, 1);
        assert_eq!(signal.signal_type, SignalType::Manual);
        assert!(signal.priority_override);
        assert!((60..=300).contains(&signal.headway_time_s));

        let idle = signal_view(section(&network, "SEC_5"), &state, &tuning, &mut rng);
        assert_eq!(idle.occupancy_status, BlockOccupancy::Free);
        assert_eq!(idle.signal_type, SignalType::Automatic);
        assert!(!idle.priority_override);
    }

    #[test]
    fn event_precedence() {
        let network = Network::default();
        let tuning = Tuning::default();
        let mut rng = SimRng::from_seed_u64(2);
        let now = Utc::now();
        let mut state = SimulationState::new(now);
        let sec1 = section(&network, "SEC_1");

        let mut train = train_on("TR001", "SEC_1", 0.0);
        let event = event_view(&train, sec1, &state, &tuning, now, &mut rng);
        assert_eq!(event.event_type, EventKind::None);
        assert_eq!(event.timestamp, None);
        assert_eq!(event.delay_duration_min, 0);

        train.restricted_speed = true;
        let event = event_view(&train, sec1, &state, &tuning, now, &mut rng);
        assert_eq!(event.event_type, EventKind::Restriction);
        assert_eq!(event.timestamp, Some(now));

        train.status = TrainStatus::Delayed;
        let event = event_view(&train, sec1, &state, &tuning, now, &mut rng);
        assert_eq!(event.event_type, EventKind::Delay);
        assert!((5..=60).contains(&event.delay_duration_min));

        train.breakdown_until = Some(now + Duration::minutes(4));
        let event = event_view(&train, sec1, &state, &tuning, now, &mut rng);
        assert_eq!(event.event_type, EventKind::Breakdown);

        let inserted = state.disruptions_mut().insert(
            &network,
            Disruption {
                section_id: "SEC_1".to_string(),
                kind: DisruptionKind::Emergency,
                start_time: now,
                end_time: now + Duration::minutes(12),
                duration_minutes: 12,
                severity: Severity::High,
            },
        );
        assert!(inserted.is_ok());
        let event = event_view(&train, sec1, &state, &tuning, now, &mut rng);
        assert_eq!(event.event_type, EventKind::SectionDisruption);
        assert!(event.disruption_details.is_some());
    }

    #[test]
    fn snapshot_is_sorted_and_serializes_wire_names() -> anyhow::Result<()> {
        let network = Network::default();
        let tuning = Tuning::quiet();
        let mut rng = SimRng::from_seed_u64(3);
        let now = Utc::now();
        let mut state = SimulationState::new(now);
        state.advance(&network, &tuning, 5, now, &mut rng);

        let snapshot = assemble(&state, &network, &tuning, now, &mut rng)?;
        let ids: Vec<&str> = snapshot
            .payload
            .iter()
            .map(|bundle| bundle.train.train_id.as_str())
            .collect();
        assert_eq!(ids, vec!["TR001", "TR002", "TR003", "TR004", "TR005"]);
        assert_eq!(
            snapshot.system_status.section_occupancy.values().sum::<usize>(),
            5
        );

        let json = serde_json::to_value(&snapshot)?;
        assert_eq!(json["type"], "train_snapshot");
        assert_eq!(json["payload"][0]["train"]["status"], "On time");
        assert!(json["payload"][0]["train"]["actual_departure"].is_string());
        assert!(json["payload"][0]["signal"]["block_id"].is_string());
        Ok(())
    }

    #[test]
    fn unknown_section_fails_snapshot() {
        let network = Network::default();
        let tuning = Tuning::quiet();
        let mut rng = SimRng::from_seed_u64(3);
        let mut state = SimulationState::new(Utc::now());
        state.place_train(train_on("TR001", "SEC_404", 0.0));
        assert!(matches!(
            assemble(&state, &network, &tuning, Utc::now(), &mut rng),
            Err(SimError::Inconsistent(_))
        ));
    }

    #[test]
    fn summary_counts_fleet() {
        let network = Network::default();
        let tuning = Tuning::quiet();
        let mut rng = SimRng::from_seed_u64(9);
        let now = Utc::now();
        let mut state = SimulationState::new(now);
        state.advance(&network, &tuning, 10, now, &mut rng);

        let later = now + Duration::minutes(3);
        let summary = summary(&state, later);
        assert_eq!(summary.total_trains, 10);
        assert_eq!(summary.status_breakdown.get(&TrainStatus::OnTime), Some(&10));
        assert_eq!(summary.direction_breakdown.values().sum::<usize>(), 10);
        assert_eq!(summary.type_breakdown.values().sum::<usize>(), 10);
        assert!((summary.system_uptime_minutes - 3.0).abs() < 1e-9);

        let health = health(&state, later);
        assert_eq!(health.total_trains, 10);
        assert_eq!(health.active_trains, 10);
        assert_eq!(health.active_disruptions, 0);
    }
}
