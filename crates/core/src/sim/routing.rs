//! Greedy single-hop routing at section boundaries.

use chrono::{DateTime, Utc};

use crate::{
    models::Direction,
    network::{Network, Section},
    sim::{disruption::Disruptions, occupancy::Occupancy},
};

/// Read-only view of the network state a routing decision depends on.
#[derive(Clone, Copy)]
pub struct RoutingContext<'a> {
    /// Static topology.
    pub network: &'a Network,
    /// Disruptions at the start of the tick.
    pub disruptions: &'a Disruptions,
    /// Occupancy at the start of the tick.
    pub occupancy: &'a Occupancy,
    /// Tick instant.
    pub now: DateTime<Utc>,
}

impl<'a> RoutingContext<'a> {
    /// Whether a train could enter `section` right now without waiting.
    fn is_open(&self, section: &Section) -> bool {
        !self.disruptions.is_disrupted(&section.id, self.now)
            && !self.occupancy.is_at_capacity(section)
    }

    /// Section to enter after `current_section_id`, or `None` when the train
    /// is at its destination or no section leaves the boundary station.
    ///
    /// Open candidates on the main route win, then any open candidate. When
    /// every candidate is blocked the first one is still returned and the
    /// train waits on it.
    pub fn next_section(
        &self,
        current_section_id: &str,
        destination_station: &str,
        direction: Direction,
    ) -> Option<&'a Section> {
        let current = self.network.section(current_section_id)?;
        let station = current.arrival_station(direction);
        if station == destination_station {
            return None;
        }

        let candidates: Vec<&'a Section> =
            self.network.departures_from(station, direction).collect();
        let open: Vec<&'a Section> = candidates
            .iter()
            .copied()
            .filter(|section| self.is_open(section))
            .collect();

        open.iter()
            .copied()
            .find(|section| self.network.is_main_route(&section.id))
            .or_else(|| open.first().copied())
            .or_else(|| candidates.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Disruption, DisruptionKind, Severity},
        sim::test_support::train_on,
    };
    use chrono::Duration;

    fn disrupt(disruptions: &mut Disruptions, network: &Network, section: &str, now: DateTime<Utc>) {
        let result = disruptions.insert(
            network,
            Disruption {
                section_id: section.to_string(),
                kind: DisruptionKind::SignalFailure,
                start_time: now,
                end_time: now + Duration::minutes(30),
                duration_minutes: 30,
                severity: Severity::Medium,
            },
        );
        assert!(result.is_ok());
    }

    fn route(
        network: &Network,
        disruptions: &Disruptions,
        occupancy: &Occupancy,
        now: DateTime<Utc>,
        from: &str,
        to: &str,
        direction: Direction,
    ) -> Option<String> {
        RoutingContext {
            network,
            disruptions,
            occupancy,
            now,
        }
        .next_section(from, to, direction)
        .map(|section| section.id.clone())
    }

    #[test]
    fn prefers_main_route() {
        let network = Network::default();
        let now = Utc::now();
        let next = route(
            &network,
            &Disruptions::default(),
            &Occupancy::default(),
            now,
            "SEC_1",
            "STN_F",
            Direction::Forward,
        );
        assert_eq!(next.as_deref(), Some("SEC_2"));
    }

    #[test]
    fn falls_back_to_branch_when_main_is_disrupted() {
        let network = Network::default();
        let now = Utc::now();
        let mut disruptions = Disruptions::default();
        disrupt(&mut disruptions, &network, "SEC_2", now);
        let next = route(
            &network,
            &disruptions,
            &Occupancy::default(),
            now,
            "SEC_1",
            "STN_F",
            Direction::Forward,
        );
        assert_eq!(next.as_deref(), Some("SEC_6"));
    }

    #[test]
    fn falls_back_to_branch_when_main_is_full() {
        let network = Network::default();
        let trains = vec![train_on("TR009", "SEC_2", 100.0)];
        let occupancy = Occupancy::rebuild(&trains);
        let next = route(
            &network,
            &Disruptions::default(),
            &occupancy,
            Utc::now(),
            "SEC_1",
            "STN_F",
            Direction::Forward,
        );
        assert_eq!(next.as_deref(), Some("SEC_6"));
    }

    #[test]
    fn returns_first_raw_candidate_when_all_blocked() {
        let network = Network::default();
        let now = Utc::now();
        let mut disruptions = Disruptions::default();
        disrupt(&mut disruptions, &network, "SEC_2", now);
        disrupt(&mut disruptions, &network, "SEC_6", now);
        let next = route(
            &network,
            &disruptions,
            &Occupancy::default(),
            now,
            "SEC_1",
            "STN_F",
            Direction::Forward,
        );
        assert_eq!(next.as_deref(), Some("SEC_2"));
    }

    #[test]
    fn none_at_destination() {
        let network = Network::default();
        let next = route(
            &network,
            &Disruptions::default(),
            &Occupancy::default(),
            Utc::now(),
            "SEC_1",
            "STN_B",
            Direction::Forward,
        );
        assert_eq!(next, None);
    }

    #[test]
    fn none_without_candidates() {
        let network = Network::default();
        // Nothing leaves STN_F going forward.
        let next = route(
            &network,
            &Disruptions::default(),
            &Occupancy::default(),
            Utc::now(),
            "SEC_5",
            "STN_A",
            Direction::Forward,
        );
        assert_eq!(next, None);
    }

    #[test]
    fn backward_uses_section_start() {
        let network = Network::default();
        let next = route(
            &network,
            &Disruptions::default(),
            &Occupancy::default(),
            Utc::now(),
            "SEC_5",
            "STN_A",
            Direction::Backward,
        );
        assert_eq!(next.as_deref(), Some("SEC_4"));
    }

    #[test]
    fn unknown_section_is_none() {
        let network = Network::default();
        let next = route(
            &network,
            &Disruptions::default(),
            &Occupancy::default(),
            Utc::now(),
            "SEC_404",
            "STN_A",
            Direction::Backward,
        );
        assert_eq!(next, None);
    }
}
