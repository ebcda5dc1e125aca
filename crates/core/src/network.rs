//! Static network topology: stations, sections and the train-type table.
//!
//! The network is loaded once at startup and only read afterwards. Lookups
//! that miss return `None`; callers decide how to degrade.

use std::{collections::HashSet, fs, path::Path};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{
    error::NetworkError,
    models::{Direction, TrainKind},
};

/// Physical layout of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    /// Single line shared by both directions.
    Single,
    /// Separate running lines per direction.
    Double,
}

/// Track segment between two stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Unique identifier, e.g. `SEC_1`.
    pub id: String,
    /// Station at position 0 of the canonical orientation.
    pub start: String,
    /// Station at the far end of the canonical orientation.
    pub end: String,
    /// Length in kilometres.
    pub length_km: f64,
    /// Trains the section is meant to hold at once.
    pub capacity: u32,
    /// Line speed.
    pub max_speed_kmh: f64,
    /// Single or double track.
    pub track_type: TrackType,
}

impl Section {
    /// Length in metres.
    pub fn length_m(&self) -> f64 {
        self.length_km * 1000.0
    }

    /// Station a train reaches at the end of this section.
    pub fn arrival_station(&self, direction: Direction) -> &str {
        match direction {
            Direction::Forward => &self.end,
            Direction::Backward => &self.start,
        }
    }

    /// Whether a train travelling in `direction` can enter this section from `station`.
    pub fn departs_from(&self, station: &str, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.start == station,
            Direction::Backward => self.end == station,
        }
    }

    /// Single-track sections arbitrate between occupants.
    pub fn is_single_track(&self) -> bool {
        self.capacity == 1
    }
}

/// Entry in the train-type table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainTypeSpec {
    /// Service class.
    pub kind: TrainKind,
    /// Conflict priority; higher wins.
    pub priority: u8,
    /// Inclusive speed range drawn for each journey.
    pub speed_range_kmh: (u32, u32),
    /// Relative draw weight.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// How trains travelling in one direction start a journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartureTemplate {
    /// Section every journey in this direction starts on.
    pub section_id: String,
    /// Inclusive offset range for the initial fleet; must end short of the section end.
    pub initial_offset_m: (u32, u32),
    /// Offset used when an arrived train starts its next journey.
    pub respawn_offset_m: f64,
    /// Candidate destination stations.
    pub destinations: Vec<String>,
}

/// Departure templates keyed by direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Departures {
    /// Template for forward journeys.
    pub forward: DepartureTemplate,
    /// Template for backward journeys.
    pub backward: DepartureTemplate,
}

impl Departures {
    /// Template for the given direction.
    pub fn for_direction(&self, direction: Direction) -> &DepartureTemplate {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }
}

/// Immutable network description consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Declared stations.
    pub stations: Vec<String>,
    /// Sections in declaration order; candidate order during routing follows it.
    pub sections: Vec<Section>,
    /// Section ids forming the canonical path preferred by routing.
    pub main_route: Vec<String>,
    /// Train types available to the fleet.
    pub train_types: Vec<TrainTypeSpec>,
    /// Journey start templates.
    pub departures: Departures,
}

static DEFAULT_NETWORK: Lazy<Network> = Lazy::new(build_default_network);

impl Default for Network {
    fn default() -> Self {
        DEFAULT_NETWORK.clone()
    }
}

impl Network {
    /// Load a network from a JSON file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read network {}", path.display()))?;
        let network: Network = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse network {}", path.display()))?;
        network
            .validate()
            .with_context(|| format!("invalid network {}", path.display()))?;
        Ok(network)
    }

    /// Look up a section by id.
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == id)
    }

    /// Whether `station` is declared.
    pub fn has_station(&self, station: &str) -> bool {
        self.stations.iter().any(|s| s == station)
    }

    /// Sections touching `station` at either end.
    pub fn sections_at<'a>(&'a self, station: &'a str) -> impl Iterator<Item = &'a Section> + 'a {
        self.sections
            .iter()
            .filter(move |section| section.start == station || section.end == station)
    }

    /// Sections a train travelling in `direction` can enter from `station`.
    pub fn departures_from<'a>(
        &'a self,
        station: &'a str,
        direction: Direction,
    ) -> impl Iterator<Item = &'a Section> + 'a {
        self.sections
            .iter()
            .filter(move |section| section.departs_from(station, direction))
    }

    /// Whether `section_id` is on the main route.
    pub fn is_main_route(&self, section_id: &str) -> bool {
        self.main_route.iter().any(|id| id == section_id)
    }

    /// Train type entry for `kind`.
    pub fn train_type(&self, kind: TrainKind) -> Option<&TrainTypeSpec> {
        self.train_types.iter().find(|spec| spec.kind == kind)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.stations.is_empty() {
            return Err(NetworkError::NoStations);
        }

        let mut seen = HashSet::new();
        for section in &self.sections {
            if !seen.insert(section.id.as_str()) {
                return Err(NetworkError::DuplicateSection(section.id.clone()));
            }
            for station in [&section.start, &section.end] {
                if !self.has_station(station) {
                    return Err(NetworkError::UnknownStation {
                        section: section.id.clone(),
                        station: station.clone(),
                    });
                }
            }
            if section.capacity < 1 {
                return Err(NetworkError::ZeroCapacity(section.id.clone()));
            }
            if !(section.length_km > 0.0 && section.max_speed_kmh > 0.0) {
                return Err(NetworkError::InvalidDimensions(section.id.clone()));
            }
        }

        if let Some(missing) = self.main_route.iter().find(|id| self.section(id).is_none()) {
            return Err(NetworkError::UnknownMainRouteSection(missing.clone()));
        }

        if self.train_types.is_empty() {
            return Err(NetworkError::NoTrainTypes);
        }
        if let Some(spec) = self
            .train_types
            .iter()
            .find(|spec| spec.speed_range_kmh.0 == 0 || spec.speed_range_kmh.0 > spec.speed_range_kmh.1)
        {
            return Err(NetworkError::InvalidSpeedRange(spec.kind.to_string()));
        }

        for direction in Direction::ALL {
            self.validate_departure(direction)?;
        }
        Ok(())
    }

    fn validate_departure(&self, direction: Direction) -> Result<(), NetworkError> {
        let template = self.departures.for_direction(direction);
        let invalid = |reason: String| NetworkError::InvalidDeparture {
            direction: direction.to_string(),
            reason,
        };

        let section = self
            .section(&template.section_id)
            .ok_or_else(|| invalid(format!("unknown section {}", template.section_id)))?;
        let (low, high) = template.initial_offset_m;
        if low > high || f64::from(high) >= section.length_m() {
            return Err(invalid(format!(
                "offset range {low}..={high} does not fit {}",
                section.id
            )));
        }
        if template.respawn_offset_m < 0.0 || template.respawn_offset_m > section.length_m() {
            return Err(invalid(format!(
                "respawn offset {} does not fit {}",
                template.respawn_offset_m, section.id
            )));
        }
        if template.destinations.is_empty() {
            return Err(invalid("no destinations".to_string()));
        }
        if let Some(station) = template.destinations.iter().find(|s| !self.has_station(s)) {
            return Err(invalid(format!("unknown destination {station}")));
        }
        Ok(())
    }
}

fn section(
    id: &str,
    start: &str,
    end: &str,
    length_km: f64,
    capacity: u32,
    max_speed_kmh: f64,
    track_type: TrackType,
) -> Section {
    Section {
        id: id.to_string(),
        start: start.to_string(),
        end: end.to_string(),
        length_km,
        capacity,
        max_speed_kmh,
        track_type,
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

// Six stations on a main line A..F with a single-track B-E branch.
fn build_default_network() -> Network {
    use TrackType::{Double, Single};

    let stations = strings(&["STN_A", "STN_B", "STN_C", "STN_D", "STN_E", "STN_F"]);
    let sections = vec![
        section("SEC_1", "STN_A", "STN_B", 8.5, 2, 120.0, Double),
        section("SEC_2", "STN_B", "STN_C", 6.2, 1, 100.0, Single),
        section("SEC_3", "STN_C", "STN_D", 7.8, 2, 140.0, Double),
        section("SEC_4", "STN_D", "STN_E", 5.3, 1, 110.0, Single),
        section("SEC_5", "STN_E", "STN_F", 9.1, 3, 160.0, Double),
        section("SEC_6", "STN_B", "STN_E", 12.0, 1, 90.0, Single),
    ];
    let train_types = vec![
        TrainTypeSpec {
            kind: TrainKind::Express,
            priority: 5,
            speed_range_kmh: (140, 160),
            weight: 1,
        },
        TrainTypeSpec {
            kind: TrainKind::Freight,
            priority: 2,
            speed_range_kmh: (80, 100),
            weight: 1,
        },
        TrainTypeSpec {
            kind: TrainKind::Local,
            priority: 3,
            speed_range_kmh: (100, 120),
            weight: 1,
        },
        TrainTypeSpec {
            kind: TrainKind::HighSpeed,
            priority: 5,
            speed_range_kmh: (160, 180),
            weight: 1,
        },
    ];
    let departures = Departures {
        forward: DepartureTemplate {
            section_id: "SEC_1".to_string(),
            initial_offset_m: (0, 500),
            respawn_offset_m: 0.0,
            destinations: stations[1..].to_vec(),
        },
        backward: DepartureTemplate {
            section_id: "SEC_5".to_string(),
            initial_offset_m: (8600, 9099),
            respawn_offset_m: 0.0,
            destinations: strings(&["STN_A", "STN_B", "STN_C"]),
        },
    };

    Network {
        stations,
        sections,
        main_route: strings(&["SEC_1", "SEC_2", "SEC_3", "SEC_4", "SEC_5"]),
        train_types,
        departures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_network_is_consistent() {
        let network = Network::default();
        assert_eq!(network.validate(), Ok(()));
        for section in &network.sections {
            assert!(section.capacity >= 1);
            assert!(network.has_station(&section.start));
            assert!(network.has_station(&section.end));
        }
    }

    #[test]
    fn incident_sections_ignore_direction() {
        let network = Network::default();
        let ids: Vec<&str> = network.sections_at("STN_B").map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["SEC_1", "SEC_2", "SEC_6"]);
        assert_eq!(network.sections_at("STN_X").count(), 0);
    }

    #[test]
    fn departures_follow_direction() {
        let network = Network::default();
        let forward: Vec<&str> = network
            .departures_from("STN_B", Direction::Forward)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(forward, vec!["SEC_2", "SEC_6"]);
        let backward: Vec<&str> = network
            .departures_from("STN_E", Direction::Backward)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(backward, vec!["SEC_4", "SEC_6"]);
    }

    #[test]
    fn lookup_miss_is_none() {
        assert!(Network::default().section("SEC_99").is_none());
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut network = Network::default();
        network.sections[1].capacity = 0;
        assert_eq!(
            network.validate(),
            Err(NetworkError::ZeroCapacity("SEC_2".to_string()))
        );
    }

    #[test]
    fn rejects_dangling_station() {
        let mut network = Network::default();
        network.sections[0].end = "STN_Z".to_string();
        assert!(matches!(
            network.validate(),
            Err(NetworkError::UnknownStation { .. })
        ));
    }

    #[test]
    fn rejects_offset_outside_section() {
        let mut network = Network::default();
        network.departures.backward.initial_offset_m = (9000, 9500);
        assert!(matches!(
            network.validate(),
            Err(NetworkError::InvalidDeparture { .. })
        ));
    }

    #[test]
    fn loads_network_from_json() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("network.json");
        fs::write(&path, serde_json::to_string_pretty(&Network::default())?)?;
        let loaded = Network::load(&path)?;
        assert_eq!(loaded, Network::default());

        let mut broken = Network::default();
        broken.main_route.push("SEC_42".to_string());
        fs::write(&path, serde_json::to_string(&broken)?)?;
        assert!(Network::load(&path).is_err());
        Ok(())
    }
}
