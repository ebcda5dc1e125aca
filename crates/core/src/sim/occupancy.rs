//! Section occupancy, derived from train positions every tick.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{models::Train, network::Section};

/// Which trains are on which section.
///
/// Only [`Occupancy::rebuild`] produces a populated value, so the map always
/// reflects the train table it was built from. Counts may exceed a section's
/// capacity; capacity is enforced by the motion engine, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Occupancy {
    by_section: BTreeMap<String, Vec<String>>,
}

impl Occupancy {
    /// Group active trains by section, in train-iteration order.
    pub fn rebuild<'a>(trains: impl IntoIterator<Item = &'a Train>) -> Self {
        let mut by_section: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for train in trains {
            if !train.status.occupies_track() {
                continue;
            }
            by_section
                .entry(train.current_location.section_id.clone())
                .or_default()
                .push(train.train_id.clone());
        }
        Self { by_section }
    }

    /// Trains on `section_id`, first occupant first.
    pub fn occupants(&self, section_id: &str) -> &[String] {
        self.by_section
            .get(section_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of trains on `section_id`.
    pub fn count(&self, section_id: &str) -> usize {
        self.occupants(section_id).len()
    }

    /// Whether the section holds as many trains as it is rated for.
    pub fn is_at_capacity(&self, section: &Section) -> bool {
        self.count(&section.id) >= section.capacity as usize
    }

    /// Occupied sections with their counts.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.by_section
            .iter()
            .map(|(id, trains)| (id.clone(), trains.len()))
            .collect()
    }

    /// Whether no section is occupied.
    pub fn is_empty(&self) -> bool {
        self.by_section.is_empty()
    }
}
