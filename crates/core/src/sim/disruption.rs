//! Section disruptions: random creation, expiry and lookups.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::{
    error::SimError,
    models::{Disruption, DisruptionKind, Severity},
    network::Network,
    rng::{pick, RandomSource},
    sim::tuning::Tuning,
};

/// What changed during one [`Disruptions::advance`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisruptionChanges {
    /// Section that received a new disruption.
    pub created: Option<String>,
    /// Sections whose disruption expired.
    pub cleared: Vec<String>,
}

/// Active disruptions keyed by section. At most one per section.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Disruptions {
    active: BTreeMap<String, Disruption>,
}

impl Disruptions {
    /// Roll for a new disruption, then drop expired ones.
    pub fn advance(
        &mut self,
        network: &Network,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
        tuning: &Tuning,
    ) -> DisruptionChanges {
        let mut changes = DisruptionChanges::default();

        if rng.chance(tuning.disruption_chance) {
            let free: Vec<&str> = network
                .sections
                .iter()
                .map(|section| section.id.as_str())
                .filter(|id| !self.active.contains_key(*id))
                .collect();
            if let Some(section_id) = pick(rng, &free).map(|id| id.to_string()) {
                let kind = pick(rng, &DisruptionKind::ALL)
                    .copied()
                    .unwrap_or(DisruptionKind::Maintenance);
                let severity = pick(rng, &Severity::ALL).copied().unwrap_or(Severity::Low);
                let minutes = tuning.disruption_minutes.sample(rng).max(1);
                let disruption = Disruption {
                    section_id: section_id.clone(),
                    kind,
                    start_time: now,
                    end_time: now + Duration::minutes(i64::from(minutes)),
                    duration_minutes: minutes,
                    severity,
                };
                info!(
                    section = %section_id,
                    kind = %kind,
                    severity = %severity,
                    minutes,
                    "New disruption"
                );
                self.active.insert(section_id.clone(), disruption);
                changes.created = Some(section_id);
            }
        }

        self.active.retain(|section_id, disruption| {
            if disruption.is_expired_at(now) {
                info!(section = %section_id, "Disruption cleared");
                changes.cleared.push(section_id.clone());
                false
            } else {
                true
            }
        });

        changes
    }

    /// Install a disruption, enforcing the one-per-section and window rules.
    /// An expired entry that has not been swept yet is replaced.
    pub fn insert(&mut self, network: &Network, disruption: Disruption) -> Result<(), SimError> {
        if network.section(&disruption.section_id).is_none() {
            return Err(SimError::UnknownSection(disruption.section_id));
        }
        if disruption.end_time <= disruption.start_time {
            return Err(SimError::EmptyDisruptionWindow(disruption.section_id));
        }
        if self.is_disrupted(&disruption.section_id, disruption.start_time) {
            return Err(SimError::SectionAlreadyDisrupted(disruption.section_id));
        }
        info!(
            section = %disruption.section_id,
            kind = %disruption.kind,
            severity = %disruption.severity,
            minutes = disruption.duration_minutes,
            "Disruption injected"
        );
        self.active
            .insert(disruption.section_id.clone(), disruption);
        Ok(())
    }

    /// Disruption recorded for `section_id`, active or not.
    pub fn get(&self, section_id: &str) -> Option<&Disruption> {
        self.active.get(section_id)
    }

    /// Whether `section_id` is disrupted at `now`.
    pub fn is_disrupted(&self, section_id: &str, now: DateTime<Utc>) -> bool {
        self.get(section_id)
            .map(|disruption| disruption.is_active_at(now))
            .unwrap_or(false)
    }

    /// Ids of sections carrying a disruption.
    pub fn section_ids(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    /// All recorded disruptions, keyed by section.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Disruption)> {
        self.active.iter()
    }

    /// Number of recorded disruptions.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no disruption is recorded.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
