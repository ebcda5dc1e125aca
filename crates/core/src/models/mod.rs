//! Shared domain models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of travel along the network's canonical orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Travelling from a section's start station towards its end station.
    Forward,
    /// Travelling from a section's end station towards its start station.
    Backward,
}

impl Direction {
    /// Both directions, in declaration order.
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Backward];

    /// Lowercase wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service class of a train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrainKind {
    /// Long-distance express service.
    Express,
    /// Goods train.
    Freight,
    /// Stopping passenger service.
    Local,
    /// High-speed passenger service.
    #[serde(rename = "High-Speed")]
    HighSpeed,
}

impl TrainKind {
    /// Display label matching the wire format.
    pub fn as_str(self) -> &'static str {
        match self {
            TrainKind::Express => "Express",
            TrainKind::Freight => "Freight",
            TrainKind::Local => "Local",
            TrainKind::HighSpeed => "High-Speed",
        }
    }
}

impl fmt::Display for TrainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational status of a train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrainStatus {
    /// Moving normally.
    #[serde(rename = "On time")]
    OnTime,
    /// Yielding to a higher-priority train on a single-track section.
    #[serde(rename = "Delayed")]
    Delayed,
    /// Held because the current section is disrupted.
    #[serde(rename = "Waiting - Section Disrupted")]
    WaitingDisrupted,
    /// Held behind another train on a single-track section.
    #[serde(rename = "Waiting - Traffic")]
    WaitingTraffic,
    /// Parked at a section boundary with no onward section.
    #[serde(rename = "Waiting - No Route")]
    WaitingNoRoute,
    /// Reached the destination; replaced by a new journey on the next tick.
    #[serde(rename = "Arrived")]
    Arrived,
    /// Withdrawn from service.
    #[serde(rename = "Cancelled")]
    Cancelled,
}

impl TrainStatus {
    /// Every status, in declaration order.
    pub const ALL: [TrainStatus; 7] = [
        TrainStatus::OnTime,
        TrainStatus::Delayed,
        TrainStatus::WaitingDisrupted,
        TrainStatus::WaitingTraffic,
        TrainStatus::WaitingNoRoute,
        TrainStatus::Arrived,
        TrainStatus::Cancelled,
    ];

    /// Wire label, e.g. `Waiting - Traffic`.
    pub fn as_str(self) -> &'static str {
        match self {
            TrainStatus::OnTime => "On time",
            TrainStatus::Delayed => "Delayed",
            TrainStatus::WaitingDisrupted => "Waiting - Section Disrupted",
            TrainStatus::WaitingTraffic => "Waiting - Traffic",
            TrainStatus::WaitingNoRoute => "Waiting - No Route",
            TrainStatus::Arrived => "Arrived",
            TrainStatus::Cancelled => "Cancelled",
        }
    }

    /// One of the `Waiting - *` statuses.
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            TrainStatus::WaitingDisrupted
                | TrainStatus::WaitingTraffic
                | TrainStatus::WaitingNoRoute
        )
    }

    /// Counts towards section occupancy.
    pub fn occupies_track(self) -> bool {
        !matches!(self, TrainStatus::Arrived | TrainStatus::Cancelled)
    }
}

impl fmt::Display for TrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a train currently is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Section the train is on.
    pub section_id: String,
    /// Metres travelled into the section.
    pub position_m: f64,
}

/// A train and its current journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    /// Stable identifier, e.g. `TR001`.
    pub train_id: String,
    /// Service class.
    #[serde(rename = "type")]
    pub kind: TrainKind,
    /// Higher values win single-track conflicts.
    pub priority: u8,
    /// Top speed assigned for this journey.
    pub max_speed_kmh: u32,
    /// Consist length.
    pub length_m: u32,
    /// Direction of travel.
    pub direction: Direction,
    /// Station that ends the journey.
    pub destination_station: String,
    /// Current section and offset.
    pub current_location: Location,
    /// Operational status.
    pub status: TrainStatus,
    /// Journey start.
    #[serde(rename = "actual_departure")]
    pub departure_time: DateTime<Utc>,
    /// Set once the train arrives.
    #[serde(rename = "actual_arrival")]
    pub arrival_time: Option<DateTime<Utc>>,
    /// Running under a speed restriction.
    pub restricted_speed: bool,
    /// End of the current breakdown, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown_until: Option<DateTime<Utc>>,
    /// Number of journeys started, including the current one.
    pub journey_count: u32,
}

impl Train {
    /// Section id the train is on.
    pub fn section_id(&self) -> &str {
        &self.current_location.section_id
    }

    /// Whether a breakdown is still in force at `now`.
    pub fn is_broken_down(&self, now: DateTime<Utc>) -> bool {
        self.breakdown_until.map(|until| now < until).unwrap_or(false)
    }
}

/// Cause of a section disruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisruptionKind {
    /// Planned maintenance.
    Maintenance,
    /// Signalling fault.
    SignalFailure,
    /// Engineering works on the track.
    TrackWork,
    /// Emergency closure.
    Emergency,
}

impl DisruptionKind {
    /// Every kind, drawn uniformly by the disruption manager.
    pub const ALL: [DisruptionKind; 4] = [
        DisruptionKind::Maintenance,
        DisruptionKind::SignalFailure,
        DisruptionKind::TrackWork,
        DisruptionKind::Emergency,
    ];

    /// snake_case wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            DisruptionKind::Maintenance => "maintenance",
            DisruptionKind::SignalFailure => "signal_failure",
            DisruptionKind::TrackWork => "track_work",
            DisruptionKind::Emergency => "emergency",
        }
    }
}

impl fmt::Display for DisruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How badly a disruption affects traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minor.
    Low,
    /// Moderate.
    Medium,
    /// Severe; trains on the section run at reduced speed.
    High,
}

impl Severity {
    /// Every severity, drawn uniformly by the disruption manager.
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

    /// Lowercase wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-bounded disruption on one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disruption {
    /// Affected section.
    pub section_id: String,
    /// Cause.
    #[serde(rename = "type")]
    pub kind: DisruptionKind,
    /// Inclusive start.
    pub start_time: DateTime<Utc>,
    /// Exclusive end.
    pub end_time: DateTime<Utc>,
    /// Length of the window in minutes.
    pub duration_minutes: u32,
    /// Impact level.
    pub severity: Severity,
}

impl Disruption {
    /// Active iff `now` lies in `[start_time, end_time)`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }

    /// Expired iff `now >= end_time`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn status_labels_round_trip_through_serde() -> anyhow::Result<()> {
        for status in TrainStatus::ALL {
            let encoded = serde_json::to_string(&status)?;
            assert_eq!(encoded, format!("\"{}\"", status.as_str()));
            let decoded: TrainStatus = serde_json::from_str(&encoded)?;
            assert_eq!(decoded, status);
        }
        Ok(())
    }

    #[test]
    fn high_speed_uses_hyphenated_label() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&TrainKind::HighSpeed)?, "\"High-Speed\"");
        Ok(())
    }

    #[test]
    fn disruption_window_is_half_open() {
        let start = Utc::now();
        let disruption = Disruption {
            section_id: "SEC_1".to_string(),
            kind: DisruptionKind::Maintenance,
            start_time: start,
            end_time: start + Duration::minutes(10),
            duration_minutes: 10,
            severity: Severity::Low,
        };
        assert!(disruption.is_active_at(start));
        assert!(disruption.is_active_at(start + Duration::minutes(9)));
        assert!(!disruption.is_active_at(start + Duration::minutes(10)));
        assert!(disruption.is_expired_at(start + Duration::minutes(10)));
    }

    #[test]
    fn occupancy_excludes_terminal_statuses() {
        assert!(TrainStatus::OnTime.occupies_track());
        assert!(TrainStatus::WaitingNoRoute.occupies_track());
        assert!(!TrainStatus::Arrived.occupies_track());
        assert!(!TrainStatus::Cancelled.occupies_track());
    }
}
