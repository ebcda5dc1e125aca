#![allow(missing_docs)]

//! Error types surfaced by the simulation core.

use thiserror::Error;

/// Problems found while validating a network topology.
#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    #[error("network declares no stations")]
    NoStations,
    #[error("section {0} is declared more than once")]
    DuplicateSection(String),
    #[error("section {section} references unknown station {station}")]
    UnknownStation { section: String, station: String },
    #[error("section {0} must have a capacity of at least 1")]
    ZeroCapacity(String),
    #[error("section {0} must have a positive length and speed limit")]
    InvalidDimensions(String),
    #[error("main route references unknown section {0}")]
    UnknownMainRouteSection(String),
    #[error("train type table is empty")]
    NoTrainTypes,
    #[error("train type {0} has an invalid speed range")]
    InvalidSpeedRange(String),
    #[error("departure template for {direction} trains is invalid: {reason}")]
    InvalidDeparture { direction: String, reason: String },
}

/// Engine-level faults. Routine traffic conditions are never errors.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("unknown section {0}")]
    UnknownSection(String),
    #[error("section {0} already has an active disruption")]
    SectionAlreadyDisrupted(String),
    #[error("disruption on {0} must end after it starts")]
    EmptyDisruptionWindow(String),
    #[error("inconsistent simulation state: {0}")]
    Inconsistent(String),
}
