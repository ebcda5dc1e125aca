#![warn(clippy::all, missing_docs)]

//! Core of the railway traffic simulator.
//!
//! This crate hosts the network model, the pull-driven simulation engine,
//! configuration handling and the views served to the terminal dashboard
//! and any future frontends.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod rng;
pub mod sim;

pub use config::AppConfig;
pub use error::{NetworkError, SimError};
pub use models::{Direction, Disruption, DisruptionKind, Severity, Train, TrainKind, TrainStatus};
pub use network::Network;
pub use sim::{Simulation, SimulationBuilder, Snapshot, Tuning};
