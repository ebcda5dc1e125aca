//! Railway traffic simulation: state, tick logic and views.

pub mod disruption;
pub mod engine;
pub mod lifecycle;
pub mod motion;
pub mod occupancy;
pub mod routing;
pub mod snapshot;
pub mod state;
pub mod tuning;

pub use engine::{Simulation, SimulationBuilder};
pub use snapshot::{DisruptionsView, FleetSummary, HealthReport, Snapshot, StateView};
pub use state::{SimulationState, TickReport};
pub use tuning::Tuning;
