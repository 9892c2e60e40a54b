pub mod calendar;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod loan;
pub mod manager;

pub use error::{SimulationError, SimulationResult};
