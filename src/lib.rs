//! Power metering device simulator
//!
//! Registers a device with an HTTP backend and then posts randomized power
//! readings for it until the configured count is reached or the process is
//! asked to stop.

pub mod backend;
pub mod config;
pub mod models;
pub mod shutdown;
pub mod simulator;

// Re-export common types for easier access
pub use backend::{BackendClient, BackendError};
pub use config::{Cli, ConfigError, SimConfig, SubmitErrorPolicy};
pub use models::{Device, NewDevice, Reading};
pub use simulator::{PowerGenerator, RunSummary, SimulationError, SimulationState, Simulator};
