//! Tick driver, configuration, and service wiring for the Conquest
//! warfare core.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `conquest-config.yaml` into
//!   strongly-typed structs.
//! - [`services`] -- The [`Conquest`] container that builds and restores
//!   every manager.
//! - [`tick`] -- The periodic sweep over time-bounded transitions.
//! - [`runner`] -- The interval loop around the tick, with stop control.
//!
//! [`Conquest`]: services::Conquest

pub mod config;
pub mod runner;
pub mod services;
pub mod tick;

pub use config::{ConfigError, ConquestConfig};
pub use runner::{DriverControl, DriverReport, RunnerError, run_driver};
pub use services::Conquest;
pub use tick::{TickDriver, TickError, TickSummary};
