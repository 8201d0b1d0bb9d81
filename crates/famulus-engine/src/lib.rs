//! Famulus Engine
//!
//! The part of famulus that makes jobs actually run.
//!
//! This crate provides:
//! - The [`Engine`] facade: job lifecycle, firing, history, simulation
//! - Six-field cron schedules with second resolution
//! - The bounded execution slot pool and the FIFO waiting queue
//! - Trigger tasks for cron and message driven jobs
//! - The staged pipeline executor moving data items between actions

pub mod config;
pub mod cron;
mod dispatcher;
pub mod engine;
pub mod executor;
pub mod history;
pub mod simulation;

pub use config::EngineConfig;
pub use cron::CronSchedule;
pub use engine::{Engine, EngineError};
pub use executor::{RunError, SimulationGate, SnapshotCollector, StageSnapshot};
pub use simulation::SimulationReport;
