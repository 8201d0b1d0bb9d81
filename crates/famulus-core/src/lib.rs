//! Famulus Core
//!
//! Shared data model for the famulus job execution engine.
//!
//! This crate provides:
//! - Data items and their wire shape
//! - Job, trigger, action and connector definitions
//! - Execution records and the run state machine
//! - The template engine used for parameter substitution
//! - The per-job persisted key/value store

pub mod action;
pub mod connector;
pub mod error;
pub mod execution;
pub mod item;
pub mod job;
pub mod state;
pub mod template;
pub mod trigger;

pub use action::{ActionParams, ActionSpec, ConcurrencyPolicy};
pub use connector::{ConnectorFamily, ConnectorSpec};
pub use error::{ConfigError, TemplateError};
pub use execution::{CancelFlag, ExecutionState, JobExecution};
pub use item::DataItem;
pub use job::Job;
pub use state::JobStateStore;
pub use template::TemplateEngine;
pub use trigger::TriggerSpec;
