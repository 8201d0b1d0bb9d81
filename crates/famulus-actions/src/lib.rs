//! Famulus Actions
//!
//! The built-in pipeline stages jobs are assembled from.
//!
//! This crate provides:
//! - The [`Action`] trait every stage implements
//! - The execution context shared by all stages of a run
//! - A registry building and validating actions from their configuration
//! - Twenty-one built-in actions covering files, web, messaging, data,
//!   filtering and flow control

pub mod actions;
pub mod context;
pub mod error;
pub mod registry;

pub use context::ExecutionContext;
pub use error::ActionError;
pub use registry::{Action, ActionRegistry};
