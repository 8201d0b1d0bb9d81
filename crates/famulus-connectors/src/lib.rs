//! Famulus Connectors
//!
//! Live handles for the external systems jobs read and write.
//!
//! This crate provides:
//! - Root-scoped local filesystem access
//! - An HTTP client handle for web request actions
//! - NATS messaging with pull-based message sources
//! - Pooled PostgreSQL access for data actions
//! - The registry resolving connector names to shared handles

pub mod error;
pub mod file;
pub mod http;
pub mod nats;
pub mod postgres;
pub mod registry;

pub use error::ConnectorError;
pub use file::{FileConnector, FileInfo};
pub use http::{HttpConnector, HttpResponse};
pub use nats::{InboundMessage, MessageSource, NatsConnector};
pub use postgres::PostgresConnector;
pub use registry::{ConnectorRegistry, LiveConnector};
