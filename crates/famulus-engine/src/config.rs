//! Engine configuration.

use std::path::PathBuf;

/// Runtime settings for the engine, read from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global cap on concurrently running jobs.
    pub execution_slots: usize,
    /// How often the waiting queue is scanned for promotable runs.
    pub queue_poll_ms: u64,
    /// Hard deadline for a single simulation.
    pub simulation_timeout_secs: u64,
    /// Messages pulled per fetch on message triggered jobs.
    pub message_batch: usize,
    /// How long a fetch waits for messages before returning empty.
    pub message_wait_ms: u64,
    /// Directory scanned for `*.connector.json` and `*.job.json` files
    /// at startup.
    pub definitions_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            execution_slots: std::env::var("FAMULUS_EXECUTION_SLOTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            queue_poll_ms: std::env::var("FAMULUS_QUEUE_POLL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            simulation_timeout_secs: std::env::var("FAMULUS_SIMULATION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            message_batch: std::env::var("FAMULUS_MESSAGE_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            message_wait_ms: std::env::var("FAMULUS_MESSAGE_WAIT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
            definitions_dir: std::env::var("FAMULUS_DEFINITIONS_DIR").ok().map(PathBuf::from),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_slots: 5,
            queue_poll_ms: 1000,
            simulation_timeout_secs: 300,
            message_batch: 10,
            message_wait_ms: 5000,
            definitions_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.execution_slots, 5);
        assert_eq!(config.queue_poll_ms, 1000);
        assert_eq!(config.simulation_timeout_secs, 300);
        assert!(config.definitions_dir.is_none());
    }
}
