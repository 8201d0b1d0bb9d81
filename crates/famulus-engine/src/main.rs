//! Famulus engine daemon.
//!
//! Loads connector and job definitions from the definitions directory and
//! runs them until shut down.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use famulus_core::{ConnectorSpec, Job};
use famulus_engine::{Engine, EngineConfig};

/// A connector definition file: the registry id plus the connection
/// parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectorFile {
    id: String,
    #[serde(flatten)]
    spec: ConnectorSpec,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,famulus_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!(host = %host, "Starting famulus engine");

    let config = EngineConfig::from_env();
    tracing::info!(
        execution_slots = config.execution_slots,
        simulation_timeout_secs = config.simulation_timeout_secs,
        "Engine configuration loaded"
    );

    let engine = Engine::new(config.clone());
    if let Some(dir) = &config.definitions_dir {
        load_definitions(&engine, dir).await?;
    } else {
        tracing::warn!("FAMULUS_DEFINITIONS_DIR not set, starting without definitions");
    }

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    tracing::info!("Shutdown signal received");

    engine.shutdown().await;
    tracing::info!("Engine stopped");
    Ok(())
}

/// Load `*.connector.json` and `*.job.json` files from the definitions
/// directory. Connectors are registered first so job validation can
/// resolve them. A definition that fails to parse or validate is logged
/// and skipped; the remaining definitions still load.
async fn load_definitions(engine: &Engine, dir: &Path) -> Result<()> {
    let mut paths: Vec<std::path::PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    let mut connectors = 0usize;
    for path in paths
        .iter()
        .filter(|p| has_suffix(p, ".connector.json"))
    {
        let parsed: Result<ConnectorFile, _> = std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str(&text).map_err(anyhow::Error::from));
        match parsed {
            Ok(file) => {
                engine.register_connector(&file.id, file.spec).await;
                connectors += 1;
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping connector definition");
            }
        }
    }

    let mut jobs = 0usize;
    for path in paths.iter().filter(|p| has_suffix(p, ".job.json")) {
        let parsed: Result<Job, _> = std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str(&text).map_err(anyhow::Error::from));
        match parsed {
            Ok(job) => match engine.submit_job_definition(job).await {
                Ok(_) => jobs += 1,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping invalid job definition");
                }
            },
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping job definition");
            }
        }
    }

    tracing::info!(connectors, jobs, "Definitions loaded");
    Ok(())
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(suffix))
}
