//! Registry resolving connector names to shared live handles.

use std::collections::HashMap;
use std::sync::Arc;

use famulus_core::connector::{ConnectorFamily, ConnectorSpec};
use tokio::sync::RwLock;

use crate::error::ConnectorError;
use crate::file::FileConnector;
use crate::http::HttpConnector;
use crate::nats::NatsConnector;
use crate::postgres::PostgresConnector;

/// A built connector handle. Every variant is pooled or connection-safe,
/// so handles are shared across concurrent runs.
#[derive(Clone)]
pub enum LiveConnector {
    File(Arc<FileConnector>),
    Http(Arc<HttpConnector>),
    Nats(Arc<NatsConnector>),
    Postgres(Arc<PostgresConnector>),
}

impl std::fmt::Debug for LiveConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnector")
            .field("family", &self.family().as_str())
            .finish()
    }
}

impl LiveConnector {
    pub async fn test(&self) -> Result<(), ConnectorError> {
        match self {
            LiveConnector::File(c) => c.test().await,
            LiveConnector::Http(c) => c.test().await,
            LiveConnector::Nats(c) => c.test().await,
            LiveConnector::Postgres(c) => c.test().await,
        }
    }

    pub fn family(&self) -> ConnectorFamily {
        match self {
            LiveConnector::File(_) => ConnectorFamily::FileHandling,
            LiveConnector::Http(_) => ConnectorFamily::Web,
            LiveConnector::Nats(_) => ConnectorFamily::Messaging,
            LiveConnector::Postgres(_) => ConnectorFamily::Data,
        }
    }
}

/// Named connector configurations and their cached live handles.
///
/// Handles are built on first resolution and reused until the definition
/// is replaced.
#[derive(Default)]
pub struct ConnectorRegistry {
    specs: RwLock<HashMap<String, ConnectorSpec>>,
    live: RwLock<HashMap<String, LiveConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load or replace a connector definition. A replaced definition drops
    /// the cached handle; running pipelines keep the handle they resolved.
    pub async fn register(&self, id: &str, spec: ConnectorSpec) {
        tracing::info!(connector = %id, kind = %spec.kind(), "registering connector");
        self.specs.write().await.insert(id.to_string(), spec);
        self.live.write().await.remove(id);
    }

    pub async fn remove(&self, id: &str) {
        self.specs.write().await.remove(id);
        self.live.write().await.remove(id);
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.specs.read().await.contains_key(id)
    }

    pub async fn family_of(&self, id: &str) -> Option<ConnectorFamily> {
        self.specs.read().await.get(id).map(|spec| spec.family())
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.specs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Build an ephemeral handle for a definition under test. Used when a
    /// definition is submitted and before a run starts.
    pub async fn test_spec(spec: &ConnectorSpec) -> Result<(), ConnectorError> {
        build(spec).await?.test().await
    }

    /// Resolve a name to its live handle, building and caching it on first
    /// use.
    pub async fn resolve(&self, id: &str) -> Result<LiveConnector, ConnectorError> {
        {
            let live = self.live.read().await;
            if let Some(handle) = live.get(id) {
                return Ok(handle.clone());
            }
        }

        let spec = self
            .specs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ConnectorError::Configuration(format!("unknown connector: {id}")))?;
        let handle = build(&spec).await?;
        self.live
            .write()
            .await
            .insert(id.to_string(), handle.clone());
        Ok(handle)
    }

    pub async fn resolve_file(&self, id: &str) -> Result<Arc<FileConnector>, ConnectorError> {
        match self.resolve(id).await? {
            LiveConnector::File(connector) => Ok(connector),
            other => Err(wrong_family(id, ConnectorFamily::FileHandling, other.family())),
        }
    }

    pub async fn resolve_http(&self, id: &str) -> Result<Arc<HttpConnector>, ConnectorError> {
        match self.resolve(id).await? {
            LiveConnector::Http(connector) => Ok(connector),
            other => Err(wrong_family(id, ConnectorFamily::Web, other.family())),
        }
    }

    pub async fn resolve_nats(&self, id: &str) -> Result<Arc<NatsConnector>, ConnectorError> {
        match self.resolve(id).await? {
            LiveConnector::Nats(connector) => Ok(connector),
            other => Err(wrong_family(id, ConnectorFamily::Messaging, other.family())),
        }
    }

    pub async fn resolve_postgres(
        &self,
        id: &str,
    ) -> Result<Arc<PostgresConnector>, ConnectorError> {
        match self.resolve(id).await? {
            LiveConnector::Postgres(connector) => Ok(connector),
            other => Err(wrong_family(id, ConnectorFamily::Data, other.family())),
        }
    }
}

async fn build(spec: &ConnectorSpec) -> Result<LiveConnector, ConnectorError> {
    match spec {
        ConnectorSpec::LocalFile(params) => {
            Ok(LiveConnector::File(Arc::new(FileConnector::new(params))))
        }
        ConnectorSpec::Http(params) => {
            Ok(LiveConnector::Http(Arc::new(HttpConnector::new(params)?)))
        }
        ConnectorSpec::Nats(params) => Ok(LiveConnector::Nats(Arc::new(
            NatsConnector::connect(params).await?,
        ))),
        ConnectorSpec::Postgres(params) => Ok(LiveConnector::Postgres(Arc::new(
            PostgresConnector::new(params)?,
        ))),
    }
}

fn wrong_family(id: &str, expected: ConnectorFamily, actual: ConnectorFamily) -> ConnectorError {
    ConnectorError::Configuration(format!(
        "connector '{id}' is a {} connector, expected {}",
        actual.as_str(),
        expected.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use famulus_core::connector::LocalFileParams;

    #[tokio::test]
    async fn test_resolve_unknown_connector() {
        let registry = ConnectorRegistry::new();
        let err = registry.resolve("nope").await.unwrap_err();
        assert!(err.to_string().contains("unknown connector"));
    }

    #[tokio::test]
    async fn test_resolve_caches_handles() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectorRegistry::new();
        registry
            .register(
                "files",
                ConnectorSpec::LocalFile(LocalFileParams {
                    root: dir.path().to_string_lossy().to_string(),
                }),
            )
            .await;

        let first = registry.resolve_file("files").await.unwrap();
        let second = registry.resolve_file("files").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_wrong_family_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectorRegistry::new();
        registry
            .register(
                "files",
                ConnectorSpec::LocalFile(LocalFileParams {
                    root: dir.path().to_string_lossy().to_string(),
                }),
            )
            .await;

        let err = registry.resolve_http("files").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
        assert!(err.to_string().contains("expected web"));
    }

    #[tokio::test]
    async fn test_family_of() {
        let registry = ConnectorRegistry::new();
        registry
            .register(
                "files",
                ConnectorSpec::LocalFile(LocalFileParams {
                    root: "/tmp".to_string(),
                }),
            )
            .await;
        assert_eq!(
            registry.family_of("files").await,
            Some(ConnectorFamily::FileHandling)
        );
        assert_eq!(registry.family_of("nope").await, None);
    }
}
