//! Connector definitions.

use serde::{Deserialize, Serialize};

/// Capability family a connector belongs to. Actions and triggers declare
/// which family they need; resolving a connector of another family is a
/// configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectorFamily {
    FileHandling,
    Web,
    Messaging,
    Data,
}

impl ConnectorFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorFamily::FileHandling => "fileHandling",
            ConnectorFamily::Web => "web",
            ConnectorFamily::Messaging => "messaging",
            ConnectorFamily::Data => "data",
        }
    }
}

/// Connection parameters of a named external system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectorSpec {
    LocalFile(LocalFileParams),
    Http(HttpConnectorParams),
    Nats(NatsConnectorParams),
    Postgres(PostgresConnectorParams),
}

impl ConnectorSpec {
    pub fn family(&self) -> ConnectorFamily {
        match self {
            ConnectorSpec::LocalFile(_) => ConnectorFamily::FileHandling,
            ConnectorSpec::Http(_) => ConnectorFamily::Web,
            ConnectorSpec::Nats(_) => ConnectorFamily::Messaging,
            ConnectorSpec::Postgres(_) => ConnectorFamily::Data,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConnectorSpec::LocalFile(_) => "localFile",
            ConnectorSpec::Http(_) => "http",
            ConnectorSpec::Nats(_) => "nats",
            ConnectorSpec::Postgres(_) => "postgres",
        }
    }
}

/// Filesystem access rooted at a directory. File parameters of actions are
/// resolved relative to the root; escaping it is a configuration error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFileParams {
    pub root: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConnectorParams {
    /// Prefixed to relative request urls.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Headers sent with every request.
    #[serde(default)]
    pub headers: Vec<(String, String)>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatsConnectorParams {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConnectorParams {
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub dbname: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_pool_size() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connector_tagging_and_family() {
        let spec: ConnectorSpec = serde_json::from_value(json!({
            "type": "localFile",
            "root": "/var/data"
        }))
        .unwrap();
        assert_eq!(spec.family(), ConnectorFamily::FileHandling);
        assert_eq!(spec.kind(), "localFile");

        let spec: ConnectorSpec = serde_json::from_value(json!({
            "type": "postgres",
            "host": "db.internal",
            "user": "famulus",
            "dbname": "jobs"
        }))
        .unwrap();
        assert_eq!(spec.family(), ConnectorFamily::Data);
        match spec {
            ConnectorSpec::Postgres(p) => {
                assert_eq!(p.port, 5432);
                assert_eq!(p.pool_size, 4);
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }
}
