//! Pooled PostgreSQL connector for data actions.

use deadpool_postgres::{Config, Pool, PoolConfig, Runtime};
use famulus_core::connector::PostgresConnectorParams;
use serde_json::Value;
use tokio_postgres::NoTls;

use crate::error::ConnectorError;

/// Shared connection pool. Concurrent runs check connections out
/// independently, so one handle serves any number of pipelines.
pub struct PostgresConnector {
    pool: Pool,
}

impl PostgresConnector {
    pub fn new(params: &PostgresConnectorParams) -> Result<Self, ConnectorError> {
        let mut config = Config::new();
        config.host = Some(params.host.clone());
        config.port = Some(params.port);
        config.user = Some(params.user.clone());
        config.password = Some(params.password.clone());
        config.dbname = Some(params.dbname.clone());
        config.pool = Some(PoolConfig::new(params.pool_size));

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ConnectorError::Database(format!("failed to create pool: {e}")))?;
        Ok(Self { pool })
    }

    pub async fn test(&self) -> Result<(), ConnectorError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ConnectorError::Database(format!("failed to get connection: {e}")))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| ConnectorError::Database(format!("probe query failed: {e}")))?;
        Ok(())
    }

    /// Run a statement. Selects return `{"rows": [...], "rowCount": n}` with
    /// one object per row; other statements return `{"affectedRows": n}`.
    pub async fn query(&self, statement: &str) -> Result<Value, ConnectorError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ConnectorError::Database(format!("failed to get connection: {e}")))?;

        let upper = statement.trim().to_uppercase();
        let is_select = upper.starts_with("SELECT") || upper.starts_with("WITH");

        if is_select {
            let rows = client
                .query(statement, &[])
                .await
                .map_err(|e| ConnectorError::Database(format!("query failed: {e}")))?;
            let json_rows: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let mut object = serde_json::Map::new();
                    for (index, column) in row.columns().iter().enumerate() {
                        object.insert(column.name().to_string(), row_value_to_json(row, index));
                    }
                    Value::Object(object)
                })
                .collect();
            Ok(serde_json::json!({
                "rows": json_rows,
                "rowCount": json_rows.len(),
            }))
        } else {
            let affected = client
                .execute(statement, &[])
                .await
                .map_err(|e| ConnectorError::Database(format!("execute failed: {e}")))?;
            Ok(serde_json::json!({ "affectedRows": affected }))
        }
    }
}

/// Convert a row value to JSON, probing the common column types.
fn row_value_to_json(row: &tokio_postgres::Row, index: usize) -> Value {
    if let Ok(v) = row.try_get::<_, Option<i64>>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<i32>>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<f64>>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<bool>>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<String>>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<Value>>(index) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(index) {
        return v
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    Value::Null
}
