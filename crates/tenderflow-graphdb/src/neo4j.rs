use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use tracing::debug;

use tenderflow_core::config::DatabaseConfig;
use tenderflow_core::error::{DatabaseErrorKind, Result, TenderError};
use tenderflow_core::retry::{retry, RetryPolicy};
use tenderflow_core::traits::GraphClient;
use tenderflow_core::types::Row;

use crate::wire::{decode_rows, CommitRequest, Statement};

/// Pooled Neo4j client over the HTTP transactional endpoint.
///
/// Transient failures (`ServiceUnavailable`, `SessionExpired`) are retried
/// here with the configured backoff; the pipeline does not retry again.
pub struct Neo4jClient {
    http: Client,
    base_uri: String,
    username: String,
    password: Option<String>,
    default_database: String,
    retry: RetryPolicy,
}

impl Neo4jClient {
    pub fn new(config: &DatabaseConfig, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .pool_max_idle_per_host(config.max_connection_pool_size)
            .pool_idle_timeout(Duration::from_secs(config.max_connection_lifetime_secs))
            .connect_timeout(Duration::from_secs(
                config.connection_acquisition_timeout_secs,
            ))
            .build()
            .map_err(|e| TenderError::Config(format!("failed to build HTTP client: {}", e)))?;

        debug!(uri = %config.uri, database = %config.database, "Neo4j client created");

        Ok(Self {
            http,
            base_uri: config.uri.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            default_database: config.database.clone(),
            retry,
        })
    }

    fn commit_url(&self, database: &str) -> String {
        format!("{}/db/{}/tx/commit", self.base_uri, database)
    }

    async fn commit_once(
        &self,
        url: &str,
        query: &str,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<Row>> {
        let body = CommitRequest {
            statements: vec![Statement {
                statement: query,
                parameters,
            }],
        };

        let response = self
            .http
            .post(url)
            .basic_auth(&self.username, self.password.as_deref())
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_connect() || e.is_timeout() {
                    DatabaseErrorKind::ServiceUnavailable
                } else {
                    DatabaseErrorKind::Protocol
                };
                TenderError::database(kind, e.to_string())
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            TenderError::database(DatabaseErrorKind::SessionExpired, e.to_string())
        })?;

        if let Some(kind) = classify_status(status) {
            return Err(TenderError::database(
                kind,
                format!("HTTP {}: {}", status, text),
            ));
        }

        decode_rows(&text)
    }
}

/// Map a non-success HTTP status to an error kind. Success yields `None`.
fn classify_status(status: StatusCode) -> Option<DatabaseErrorKind> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::BAD_GATEWAY
        | StatusCode::GATEWAY_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => DatabaseErrorKind::ServiceUnavailable,
        _ => DatabaseErrorKind::Query,
    })
}

impl GraphClient for Neo4jClient {
    fn execute_query(
        &self,
        query: &str,
        parameters: serde_json::Map<String, serde_json::Value>,
        database: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<Row>>> {
        let query = query.to_string();
        let database = database.unwrap_or(&self.default_database).to_string();

        Box::pin(async move {
            let url = self.commit_url(&database);
            let rows = retry(&self.retry, "neo4j.execute_query", |_| {
                self.commit_once(&url, &query, &parameters)
            })
            .await?;
            debug!(rows = rows.len(), database = %database, "Query executed");
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(uri: &str) -> DatabaseConfig {
        DatabaseConfig {
            uri: uri.to_string(),
            password: Some("secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_commit_url_uses_database() {
        let client =
            Neo4jClient::new(&config("http://localhost:7474/"), RetryPolicy::immediate(1)).unwrap();
        assert_eq!(
            client.commit_url("tenders"),
            "http://localhost:7474/db/tenders/tx/commit"
        );
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::OK), None);
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            Some(DatabaseErrorKind::ServiceUnavailable)
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            Some(DatabaseErrorKind::Query)
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_service_unavailable() {
        // Port 9 (discard) is closed on test hosts; the connect fails fast.
        let client =
            Neo4jClient::new(&config("http://127.0.0.1:9"), RetryPolicy::immediate(2)).unwrap();
        let err = client
            .execute_query("RETURN 1", serde_json::Map::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenderError::Database { kind: DatabaseErrorKind::ServiceUnavailable, .. }
        ));
    }
}
