use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{info, warn};

use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::traits::GraphClient;
use tenderflow_core::types::{QueryContext, QueryResult, Relationship, Row, StageId};

use super::Stage;
use crate::state::{HistoryKind, PipelineState};

/// Runs the generated query against the graph database.
pub struct Execute {
    db: Arc<dyn GraphClient>,
    database: Option<String>,
}

impl Execute {
    pub fn new(db: Arc<dyn GraphClient>) -> Self {
        Self { db, database: None }
    }

    /// Target a named database instead of the client's default.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

/// Query parameters derived from the context.
pub(crate) fn query_parameters(context: &QueryContext) -> serde_json::Map<String, Value> {
    let mut params = serde_json::Map::new();
    params.insert("document_types".into(), context.search_scope().into());
    params.insert("threshold".into(), context.relevance_threshold().into());
    params.insert("max_results".into(), (context.max_results() as u64).into());
    params
}

fn node_id(row: &Row) -> Result<String> {
    match row.get("id") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        other => Err(TenderError::Validation(format!(
            "result row has no usable id: {:?}",
            other
        ))),
    }
}

fn object_field(row: &Row, key: &str) -> Option<serde_json::Map<String, Value>> {
    match row.get(key) {
        Some(Value::Object(map)) => Some(map.clone()),
        _ => None,
    }
}

fn relationships(row: &Row) -> Vec<Relationship> {
    let Some(Value::Array(items)) = row.get("relationships") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|rel| {
            let text = |key: &str| match rel.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            let target = match text("end_node") {
                t if t.is_empty() => text("target"),
                t => t,
            };
            Relationship {
                rel_type: text("type"),
                target,
                properties: rel
                    .get("properties")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            }
        })
        .collect()
}

/// Map one database row to a validated result.
pub(crate) fn map_row(row: &Row, include_metadata: bool) -> Result<QueryResult> {
    let score = match row.get("score") {
        None | Some(Value::Null) => 1.0,
        Some(v) => v.as_f64().ok_or_else(|| {
            TenderError::Validation(format!("result score is not a number: {}", v))
        })?,
    };

    let mut result = QueryResult::new(
        node_id(row)?,
        object_field(row, "properties").unwrap_or_default(),
        score,
    )?
    .with_relationships(relationships(row))?;

    if include_metadata {
        if let Some(metadata) = object_field(row, "metadata") {
            result = result.with_metadata(metadata);
        }
    }
    Ok(result)
}

impl Stage for Execute {
    fn id(&self) -> StageId {
        StageId::QueryExecution
    }

    fn run<'a>(&'a self, state: &'a PipelineState) -> BoxFuture<'a, Result<PipelineState>> {
        Box::pin(async move {
            info!("Starting query execution");
            let started = Instant::now();

            let query = state.generated_query().ok_or_else(|| {
                TenderError::Validation("query execution requires a generated query".into())
            })?;
            let context = state.query_context();

            let rows = self
                .db
                .execute_query(query, query_parameters(context), self.database.as_deref())
                .await?;

            let mut results = rows
                .iter()
                .map(|row| map_row(row, context.include_metadata()))
                .collect::<Result<Vec<_>>>()?;

            if results.len() > context.max_results() {
                warn!(
                    returned = results.len(),
                    max_results = context.max_results(),
                    "Database returned more rows than requested, truncating"
                );
                results.truncate(context.max_results());
            }

            let count = results.len();
            let next = state
                .clone()
                .record(
                    self.id(),
                    HistoryKind::Response,
                    format!("{} rows returned", rows.len()),
                )
                .with_results(results)
                .with_metric("execution_time", started.elapsed().as_secs_f64())
                .with_metric("result_count", count);

            info!(result_count = count, "Query execution completed");
            Ok(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenderflow_core::error::DatabaseErrorKind;
    use tenderflow_test_utils::{fixtures, StubGraphClient};

    fn ready(context: QueryContext) -> PipelineState {
        PipelineState::new(fixtures::NETWORK_QUERY, context)
            .with_generated_query(fixtures::CYPHER_QUERY)
    }

    #[tokio::test]
    async fn test_rows_mapped_to_results() {
        let db = Arc::new(StubGraphClient::new(vec![fixtures::network_row()]));
        let out = Execute::new(db.clone())
            .run(&ready(QueryContext::default()))
            .await
            .unwrap();

        let results = out.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_id(), "123");
        assert_eq!(results[0].relevance_score(), 0.95);
        assert_eq!(results[0].content()["title"], json!("Network Infrastructure Tender"));
        assert_eq!(results[0].metadata().unwrap()["version"], json!("1.0"));
        assert_eq!(
            results[0].relationships(),
            [Relationship::new("REQUIRES", "456").with_property("priority", json!("high"))]
        );
        assert_eq!(out.metrics()["result_count"].as_f64(), Some(1.0));

        let (query, params) = &db.received()[0];
        assert_eq!(query, fixtures::CYPHER_QUERY);
        assert_eq!(params["document_types"], json!(["Technical", "Requirements"]));
        assert_eq!(params["threshold"], json!(0.7));
        assert_eq!(params["max_results"], json!(100));
    }

    #[test]
    fn test_missing_score_defaults_to_one() {
        let row = fixtures::row(json!({"id": 7, "properties": {"title": "x"}}));
        let result = map_row(&row, true).unwrap();
        assert_eq!(result.node_id(), "7");
        assert_eq!(result.relevance_score(), 1.0);
        assert!(result.metadata().is_none());
        assert!(result.relationships().is_empty());
    }

    #[test]
    fn test_metadata_gated_by_context() {
        let result = map_row(&fixtures::network_row(), false).unwrap();
        assert!(result.metadata().is_none());
    }

    #[test]
    fn test_invalid_rows_rejected() {
        let out_of_range = fixtures::row(json!({"id": "1", "score": 1.7}));
        assert!(matches!(map_row(&out_of_range, true), Err(TenderError::Validation(_))));

        let no_target = fixtures::row(json!({
            "id": "1",
            "relationships": [{"type": "REQUIRES"}]
        }));
        assert!(matches!(map_row(&no_target, true), Err(TenderError::Validation(_))));

        let no_id = fixtures::row(json!({"score": 0.5}));
        assert!(map_row(&no_id, true).is_err());
    }

    #[tokio::test]
    async fn test_results_truncated_to_max_results() {
        let rows = (0..5)
            .map(|i| fixtures::row(json!({"id": i.to_string(), "score": 0.9})))
            .collect();
        let context = QueryContext::new(vec!["Technical".into()], 0.5, 3, false).unwrap();
        let out = Execute::new(Arc::new(StubGraphClient::new(rows)))
            .run(&ready(context))
            .await
            .unwrap();
        assert_eq!(out.results().len(), 3);
    }

    #[tokio::test]
    async fn test_database_error_surfaces_unchanged() {
        let db = Arc::new(
            StubGraphClient::new(vec![fixtures::network_row()])
                .fail_first(1, DatabaseErrorKind::ServiceUnavailable),
        );
        let err = Execute::new(db.clone())
            .run(&ready(QueryContext::default()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenderError::Database { kind: DatabaseErrorKind::ServiceUnavailable, .. }
        ));
        assert_eq!(db.calls(), 1);
    }

    #[tokio::test]
    async fn test_named_database_reaches_client() {
        let db = Arc::new(StubGraphClient::new(vec![fixtures::network_row()]));
        Execute::new(db.clone())
            .run(&ready(QueryContext::default()))
            .await
            .unwrap();
        Execute::new(db.clone())
            .with_database("tenders")
            .run(&ready(QueryContext::default()))
            .await
            .unwrap();
        assert_eq!(db.databases(), vec![None, Some("tenders".to_string())]);
    }
}
