use serde_json::{json, Value};

use tenderflow_core::config::PipelineConfig;
use tenderflow_core::types::{QueryContext, Row};

pub const NETWORK_QUERY: &str = "What are the network infrastructure requirements?";

pub const ENHANCED_QUERY: &str = "Enhanced query with technical specifications";

pub const CYPHER_QUERY: &str = "MATCH (d:Document)-[r]->(t) \
WHERE d.type IN $document_types AND d.score >= $threshold \
RETURN d.id AS id, properties(d) AS properties, d.score AS score, \
{document_type: d.type} AS metadata, \
[{type: type(r), end_node: t.id, properties: properties(r)}] AS relationships \
LIMIT $max_results";

/// Analysis model output for [`NETWORK_QUERY`], wrapped in a Markdown fence.
pub fn analysis_reply() -> String {
    let body = json!({
        "query_intent": "Find network infrastructure requirements",
        "key_concepts": ["network", "infrastructure", "requirements"],
        "temporal_aspects": {
            "valid_from": "2024-01-01",
            "valid_to": "2024-12-31",
            "is_current": true
        },
        "document_scope": ["Technical", "Requirements"],
        "relationship_patterns": ["REQUIRES"],
        "compliance_checks": ["ISO 27001"]
    });
    format!("Here is the analysis:\n```json\n{:#}\n```", body)
}

/// Database row for a network infrastructure tender node.
pub fn network_row() -> Row {
    row(json!({
        "id": "123",
        "properties": {
            "title": "Network Infrastructure Tender",
            "description": "Specifications for network setup",
            "created_at": "2024-01-15"
        },
        "score": 0.95,
        "metadata": {
            "document_type": "Technical",
            "version": "1.0"
        },
        "relationships": [
            {
                "type": "REQUIRES",
                "end_node": "456",
                "properties": {"priority": "high"}
            }
        ]
    }))
}

/// Build a row from a JSON object literal.
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row fixture must be an object, got {}", other),
    }
}

/// A narrower context than the default.
pub fn sample_context() -> QueryContext {
    QueryContext::new(
        vec!["Technical".into(), "Requirements".into()],
        0.8,
        50,
        true,
    )
    .unwrap()
}

/// Pipeline settings with `max_retries` attempts and a 1ms backoff.
pub fn fast_pipeline_config(max_retries: u32) -> PipelineConfig {
    PipelineConfig {
        max_retries,
        retry_delay_secs: 0.001,
        max_retry_delay_secs: 0.001,
        ..Default::default()
    }
}
