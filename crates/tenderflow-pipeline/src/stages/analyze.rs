use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, info};

use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::traits::TextCompletion;
use tenderflow_core::types::{ChatMessage, QueryAnalysis, StageId};

use super::parse::extract_json_object;
use super::prompts::{analysis_prompt, ANALYSIS_SYSTEM};
use super::{record_exchange, Stage};
use crate::state::PipelineState;

/// Structured analysis of the original query.
pub struct Analyze {
    llm: Arc<dyn TextCompletion>,
}

impl Analyze {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self { llm }
    }
}

/// Parse the analysis model's reply, tolerating prose or a code fence around the JSON.
pub(crate) fn parse_analysis(text: &str) -> Result<QueryAnalysis> {
    let json = extract_json_object(text)
        .ok_or_else(|| TenderError::LlmParse("analysis reply contains no JSON object".into()))?;
    let analysis: QueryAnalysis = serde_json::from_str(json)
        .map_err(|e| TenderError::LlmParse(format!("analysis does not match schema: {}", e)))?;
    if analysis.query_intent.trim().is_empty() {
        return Err(TenderError::LlmParse("analysis has an empty query_intent".into()));
    }
    Ok(analysis)
}

/// Share of the analysis sections the model filled in.
fn confidence(analysis: &QueryAnalysis) -> f64 {
    let filled = [
        !analysis.query_intent.is_empty(),
        !analysis.key_concepts.is_empty(),
        analysis.temporal_aspects.is_some(),
        !analysis.document_scope.is_empty(),
        !analysis.relationship_patterns.is_empty(),
        !analysis.compliance_checks.is_empty(),
    ];
    filled.iter().filter(|f| **f).count() as f64 / filled.len() as f64
}

impl Stage for Analyze {
    fn id(&self) -> StageId {
        StageId::QueryAnalysis
    }

    fn run<'a>(&'a self, state: &'a PipelineState) -> BoxFuture<'a, Result<PipelineState>> {
        Box::pin(async move {
            info!(query = %state.original_query(), "Starting query analysis");
            let started = Instant::now();

            let messages = vec![
                ChatMessage::system(ANALYSIS_SYSTEM),
                ChatMessage::user(analysis_prompt(state.original_query())),
            ];
            let completion = self.llm.complete(messages.clone()).await?;
            let analysis = parse_analysis(&completion.text)?;
            debug!(intent = %analysis.query_intent, scope = ?analysis.document_scope, "Query analyzed");

            let context = if analysis.document_scope.is_empty() {
                state.query_context().clone()
            } else {
                state
                    .query_context()
                    .with_search_scope(analysis.document_scope.clone())
            };

            let next = record_exchange(state.clone(), self.id(), &messages, &completion)
                .with_context(context)
                .with_enhanced_query(analysis.query_intent.clone())
                .with_metric("analysis_duration", started.elapsed().as_secs_f64())
                .with_metric("analysis_confidence", confidence(&analysis))
                .with_analysis(analysis);

            info!("Query analysis completed successfully");
            Ok(next)
        })
    }
}
