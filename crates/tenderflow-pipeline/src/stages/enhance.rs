use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::info;

use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::traits::TextCompletion;
use tenderflow_core::types::{ChatMessage, StageId};

use super::prompts::{enhancement_prompt, ENHANCEMENT_SYSTEM};
use super::{record_exchange, Stage};
use crate::state::PipelineState;

/// Expands the analyzed query into a richer search specification.
pub struct Enhance {
    llm: Arc<dyn TextCompletion>,
}

impl Enhance {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self { llm }
    }
}

impl Stage for Enhance {
    fn id(&self) -> StageId {
        StageId::QueryEnhancement
    }

    fn run<'a>(&'a self, state: &'a PipelineState) -> BoxFuture<'a, Result<PipelineState>> {
        Box::pin(async move {
            info!("Starting query enhancement");
            let started = Instant::now();

            let analysis = state.analysis().ok_or_else(|| {
                TenderError::Validation("query enhancement requires analysis results".into())
            })?;

            let messages = vec![
                ChatMessage::system(ENHANCEMENT_SYSTEM),
                ChatMessage::user(enhancement_prompt(state.original_query(), analysis)),
            ];
            let completion = self.llm.complete(messages.clone()).await?;
            let enhanced = completion.text.trim();
            if enhanced.is_empty() {
                return Err(TenderError::LlmParse("enhancement reply is empty".into()));
            }

            let next = record_exchange(state.clone(), self.id(), &messages, &completion)
                .with_enhanced_query(enhanced)
                .with_metric("enhancement_duration", started.elapsed().as_secs_f64());

            info!("Query enhancement completed successfully");
            Ok(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderflow_core::types::{QueryAnalysis, QueryContext};
    use tenderflow_test_utils::{fixtures, FailingThenOk, ScriptedCompletion};

    fn analyzed() -> PipelineState {
        PipelineState::new(fixtures::NETWORK_QUERY, QueryContext::default())
            .with_enhanced_query("Find network infrastructure requirements")
            .with_analysis(QueryAnalysis {
                query_intent: "Find network infrastructure requirements".into(),
                key_concepts: vec!["network".into()],
                temporal_aspects: None,
                document_scope: vec!["Technical".into()],
                relationship_patterns: vec![],
                compliance_checks: vec![],
            })
    }

    #[tokio::test]
    async fn test_enhancement_replaces_enhanced_query() {
        let llm = Arc::new(ScriptedCompletion::always("claude", fixtures::ENHANCED_QUERY));
        let out = Enhance::new(llm.clone()).run(&analyzed()).await.unwrap();
        assert_eq!(out.enhanced_query(), Some(fixtures::ENHANCED_QUERY));
        assert!(out.metrics().contains_key("enhancement_duration"));

        let sent = &llm.received()[0];
        assert!(sent[1].content.contains(fixtures::NETWORK_QUERY));
        assert!(sent[1].content.contains("\"key_concepts\""));
    }

    #[tokio::test]
    async fn test_missing_analysis_is_fatal() {
        let llm = Arc::new(ScriptedCompletion::always("claude", "x"));
        let state = PipelineState::new("q", QueryContext::default());
        let err = Enhance::new(llm.clone()).run(&state).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_collaborator_failure_propagates() {
        let llm = Arc::new(ScriptedCompletion::new("claude").fail("HTTP 500"));
        let err = Enhance::new(llm).run(&analyzed()).await.unwrap_err();
        assert!(matches!(err, TenderError::LlmRequest(_)));
    }

    #[tokio::test]
    async fn test_stage_makes_one_attempt_per_run() {
        let llm = Arc::new(FailingThenOk::new(1, fixtures::ENHANCED_QUERY));
        let stage = Enhance::new(llm.clone());

        let err = stage.run(&analyzed()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(llm.calls(), 1);

        let out = stage.run(&analyzed()).await.unwrap();
        assert_eq!(out.enhanced_query(), Some(fixtures::ENHANCED_QUERY));
        assert_eq!(llm.calls(), 2);
    }
}
