use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{info, warn};

use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::traits::TextCompletion;
use tenderflow_core::types::{ChatMessage, StageId};

use super::parse::{strip_code_fence, validate_cypher};
use super::prompts::{cypher_prompt, CYPHER_SYSTEM};
use super::{record_exchange, Stage};
use crate::state::{PipelineState, ValidationStatus};

/// Turns the enhanced query into a parameterized Cypher query.
pub struct Translate {
    llm: Arc<dyn TextCompletion>,
}

impl Translate {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self { llm }
    }
}

impl Stage for Translate {
    fn id(&self) -> StageId {
        StageId::CypherGeneration
    }

    fn run<'a>(&'a self, state: &'a PipelineState) -> BoxFuture<'a, Result<PipelineState>> {
        Box::pin(async move {
            info!("Starting Cypher query generation");
            let started = Instant::now();

            let enhanced = state.enhanced_query().ok_or_else(|| {
                TenderError::Validation("cypher generation requires an enhanced query".into())
            })?;

            let messages = vec![
                ChatMessage::system(CYPHER_SYSTEM),
                ChatMessage::user(cypher_prompt(enhanced, state.query_context())),
            ];
            let completion = self.llm.complete(messages.clone()).await?;
            let cypher = strip_code_fence(&completion.text);

            if let Err(e) = validate_cypher(cypher) {
                warn!(query = %cypher, error = %e, "Generated query rejected");
                return Err(e);
            }

            let next = record_exchange(state.clone(), self.id(), &messages, &completion)
                .with_generated_query(cypher)
                .with_validation_status(ValidationStatus::Valid)
                .with_metric("cypher_generation_duration", started.elapsed().as_secs_f64());

            info!("Cypher query generation completed successfully");
            Ok(next)
        })
    }
}
