//! The four working stages.
//!
//! Each stage borrows its input state and returns a new one; it never
//! retries on its own. Retry and routing belong to the orchestrator.

mod analyze;
mod enhance;
mod execute;
mod parse;
mod prompts;
mod translate;

pub use analyze::Analyze;
pub use enhance::Enhance;
pub use execute::Execute;
pub use parse::{extract_json_object, strip_code_fence, validate_cypher};
pub use translate::Translate;

use futures::future::BoxFuture;

use tenderflow_core::error::Result;
use tenderflow_core::types::{ChatMessage, Completion, StageId};

use crate::state::{HistoryKind, PipelineState};

/// One unit of pipeline work.
pub trait Stage: Send + Sync + 'static {
    fn id(&self) -> StageId;

    fn run<'a>(&'a self, state: &'a PipelineState) -> BoxFuture<'a, Result<PipelineState>>;
}

/// Append the prompts sent and the response received to the history.
fn record_exchange(
    state: PipelineState,
    stage: StageId,
    messages: &[ChatMessage],
    completion: &Completion,
) -> PipelineState {
    let state = messages.iter().fold(state, |s, m| {
        s.record(stage, HistoryKind::Prompt, format!("{:?}: {}", m.role, m.content))
    });
    state.record(
        stage,
        HistoryKind::Response,
        format!("{}: {}", completion.model, completion.text),
    )
}
