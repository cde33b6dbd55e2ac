//! Workflow graph: the transition table, the recovery router, and the
//! orchestrator that walks them.
//!
//! The orchestrator starts at `query_analysis` and follows the edge picked
//! by each stage's outcome. Failures go to `error_handler`, where the
//! recovery router either re-enters the failed stage after a backoff or
//! gives up and ends the run at `failed`.

pub mod edge;
pub mod executor;
pub mod router;

pub use edge::{Edge, EdgeCondition, Outcome, TransitionTable, WorkflowNode};
pub use executor::{Orchestrator, PipelineResponse, RunReport};
pub use router::{RecoveryDecision, RecoveryRouter};
