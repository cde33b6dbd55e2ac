//! Tender retrieval pipeline: stages, workflow graph and orchestrator.
//!
//! A run takes a natural-language question through four stages
//! (analysis, enhancement, Cypher generation, execution) and ends with
//! ranked [`QueryResult`](tenderflow_core::types::QueryResult)s or a
//! terminal error.

pub mod graph;
pub mod run_log;
pub mod stages;
pub mod state;
pub mod summary;

pub use graph::{
    Orchestrator, PipelineResponse, RecoveryDecision, RecoveryRouter, RunReport, TransitionTable,
    WorkflowNode,
};
pub use run_log::RunLogger;
pub use stages::Stage;
pub use state::{HistoryEntry, HistoryKind, PipelineState, ValidationStatus};
pub use summary::{
    analyze_results, export_metrics, performance_summary, PerformanceSummary, ResultStatistics,
};
