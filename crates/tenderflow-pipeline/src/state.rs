use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tenderflow_core::types::{MetricValue, QueryAnalysis, QueryContext, QueryResult, RunId, StageId};

/// Outcome of checking the generated graph query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Prompt,
    Response,
    StageStarted,
    StageCompleted,
    StageFailed,
    Retry,
    Done,
    Failed,
}

/// One line of the append-only run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stage: StageId,
    pub kind: HistoryKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The record threaded through every stage of one run.
///
/// A state is never changed after it has been handed to a stage. Every
/// `with_*` method consumes the value and returns the updated copy, so
/// a stage derives its output from `input.clone()` and the input stays
/// as it was. History and metrics only grow.
#[derive(Debug, Clone)]
pub struct PipelineState {
    run_id: RunId,
    original_query: String,
    query_context: QueryContext,
    enhanced_query: Option<String>,
    analysis: Option<QueryAnalysis>,
    generated_query: Option<String>,
    validation_status: ValidationStatus,
    results: Vec<QueryResult>,
    current_stage: StageId,
    history: Vec<HistoryEntry>,
    last_error: Option<String>,
    retry_counts: BTreeMap<StageId, u32>,
    metrics: BTreeMap<String, MetricValue>,
    started_at: DateTime<Utc>,
}

impl PipelineState {
    /// Initial state of a run: positioned at query analysis, no retries used.
    pub fn new(original_query: impl Into<String>, query_context: QueryContext) -> Self {
        Self {
            run_id: RunId::new(),
            original_query: original_query.into(),
            query_context,
            enhanced_query: None,
            analysis: None,
            generated_query: None,
            validation_status: ValidationStatus::Unknown,
            results: Vec::new(),
            current_stage: StageId::QueryAnalysis,
            history: Vec::new(),
            last_error: None,
            retry_counts: BTreeMap::new(),
            metrics: BTreeMap::new(),
            started_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    pub fn query_context(&self) -> &QueryContext {
        &self.query_context
    }

    pub fn enhanced_query(&self) -> Option<&str> {
        self.enhanced_query.as_deref()
    }

    pub fn analysis(&self) -> Option<&QueryAnalysis> {
        self.analysis.as_ref()
    }

    pub fn generated_query(&self) -> Option<&str> {
        self.generated_query.as_deref()
    }

    pub fn validation_status(&self) -> ValidationStatus {
        self.validation_status
    }

    pub fn results(&self) -> &[QueryResult] {
        &self.results
    }

    pub fn current_stage(&self) -> StageId {
        self.current_stage
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }

    /// Re-entries recorded for `stage`.
    pub fn retry_count(&self, stage: StageId) -> u32 {
        self.retry_counts.get(&stage).copied().unwrap_or(0)
    }

    /// Re-entries recorded across all stages.
    pub fn total_retries(&self) -> u32 {
        self.retry_counts.values().sum()
    }

    pub fn metrics(&self) -> &BTreeMap<String, MetricValue> {
        &self.metrics
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds since the run started.
    pub fn duration_secs(&self) -> f64 {
        (Utc::now() - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn with_context(mut self, query_context: QueryContext) -> Self {
        self.query_context = query_context;
        self
    }

    pub fn with_enhanced_query(mut self, enhanced_query: impl Into<String>) -> Self {
        self.enhanced_query = Some(enhanced_query.into());
        self
    }

    pub fn with_analysis(mut self, analysis: QueryAnalysis) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_generated_query(mut self, generated_query: impl Into<String>) -> Self {
        self.generated_query = Some(generated_query.into());
        self
    }

    pub fn with_validation_status(mut self, status: ValidationStatus) -> Self {
        self.validation_status = status;
        self
    }

    pub fn with_results(mut self, results: Vec<QueryResult>) -> Self {
        self.results = results;
        self
    }

    pub fn at_stage(mut self, stage: StageId) -> Self {
        self.current_stage = stage;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.last_error = error;
        self
    }

    /// Count one more re-entry of `stage`.
    pub fn with_retry(mut self, stage: StageId) -> Self {
        *self.retry_counts.entry(stage).or_insert(0) += 1;
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    /// Append a history entry attributed to `stage`.
    pub fn record(mut self, stage: StageId, kind: HistoryKind, message: impl Into<String>) -> Self {
        self.history.push(HistoryEntry {
            stage,
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        });
        self
    }
}
