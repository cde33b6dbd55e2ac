use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tenderflow_core::config::PipelineConfig;
use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::event::EventBus;
use tenderflow_core::traits::{GraphClient, TextCompletion};
use tenderflow_core::types::{
    EventKind, MetricValue, PipelineEvent, QueryContext, QueryResult, RunId, StageId,
};
use tenderflow_store::{cache_key, ResultCache};

use super::edge::{Outcome, TransitionTable, WorkflowNode};
use super::router::{RecoveryDecision, RecoveryRouter};
use crate::run_log::RunLogger;
use crate::stages::{Analyze, Enhance, Execute, Stage, Translate};
use crate::state::{HistoryKind, PipelineState, ValidationStatus};

/// How long a finished run waits for its JSONL logger to drain.
const LOGGER_DRAIN: Duration = Duration::from_secs(5);

/// Final state of one run plus its terminal error, if it failed.
#[derive(Debug)]
pub struct RunReport {
    pub state: PipelineState,
    pub error: Option<TenderError>,
}

/// What `run_pipeline` hands back to callers.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    pub results: Vec<QueryResult>,
    pub performance_metrics: BTreeMap<String, MetricValue>,
    pub error: Option<String>,
}

/// Drives one run at a time through the workflow graph; any number of runs
/// may share one orchestrator concurrently.
pub struct Orchestrator {
    stages: Vec<Arc<dyn Stage>>,
    table: TransitionTable,
    router: RecoveryRouter,
    stage_timeout: Duration,
    default_context: QueryContext,
    monitoring: bool,
    events: Arc<EventBus>,
    cache: Option<ResultCache>,
    run_log_dir: Option<PathBuf>,
}

impl Orchestrator {
    /// Build the standard pipeline: analysis on one model, enhancement and
    /// query generation on the other, execution against `graph`.
    ///
    /// Fails with `Config` when `config` does not validate.
    pub fn new(
        analysis_llm: Arc<dyn TextCompletion>,
        generation_llm: Arc<dyn TextCompletion>,
        graph: Arc<dyn GraphClient>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        Ok(Self {
            stages: vec![
                Arc::new(Analyze::new(analysis_llm)),
                Arc::new(Enhance::new(generation_llm.clone())),
                Arc::new(Translate::new(generation_llm)),
                Arc::new(Execute::new(graph)),
            ],
            table: TransitionTable::standard(),
            router: RecoveryRouter::from_config(config)?,
            stage_timeout: Duration::from_secs(config.stage_timeout_secs),
            default_context: config.default_context()?,
            monitoring: config.enable_performance_monitoring,
            events: Arc::new(EventBus::default()),
            cache: None,
            run_log_dir: None,
        })
    }

    /// Replace the stage with the same id.
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        let index = stage.id().index();
        self.stages[index] = stage;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Write each run's events as JSONL under `dir`.
    pub fn with_run_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_log_dir = Some(dir.into());
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn transition_table(&self) -> &TransitionTable {
        &self.table
    }

    /// Run the pipeline; `Ok` carries the completed state.
    pub async fn run(&self, query: &str, context: Option<QueryContext>) -> Result<PipelineState> {
        let report = self
            .execute(query, context, &CancellationToken::new())
            .await;
        match report.error {
            Some(e) => Err(e),
            None => Ok(report.state),
        }
    }

    /// Run the pipeline and flatten the outcome into a response.
    ///
    /// A failed run returns no results, never a partial list.
    pub async fn run_pipeline(
        &self,
        query: &str,
        context: Option<QueryContext>,
    ) -> PipelineResponse {
        let report = self
            .execute(query, context, &CancellationToken::new())
            .await;
        let performance_metrics = if self.monitoring {
            report.state.metrics().clone()
        } else {
            BTreeMap::new()
        };
        match report.error {
            Some(e) => PipelineResponse {
                results: Vec::new(),
                performance_metrics,
                error: Some(e.to_string()),
            },
            None => PipelineResponse {
                results: report.state.results().to_vec(),
                performance_metrics,
                error: None,
            },
        }
    }

    /// Run the pipeline until it finishes, fails, or `cancel` fires.
    ///
    /// Cancellation is checked before every stage and also interrupts a
    /// stage call or retry backoff in progress.
    pub async fn execute(
        &self,
        query: &str,
        context: Option<QueryContext>,
        cancel: &CancellationToken,
    ) -> RunReport {
        let context = context.unwrap_or_else(|| self.default_context.clone());
        let state = PipelineState::new(query, context);
        let run_id = state.run_id().clone();
        let logger = self.spawn_run_logger(&run_id);

        info!(run_id = %run_id, query, "Starting pipeline execution");
        self.emit(&run_id, EventKind::RunStarted { query: query.to_string() });

        let key = self
            .cache
            .as_ref()
            .map(|_| cache_key(query, state.query_context()));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(results) = cache.get(key).await {
                info!(run_id = %run_id, result_count = results.len(), "Serving results from cache");
                let count = results.len();
                let duration = state.duration_secs();
                let state = state
                    .with_results(results)
                    .with_metric("cache_hit", 1i64)
                    .with_metric("total_duration", duration);
                self.emit(&run_id, EventKind::CacheHit { result_count: count });
                finish_run_logger(logger).await;
                return RunReport { state, error: None };
            }
        }

        let (state, outcome) = self.drive(state, cancel).await;
        let state = if key.is_some() {
            state.with_metric("cache_hit", 0i64)
        } else {
            state
        };

        let duration_ms = (state.duration_secs() * 1000.0) as u64;
        let error = match outcome {
            Ok(()) => {
                if let (Some(cache), Some(key)) = (&self.cache, &key) {
                    cache.put(key, state.results()).await;
                }
                info!(
                    run_id = %run_id,
                    result_count = state.results().len(),
                    duration_ms,
                    "Pipeline completed successfully"
                );
                self.emit(
                    &run_id,
                    EventKind::RunCompleted {
                        result_count: state.results().len(),
                        duration_ms,
                    },
                );
                None
            }
            Err(e) => {
                error!(run_id = %run_id, query, error = %e, "Pipeline execution failed");
                self.emit(
                    &run_id,
                    EventKind::RunFailed {
                        stage: e.stage(),
                        error: e.to_string(),
                    },
                );
                Some(e)
            }
        };

        finish_run_logger(logger).await;
        RunReport { state, error }
    }

    /// Walk the graph from the entry node to a terminal node.
    async fn drive(
        &self,
        mut state: PipelineState,
        cancel: &CancellationToken,
    ) -> (PipelineState, Result<()>) {
        let run_id = state.run_id().clone();
        let mut node = WorkflowNode::ENTRY;
        let mut pending: Option<TenderError> = None;
        let mut terminal: Option<TenderError> = None;

        loop {
            let outcome = match node {
                WorkflowNode::Done => {
                    let stage = state.current_stage();
                    let duration = state.duration_secs();
                    let state = state
                        .with_metric("total_duration", duration)
                        .record(stage, HistoryKind::Done, "pipeline completed");
                    return (state, Ok(()));
                }
                WorkflowNode::Failed => {
                    let error = terminal.take().unwrap_or_else(|| {
                        TenderError::Config("workflow reached failed without an error".into())
                    });
                    let stage = state.current_stage();
                    let duration = state.duration_secs();
                    let state = state
                        .with_metric("total_duration", duration)
                        .record(stage, HistoryKind::Failed, error.to_string());
                    return (state, Err(error));
                }
                WorkflowNode::ErrorHandler => {
                    let stage = state.current_stage();
                    let error = pending.take().unwrap_or_else(|| {
                        TenderError::Config("error handler entered without a failure".into())
                    });

                    match self.router.route(&state, &error) {
                        RecoveryDecision::Retry { backoff } => {
                            state = state.with_retry(stage);
                            let attempt = state.retry_count(stage) + 1;
                            let backoff_ms = backoff.as_millis() as u64;
                            warn!(
                                run_id = %run_id,
                                stage = %stage,
                                attempt,
                                backoff_ms,
                                query = %state.original_query(),
                                error = %error,
                                "Re-entering failed stage"
                            );
                            state = state.record(
                                stage,
                                HistoryKind::Retry,
                                format!("attempt {} after {}ms: {}", attempt, backoff_ms, error),
                            );
                            self.emit(
                                &run_id,
                                EventKind::RetryScheduled { stage, attempt, backoff_ms },
                            );

                            let slept = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => false,
                                _ = tokio::time::sleep(backoff) => true,
                            };
                            if !slept {
                                return cancelled(state);
                            }
                            Outcome::Recover(stage)
                        }
                        RecoveryDecision::Exhausted => {
                            state = state.with_retry(stage);
                            let attempts = state.retry_count(stage);
                            error!(
                                run_id = %run_id,
                                stage = %stage,
                                attempts,
                                query = %state.original_query(),
                                error = %error,
                                "Max retries exceeded"
                            );
                            terminal = Some(TenderError::MaxRetriesExceeded {
                                stage,
                                attempts,
                                last_error: error.to_string(),
                            });
                            Outcome::GiveUp
                        }
                        RecoveryDecision::Fatal => {
                            error!(
                                run_id = %run_id,
                                stage = %stage,
                                query = %state.original_query(),
                                error = %error,
                                "Stage failed without retry"
                            );
                            terminal = Some(TenderError::StageFailed {
                                stage,
                                source: Box::new(error),
                            });
                            Outcome::GiveUp
                        }
                    }
                }
                working => {
                    let Some(stage) = working.stage() else {
                        return (
                            state,
                            Err(TenderError::Config(format!("{} is not a stage", working))),
                        );
                    };
                    if cancel.is_cancelled() {
                        return cancelled(state);
                    }

                    let attempt = state.retry_count(stage) + 1;
                    state = state.at_stage(stage).record(
                        stage,
                        HistoryKind::StageStarted,
                        format!("attempt {}", attempt),
                    );
                    self.emit(&run_id, EventKind::StageStarted { stage, attempt });
                    debug!(run_id = %run_id, stage = %stage, attempt, "Entering stage");

                    let started = Instant::now();
                    let result = {
                        let run = tokio::time::timeout(
                            self.stage_timeout,
                            self.stages[stage.index()].run(&state),
                        );
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            r = run => Some(r.unwrap_or_else(|_| Err(TenderError::StageTimeout {
                                stage,
                                timeout_secs: self.stage_timeout.as_secs(),
                            }))),
                        }
                    };
                    let Some(result) = result else {
                        return cancelled(state);
                    };
                    let duration_ms = started.elapsed().as_millis() as u64;

                    match result {
                        Ok(next) => {
                            state = next.with_error(None).record(
                                stage,
                                HistoryKind::StageCompleted,
                                format!("attempt {} in {}ms", attempt, duration_ms),
                            );
                            self.emit(
                                &run_id,
                                EventKind::StageCompleted { stage, attempt, duration_ms },
                            );
                            self.emit(
                                &run_id,
                                EventKind::StageProgress {
                                    stage,
                                    percent: ((stage.index() + 1) * 100 / StageId::ALL.len()) as u8,
                                },
                            );
                            Outcome::Success
                        }
                        Err(e) => {
                            let retryable = e.is_retryable() && RecoveryRouter::is_retried(stage);
                            error!(
                                run_id = %run_id,
                                stage = %stage,
                                attempt,
                                retryable,
                                query = %state.original_query(),
                                error = %e,
                                "Stage attempt failed"
                            );
                            if stage == StageId::CypherGeneration
                                && matches!(e, TenderError::Validation(_))
                            {
                                state = state.with_validation_status(ValidationStatus::Invalid);
                            }
                            state = state.with_error(Some(e.to_string())).record(
                                stage,
                                HistoryKind::StageFailed,
                                format!("attempt {}: {}", attempt, e),
                            );
                            self.emit(
                                &run_id,
                                EventKind::StageFailed {
                                    stage,
                                    attempt,
                                    error: e.to_string(),
                                    retryable,
                                },
                            );
                            pending = Some(e);
                            Outcome::Failure
                        }
                    }
                }
            };

            node = match self.table.next(node, outcome) {
                Some(next) => next,
                None => {
                    return (
                        state,
                        Err(TenderError::Config(format!(
                            "no transition from {} on {:?}",
                            node, outcome
                        ))),
                    )
                }
            };
        }
    }

    fn emit(&self, run_id: &RunId, kind: EventKind) {
        self.events.publish(PipelineEvent::new(run_id.clone(), kind));
    }

    fn spawn_run_logger(&self, run_id: &RunId) -> Option<(JoinHandle<()>, CancellationToken)> {
        let dir = self.run_log_dir.as_ref()?;
        // Subscribe before the first event is published
        let rx = self.events.subscribe();
        let token = CancellationToken::new();
        let logger = RunLogger::new(dir.clone());
        let handle = tokio::spawn(logger.run(rx, run_id.clone(), token.clone()));
        Some((handle, token))
    }
}

fn cancelled(state: PipelineState) -> (PipelineState, Result<()>) {
    let stage = state.current_stage();
    warn!(run_id = %state.run_id(), stage = %stage, "Pipeline run cancelled");
    let state = state
        .with_error(Some(TenderError::Cancelled.to_string()))
        .record(stage, HistoryKind::Failed, "cancelled");
    (state, Err(TenderError::Cancelled))
}

async fn finish_run_logger(logger: Option<(JoinHandle<()>, CancellationToken)>) {
    if let Some((handle, token)) = logger {
        if tokio::time::timeout(LOGGER_DRAIN, handle).await.is_err() {
            warn!("Run logger did not drain in time");
            token.cancel();
        }
    }
}
