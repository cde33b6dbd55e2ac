//! Natural-language retrieval over a graph of tender documents.
//!
//! [`TenderPipeline`] wires an [`AppConfig`] to the concrete collaborators
//! (two language models, a Neo4j database, an optional result cache) and
//! runs questions through the four-stage workflow:
//!
//! ```no_run
//! # async fn demo() -> tenderflow::Result<()> {
//! let config = tenderflow::AppConfig::load(std::path::Path::new("tenderflow.toml"))?;
//! let pipeline = tenderflow::TenderPipeline::from_config(config)?;
//! let response = pipeline
//!     .run_pipeline("What are the network infrastructure requirements?", None)
//!     .await;
//! println!("{} results", response.results.len());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tenderflow_core::retry::RetryPolicy;
use tenderflow_core::traits::{GraphClient, TextCompletion};
use tenderflow_graphdb::Neo4jClient;
use tenderflow_llm::create_client;
use tenderflow_pipeline::stages::Execute;

pub use tenderflow_core::config::{AppConfig, RetryBudget};
pub use tenderflow_core::types::{
    EventKind, MetricValue, PipelineEvent, QueryContext, QueryResult, Relationship, StageId,
    TemporalAspects,
};
pub use tenderflow_core::{logging, EventBus, Result, TenderError};
pub use tenderflow_pipeline::{
    analyze_results, export_metrics, performance_summary, Orchestrator, PipelineResponse,
    PipelineState, RunReport,
};
pub use tenderflow_store::{load_results, save_results, ResultCache, ResultFormat};

/// A configured pipeline, shareable across concurrent runs.
pub struct TenderPipeline {
    orchestrator: Orchestrator,
    config: AppConfig,
}

impl TenderPipeline {
    /// Build every collaborator from `config`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let analysis = create_client(&config.analysis_model);
        let generation = create_client(&config.generation_model);
        let retry = RetryPolicy::from_config(&config.pipeline)?;
        let graph = Neo4jClient::new(&config.database, retry)?;
        Self::with_collaborators(config, analysis, generation, Arc::new(graph))
    }

    /// Build around caller-supplied collaborators; cache and run-log
    /// settings still come from `config`.
    pub fn with_collaborators(
        config: AppConfig,
        analysis: Arc<dyn TextCompletion>,
        generation: Arc<dyn TextCompletion>,
        graph: Arc<dyn GraphClient>,
    ) -> Result<Self> {
        config.validate()?;
        let execute = Execute::new(graph.clone()).with_database(config.database.database.clone());
        let mut orchestrator = Orchestrator::new(analysis, generation, graph, &config.pipeline)?
            .with_stage(Arc::new(execute));

        if config.cache.enabled {
            let path = config.cache_path();
            match ResultCache::open(&path) {
                Ok(cache) => orchestrator = orchestrator.with_cache(cache),
                // The cache is advisory
                Err(e) => warn!(path = %path.display(), error = %e, "Result cache disabled"),
            }
        }
        if let Some(dir) = &config.log.run_log_dir {
            orchestrator = orchestrator.with_run_log_dir(PathBuf::from(dir));
        }

        info!(
            analysis_model = %config.analysis_model.model_id,
            generation_model = %config.generation_model.model_id,
            database = %config.database.uri,
            "Tender pipeline ready"
        );
        Ok(Self { orchestrator, config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Subscribe here for progress events of every run.
    pub fn events(&self) -> Arc<EventBus> {
        self.orchestrator.events()
    }

    pub async fn run_pipeline(
        &self,
        query: &str,
        context: Option<QueryContext>,
    ) -> PipelineResponse {
        self.orchestrator.run_pipeline(query, context).await
    }

    pub async fn run(&self, query: &str, context: Option<QueryContext>) -> Result<PipelineState> {
        self.orchestrator.run(query, context).await
    }

    pub async fn run_with_cancel(
        &self,
        query: &str,
        context: Option<QueryContext>,
        cancel: &CancellationToken,
    ) -> RunReport {
        self.orchestrator.execute(query, context, cancel).await
    }
}

/// One-shot entry point: build a pipeline from `config` and run `query`.
///
/// Setup failures are reported in the response like run failures.
pub async fn run_pipeline(
    config: AppConfig,
    query: &str,
    context: Option<QueryContext>,
) -> PipelineResponse {
    match TenderPipeline::from_config(config) {
        Ok(pipeline) => pipeline.run_pipeline(query, context).await,
        Err(e) => PipelineResponse {
            results: Vec::new(),
            performance_metrics: Default::default(),
            error: Some(e.to_string()),
        },
    }
}
