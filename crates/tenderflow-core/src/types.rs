use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TenderError};

/// A single row returned by the graph database, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Unique identifier of one pipeline run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four working stages of the retrieval pipeline, in execution order.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    QueryAnalysis,
    QueryEnhancement,
    CypherGeneration,
    QueryExecution,
}

impl StageId {
    pub const ALL: [StageId; 4] = [
        StageId::QueryAnalysis,
        StageId::QueryEnhancement,
        StageId::CypherGeneration,
        StageId::QueryExecution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryAnalysis => "query_analysis",
            Self::QueryEnhancement => "query_enhancement",
            Self::CypherGeneration => "cypher_generation",
            Self::QueryExecution => "query_execution",
        }
    }

    /// The stage that follows this one, or `None` for the last stage.
    pub fn next(&self) -> Option<StageId> {
        match self {
            Self::QueryAnalysis => Some(Self::QueryEnhancement),
            Self::QueryEnhancement => Some(Self::CypherGeneration),
            Self::CypherGeneration => Some(Self::QueryExecution),
            Self::QueryExecution => None,
        }
    }

    /// Position of the stage in the pipeline, starting at zero.
    pub fn index(&self) -> usize {
        match self {
            Self::QueryAnalysis => 0,
            Self::QueryEnhancement => 1,
            Self::CypherGeneration => 2,
            Self::QueryExecution => 3,
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageId {
    type Err = TenderError;

    fn from_str(s: &str) -> Result<Self> {
        StageId::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| TenderError::Config(format!("Unknown stage: {}", s)))
    }
}

/// Role in a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message sent to a text-completion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// A finished model response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

impl Completion {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
        }
    }
}

// ── QueryContext ────────────────────────────────────────────────

/// Search constraints for one pipeline run.
///
/// Fields are private so a context can only be obtained through
/// [`QueryContext::new`] (or deserialization, which runs the same checks);
/// every instance therefore satisfies the range invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQueryContext")]
pub struct QueryContext {
    search_scope: Vec<String>,
    relevance_threshold: f64,
    max_results: usize,
    include_metadata: bool,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawQueryContext {
    #[serde(default = "default_search_scope")]
    search_scope: Vec<String>,
    #[serde(default = "default_relevance_threshold")]
    relevance_threshold: f64,
    #[serde(default = "default_max_results")]
    max_results: usize,
    #[serde(default = "default_include_metadata")]
    include_metadata: bool,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl TryFrom<RawQueryContext> for QueryContext {
    type Error = TenderError;

    fn try_from(raw: RawQueryContext) -> Result<Self> {
        let mut ctx = QueryContext::new(
            raw.search_scope,
            raw.relevance_threshold,
            raw.max_results,
            raw.include_metadata,
        )?;
        ctx.created_at = raw.created_at;
        Ok(ctx)
    }
}

pub fn default_search_scope() -> Vec<String> {
    vec!["Technical".to_string(), "Requirements".to_string()]
}
pub fn default_relevance_threshold() -> f64 { 0.7 }
pub fn default_max_results() -> usize { 100 }
pub fn default_include_metadata() -> bool { true }

impl QueryContext {
    /// Build a validated context.
    ///
    /// Rejects a relevance threshold outside `[0, 1]` (including NaN) and a
    /// `max_results` of zero.
    pub fn new(
        search_scope: Vec<String>,
        relevance_threshold: f64,
        max_results: usize,
        include_metadata: bool,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&relevance_threshold) {
            return Err(TenderError::Validation(format!(
                "relevance_threshold must be within [0, 1], got {}",
                relevance_threshold
            )));
        }
        if max_results == 0 {
            return Err(TenderError::Validation(
                "max_results must be a positive integer".into(),
            ));
        }
        Ok(Self {
            search_scope,
            relevance_threshold,
            max_results,
            include_metadata,
            created_at: Utc::now(),
        })
    }

    pub fn search_scope(&self) -> &[String] {
        &self.search_scope
    }

    pub fn relevance_threshold(&self) -> f64 {
        self.relevance_threshold
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn include_metadata(&self) -> bool {
        self.include_metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// A new context identical to this one except for the search scope.
    pub fn with_search_scope(&self, search_scope: Vec<String>) -> Self {
        Self {
            search_scope,
            created_at: Utc::now(),
            ..self.clone()
        }
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            search_scope: default_search_scope(),
            relevance_threshold: default_relevance_threshold(),
            max_results: default_max_results(),
            include_metadata: default_include_metadata(),
            created_at: Utc::now(),
        }
    }
}

// ── QueryResult ─────────────────────────────────────────────────

/// A typed edge from a result node to another node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub target: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Relationship {
    pub fn new(rel_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            rel_type: rel_type.into(),
            target: target.into(),
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// One retrieved node. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQueryResult")]
pub struct QueryResult {
    node_id: String,
    content: serde_json::Map<String, serde_json::Value>,
    relevance_score: f64,
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
    relationships: Vec<Relationship>,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawQueryResult {
    node_id: String,
    content: serde_json::Map<String, serde_json::Value>,
    relevance_score: f64,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    relationships: Vec<Relationship>,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl TryFrom<RawQueryResult> for QueryResult {
    type Error = TenderError;

    fn try_from(raw: RawQueryResult) -> Result<Self> {
        let mut result = QueryResult::new(raw.node_id, raw.content, raw.relevance_score)?
            .with_relationships(raw.relationships)?;
        result.metadata = raw.metadata;
        result.timestamp = raw.timestamp;
        Ok(result)
    }
}

impl QueryResult {
    /// Build a result, rejecting scores outside `[0, 1]`.
    pub fn new(
        node_id: impl Into<String>,
        content: serde_json::Map<String, serde_json::Value>,
        relevance_score: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&relevance_score) {
            return Err(TenderError::Validation(format!(
                "relevance_score must be within [0, 1], got {}",
                relevance_score
            )));
        }
        Ok(Self {
            node_id: node_id.into(),
            content,
            relevance_score,
            metadata: None,
            relationships: Vec::new(),
            timestamp: Utc::now(),
        })
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach relationships; every descriptor needs a type and a target.
    pub fn with_relationships(mut self, relationships: Vec<Relationship>) -> Result<Self> {
        if let Some(bad) = relationships
            .iter()
            .find(|r| r.rel_type.is_empty() || r.target.is_empty())
        {
            return Err(TenderError::Validation(format!(
                "relationship on node {} is missing type or target: {:?}",
                self.node_id, bad
            )));
        }
        self.relationships = relationships;
        Ok(self)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn content(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.content
    }

    pub fn relevance_score(&self) -> f64 {
        self.relevance_score
    }

    pub fn metadata(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.metadata.as_ref()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Analysis output ─────────────────────────────────────────────

/// Validity window extracted from a query. Dates use `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTemporalAspects")]
pub struct TemporalAspects {
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub is_current: bool,
}

#[derive(Deserialize)]
struct RawTemporalAspects {
    #[serde(default)]
    valid_from: Option<String>,
    #[serde(default)]
    valid_to: Option<String>,
    #[serde(default = "default_is_current")]
    is_current: bool,
}

fn default_is_current() -> bool { true }

impl TryFrom<RawTemporalAspects> for TemporalAspects {
    type Error = TenderError;

    fn try_from(raw: RawTemporalAspects) -> Result<Self> {
        TemporalAspects::new(raw.valid_from, raw.valid_to, raw.is_current)
    }
}

impl TemporalAspects {
    pub fn new(
        valid_from: Option<String>,
        valid_to: Option<String>,
        is_current: bool,
    ) -> Result<Self> {
        for date in [&valid_from, &valid_to].into_iter().flatten() {
            validate_calendar_date(date)?;
        }
        Ok(Self {
            valid_from,
            valid_to,
            is_current,
        })
    }
}

impl Default for TemporalAspects {
    fn default() -> Self {
        Self {
            valid_from: None,
            valid_to: None,
            is_current: true,
        }
    }
}

fn validate_calendar_date(value: &str) -> Result<()> {
    // chrono accepts unpadded fields; the grammar requires exactly 4-2-2 digits.
    let shape_ok = value.len() == 10
        && value
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if !shape_ok || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
        return Err(TenderError::Validation(format!(
            "Date must be in YYYY-MM-DD format, got {:?}",
            value
        )));
    }
    Ok(())
}

/// Structured interpretation of a natural-language query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query_intent: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub temporal_aspects: Option<TemporalAspects>,
    #[serde(default)]
    pub document_scope: Vec<String>,
    #[serde(default)]
    pub relationship_patterns: Vec<String>,
    #[serde(default)]
    pub compliance_checks: Vec<String>,
}

// ── Metrics ─────────────────────────────────────────────────────

/// A recorded performance metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ── Events ──────────────────────────────────────────────────────

/// A progress event emitted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl PipelineEvent {
    pub fn new(run_id: RunId, kind: EventKind) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// Run accepted; the state machine is about to enter its first stage.
    RunStarted { query: String },
    /// Results were served from the cache; no stage ran.
    CacheHit { result_count: usize },
    /// A stage attempt began.
    StageStarted { stage: StageId, attempt: u32 },
    /// Overall pipeline progress after a stage completed.
    StageProgress { stage: StageId, percent: u8 },
    /// A stage attempt succeeded.
    StageCompleted {
        stage: StageId,
        attempt: u32,
        duration_ms: u64,
    },
    /// A stage attempt failed.
    StageFailed {
        stage: StageId,
        attempt: u32,
        error: String,
        retryable: bool,
    },
    /// The recovery router scheduled a re-entry after a backoff.
    RetryScheduled {
        stage: StageId,
        attempt: u32,
        backoff_ms: u64,
    },
    /// All stages succeeded.
    RunCompleted {
        result_count: usize,
        duration_ms: u64,
    },
    /// The run reached the failed terminal.
    RunFailed {
        stage: Option<StageId>,
        error: String,
    },
}

impl EventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted { .. } | Self::RunFailed { .. } | Self::CacheHit { .. }
        )
    }
}
