use thiserror::Error;

use crate::types::StageId;

/// Failure classes reported by the graph database collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// The server could not be reached or refused work (transient).
    ServiceUnavailable,
    /// The session/transaction was lost mid-flight (transient).
    SessionExpired,
    /// The server rejected the query itself.
    Query,
    /// The response could not be understood.
    Protocol,
}

impl std::fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::SessionExpired => "SessionExpired",
            Self::Query => "Query",
            Self::Protocol => "Protocol",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum TenderError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Database errors
    #[error("Database error ({kind}): {message}")]
    Database {
        kind: DatabaseErrorKind,
        message: String,
    },

    // Pipeline errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Stage {stage} timed out after {timeout_secs}s")]
    StageTimeout { stage: StageId, timeout_secs: u64 },

    #[error("Max retries exceeded at {stage} after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        stage: StageId,
        attempts: u32,
        last_error: String,
    },

    #[error("Stage {stage} failed: {source}")]
    StageFailed {
        stage: StageId,
        #[source]
        source: Box<TenderError>,
    },

    #[error("Pipeline run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Result store error: {0}")]
    Store(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TenderError {
    pub fn database(kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        Self::Database {
            kind,
            message: message.into(),
        }
    }

    /// Whether a fresh attempt at the same operation may succeed.
    ///
    /// Collaborator connectivity, unparseable model output and stage
    /// timeouts are transient. Validation failures, query rejections and
    /// terminal pipeline errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LlmRequest(_) | Self::LlmParse(_) | Self::StageTimeout { .. } => true,
            Self::Database { kind, .. } => matches!(
                kind,
                DatabaseErrorKind::ServiceUnavailable | DatabaseErrorKind::SessionExpired
            ),
            _ => false,
        }
    }

    /// The stage a terminal pipeline error is attributed to, if any.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::StageTimeout { stage, .. }
            | Self::MaxRetriesExceeded { stage, .. }
            | Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Unwrap `StageFailed` layers down to the underlying cause.
    pub fn root_cause(&self) -> &TenderError {
        match self {
            Self::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, TenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TenderError::LlmRequest("HTTP 503".into()).is_retryable());
        assert!(TenderError::LlmParse("missing field".into()).is_retryable());
        assert!(
            TenderError::database(DatabaseErrorKind::ServiceUnavailable, "down").is_retryable()
        );
        assert!(TenderError::database(DatabaseErrorKind::SessionExpired, "gone").is_retryable());
        assert!(!TenderError::database(DatabaseErrorKind::Query, "syntax").is_retryable());
        assert!(!TenderError::Validation("bad".into()).is_retryable());
        assert!(!TenderError::Cancelled.is_retryable());
    }

    #[test]
    fn test_stage_failed_display_and_root_cause() {
        let err = TenderError::StageFailed {
            stage: StageId::QueryExecution,
            source: Box::new(TenderError::database(
                DatabaseErrorKind::ServiceUnavailable,
                "connection refused",
            )),
        };
        let text = err.to_string();
        assert!(text.contains("query_execution"));
        assert!(text.contains("ServiceUnavailable"));
        assert_eq!(err.stage(), Some(StageId::QueryExecution));
        assert!(matches!(
            err.root_cause(),
            TenderError::Database {
                kind: DatabaseErrorKind::ServiceUnavailable,
                ..
            }
        ));
    }

    #[test]
    fn test_max_retries_names_stage() {
        let err = TenderError::MaxRetriesExceeded {
            stage: StageId::QueryAnalysis,
            attempts: 3,
            last_error: "LLM request failed: HTTP 500".into(),
        };
        assert!(err.to_string().contains("query_analysis"));
        assert_eq!(err.stage(), Some(StageId::QueryAnalysis));
    }
}
