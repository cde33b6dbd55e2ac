use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{ChatMessage, Completion, Row};

/// Text completion: one model identity behind a request/response call.
///
/// Implementations must be safe for concurrent use by independent runs.
pub trait TextCompletion: Send + Sync + 'static {
    /// Model identifier, used in logs and history entries.
    fn model_id(&self) -> &str;

    /// Send role-tagged messages and wait for the full response text.
    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>>;
}

/// Graph database client: parameterized query in, rows out.
///
/// Implementations pool connections internally and may be shared by
/// concurrent runs.
pub trait GraphClient: Send + Sync + 'static {
    fn execute_query(
        &self,
        query: &str,
        parameters: serde_json::Map<String, serde_json::Value>,
        database: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<Row>>>;
}
