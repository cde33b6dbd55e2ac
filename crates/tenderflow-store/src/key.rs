use sha2::{Digest, Sha256};

use tenderflow_core::types::QueryContext;

/// Stable cache key for a query under a context.
///
/// SHA-256 over canonical JSON (sorted keys). The context's creation time
/// is left out so equal requests share a key.
pub fn cache_key(query: &str, context: &QueryContext) -> String {
    let canonical = serde_json::json!({
        "query": query,
        "search_scope": context.search_scope(),
        "relevance_threshold": context.relevance_threshold(),
        "max_results": context.max_results(),
        "include_metadata": context.include_metadata(),
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
