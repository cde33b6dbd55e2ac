pub mod anthropic;
pub mod openai;

use tenderflow_core::error::TenderError;

/// Turn a non-success HTTP response into an `LlmRequest` error carrying the body.
pub(crate) async fn status_error(response: reqwest::Response) -> TenderError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    TenderError::LlmRequest(format!("HTTP {}: {}", status, body))
}
