use serde::{Deserialize, Serialize};

use tenderflow_core::error::{DatabaseErrorKind, Result, TenderError};
use tenderflow_core::types::Row;

#[derive(Serialize)]
pub(crate) struct CommitRequest<'a> {
    pub statements: Vec<Statement<'a>>,
}

#[derive(Serialize)]
pub(crate) struct Statement<'a> {
    pub statement: &'a str,
    pub parameters: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CommitResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default)]
    pub errors: Vec<ServerError>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct StatementResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<DataRow>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DataRow {
    #[serde(default)]
    pub row: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ServerError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Classify a Neo4j status code such as `Neo.TransientError.General.DatabaseUnavailable`.
pub(crate) fn classify_code(code: &str) -> DatabaseErrorKind {
    if code.contains("SessionExpired") || code.contains("Transaction.TransactionNotFound") {
        DatabaseErrorKind::SessionExpired
    } else if code.starts_with("Neo.TransientError") || code.contains("ServiceUnavailable") {
        DatabaseErrorKind::ServiceUnavailable
    } else {
        DatabaseErrorKind::Query
    }
}

/// Decode a commit response body into rows of the first statement.
pub(crate) fn decode_rows(body: &str) -> Result<Vec<Row>> {
    let response: CommitResponse = serde_json::from_str(body).map_err(|e| {
        TenderError::database(
            DatabaseErrorKind::Protocol,
            format!("invalid response body: {}", e),
        )
    })?;

    if let Some(err) = response.errors.first() {
        return Err(TenderError::database(
            classify_code(&err.code),
            format!("{}: {}", err.code, err.message),
        ));
    }

    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };

    let columns = result.columns;
    result
        .data
        .into_iter()
        .map(|data| {
            if data.row.len() != columns.len() {
                return Err(TenderError::database(
                    DatabaseErrorKind::Protocol,
                    format!(
                        "row has {} values for {} columns",
                        data.row.len(),
                        columns.len()
                    ),
                ));
            }
            Ok(columns.iter().cloned().zip(data.row).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_rows_zips_columns() {
        let body = json!({
            "results": [{
                "columns": ["id", "score", "relationships"],
                "data": [
                    {"row": ["123", 0.95, [{"type": "REQUIRES", "end_node": "456"}]], "meta": []},
                    {"row": ["124", null, []], "meta": []}
                ]
            }],
            "errors": []
        })
        .to_string();

        let rows = decode_rows(&body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!("123"));
        assert_eq!(rows[0]["score"], json!(0.95));
        assert_eq!(rows[0]["relationships"][0]["end_node"], json!("456"));
        assert!(rows[1]["score"].is_null());
    }

    #[test]
    fn test_decode_rows_empty_results() {
        assert!(decode_rows(r#"{"results": [], "errors": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_server_errors_classified() {
        let body = json!({
            "results": [],
            "errors": [{"code": "Neo.TransientError.General.DatabaseUnavailable", "message": "db down"}]
        })
        .to_string();
        let err = decode_rows(&body).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            TenderError::Database { kind: DatabaseErrorKind::ServiceUnavailable, .. }
        ));

        let body = json!({
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input"}]
        })
        .to_string();
        let err = decode_rows(&body).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("SyntaxError"));
    }

    #[test]
    fn test_session_expiry_code() {
        assert_eq!(
            classify_code("Neo.ClientError.Transaction.TransactionNotFound"),
            DatabaseErrorKind::SessionExpired
        );
        assert_eq!(
            classify_code("Neo.ClientError.Security.Unauthorized"),
            DatabaseErrorKind::Query
        );
    }

    #[test]
    fn test_garbage_body_is_protocol_error() {
        let err = decode_rows("not json").unwrap_err();
        assert!(matches!(
            err,
            TenderError::Database { kind: DatabaseErrorKind::Protocol, .. }
        ));
    }
}
