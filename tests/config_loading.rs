use std::io::Write;

use tenderflow::{AppConfig, RetryBudget, TenderError};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[database]
uri = "http://neo4j.internal:7474/"
username = "reader"
password = "s3cret"
database = "tenders"
max_connection_pool_size = 20
max_connection_lifetime_secs = 120
connection_acquisition_timeout_secs = 10

[analysis_model]
provider = "openai"
model_id = "chatgpt-4o-latest"
api_key = "sk-test-key"
base_url = "http://localhost:8000/v1"

[generation_model]
provider = "anthropic"
model_id = "claude-3-5-sonnet-latest"
api_key = "sk-ant-test"
max_tokens = 2048
temperature = 0.2

[pipeline]
default_search_scope = ["Technical", "Legal"]
default_relevance_threshold = 0.6
default_max_results = 25
max_retries = 5
retry_delay_secs = 0.5
max_retry_delay_secs = 8.0
retry_jitter = true
stage_timeout_secs = 45
retry_budget = "shared"
enable_performance_monitoring = false

[cache]
enabled = true
path = "/tmp/tenderflow-cache.db"

[log]
level = "tenderflow=debug"
format = "compact"
run_log_dir = "/tmp/tenderflow-runs"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.database.uri, "http://neo4j.internal:7474/");
    assert_eq!(config.database.username, "reader");
    assert_eq!(config.database.password.as_deref(), Some("s3cret"));
    assert_eq!(config.database.database, "tenders");
    assert_eq!(config.database.max_connection_pool_size, 20);

    assert_eq!(config.analysis_model.provider, "openai");
    assert_eq!(
        config.analysis_model.base_url.as_deref(),
        Some("http://localhost:8000/v1")
    );
    assert_eq!(config.generation_model.model_id, "claude-3-5-sonnet-latest");
    assert_eq!(config.generation_model.max_tokens, 2048);
    assert!((config.generation_model.temperature - 0.2).abs() < f32::EPSILON);

    let p = &config.pipeline;
    assert_eq!(p.max_retries, 5);
    assert_eq!(p.retry_delay_secs, 0.5);
    assert!(p.retry_jitter);
    assert_eq!(p.stage_timeout_secs, 45);
    assert_eq!(p.retry_budget, RetryBudget::Shared);
    assert!(!p.enable_performance_monitoring);

    let ctx = p.default_context().expect("valid defaults");
    assert_eq!(ctx.search_scope(), ["Technical", "Legal"]);
    assert_eq!(ctx.max_results(), 25);
    assert!(ctx.include_metadata());

    assert!(config.cache.enabled);
    assert_eq!(
        config.cache_path(),
        std::path::PathBuf::from("/tmp/tenderflow-cache.db")
    );
    assert_eq!(config.log.run_log_dir.as_deref(), Some("/tmp/tenderflow-runs"));
}

#[test]
fn test_env_var_expansion_in_credentials() {
    std::env::set_var("TENDERFLOW_TEST_NEO4J_PASSWORD", "from-env");
    let toml_content = r#"
[database]
password = "${TENDERFLOW_TEST_NEO4J_PASSWORD}"

[generation_model]
model_id = "claude-3-5-sonnet-latest"
api_key = "${TENDERFLOW_TEST_UNSET_KEY}"
"#;
    let config = AppConfig::from_toml_str(toml_content).expect("parse config");
    std::env::remove_var("TENDERFLOW_TEST_NEO4J_PASSWORD");

    assert_eq!(config.database.password.as_deref(), Some("from-env"));
    assert_eq!(
        config.generation_model.api_key.as_deref(),
        Some("${TENDERFLOW_TEST_UNSET_KEY}")
    );
}

#[test]
fn test_missing_file_is_reported() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/tenderflow.toml")).unwrap_err();
    assert!(matches!(err, TenderError::ConfigNotFound(_)));
}

#[test]
fn test_invalid_values_rejected_at_load() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[pipeline]\ndefault_max_results = 0\n")
        .expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, TenderError::Config(_)));
}

#[test]
fn test_malformed_toml_rejected() {
    let err = AppConfig::from_toml_str("[pipeline\nmax_retries = 3").unwrap_err();
    assert!(matches!(err, TenderError::Config(_)));
}
