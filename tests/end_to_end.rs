use std::sync::Arc;

use tenderflow::{
    analyze_results, export_metrics, load_results, performance_summary, run_pipeline,
    save_results, AppConfig, EventKind, MetricValue, ResultFormat, StageId, TenderPipeline,
};
use tenderflow_test_utils::{fixtures, ScriptedCompletion, StubGraphClient};

fn stub_pipeline(config: AppConfig) -> anyhow::Result<(TenderPipeline, Arc<StubGraphClient>)> {
    let db = Arc::new(StubGraphClient::new(vec![fixtures::network_row()]));
    let pipeline = TenderPipeline::with_collaborators(
        config,
        Arc::new(ScriptedCompletion::always("gpt", fixtures::analysis_reply())),
        Arc::new(ScriptedCompletion::always("claude", fixtures::CYPHER_QUERY)),
        db.clone(),
    )?;
    Ok((pipeline, db))
}

fn fast_config() -> AppConfig {
    AppConfig {
        pipeline: fixtures::fast_pipeline_config(3),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_network_query_through_facade() -> anyhow::Result<()> {
    let (pipeline, db) = stub_pipeline(fast_config())?;
    let mut events = pipeline.events().subscribe();

    let response = pipeline
        .run_pipeline(fixtures::NETWORK_QUERY, Some(fixtures::sample_context()))
        .await;

    assert!(response.error.is_none(), "{:?}", response.error);
    assert_eq!(response.results.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.node_id(), "123");
    assert_eq!(result.relevance_score(), 0.95);
    assert_eq!(result.relationships()[0].rel_type, "REQUIRES");
    assert_eq!(result.relationships()[0].target, "456");
    assert_eq!(response.performance_metrics["result_count"], MetricValue::Int(1));

    let received = db.received();
    let (_, params) = &received[0];
    assert_eq!(params["threshold"], serde_json::json!(0.8));
    assert_eq!(params["max_results"], serde_json::json!(50));
    assert_eq!(db.databases(), vec![Some("neo4j".to_string())]);

    let mut completed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EventKind::StageCompleted { stage, .. } = event.kind {
            completed.push(stage);
        }
    }
    assert_eq!(completed, StageId::ALL);
    Ok(())
}

#[tokio::test]
async fn test_cache_and_run_log_from_config() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = fast_config();
    config.cache.enabled = true;
    config.cache.path = dir.path().join("cache/results.db").display().to_string();
    config.log.run_log_dir = Some(dir.path().join("runs").display().to_string());

    let (pipeline, db) = stub_pipeline(config)?;
    let first = pipeline.run(fixtures::NETWORK_QUERY, None).await?;
    let second = pipeline.run(fixtures::NETWORK_QUERY, None).await?;

    assert_eq!(db.calls(), 1);
    assert_eq!(second.metrics()["cache_hit"], MetricValue::Int(1));
    assert_eq!(second.results(), first.results());

    for state in [&first, &second] {
        let log = dir.path().join("runs").join(format!("{}.jsonl", state.run_id()));
        assert!(std::fs::read_to_string(log)?.lines().count() >= 2);
    }
    Ok(())
}

#[tokio::test]
async fn test_results_export_and_reporting() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (pipeline, _db) = stub_pipeline(fast_config())?;
    let state = pipeline.run(fixtures::NETWORK_QUERY, None).await?;

    for name in ["results.json", "results.db"] {
        let path = dir.path().join(name);
        save_results(state.results(), &path, None)?;
        assert_eq!(load_results(&path, None)?, state.results());
    }
    let snapshot = dir.path().join("results.bin");
    save_results(state.results(), &snapshot, Some(ResultFormat::Snapshot))?;
    assert_eq!(load_results(&snapshot, Some(ResultFormat::Snapshot))?, state.results());

    let stats = analyze_results(state.results());
    assert_eq!(stats.total_results, 1);
    assert_eq!(stats.relationship_types["REQUIRES"], 1);

    let summary = performance_summary(&state);
    assert_eq!(summary.result_count, 1);
    assert_eq!(summary.total_retries, 0);
    assert_eq!(summary.error_count, 0);
    assert!(summary.slowest_stage.is_some());

    let metrics_path = dir.path().join("metrics.json");
    export_metrics(state.metrics(), &metrics_path)?;
    let exported: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(metrics_path)?)?;
    assert_eq!(exported["result_count"], 1);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_model_fails_at_analysis() {
    let mut config = AppConfig::default();
    config.pipeline.max_retries = 1;
    config.analysis_model.base_url = Some("http://127.0.0.1:9/v1".into());
    config.database.uri = "http://127.0.0.1:9".into();

    let response = run_pipeline(config, fixtures::NETWORK_QUERY, None).await;

    assert!(response.results.is_empty());
    let error = response.error.expect("run should fail");
    assert!(error.contains("query_analysis"), "{}", error);
}

#[tokio::test]
async fn test_invalid_config_reported_in_response() {
    let mut config = AppConfig::default();
    config.pipeline.max_retries = 0;

    let response = run_pipeline(config, fixtures::NETWORK_QUERY, None).await;

    assert!(response.results.is_empty());
    assert!(response.error.unwrap().contains("max_retries"));
}

#[test]
fn test_negative_retry_delay_rejected_without_panic() {
    let mut config = fast_config();
    config.pipeline.retry_delay_secs = -1.0;

    let built = stub_pipeline(config);

    let err = built.err().expect("config must be rejected");
    assert!(err.to_string().contains("retry_delay_secs"), "{}", err);
}
