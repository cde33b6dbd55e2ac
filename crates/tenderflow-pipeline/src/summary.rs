//! Post-run reporting over results and pipeline metrics.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use tenderflow_core::error::Result;
use tenderflow_core::types::{MetricValue, QueryResult};

use crate::state::{HistoryKind, PipelineState};

/// Aggregate view of one result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultStatistics {
    pub total_results: usize,
    pub mean_relevance: f64,
    pub min_relevance: f64,
    pub max_relevance: f64,
    pub std_relevance: f64,
    pub avg_relationships: f64,
    pub max_relationships: usize,
    pub relationship_types: BTreeMap<String, usize>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// Timing and error counts for one finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_duration: f64,
    /// Mean over every `*_duration` stage metric.
    pub average_stage_duration: Option<f64>,
    pub slowest_stage: Option<(String, f64)>,
    pub result_count: usize,
    pub total_retries: u32,
    pub error_count: usize,
}

/// Statistics over `results`. An empty slice yields all-zero statistics.
pub fn analyze_results(results: &[QueryResult]) -> ResultStatistics {
    if results.is_empty() {
        return ResultStatistics::default();
    }

    let n = results.len() as f64;
    let scores: Vec<f64> = results.iter().map(QueryResult::relevance_score).collect();
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

    let mut relationship_types = BTreeMap::new();
    for rel in results.iter().flat_map(|r| r.relationships()) {
        *relationship_types.entry(rel.rel_type.clone()).or_insert(0) += 1;
    }
    let rel_counts: Vec<usize> = results.iter().map(|r| r.relationships().len()).collect();

    ResultStatistics {
        total_results: results.len(),
        mean_relevance: mean,
        min_relevance: scores.iter().copied().fold(f64::INFINITY, f64::min),
        max_relevance: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        std_relevance: variance.sqrt(),
        avg_relationships: rel_counts.iter().sum::<usize>() as f64 / n,
        max_relationships: rel_counts.iter().copied().max().unwrap_or(0),
        relationship_types,
        earliest: results.iter().map(QueryResult::timestamp).min(),
        latest: results.iter().map(QueryResult::timestamp).max(),
    }
}

pub fn performance_summary(state: &PipelineState) -> PerformanceSummary {
    let metrics = state.metrics();
    let total_duration = metrics
        .get("total_duration")
        .and_then(MetricValue::as_f64)
        .unwrap_or_else(|| state.duration_secs());

    let stage_durations: Vec<(&String, f64)> = metrics
        .iter()
        .filter(|(name, _)| name.ends_with("_duration") && name.as_str() != "total_duration")
        .filter_map(|(name, value)| value.as_f64().map(|v| (name, v)))
        .collect();

    let average_stage_duration = if stage_durations.is_empty() {
        None
    } else {
        Some(stage_durations.iter().map(|(_, v)| v).sum::<f64>() / stage_durations.len() as f64)
    };
    let slowest_stage = stage_durations
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, v)| ((*name).clone(), *v));

    PerformanceSummary {
        total_duration,
        average_stage_duration,
        slowest_stage,
        result_count: state.results().len(),
        total_retries: state.total_retries(),
        error_count: state
            .history()
            .iter()
            .filter(|e| matches!(e.kind, HistoryKind::StageFailed | HistoryKind::Failed))
            .count(),
    }
}

/// Write `metrics` to `path` as pretty-printed JSON.
pub fn export_metrics(metrics: &BTreeMap<String, MetricValue>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(metrics)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tenderflow_core::types::{QueryContext, Relationship, StageId};

    fn result(id: &str, score: f64, rels: &[&str]) -> QueryResult {
        QueryResult::new(id, Map::new(), score)
            .unwrap()
            .with_relationships(rels.iter().map(|t| Relationship::new(*t, "n")).collect())
            .unwrap()
    }

    #[test]
    fn test_analyze_results_statistics() {
        let results = vec![
            result("1", 0.9, &["REQUIRES", "REFERENCES"]),
            result("2", 0.5, &["REQUIRES"]),
            result("3", 0.7, &[]),
        ];
        let stats = analyze_results(&results);
        assert_eq!(stats.total_results, 3);
        assert!((stats.mean_relevance - 0.7).abs() < 1e-9);
        assert_eq!(stats.min_relevance, 0.5);
        assert_eq!(stats.max_relevance, 0.9);
        assert!(stats.std_relevance > 0.16 && stats.std_relevance < 0.17);
        assert_eq!(stats.avg_relationships, 1.0);
        assert_eq!(stats.max_relationships, 2);
        assert_eq!(stats.relationship_types["REQUIRES"], 2);
        assert_eq!(stats.relationship_types["REFERENCES"], 1);
        assert!(stats.earliest <= stats.latest);
    }

    #[test]
    fn test_analyze_results_empty() {
        let stats = analyze_results(&[]);
        assert_eq!(stats.total_results, 0);
        assert!(stats.earliest.is_none());
    }

    #[test]
    fn test_performance_summary_picks_slowest_stage() {
        let state = PipelineState::new("q", QueryContext::default())
            .with_metric("analysis_duration", 1.5)
            .with_metric("enhancement_duration", 0.5)
            .with_metric("total_duration", 2.5)
            .with_metric("result_count", 1i64)
            .with_retry(StageId::QueryAnalysis)
            .record(StageId::QueryAnalysis, HistoryKind::StageFailed, "boom");

        let summary = performance_summary(&state);
        assert_eq!(summary.total_duration, 2.5);
        assert_eq!(summary.average_stage_duration, Some(1.0));
        assert_eq!(summary.slowest_stage, Some(("analysis_duration".to_string(), 1.5)));
        assert_eq!(summary.total_retries, 1);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.result_count, 0);
    }

    #[test]
    fn test_export_metrics_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/metrics.json");
        let mut metrics = BTreeMap::new();
        metrics.insert("result_count".to_string(), MetricValue::from(3i64));
        metrics.insert("execution_time".to_string(), MetricValue::from(0.25));

        export_metrics(&metrics, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["result_count"], 3);
        assert_eq!(value["execution_time"], 0.25);
    }
}
