use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use tenderflow_core::types::{EventKind, PipelineEvent, RunId};

/// Per-run JSONL event log.
///
/// Writes one line per [`PipelineEvent`] of a single run to
/// `{log_dir}/{run_id}.jsonl`, flushing after every line so a crash leaves
/// all earlier lines intact.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

impl RunLogger {
    /// `level` controls verbosity: 1 = run summary, 2 = stage attempts
    /// and retries, 3 = progress ticks as well.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, level: 2 }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Consume events for `run_id` until its terminal event arrives, the
    /// bus closes, or `cancel` fires.
    ///
    /// The receiver must be subscribed before the run publishes anything.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<PipelineEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create run log directory");
            return;
        }
        let log_path = self.log_dir.join(format!("{}.jsonl", run_id));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open run log");
                return;
            }
        };

        debug!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) if event.run_id == run_id => {
                            let terminal = event.kind.is_terminal();
                            if self.wants(&event.kind) {
                                if let Ok(json) = serde_json::to_string(&event) {
                                    let line = format!("{}\n", json);
                                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                                        error!(error = %e, "Failed to write run log entry");
                                        break;
                                    }
                                    if let Err(e) = writer.flush().await {
                                        error!(error = %e, "Failed to flush run log");
                                    }
                                }
                            }
                            if terminal {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        info!(path = %log_path.display(), "Run log written");
    }

    fn wants(&self, kind: &EventKind) -> bool {
        match kind {
            EventKind::RunStarted { .. }
            | EventKind::CacheHit { .. }
            | EventKind::RunCompleted { .. }
            | EventKind::RunFailed { .. } => true,
            EventKind::StageProgress { .. } => self.level >= 3,
            _ => self.level >= 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderflow_core::event::EventBus;
    use tenderflow_core::types::StageId;

    fn lines(path: &std::path::Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_writes_only_own_run_until_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new(16);
        let mine = RunId::new();
        let other = RunId::new();

        let rx = bus.subscribe();
        let handle = tokio::spawn(RunLogger::new(dir.path().to_path_buf()).run(
            rx,
            mine.clone(),
            CancellationToken::new(),
        ));

        bus.publish(PipelineEvent::new(mine.clone(), EventKind::RunStarted { query: "q".into() }));
        bus.publish(PipelineEvent::new(other.clone(), EventKind::RunStarted { query: "x".into() }));
        bus.publish(PipelineEvent::new(
            mine.clone(),
            EventKind::StageStarted { stage: StageId::QueryAnalysis, attempt: 1 },
        ));
        bus.publish(PipelineEvent::new(
            mine.clone(),
            EventKind::StageProgress { stage: StageId::QueryAnalysis, percent: 25 },
        ));
        bus.publish(PipelineEvent::new(
            mine.clone(),
            EventKind::RunCompleted { result_count: 1, duration_ms: 10 },
        ));
        bus.publish(PipelineEvent::new(mine.clone(), EventKind::RunStarted { query: "late".into() }));
        handle.await.unwrap();

        let entries = lines(&dir.path().join(format!("{}.jsonl", mine)));
        let kinds: Vec<&str> = entries.iter().map(|e| e["event"].as_str().unwrap()).collect();
        assert_eq!(kinds, ["run_started", "stage_started", "run_completed"]);
        assert!(entries.iter().all(|e| e["run_id"] == mine.to_string()));
        assert!(!dir.path().join(format!("{}.jsonl", other)).exists());
    }

    #[tokio::test]
    async fn test_cancellation_stops_logger() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new(16);
        let run_id = RunId::new();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(RunLogger::new(dir.path().to_path_buf()).with_level(1).run(
            bus.subscribe(),
            run_id.clone(),
            cancel.clone(),
        ));
        bus.publish(PipelineEvent::new(
            run_id.clone(),
            EventKind::RetryScheduled { stage: StageId::QueryEnhancement, attempt: 2, backoff_ms: 5 },
        ));
        cancel.cancel();
        handle.await.unwrap();

        let path = dir.path().join(format!("{}.jsonl", run_id));
        assert!(lines(&path).is_empty());
    }
}
