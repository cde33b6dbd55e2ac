use std::time::Duration;

use tenderflow_core::config::{PipelineConfig, RetryBudget};
use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::retry::RetryPolicy;
use tenderflow_core::types::StageId;

use crate::state::PipelineState;

/// What the error handler does with a failed stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDecision {
    /// Count the failure, wait, and re-enter the same stage.
    Retry { backoff: Duration },
    /// Count the failure and stop: the stage used its whole budget.
    Exhausted,
    /// Stop without retrying: the stage is never retried or the error is permanent.
    Fatal,
}

/// Maps a failed stage and its retry count to the next transition.
#[derive(Debug, Clone)]
pub struct RecoveryRouter {
    policy: RetryPolicy,
    budget: RetryBudget,
}

impl RecoveryRouter {
    pub fn new(policy: RetryPolicy, budget: RetryBudget) -> Self {
        Self { policy, budget }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(RetryPolicy::from_config(config)?, config.retry_budget))
    }

    pub fn max_retries(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Whether failures of `stage` may be retried at all.
    pub fn is_retried(stage: StageId) -> bool {
        stage != StageId::QueryExecution
    }

    /// Retries already spent that count against `stage`'s budget.
    pub fn retries_used(&self, state: &PipelineState, stage: StageId) -> u32 {
        match self.budget {
            RetryBudget::PerStage => state.retry_count(stage),
            RetryBudget::Shared => state.total_retries(),
        }
    }

    /// Decide how to recover from `error` at the state's current stage.
    ///
    /// Each failure is counted before the budget is checked, so a stage runs
    /// at most `max_retries` times and its counter never passes that value.
    pub fn route(&self, state: &PipelineState, error: &TenderError) -> RecoveryDecision {
        let stage = state.current_stage();
        if !Self::is_retried(stage) || !error.is_retryable() {
            return RecoveryDecision::Fatal;
        }

        let used = self.retries_used(state, stage) + 1;
        if used >= self.policy.max_attempts {
            RecoveryDecision::Exhausted
        } else {
            RecoveryDecision::Retry {
                backoff: self.policy.backoff(used),
            }
        }
    }
}
