//! Step executor abstraction.
//!
//! The [`StepExecutor`] trait decouples the runtime from whatever performs a
//! step. Concrete step handlers own their side effects; the contract here is
//! only how results are reported. Tests use scripted executors.

use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::core::plan::PlanStep;
use crate::core::types::ExecutionResult;

/// Per-step context handed to executors.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: String,
    pub workspace_root: PathBuf,
    /// Cancelled when the run is cancelled. Executors should stop at their
    /// next opportunity and report [`ExecutionResult::Cancelled`].
    pub cancel: CancellationToken,
}

/// Performs one step. One call, one result: no retries.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &PlanStep, ctx: &StepContext) -> ExecutionResult;
}

/// Run a step action under the result-reporting discipline.
///
/// - `Succeeded` when the action resolves `Ok`.
/// - `Failed` when it resolves `Err`.
/// - `Cancelled` when `cancel` fires first; the action future is dropped.
pub async fn guarded<F>(cancel: &CancellationToken, action: F) -> ExecutionResult
where
    F: Future<Output = anyhow::Result<()>>,
{
    if cancel.is_cancelled() {
        return ExecutionResult::Cancelled;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => ExecutionResult::Cancelled,
        outcome = action => match outcome {
            Ok(()) => ExecutionResult::Succeeded,
            Err(err) => ExecutionResult::failed(format!("{err:#}")),
        },
    }
}

/// Executor that performs no side effects and reports every step complete.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl StepExecutor for DryRunExecutor {
    #[instrument(skip_all, fields(run_id = %ctx.run_id, step_id = step.id))]
    async fn execute(&self, step: &PlanStep, ctx: &StepContext) -> ExecutionResult {
        guarded(&ctx.cancel, async {
            info!(task = %step.task, root = %ctx.workspace_root.display(), "dry-run step");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn ctx() -> StepContext {
        StepContext {
            run_id: "run-1".to_string(),
            workspace_root: PathBuf::from("."),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn ok_action_succeeds() {
        let got = guarded(&CancellationToken::new(), async { Ok(()) }).await;
        assert_eq!(got, ExecutionResult::Succeeded);
    }

    #[tokio::test]
    async fn err_action_fails_with_cause() {
        let got = guarded(&CancellationToken::new(), async {
            Err(anyhow!("permission denied").context("write src/lib.rs"))
        })
        .await;
        assert_eq!(
            got,
            ExecutionResult::failed("write src/lib.rs: permission denied")
        );
    }

    #[tokio::test]
    async fn cancellation_preempts_pending_action() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let got = guarded(&cancel, async move {
            trigger.cancel();
            std::future::pending::<anyhow::Result<()>>().await
        })
        .await;
        assert_eq!(got, ExecutionResult::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_token_never_starts_action() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let got = guarded(&cancel, async { Err(anyhow!("must not run")) }).await;
        assert_eq!(got, ExecutionResult::Cancelled);
    }

    #[tokio::test]
    async fn dry_run_succeeds() {
        let step = PlanStep {
            id: 0,
            task: "touch README".to_string(),
        };
        assert_eq!(
            DryRunExecutor.execute(&step, &ctx()).await,
            ExecutionResult::Succeeded
        );
    }
}
