//! Run orchestration: classify, plan, validate, execute.
//!
//! A [`Runtime`] drives one run at a time through the lifecycle in
//! [`RuntimeStatus`]. It is the only writer of the status; readers observe it
//! through a [`RuntimeHandle`], which also carries the event stream and the
//! cancellation signal.
//!
//! Halting is fail-fast: the first blocked step, failed step, denied approval
//! or observed cancellation ends the run, and no step starts afterwards.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::classifier::IntentClassifier;
use crate::agents::planner::{DEFAULT_MAX_STEPS, Planner};
use crate::core::intent::Intent;
use crate::core::intent_rules::rule_violations;
use crate::core::plan::{Plan, PlanStep, StepId};
use crate::core::status::RuntimeStatus;
use crate::core::types::{ExecutionResult, StepOutcome};
use crate::core::validator::{Decision, ValidationReport, Validator};
use crate::error::RuntimeError;
use crate::io::approval::{ApprovalDecision, ApprovalGate, ApprovalRequest};
use crate::io::executor::{StepContext, StepExecutor};
use crate::io::history::{RunHistory, RunRecord};
use crate::io::provider::CapabilityProvider;

const EVENT_CAPACITY: usize = 64;

/// Observable progress of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    StatusChanged {
        from: RuntimeStatus,
        to: RuntimeStatus,
    },
    IntentClassified {
        run_id: String,
        intent: Intent,
    },
    PlanCreated {
        run_id: String,
        steps: Vec<PlanStep>,
    },
    PlanValidated {
        run_id: String,
        report: ValidationReport,
    },
    ApprovalRequested {
        run_id: String,
        step_id: StepId,
        reason: String,
    },
    StepStarted {
        run_id: String,
        step_id: StepId,
    },
    StepCompleted {
        run_id: String,
        step_id: StepId,
        result: ExecutionResult,
    },
}

/// Tunables for a [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub max_steps: usize,
    /// Fail the run when the classified intent breaks the classification rules.
    pub enforce_rules: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            enforce_rules: true,
        }
    }
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: String,
    /// Always terminal.
    pub status: RuntimeStatus,
    pub intent: Option<Intent>,
    /// Present once planning succeeded; carries the validation report once
    /// validation ran.
    pub plan: Option<Plan>,
    /// One entry per step reached, in execution order.
    pub executions: Vec<StepOutcome>,
    /// Why the run failed. `None` unless `status` is `Failed`.
    pub error: Option<RuntimeError>,
    pub summary: String,
}

struct Shared {
    status: watch::Sender<RuntimeStatus>,
    events: broadcast::Sender<RuntimeEvent>,
    cancel: Mutex<CancellationToken>,
}

impl Shared {
    fn token(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RuntimeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Cheap, cloneable view of a runtime for observers and cancellers.
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<Shared>,
}

impl RuntimeHandle {
    /// Snapshot of the current status.
    pub fn status(&self) -> RuntimeStatus {
        *self.shared.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<RuntimeStatus> {
        self.shared.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.shared.events.subscribe()
    }

    /// Request cooperative cancellation of the active run.
    ///
    /// Has no effect on a run started after the call.
    pub fn cancel(&self) {
        self.shared.token().cancel();
    }
}

enum Halt {
    Failed(RuntimeError),
    Cancelled,
}

impl From<RuntimeError> for Halt {
    fn from(err: RuntimeError) -> Self {
        Halt::Failed(err)
    }
}

#[derive(Default)]
struct RunState {
    intent: Option<Intent>,
    plan: Option<Plan>,
    executions: Vec<StepOutcome>,
}

pub struct Runtime {
    shared: Arc<Shared>,
    provider: Arc<dyn CapabilityProvider>,
    classifier: IntentClassifier,
    planner: Planner,
    validator: Arc<dyn Validator>,
    executor: Arc<dyn StepExecutor>,
    approvals: Arc<dyn ApprovalGate>,
    history: Option<Arc<dyn RunHistory>>,
    workspace_root: PathBuf,
    options: RunOptions,
}

impl Runtime {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        validator: Arc<dyn Validator>,
        executor: Arc<dyn StepExecutor>,
        approvals: Arc<dyn ApprovalGate>,
    ) -> Self {
        let (status, _) = watch::channel(RuntimeStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let options = RunOptions::default();
        Self {
            shared: Arc::new(Shared {
                status,
                events,
                cancel: Mutex::new(CancellationToken::new()),
            }),
            classifier: IntentClassifier::new(provider.clone()),
            planner: Planner::new(provider.clone(), options.max_steps),
            provider,
            validator,
            executor,
            approvals,
            history: None,
            workspace_root: PathBuf::from("."),
            options,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.planner = Planner::new(self.provider.clone(), options.max_steps);
        self.options = options;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn RunHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn status(&self) -> RuntimeStatus {
        *self.shared.status.borrow()
    }

    /// Run `prompt` to a terminal status.
    ///
    /// Returns `Err(InvalidRuntimeState)` only when the runtime is not idle;
    /// the active run is left untouched. Every other failure is reported in
    /// the returned [`RunOutcome`].
    pub async fn run(&self, prompt: &str) -> Result<RunOutcome, RuntimeError> {
        let cancel = self.begin()?;
        let run_id = new_run_id();
        let started_at = Utc::now();
        info!(%run_id, "run started");
        self.shared.emit(RuntimeEvent::StatusChanged {
            from: RuntimeStatus::Idle,
            to: RuntimeStatus::Planning,
        });

        let mut state = RunState::default();
        let halt = self.drive(&run_id, prompt, &cancel, &mut state).await;
        let (status, error) = match halt {
            Ok(()) => (RuntimeStatus::Succeeded, None),
            Err(Halt::Failed(err)) => (RuntimeStatus::Failed, Some(err)),
            Err(Halt::Cancelled) => (RuntimeStatus::Cancelled, None),
        };
        self.transition(&run_id, status);

        let outcome = RunOutcome {
            summary: summarize(status, error.as_ref(), &state),
            run_id,
            status,
            intent: state.intent,
            plan: state.plan,
            executions: state.executions,
            error,
        };
        info!(
            run_id = %outcome.run_id,
            status = %status,
            summary = %outcome.summary,
            "run finished"
        );
        self.record(prompt, started_at, &outcome);
        Ok(outcome)
    }

    /// Return a finished runtime to `Idle`. A no-op when already idle.
    pub fn reset(&self) -> Result<(), RuntimeError> {
        let mut observed = RuntimeStatus::Idle;
        self.shared.status.send_if_modified(|status| {
            observed = *status;
            if status.is_terminal() {
                *status = RuntimeStatus::Idle;
                true
            } else {
                false
            }
        });
        if observed.is_terminal() {
            debug!(from = %observed, "runtime reset");
            self.shared.emit(RuntimeEvent::StatusChanged {
                from: observed,
                to: RuntimeStatus::Idle,
            });
            Ok(())
        } else if observed == RuntimeStatus::Idle {
            Ok(())
        } else {
            Err(RuntimeError::InvalidRuntimeState { status: observed })
        }
    }

    /// Atomically claim the runtime (Idle -> Planning) and arm a fresh
    /// cancellation token for the run.
    fn begin(&self) -> Result<CancellationToken, RuntimeError> {
        let mut observed = RuntimeStatus::Idle;
        let mut token = None;
        self.shared.status.send_if_modified(|status| {
            observed = *status;
            if *status != RuntimeStatus::Idle {
                return false;
            }
            *status = RuntimeStatus::Planning;
            let fresh = CancellationToken::new();
            *self.shared.token() = fresh.clone();
            token = Some(fresh);
            true
        });
        token.ok_or(RuntimeError::InvalidRuntimeState { status: observed })
    }

    fn transition(&self, run_id: &str, next: RuntimeStatus) {
        let mut from = next;
        self.shared.status.send_modify(|status| {
            from = *status;
            *status = next;
        });
        debug_assert!(from.can_transition_to(next), "illegal transition {from} -> {next}");
        info!(run_id, %from, to = %next, "status changed");
        self.shared.emit(RuntimeEvent::StatusChanged { from, to: next });
    }

    async fn drive(
        &self,
        run_id: &str,
        prompt: &str,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<(), Halt> {
        checkpoint(cancel)?;
        let intent = cancellable(cancel, self.classifier.classify(prompt)).await?;
        state.intent = Some(intent);
        self.shared.emit(RuntimeEvent::IntentClassified {
            run_id: run_id.to_string(),
            intent,
        });

        let violations = rule_violations(prompt, &intent);
        for violation in &violations {
            warn!(run_id, %violation, "intent breaks classification rule");
        }
        if self.options.enforce_rules && !violations.is_empty() {
            return Err(RuntimeError::ClassificationMalformed(violations.join("; ")).into());
        }

        let mut plan = cancellable(cancel, self.planner.create_plan(prompt, &intent)).await?;
        self.shared.emit(RuntimeEvent::PlanCreated {
            run_id: run_id.to_string(),
            steps: plan.steps().to_vec(),
        });
        checkpoint(cancel)?;

        self.transition(run_id, RuntimeStatus::Validating);
        let report = self.validator.validate_plan(&plan, &intent);
        plan.attach_validation(report.clone());
        state.plan = Some(plan.clone());
        self.shared.emit(RuntimeEvent::PlanValidated {
            run_id: run_id.to_string(),
            report: report.clone(),
        });
        for diagnostic in report.diagnostics() {
            warn!(run_id, %diagnostic, "plan diagnostic");
        }
        check_report(&plan, &report)?;
        checkpoint(cancel)?;

        self.transition(run_id, RuntimeStatus::Running);
        for step in plan.steps() {
            checkpoint(cancel)?;
            if let Some(result) = report.get(step.id) {
                if result.decision == Decision::NeedApproval {
                    let reason = result.approval_reason.clone().unwrap_or_default();
                    self.await_approval(run_id, step, reason, cancel).await?;
                }
            }

            self.shared.emit(RuntimeEvent::StepStarted {
                run_id: run_id.to_string(),
                step_id: step.id,
            });
            let ctx = StepContext {
                run_id: run_id.to_string(),
                workspace_root: self.workspace_root.clone(),
                cancel: cancel.clone(),
            };
            let result = self.executor.execute(step, &ctx).await;
            info!(run_id, step_id = step.id, ?result, "step completed");
            state.executions.push(StepOutcome {
                step_id: step.id,
                result: result.clone(),
            });
            self.shared.emit(RuntimeEvent::StepCompleted {
                run_id: run_id.to_string(),
                step_id: step.id,
                result: result.clone(),
            });

            match result {
                ExecutionResult::Succeeded => {}
                ExecutionResult::Failed { cause } => {
                    return Err(RuntimeError::ExecutionFailed {
                        step_id: step.id,
                        cause,
                    }
                    .into());
                }
                ExecutionResult::Cancelled => return Err(Halt::Cancelled),
            }
        }
        Ok(())
    }

    async fn await_approval(
        &self,
        run_id: &str,
        step: &PlanStep,
        reason: String,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        self.transition(run_id, RuntimeStatus::AwaitingApproval);
        self.shared.emit(RuntimeEvent::ApprovalRequested {
            run_id: run_id.to_string(),
            step_id: step.id,
            reason: reason.clone(),
        });
        let request = ApprovalRequest {
            run_id: run_id.to_string(),
            step: step.clone(),
            reason,
        };
        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Halt::Cancelled),
            decision = self.approvals.review(&request) => decision,
        };
        match decision {
            ApprovalDecision::Approved => {
                self.transition(run_id, RuntimeStatus::Running);
                Ok(())
            }
            ApprovalDecision::Denied { reason } => Err(RuntimeError::ValidationBlocked {
                step_id: step.id,
                reason: format!("approval denied: {reason}"),
            }
            .into()),
        }
    }

    fn record(&self, prompt: &str, started_at: DateTime<Utc>, outcome: &RunOutcome) {
        let Some(history) = &self.history else {
            return;
        };
        let record = RunRecord {
            run_id: outcome.run_id.clone(),
            prompt: prompt.to_string(),
            status: outcome.status,
            started_at,
            ended_at: Utc::now(),
            intent: outcome.intent,
            steps: outcome.executions.clone(),
            halted_at: outcome.error.as_ref().and_then(RuntimeError::step_id),
            reason: outcome.error.as_ref().map(ToString::to_string),
        };
        if let Err(err) = history.append(&record) {
            warn!(run_id = %outcome.run_id, error = %format!("{err:#}"), "failed to record run");
        }
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), Halt> {
    if cancel.is_cancelled() {
        Err(Halt::Cancelled)
    } else {
        Ok(())
    }
}

/// Await a provider-backed phase unless the run is cancelled first.
async fn cancellable<T, F>(cancel: &CancellationToken, phase: F) -> Result<T, Halt>
where
    F: Future<Output = Result<T, RuntimeError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Halt::Cancelled),
        result = phase => result.map_err(Halt::from),
    }
}

/// Every plan step must have a result, and none may be blocked.
fn check_report(plan: &Plan, report: &ValidationReport) -> Result<(), Halt> {
    for error in report.coverage_errors(plan) {
        warn!(%error, "validation coverage");
    }
    if let Some(step) = plan.steps().iter().find(|step| report.get(step.id).is_none()) {
        return Err(RuntimeError::ValidationBlocked {
            step_id: step.id,
            reason: "no validation result".to_string(),
        }
        .into());
    }
    if let Some((step_id, result)) = report.first_blocked() {
        return Err(RuntimeError::ValidationBlocked {
            step_id,
            reason: result
                .error
                .clone()
                .unwrap_or_else(|| "blocked by policy".to_string()),
        }
        .into());
    }
    Ok(())
}

fn summarize(status: RuntimeStatus, error: Option<&RuntimeError>, state: &RunState) -> String {
    let total = state.plan.as_ref().map_or(0, Plan::len);
    let executed = state.executions.len();
    match (status, error) {
        (RuntimeStatus::Succeeded, _) => format!("completed {executed} of {total} steps"),
        (RuntimeStatus::Cancelled, _) if state.plan.is_none() => {
            "cancelled before planning finished".to_string()
        }
        (RuntimeStatus::Cancelled, _) => format!("cancelled after {executed} of {total} steps"),
        (_, Some(err)) => err.to_string(),
        (status, None) => status.to_string(),
    }
}

fn new_run_id() -> String {
    let mut rng = rand::thread_rng();
    let short_id = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format!("run-{}_{short_id}", Utc::now().format("%Y%m%d_%H%M%S"))
}
