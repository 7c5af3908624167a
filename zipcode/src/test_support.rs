//! Test-only fakes for providers, executors and approval gates.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::core::intent::{Category, Intent, OperationType, RiskLevel};
use crate::core::plan::{PlanStep, StepId};
use crate::core::types::ExecutionResult;
use crate::error::ProviderError;
use crate::io::approval::{ApprovalDecision, ApprovalGate, ApprovalRequest};
use crate::io::config::{ZipcodeConfig, write_config};
use crate::io::executor::{StepContext, StepExecutor};
use crate::io::provider::CapabilityProvider;
use crate::io::workspace::WorkspacePaths;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Provider that replays queued responses in order.
///
/// Once the script is exhausted it either fails with a transport error or,
/// with [`hang_when_exhausted`](Self::hang_when_exhausted), never answers.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: Mutex<Vec<ProviderCall>>,
    hang: bool,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    /// Answer with each text in order.
    pub fn texts<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::new(texts.into_iter().map(|text| Ok(text.into())).collect())
    }

    pub fn hang_when_exhausted(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        lock(&self.calls).push(ProviderCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
        });
        let next = lock(&self.responses).pop_front();
        match next {
            Some(response) => response,
            None if self.hang => std::future::pending().await,
            None => Err(ProviderError::Transport("script exhausted".to_string())),
        }
    }
}

type StepHook = Box<dyn Fn(StepId) + Send + Sync>;

/// Executor with per-step scripted results. Unscripted steps succeed.
#[derive(Default)]
pub struct ScriptedExecutor {
    results: HashMap<StepId, ExecutionResult>,
    executed: Mutex<Vec<StepId>>,
    after_step: Option<StepHook>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, step_id: StepId, result: ExecutionResult) -> Self {
        self.results.insert(step_id, result);
        self
    }

    /// Run `hook` after each step, before its result is returned.
    pub fn after_step(mut self, hook: impl Fn(StepId) + Send + Sync + 'static) -> Self {
        self.after_step = Some(Box::new(hook));
        self
    }

    /// Ids of executed steps, in call order.
    pub fn executed(&self) -> Vec<StepId> {
        lock(&self.executed).clone()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, step: &PlanStep, _ctx: &StepContext) -> ExecutionResult {
        lock(&self.executed).push(step.id);
        let result = self
            .results
            .get(&step.id)
            .cloned()
            .unwrap_or(ExecutionResult::Succeeded);
        if let Some(hook) = &self.after_step {
            hook(step.id);
        }
        result
    }
}

/// Gate that answers every request with the same decision and records them.
pub struct FixedApproval {
    decision: ApprovalDecision,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl FixedApproval {
    pub fn approve() -> Arc<Self> {
        Arc::new(Self {
            decision: ApprovalDecision::Approved,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn deny(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            decision: ApprovalDecision::Denied {
                reason: reason.to_string(),
            },
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ApprovalGate for FixedApproval {
    async fn review(&self, request: &ApprovalRequest) -> ApprovalDecision {
        lock(&self.requests).push(request.clone());
        self.decision.clone()
    }
}

/// Intent whose file flags follow `operation_type`.
pub fn intent(
    category: Category,
    operation_type: OperationType,
    risk_level: RiskLevel,
    requires_deletion: bool,
) -> Intent {
    Intent {
        category,
        operation_type,
        risk_level,
        requires_new_files: operation_type == OperationType::CreateNew,
        requires_file_modification: matches!(
            operation_type,
            OperationType::ModifyExisting | OperationType::Mixed
        ),
        requires_deletion,
    }
}

/// Classifier response text for `intent`.
pub fn intent_json(intent: &Intent) -> String {
    serde_json::to_string(intent).unwrap_or_default()
}

/// Planner response text for `tasks`.
pub fn plan_json(tasks: &[&str]) -> String {
    serde_json::json!({ "steps": tasks }).to_string()
}

/// Temporary workspace root holding `config` at its config path.
pub fn temp_workspace(config: &ZipcodeConfig) -> anyhow::Result<TempDir> {
    let temp = tempfile::tempdir()?;
    write_config(&WorkspacePaths::new(temp.path()).config_path, config)?;
    Ok(temp)
}

/// Whether `root` has a recorded run history.
pub fn has_history(root: &Path) -> bool {
    WorkspacePaths::new(root).history_path.exists()
}
