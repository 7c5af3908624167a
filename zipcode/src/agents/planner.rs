//! Planner agent: intent plus prompt in, ordered plan out.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::intent::Intent;
use crate::core::plan::Plan;
use crate::core::schema::schema_violations;
use crate::error::RuntimeError;
use crate::io::prompt::planner_system_prompt;
use crate::io::provider::CapabilityProvider;

use super::describe_provider_error;

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Default upper bound on plan length.
pub const DEFAULT_MAX_STEPS: usize = 20;

#[derive(Debug, Deserialize)]
struct PlannerOutput {
    steps: Vec<String>,
}

/// Asks the provider for a plan and validates its shape.
#[derive(Clone)]
pub struct Planner {
    provider: Arc<dyn CapabilityProvider>,
    max_steps: usize,
}

impl Planner {
    pub fn new(provider: Arc<dyn CapabilityProvider>, max_steps: usize) -> Self {
        Self {
            provider,
            max_steps,
        }
    }

    /// Every failure, provider or shape, is `PlanningFailed`.
    #[instrument(skip_all, fields(max_steps = self.max_steps))]
    pub async fn create_plan(&self, prompt: &str, intent: &Intent) -> Result<Plan, RuntimeError> {
        let system_prompt = planner_system_prompt(intent, self.max_steps)
            .map_err(|err| RuntimeError::PlanningFailed(format!("render planner prompt: {err}")))?;
        let raw = self
            .provider
            .complete(&system_prompt, prompt)
            .await
            .map_err(|err| RuntimeError::PlanningFailed(describe_provider_error(&err)))?;
        debug!(response_bytes = raw.len(), "planner responded");
        let plan = parse_plan(&raw, self.max_steps).map_err(RuntimeError::PlanningFailed)?;
        debug!(steps = plan.len(), "plan created");
        Ok(plan)
    }
}

/// Parse planner output into a [`Plan`].
///
/// Unlike the classifier, the planner may wrap its object in prose or a
/// markdown fence; the outermost `{...}` span is taken.
pub fn parse_plan(raw: &str, max_steps: usize) -> Result<Plan, String> {
    let json = outer_object(raw).ok_or_else(|| "planner output has no JSON object".to_string())?;
    let value: Value =
        serde_json::from_str(json).map_err(|err| format!("invalid plan json: {err}"))?;
    let violations = schema_violations(&value, PLAN_SCHEMA)?;
    if !violations.is_empty() {
        return Err(format!(
            "plan schema violations:\n- {}",
            violations.join("\n- ")
        ));
    }
    let output: PlannerOutput =
        serde_json::from_value(value).map_err(|err| format!("parse plan: {err}"))?;
    if output.steps.len() > max_steps {
        return Err(format!(
            "plan has {} steps, limit is {max_steps}",
            output.steps.len()
        ));
    }
    Plan::from_tasks(output.steps)
}

fn outer_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intent::{Category, OperationType, RiskLevel};
    use crate::error::ProviderError;
    use crate::test_support::{ScriptedProvider, intent, plan_json};

    fn cleanup() -> Intent {
        intent(
            Category::Cleanup,
            OperationType::DeleteExisting,
            RiskLevel::High,
            true,
        )
    }

    #[test]
    fn parses_fenced_plan() {
        let raw = "Here is the plan:\n```json\n{\"steps\": [\" locate module \", \"delete module\"]}\n```";
        let plan = parse_plan(raw, 5).expect("plan");
        let tasks: Vec<&str> = plan.steps().iter().map(|s| s.task.as_str()).collect();
        assert_eq!(tasks, vec!["locate module", "delete module"]);
    }

    #[test]
    fn rejects_empty_and_oversized_plans() {
        let err = parse_plan(r#"{"steps": []}"#, 5).unwrap_err();
        assert!(err.starts_with("plan schema violations"), "{err}");

        let err = parse_plan(&plan_json(&["a", "b", "c"]), 2).unwrap_err();
        assert_eq!(err, "plan has 3 steps, limit is 2");
    }

    #[test]
    fn rejects_blank_step_text() {
        let err = parse_plan(&plan_json(&["read", "   "]), 5).unwrap_err();
        assert_eq!(err, "step 1 has empty task text");
    }

    #[test]
    fn rejects_text_without_object() {
        let err = parse_plan("I cannot plan this.", 5).unwrap_err();
        assert_eq!(err, "planner output has no JSON object");
    }

    #[tokio::test]
    async fn sends_prompt_with_intent_context() {
        let provider = Arc::new(ScriptedProvider::texts([plan_json(&[
            "Locate the legacy auth module",
            "Delete the legacy auth module",
        ])]));
        let planner = Planner::new(provider.clone(), 4);
        let plan = planner
            .create_plan("delete the legacy auth module", &cleanup())
            .await
            .expect("plan");
        assert_eq!(plan.len(), 2);

        let calls = provider.calls();
        assert_eq!(calls[0].user_prompt, "delete the legacy auth module");
        assert!(calls[0].system_prompt.contains("between 1 and 4 steps"));
        assert!(calls[0].system_prompt.contains("- requires_deletion: true"));
    }

    #[tokio::test]
    async fn provider_failure_is_planning_failure() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Response(
            "no output text".to_string(),
        ))]);
        let planner = Planner::new(Arc::new(provider), DEFAULT_MAX_STEPS);
        let err = planner.create_plan("x", &cleanup()).await.unwrap_err();
        assert_eq!(
            err,
            RuntimeError::PlanningFailed("provider response unusable: no output text".to_string())
        );
    }
}
