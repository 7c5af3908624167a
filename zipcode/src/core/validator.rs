//! Step validation against the policy table.
//!
//! Results are keyed by step id. Plan-level diagnostics are kept in a separate
//! list so that they can never shift the step-to-result correspondence.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::intent::Intent;
use crate::core::plan::{Plan, PlanStep, StepId};
use crate::core::policy::{CompiledPolicy, RuleAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    NeedApproval,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub decision: Decision,
    /// Reason the step was blocked. `None` unless `decision` is `Blocked`.
    pub error: Option<String>,
    /// Why the step needs approval before it runs.
    pub approval_reason: Option<String>,
    /// Advisory, non-blocking.
    pub warning: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            valid: true,
            decision: Decision::Allowed,
            error: None,
            approval_reason: None,
            warning: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            decision: Decision::Blocked,
            error: Some(reason.into()),
            approval_reason: None,
            warning: None,
        }
    }

    pub fn need_approval(reason: impl Into<String>) -> Self {
        Self {
            valid: true,
            decision: Decision::NeedApproval,
            error: None,
            approval_reason: Some(reason.into()),
            warning: None,
        }
    }

    fn with_warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }
}

/// Validation results for a whole plan.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ValidationReport {
    results: BTreeMap<StepId, ValidationResult>,
    diagnostics: Vec<String>,
}

impl ValidationReport {
    pub fn insert(&mut self, step_id: StepId, result: ValidationResult) {
        self.results.insert(step_id, result);
    }

    /// Record an out-of-band finding that belongs to no single step.
    pub fn push_diagnostic(&mut self, diagnostic: impl Into<String>) {
        self.diagnostics.push(diagnostic.into());
    }

    pub fn get(&self, step_id: StepId) -> Option<&ValidationResult> {
        self.results.get(&step_id)
    }

    pub fn results(&self) -> &BTreeMap<StepId, ValidationResult> {
        &self.results
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// First blocked step in execution order.
    pub fn first_blocked(&self) -> Option<(StepId, &ValidationResult)> {
        self.results
            .iter()
            .find(|(_, result)| result.decision == Decision::Blocked)
            .map(|(id, result)| (*id, result))
    }

    /// Steps of `plan` with no result, and results for ids not in `plan`.
    pub fn coverage_errors(&self, plan: &Plan) -> Vec<String> {
        let mut errors = Vec::new();
        for step in plan.steps() {
            if !self.results.contains_key(&step.id) {
                errors.push(format!("step {} has no validation result", step.id));
            }
        }
        for id in self.results.keys() {
            if plan.step(*id).is_none() {
                errors.push(format!("validation result for unknown step {id}"));
            }
        }
        errors
    }
}

/// Evaluates plans against policy.
pub trait Validator: Send + Sync {
    fn validate_plan(&self, plan: &Plan, intent: &Intent) -> ValidationReport;
}

/// State carried from earlier steps of the same plan.
#[derive(Debug, Clone, Default)]
pub struct ValidationState {
    /// Id of the first step matched by a destructive rule.
    pub destructive_step: Option<StepId>,
}

/// Validator backed by a compiled [`CompiledPolicy`].
#[derive(Debug, Clone)]
pub struct PolicyValidator {
    policy: CompiledPolicy,
}

impl PolicyValidator {
    pub fn new(policy: CompiledPolicy) -> Self {
        Self { policy }
    }

    /// Validate one step, updating `state` for the steps that follow.
    pub fn validate_step(
        &self,
        state: &mut ValidationState,
        step: &PlanStep,
        intent: &Intent,
    ) -> ValidationResult {
        let mut decision = Decision::Allowed;
        let mut reasons: Vec<&str> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut destructive = false;

        for rule in self.policy.matching(&step.task, intent.risk_level) {
            destructive |= rule.destructive;
            let rule_decision = match rule.action {
                RuleAction::Block => Decision::Blocked,
                RuleAction::RequireApproval => Decision::NeedApproval,
                RuleAction::Warn => {
                    warnings.push(format!("{}: {}", rule.name, rule.reason));
                    continue;
                }
            };
            if rule_decision > decision {
                decision = rule_decision;
                reasons.clear();
            }
            if rule_decision == decision {
                reasons.push(&rule.reason);
            }
        }

        if decision == Decision::Allowed && self.policy.escalate_after_destructive {
            if let Some(prior) = state.destructive_step {
                decision = Decision::NeedApproval;
                warnings.push(format!("follows destructive step {prior}"));
            }
        }

        if destructive && state.destructive_step.is_none() {
            state.destructive_step = Some(step.id);
        }

        let warning = (!warnings.is_empty()).then(|| warnings.join("; "));
        match decision {
            Decision::Allowed => ValidationResult::allowed().with_warning(warning),
            Decision::Blocked => {
                ValidationResult::blocked(reasons.join("; ")).with_warning(warning)
            }
            Decision::NeedApproval if reasons.is_empty() => {
                ValidationResult::need_approval("escalated after destructive step")
                    .with_warning(warning)
            }
            Decision::NeedApproval => {
                ValidationResult::need_approval(reasons.join("; ")).with_warning(warning)
            }
        }
    }
}

impl Validator for PolicyValidator {
    fn validate_plan(&self, plan: &Plan, intent: &Intent) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut state = ValidationState::default();
        for step in plan.steps() {
            let result = self.validate_step(&mut state, step, intent);
            report.insert(step.id, result);
        }
        if let Some(step_id) = state.destructive_step {
            if !intent.requires_deletion {
                report.push_diagnostic(format!(
                    "step {step_id} is destructive but the intent does not declare deletion"
                ));
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intent::{Category, OperationType, RiskLevel};
    use crate::core::policy::{PolicyRule, PolicyTable};

    fn intent(risk_level: RiskLevel, requires_deletion: bool) -> Intent {
        Intent {
            category: Category::Cleanup,
            operation_type: OperationType::Mixed,
            risk_level,
            requires_new_files: false,
            requires_file_modification: true,
            requires_deletion,
        }
    }

    fn validator() -> PolicyValidator {
        PolicyValidator::new(PolicyTable::default().compile().expect("compile"))
    }

    #[test]
    fn every_step_gets_exactly_one_result() {
        let plan = Plan::from_tasks(["read", "delete old module", "write", "test"]).expect("plan");
        let report = validator().validate_plan(&plan, &intent(RiskLevel::Medium, true));
        assert!(report.coverage_errors(&plan).is_empty());
        assert_eq!(report.results().len(), plan.len());
    }

    #[test]
    fn deletion_in_high_risk_run_is_blocked() {
        let plan =
            Plan::from_tasks(["Locate the legacy auth module", "Delete the legacy auth module"])
                .expect("plan");
        let report = validator().validate_plan(&plan, &intent(RiskLevel::High, true));
        assert_eq!(report.get(0).map(|r| r.decision), Some(Decision::Allowed));
        let (id, result) = report.first_blocked().expect("blocked");
        assert_eq!(id, 1);
        assert!(!result.valid);
        assert_eq!(
            result.error.as_deref(),
            Some("destructive step in a high-risk run")
        );
    }

    #[test]
    fn deletion_phrasings_are_blocked_in_high_risk_run() {
        let tasks = [
            "Deleting the legacy auth module",
            "Deletion of src/auth/legacy.rs",
            "rm src/auth/legacy.rs",
            "Run rm -fr src/auth",
            "git rm src/auth/legacy.rs",
            "rmdir src/auth",
            "Removal of the old session store",
        ];
        let validator = validator();
        for task in tasks {
            let plan = Plan::from_tasks([task]).expect("plan");
            let report = validator.validate_plan(&plan, &intent(RiskLevel::High, true));
            assert_eq!(
                report.get(0).map(|r| r.decision),
                Some(Decision::Blocked),
                "{task}"
            );
        }
    }

    #[test]
    fn deletion_lookalikes_stay_allowed() {
        let plan = Plan::from_tasks(["confirm the dropdown renders", "format the remote url"])
            .expect("plan");
        let report = validator().validate_plan(&plan, &intent(RiskLevel::High, false));
        assert!(
            report
                .results()
                .values()
                .all(|r| r.decision == Decision::Allowed)
        );
    }

    #[test]
    fn deletion_in_lower_risk_run_needs_approval() {
        let plan = Plan::from_tasks(["remove unused imports"]).expect("plan");
        let report = validator().validate_plan(&plan, &intent(RiskLevel::Low, true));
        let result = report.get(0).expect("result");
        assert_eq!(result.decision, Decision::NeedApproval);
        assert!(result.valid);
        assert_eq!(result.error, None);
        assert_eq!(
            result.approval_reason.as_deref(),
            Some("destructive step requires approval")
        );
    }

    #[test]
    fn steps_after_destructive_step_are_escalated() {
        let plan =
            Plan::from_tasks(["remove unused imports", "update the changelog"]).expect("plan");
        let report = validator().validate_plan(&plan, &intent(RiskLevel::Low, true));
        let later = report.get(1).expect("result");
        assert_eq!(later.decision, Decision::NeedApproval);
        assert_eq!(later.warning.as_deref(), Some("follows destructive step 0"));
        assert_eq!(
            later.approval_reason.as_deref(),
            Some("escalated after destructive step")
        );
    }

    #[test]
    fn escalation_can_be_disabled() {
        let mut table = PolicyTable::default();
        table.escalate_after_destructive = false;
        let validator = PolicyValidator::new(table.compile().expect("compile"));
        let plan =
            Plan::from_tasks(["remove unused imports", "update the changelog"]).expect("plan");
        let report = validator.validate_plan(&plan, &intent(RiskLevel::Low, true));
        assert_eq!(report.get(1).map(|r| r.decision), Some(Decision::Allowed));
    }

    #[test]
    fn warnings_do_not_block() {
        let plan = Plan::from_tasks(["update the config defaults"]).expect("plan");
        let report = validator().validate_plan(&plan, &intent(RiskLevel::Medium, false));
        let result = report.get(0).expect("result");
        assert_eq!(result.decision, Decision::Allowed);
        assert_eq!(
            result.warning.as_deref(),
            Some("configuration: step edits configuration")
        );
    }

    #[test]
    fn diagnostics_do_not_shift_step_results() {
        let plan =
            Plan::from_tasks(["read", "write", "drop the cache table", "test"]).expect("plan");
        let report = validator().validate_plan(&plan, &intent(RiskLevel::Medium, false));
        assert_eq!(
            report.diagnostics(),
            ["step 2 is destructive but the intent does not declare deletion"]
        );
        assert_eq!(report.results().len(), 4);
        assert_eq!(report.get(0).map(|r| r.decision), Some(Decision::Allowed));
        assert_eq!(report.get(2).map(|r| r.decision), Some(Decision::NeedApproval));
        assert!(report.coverage_errors(&plan).is_empty());
    }

    #[test]
    fn strongest_decision_wins() {
        let table = PolicyTable {
            escalate_after_destructive: false,
            rules: vec![
                PolicyRule {
                    name: "review".to_string(),
                    pattern: "deploy".to_string(),
                    action: RuleAction::RequireApproval,
                    min_risk: RiskLevel::Low,
                    destructive: false,
                    reason: "deploys need review".to_string(),
                },
                PolicyRule {
                    name: "prod".to_string(),
                    pattern: "production".to_string(),
                    action: RuleAction::Block,
                    min_risk: RiskLevel::Low,
                    destructive: false,
                    reason: "production is off limits".to_string(),
                },
            ],
        };
        let validator = PolicyValidator::new(table.compile().expect("compile"));
        let plan = Plan::from_tasks(["deploy to production"]).expect("plan");
        let report = validator.validate_plan(&plan, &intent(RiskLevel::Low, false));
        let result = report.get(0).expect("result");
        assert_eq!(result.decision, Decision::Blocked);
        assert_eq!(result.error.as_deref(), Some("production is off limits"));
    }

    #[test]
    fn coverage_errors_report_missing_and_unknown_ids() {
        let plan = Plan::from_tasks(["a", "b"]).expect("plan");
        let mut report = ValidationReport::default();
        report.insert(0, ValidationResult::allowed());
        report.insert(7, ValidationResult::allowed());
        assert_eq!(
            report.coverage_errors(&plan),
            vec![
                "step 1 has no validation result".to_string(),
                "validation result for unknown step 7".to_string()
            ]
        );
    }
}
