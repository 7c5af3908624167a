//! Data-driven policy table consulted by the validator.
//!
//! Rules are declared in configuration (`[[policy.rules]]`) and compiled once
//! into case-insensitive regexes before a run starts.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::core::intent::RiskLevel;

/// What a matching rule does to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Block,
    RequireApproval,
    Warn,
}

/// Declarative policy rule (TOML form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    /// Regex matched case-insensitively against the step task text.
    pub pattern: String,
    pub action: RuleAction,
    /// The rule applies only when the run's risk is at least this level.
    #[serde(default)]
    pub min_risk: RiskLevel,
    /// Marks steps that destroy existing work; raises scrutiny on later steps.
    #[serde(default)]
    pub destructive: bool,
    pub reason: String,
}

/// Policy table (TOML form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTable {
    /// Escalate otherwise-allowed steps that follow a destructive step.
    pub escalate_after_destructive: bool,
    pub rules: Vec<PolicyRule>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            escalate_after_destructive: true,
            rules: default_rules(),
        }
    }
}

/// Deletion vocabulary shared by the default destructive rules and the
/// classification rules. Covers inflections plus shell forms like `rm`,
/// `rm -fr`, `git rm` and `rmdir`.
pub const DELETION_PATTERN: &str =
    r"\b(delet(e|es|ed|ing|ion|ions)|remov(e|es|ed|ing|al|als)|eras(e|es|ed|ing|ure)|purg(e|es|ed|ing)|drop(s|ped|ping)?|wip(e|es|ed|ing)|unlink(s|ed|ing)?|rmdir|rm)\b";

fn default_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            name: "destructive-high-risk".to_string(),
            pattern: DELETION_PATTERN.to_string(),
            action: RuleAction::Block,
            min_risk: RiskLevel::High,
            destructive: true,
            reason: "destructive step in a high-risk run".to_string(),
        },
        PolicyRule {
            name: "destructive".to_string(),
            pattern: DELETION_PATTERN.to_string(),
            action: RuleAction::RequireApproval,
            min_risk: RiskLevel::Low,
            destructive: true,
            reason: "destructive step requires approval".to_string(),
        },
        PolicyRule {
            name: "force-push".to_string(),
            pattern: r"\bgit\s+push\b.*(--force\b|\s-f\b)".to_string(),
            action: RuleAction::Block,
            min_risk: RiskLevel::Low,
            destructive: true,
            reason: "force push rewrites shared history".to_string(),
        },
        PolicyRule {
            name: "secrets".to_string(),
            pattern: r"\b(secrets?|credentials?|passwords?|private[ _-]?keys?|api[ _-]?keys?)\b"
                .to_string(),
            action: RuleAction::RequireApproval,
            min_risk: RiskLevel::Low,
            destructive: false,
            reason: "step touches secrets or credentials".to_string(),
        },
        PolicyRule {
            name: "configuration".to_string(),
            pattern: r"(\bconfig(uration)?s?\b|\.env\b|environment variables?)".to_string(),
            action: RuleAction::Warn,
            min_risk: RiskLevel::Low,
            destructive: false,
            reason: "step edits configuration".to_string(),
        },
    ]
}

/// A rule with its pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: PolicyRule,
    regex: Regex,
}

impl CompiledRule {
    pub fn matches(&self, task: &str, risk: RiskLevel) -> bool {
        risk >= self.rule.min_risk && self.regex.is_match(task)
    }
}

/// Policy table ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub escalate_after_destructive: bool,
    pub rules: Vec<CompiledRule>,
}

impl PolicyTable {
    /// Compile every rule pattern. Fails on the first invalid rule.
    pub fn compile(&self) -> Result<CompiledPolicy, String> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                return Err("policy rule name must be non-empty".to_string());
            }
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|err| format!("policy rule '{}': invalid pattern: {err}", rule.name))?;
            rules.push(CompiledRule {
                rule: rule.clone(),
                regex,
            });
        }
        Ok(CompiledPolicy {
            escalate_after_destructive: self.escalate_after_destructive,
            rules,
        })
    }
}

impl CompiledPolicy {
    /// Rules that apply to `task` at the given run risk, in table order.
    pub fn matching<'a>(
        &'a self,
        task: &'a str,
        risk: RiskLevel,
    ) -> impl Iterator<Item = &'a PolicyRule> + 'a {
        self.rules
            .iter()
            .filter(move |compiled| compiled.matches(task, risk))
            .map(|compiled| &compiled.rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(policy: &CompiledPolicy, task: &str, risk: RiskLevel) -> Vec<String> {
        policy
            .matching(task, risk)
            .map(|rule| rule.name.clone())
            .collect()
    }

    #[test]
    fn default_table_compiles() {
        let policy = PolicyTable::default().compile().expect("compile");
        assert_eq!(policy.rules.len(), 5);
        assert!(policy.escalate_after_destructive);
    }

    #[test]
    fn deletion_matches_by_risk() {
        let policy = PolicyTable::default().compile().expect("compile");
        assert_eq!(
            names(&policy, "Delete src/auth/legacy.rs", RiskLevel::High),
            vec!["destructive-high-risk", "destructive"]
        );
        assert_eq!(
            names(&policy, "Delete src/auth/legacy.rs", RiskLevel::Medium),
            vec!["destructive"]
        );
    }

    #[test]
    fn force_push_is_matched() {
        let policy = PolicyTable::default().compile().expect("compile");
        assert_eq!(
            names(&policy, "git push origin main --force", RiskLevel::Low),
            vec!["force-push"]
        );
        assert!(names(&policy, "git push origin main", RiskLevel::Low).is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let table = PolicyTable {
            escalate_after_destructive: false,
            rules: vec![PolicyRule {
                name: "broken".to_string(),
                pattern: "(unclosed".to_string(),
                action: RuleAction::Warn,
                min_risk: RiskLevel::Low,
                destructive: false,
                reason: "r".to_string(),
            }],
        };
        let err = table.compile().unwrap_err();
        assert!(err.starts_with("policy rule 'broken': invalid pattern"), "{err}");
    }

    #[test]
    fn rules_parse_from_toml() {
        let table: PolicyTable = toml::from_str(
            r#"
            escalate_after_destructive = false

            [[rules]]
            name = "migrations"
            pattern = "migration"
            action = "require_approval"
            reason = "schema migrations need review"
            "#,
        )
        .expect("toml");
        assert!(!table.escalate_after_destructive);
        assert_eq!(table.rules[0].action, RuleAction::RequireApproval);
        assert_eq!(table.rules[0].min_risk, RiskLevel::Low);
        assert!(!table.rules[0].destructive);
    }
}
