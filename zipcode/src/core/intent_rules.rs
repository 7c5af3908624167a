//! Acceptance rules for classifier output.
//!
//! The model applies these rules when classifying; the runtime only checks that
//! its output is consistent with them. Checks are keyword heuristics on the raw
//! prompt and never rewrite the intent.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::intent::{Category, Intent, OperationType, RiskLevel};
use crate::core::policy::DELETION_PATTERN;

static SECURITY_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(auth\w*|encrypt\w*|decrypt\w*|tokens?|secrets?|credentials?|passwords?|api[ _-]?keys?|access[ _-]control|permissions?)\b",
    )
    .expect("security terms regex is valid")
});

static DELETION_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("(?i){DELETION_PATTERN}")).expect("deletion terms regex is valid")
});

/// Check an intent against the classification rules for `prompt`.
///
/// Returns stable violation messages (empty when the intent conforms).
pub fn rule_violations(prompt: &str, intent: &Intent) -> Vec<String> {
    let mut violations = Vec::new();

    if SECURITY_TERMS.is_match(prompt) && intent.risk_level != RiskLevel::High {
        violations.push(format!(
            "security-sensitive prompt requires risk_level=high (got {})",
            intent.risk_level
        ));
    }

    if DELETION_TERMS.is_match(prompt) {
        if !intent.requires_deletion {
            violations.push("deletion request requires requires_deletion=true".to_string());
        }
        if intent.risk_level != RiskLevel::High {
            violations.push(format!(
                "deletion request requires risk_level=high (got {})",
                intent.risk_level
            ));
        }
    }

    if intent.category == Category::Unknown && intent.risk_level != RiskLevel::High {
        violations.push(format!(
            "ambiguous intent requires risk_level=high (got {})",
            intent.risk_level
        ));
    }

    if intent.operation_type == OperationType::DeleteExisting && !intent.requires_deletion {
        violations
            .push("operation_type=delete_existing requires requires_deletion=true".to_string());
    }

    violations
}
