//! Structured intent produced by the classifier.
//!
//! The classifier response is the schema boundary between the model and the
//! planner. It is validated strictly: one JSON object with exactly six fields,
//! closed enums, no prose and no markdown fences around it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::schema::schema_violations;

const INTENT_SCHEMA: &str = include_str!("../../schemas/intent.schema.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Feature,
    Refactor,
    Bugfix,
    Analysis,
    Test,
    Documentation,
    Configuration,
    Performance,
    Security,
    Cleanup,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    ModifyExisting,
    CreateNew,
    DeleteExisting,
    ReadOnly,
    Mixed,
}

/// Risk of a request. Ordered so that `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// Classification of a single user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Intent {
    pub category: Category,
    pub operation_type: OperationType,
    pub risk_level: RiskLevel,
    pub requires_new_files: bool,
    pub requires_file_modification: bool,
    pub requires_deletion: bool,
}

/// Parse a raw classifier response into an [`Intent`].
///
/// The response must be the JSON object and nothing else. Errors list every
/// schema violation so malformed output can be diagnosed from one message.
pub fn parse_intent(raw: &str) -> Result<Intent, String> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|err| format!("invalid intent json: {err}"))?;
    let violations = schema_violations(&value, INTENT_SCHEMA)?;
    if !violations.is_empty() {
        return Err(format!(
            "intent schema violations:\n- {}",
            violations.join("\n- ")
        ));
    }
    serde_json::from_value(value).map_err(|err| format!("parse intent: {err}"))
}
