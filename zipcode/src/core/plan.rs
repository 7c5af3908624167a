//! Ordered plans and their steps.

use serde::{Deserialize, Serialize};

use crate::core::validator::ValidationReport;

/// Position of a step within its plan (0-based, contiguous).
pub type StepId = usize;

/// One atomic unit of agent work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: StepId,
    pub task: String,
}

/// Ordered sequence of steps. Order is execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    steps: Vec<PlanStep>,
    validation: Option<ValidationReport>,
}

impl Plan {
    /// Build a plan from task descriptions in execution order.
    ///
    /// Ids are assigned in creation order starting at 0. Task text is trimmed;
    /// an empty plan or an empty task is rejected.
    pub fn from_tasks<I, S>(tasks: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut steps = Vec::new();
        for (id, task) in tasks.into_iter().enumerate() {
            let task = task.as_ref().trim();
            if task.is_empty() {
                return Err(format!("step {id} has empty task text"));
            }
            steps.push(PlanStep {
                id,
                task: task.to_string(),
            });
        }
        if steps.is_empty() {
            return Err("plan has no steps".to_string());
        }
        Ok(Self {
            steps,
            validation: None,
        })
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: StepId) -> Option<&PlanStep> {
        self.steps.get(id)
    }

    /// Validation results, once validation has run.
    pub fn validation(&self) -> Option<&ValidationReport> {
        self.validation.as_ref()
    }

    pub fn attach_validation(&mut self, report: ValidationReport) {
        self.validation = Some(report);
    }
}
