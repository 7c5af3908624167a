//! System prompts for the classifier and the planner.

use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::intent::Intent;

const CLASSIFIER_TEMPLATE: &str = include_str!("../prompts/intent_classifier.md");
const PLANNER_TEMPLATE: &str = include_str!("../prompts/planner.md");

#[derive(Debug, Clone, Serialize)]
struct CategoryDoc {
    name: &'static str,
    meaning: &'static str,
}

const CATEGORIES: [CategoryDoc; 11] = [
    CategoryDoc {
        name: "feature",
        meaning: "adds new functionality",
    },
    CategoryDoc {
        name: "refactor",
        meaning: "improves structure without changing behavior",
    },
    CategoryDoc {
        name: "bugfix",
        meaning: "fixes incorrect behavior",
    },
    CategoryDoc {
        name: "analysis",
        meaning: "explanation, inspection, or reasoning about code",
    },
    CategoryDoc {
        name: "test",
        meaning: "adds or modifies tests",
    },
    CategoryDoc {
        name: "documentation",
        meaning: "adds or updates documentation",
    },
    CategoryDoc {
        name: "configuration",
        meaning: "changes config, env, or infra definitions",
    },
    CategoryDoc {
        name: "performance",
        meaning: "optimization or efficiency improvement",
    },
    CategoryDoc {
        name: "security",
        meaning: "security hardening or vulnerability fix",
    },
    CategoryDoc {
        name: "cleanup",
        meaning: "code removal, dead code elimination, formatting",
    },
    CategoryDoc {
        name: "unknown",
        meaning: "cannot confidently determine",
    },
];

const OPERATIONS: [&str; 5] = [
    "modify_existing",
    "create_new",
    "delete_existing",
    "read_only",
    "mixed",
];

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("classifier", CLASSIFIER_TEMPLATE)?;
        env.add_template("planner", PLANNER_TEMPLATE)?;
        Ok(Self { env })
    }
}

/// Render the intent classifier system prompt.
pub fn classifier_system_prompt() -> Result<String, minijinja::Error> {
    let engine = PromptEngine::new()?;
    engine.env.get_template("classifier")?.render(context! {
        categories => CATEGORIES,
        operations => OPERATIONS,
    })
}

/// Render the planner system prompt for a classified intent.
pub fn planner_system_prompt(
    intent: &Intent,
    max_steps: usize,
) -> Result<String, minijinja::Error> {
    let engine = PromptEngine::new()?;
    engine.env.get_template("planner")?.render(context! {
        intent => intent,
        max_steps => max_steps,
    })
}
