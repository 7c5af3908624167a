//! Wire a [`Runtime`] from a loaded [`Workspace`].

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use tracing::debug;

use crate::core::validator::PolicyValidator;
use crate::io::approval::{ApprovalGate, AutoApprove, StdinApprovalGate};
use crate::io::config::{ApprovalMode, ProviderConfig};
use crate::io::executor::DryRunExecutor;
use crate::io::history::JsonlRunHistory;
use crate::io::openai::{OpenAiProvider, OpenAiSettings};
use crate::io::provider::{CapabilityProvider, RetryingProvider};
use crate::io::workspace::Workspace;
use crate::runtime::{RunOptions, Runtime};

/// Read the API key from the environment variable named in config.
pub fn api_key(config: &ProviderConfig) -> Result<String> {
    let key = std::env::var(&config.api_key_env)
        .with_context(|| format!("read API key from ${}", config.api_key_env))?;
    if key.trim().is_empty() {
        bail!("${} is set but empty", config.api_key_env);
    }
    Ok(key)
}

/// OpenAI provider wrapped in the configured retry policy.
pub fn openai_provider(
    config: &ProviderConfig,
    api_key: String,
) -> Result<Arc<dyn CapabilityProvider>> {
    let provider = OpenAiProvider::new(OpenAiSettings {
        base_url: config.base_url.clone(),
        model: config.model.clone(),
        api_key,
        timeout: config.timeout(),
    })
    .context("build OpenAI provider")?;
    Ok(Arc::new(RetryingProvider::new(
        provider,
        config.retry_policy(),
    )))
}

/// Gate used by the CLI: `--yes` or `approval = "auto"` approve everything.
pub fn approval_gate(mode: ApprovalMode, assume_yes: bool) -> Arc<dyn ApprovalGate> {
    if assume_yes || mode == ApprovalMode::Auto {
        Arc::new(AutoApprove)
    } else {
        Arc::new(StdinApprovalGate)
    }
}

/// Runtime for `workspace` backed by `provider`.
pub fn runtime_for(
    workspace: &Workspace,
    provider: Arc<dyn CapabilityProvider>,
    approvals: Arc<dyn ApprovalGate>,
) -> Result<Runtime> {
    let config = workspace.config();
    let policy = config
        .policy
        .compile()
        .map_err(|err| anyhow!(err))
        .context("compile policy table")?;
    let mut runtime = Runtime::new(
        provider,
        Arc::new(PolicyValidator::new(policy)),
        Arc::new(DryRunExecutor),
        approvals,
    )
    .with_options(RunOptions {
        max_steps: config.planner.max_steps,
        enforce_rules: config.classifier.enforce_rules,
    })
    .with_workspace_root(workspace.root());
    if config.runtime.record_history {
        runtime = runtime.with_history(Arc::new(JsonlRunHistory::new(
            &workspace.paths().history_path,
        )));
    }
    debug!(
        root = %workspace.root().display(),
        model = %config.provider.model,
        record_history = config.runtime.record_history,
        "runtime ready"
    );
    Ok(runtime)
}

/// Runtime for `workspace` using the configured OpenAI backend.
pub fn build_runtime(workspace: &Workspace, approvals: Arc<dyn ApprovalGate>) -> Result<Runtime> {
    let provider_config = &workspace.config().provider;
    let provider = openai_provider(provider_config, api_key(provider_config)?)?;
    runtime_for(workspace, provider, approvals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intent::{Category, OperationType, RiskLevel};
    use crate::core::status::RuntimeStatus;
    use crate::io::config::ZipcodeConfig;
    use crate::test_support::{
        FixedApproval, ScriptedProvider, has_history, intent, intent_json, plan_json,
        temp_workspace,
    };

    #[test]
    fn missing_api_key_is_an_error() {
        let config = ProviderConfig {
            api_key_env: "ZIPCODE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ProviderConfig::default()
        };
        let err = api_key(&config).unwrap_err();
        assert!(
            err.to_string()
                .contains("$ZIPCODE_TEST_KEY_THAT_IS_NEVER_SET"),
            "{err:#}"
        );
    }

    #[tokio::test]
    async fn wired_runtime_records_history() {
        let temp = temp_workspace(&ZipcodeConfig::default()).expect("workspace");
        let workspace = Workspace::load(temp.path()).expect("load");
        let provider = Arc::new(ScriptedProvider::texts([
            intent_json(&intent(
                Category::Documentation,
                OperationType::ModifyExisting,
                RiskLevel::Low,
                false,
            )),
            plan_json(&["update the README usage section"]),
        ]));
        let runtime =
            runtime_for(&workspace, provider, FixedApproval::approve()).expect("runtime");

        let outcome = runtime.run("document the new flag").await.expect("run");
        assert_eq!(outcome.status, RuntimeStatus::Succeeded);
        assert!(has_history(temp.path()));

        let records = JsonlRunHistory::new(&workspace.paths().history_path)
            .read_all()
            .expect("read history");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].run_id, outcome.run_id);
        assert_eq!(records[0].steps.len(), 1);
    }

    #[tokio::test]
    async fn history_can_be_disabled() {
        let mut config = ZipcodeConfig::default();
        config.runtime.record_history = false;
        let temp = temp_workspace(&config).expect("workspace");
        let workspace = Workspace::load(temp.path()).expect("load");
        let provider = Arc::new(ScriptedProvider::texts([
            intent_json(&intent(
                Category::Analysis,
                OperationType::ReadOnly,
                RiskLevel::Low,
                false,
            )),
            plan_json(&["read the module"]),
        ]));
        let runtime =
            runtime_for(&workspace, provider, FixedApproval::approve()).expect("runtime");
        runtime.run("explain the module").await.expect("run");
        assert!(!has_history(temp.path()));
    }
}
