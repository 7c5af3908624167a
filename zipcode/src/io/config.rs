//! Workspace configuration stored under `.zipcode/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::PolicyTable;
use crate::io::provider::RetryPolicy;

/// Zipcode configuration (TOML).
///
/// Meant to be edited by humans. Missing fields default to the values below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ZipcodeConfig {
    pub provider: ProviderConfig,
    pub classifier: ClassifierConfig,
    pub planner: PlannerConfig,
    pub runtime: RuntimeConfig,
    pub policy: PolicyTable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Per-call timeout. A call exceeding it is a transport failure.
    pub timeout_secs: u64,
    /// Transport failures retried by the caller-side decorator (0 = none).
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Fail the run when the intent contradicts the classification rules.
    /// When off, violations are only logged.
    pub enforce_rules: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enforce_rules: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    pub max_steps: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { max_steps: 20 }
    }
}

/// How steps that need approval are resolved by the CLI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Ask on the terminal.
    #[default]
    Prompt,
    /// Approve every request.
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub approval: ApprovalMode,
    /// Append a record per run to `.zipcode/history.jsonl`.
    pub record_history: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            approval: ApprovalMode::Prompt,
            record_history: true,
        }
    }
}

impl ZipcodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.provider.model.trim().is_empty() {
            return Err(anyhow!("provider.model must be non-empty"));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(anyhow!("provider.base_url must be non-empty"));
        }
        if self.provider.api_key_env.trim().is_empty() {
            return Err(anyhow!("provider.api_key_env must be non-empty"));
        }
        if self.provider.timeout_secs == 0 {
            return Err(anyhow!("provider.timeout_secs must be > 0"));
        }
        if self.planner.max_steps == 0 {
            return Err(anyhow!("planner.max_steps must be > 0"));
        }
        self.policy.compile().map_err(|err| anyhow!(err))?;
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ZipcodeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ZipcodeConfig> {
    if !path.exists() {
        let cfg = ZipcodeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ZipcodeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ZipcodeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
