//! Read-only workspace snapshot consumed by a run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::io::config::{ZipcodeConfig, load_config};

/// Canonical paths under `<root>/.zipcode/`.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub history_path: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: &Path) -> Self {
        let state_dir = root.join(".zipcode");
        Self {
            config_path: state_dir.join("config.toml"),
            history_path: state_dir.join("history.jsonl"),
            state_dir,
        }
    }
}

/// Root path plus the configuration loaded from it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    paths: WorkspacePaths,
    config: ZipcodeConfig,
}

impl Workspace {
    /// Load the workspace rooted at `root`.
    pub fn load(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("workspace root {} is not a directory", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve workspace root {}", root.display()))?;
        let paths = WorkspacePaths::new(&root);
        let config = load_config(&paths.config_path)?;
        debug!(root = %root.display(), model = %config.provider.model, "workspace loaded");
        Ok(Self {
            root,
            paths,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn config(&self) -> &ZipcodeConfig {
        &self.config
    }
}
