//! Triage configuration — `apktriage.toml`
//!
//! Everything operators may want to tune without recompiling: the oracle
//! binary and its timeouts, where prompt templates are looked up, and the
//! input bound applied before prose mining. Every field has a default, so
//! a missing config file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{TriageError, TriageResult};

/// Engine configuration (loaded from `apktriage.toml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// External oracle executable name
    #[serde(default = "default_oracle_binary")]
    pub oracle_binary: String,

    /// Fixed arguments passed before the prompt
    #[serde(default = "default_oracle_args")]
    pub oracle_args: Vec<String>,

    /// Wall-clock budget for one oracle invocation
    #[serde(default = "default_oracle_timeout")]
    pub oracle_timeout_secs: u64,

    /// Secondary budget for draining buffered output after exit
    #[serde(default = "default_drain_timeout")]
    pub oracle_drain_timeout_secs: u64,

    /// Candidate prompt-template roots, first existing wins
    #[serde(default = "default_prompt_roots")]
    pub prompt_roots: Vec<PathBuf>,

    /// Oracle output is truncated to this many bytes before mining
    #[serde(default = "default_mining_bound")]
    pub mining_max_input_bytes: usize,
}

fn default_oracle_binary() -> String {
    "claude".to_string()
}
fn default_oracle_args() -> Vec<String> {
    vec!["--dangerously-skip-permissions".to_string()]
}
fn default_oracle_timeout() -> u64 {
    300
}
fn default_drain_timeout() -> u64 {
    10
}
fn default_prompt_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/prompts"), PathBuf::from("prompts")]
}
fn default_mining_bound() -> usize {
    1024 * 1024
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            oracle_binary: default_oracle_binary(),
            oracle_args: default_oracle_args(),
            oracle_timeout_secs: default_oracle_timeout(),
            oracle_drain_timeout_secs: default_drain_timeout(),
            prompt_roots: default_prompt_roots(),
            mining_max_input_bytes: default_mining_bound(),
        }
    }
}

impl TriageConfig {
    /// Load configuration from a specific `.toml` file
    pub fn from_file(path: &Path) -> TriageResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| TriageError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Try `apktriage.toml` under the given root, fall back to defaults
    pub fn from_project_root(root: &Path) -> Self {
        let path = root.join("apktriage.toml");
        if path.exists() {
            match Self::from_file(&path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {} — using defaults", path.display(), e);
                }
            }
        }
        Self::default()
    }
}
