//! Configuration management for Stratum
//!
//! Project-level settings live in `.stratum/config.toml`. Every field has a
//! default so a partial (or missing) file is always valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Result, StratumError, STRATUM_DIR};

/// Project-level Stratum configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumConfig {
    /// Files/directories the Builder may never write
    #[serde(default = "default_protected_files")]
    pub protected_files: Vec<String>,

    /// Context budget and compression
    #[serde(default)]
    pub context: ContextConfig,

    /// Verification gate tooling
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Agent backend selection
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Context budget and compression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget for the context handed to the Builder
    #[serde(default = "default_budget_tokens")]
    pub budget_tokens: usize,

    /// Number of most recent completed phases rendered in full detail
    #[serde(default = "default_recent_phases")]
    pub recent_phases_full_detail: usize,

    /// Most recent architectural decisions kept in a compressed view
    #[serde(default = "default_max_decisions")]
    pub max_decisions: usize,
}

/// Verification gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Test run timeout
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,

    /// How long the dev server may take to report readiness
    #[serde(default = "default_server_startup_timeout")]
    pub server_startup_timeout_secs: u64,

    /// Per-file design review timeout
    #[serde(default = "default_design_review_timeout")]
    pub design_review_timeout_secs: u64,

    /// Explicit test command, bypassing project-type resolution
    #[serde(default)]
    pub test_command: Option<String>,

    /// External design/accessibility review tool; receives the file path as last argument
    #[serde(default)]
    pub design_review_command: Option<String>,

    /// `package.json` script used to start the dev server (auto-detected when unset)
    #[serde(default)]
    pub dev_server_script: Option<String>,
}

/// Agent backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model used for all roles
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Reviewer agents queried concurrently during the review stage
    #[serde(default = "default_review_concurrency")]
    pub review_concurrency: usize,
}

// Default value providers
fn default_protected_files() -> Vec<String> {
    vec![
        ".git".to_string(),
        ".stratum".to_string(),
        ".env".to_string(),
        ".secrets".to_string(),
        ".gitignore".to_string(),
    ]
}

fn default_budget_tokens() -> usize {
    50_000
}

fn default_recent_phases() -> usize {
    2
}

fn default_max_decisions() -> usize {
    5
}

fn default_test_timeout() -> u64 {
    300
}

fn default_server_startup_timeout() -> u64 {
    60
}

fn default_design_review_timeout() -> u64 {
    60
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_tokens() -> usize {
    16_000
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_review_concurrency() -> usize {
    3
}

impl StratumConfig {
    /// Path of the config file for a project root
    pub fn path(project_root: &Path) -> std::path::PathBuf {
        project_root.join(STRATUM_DIR).join("config.toml")
    }

    /// Load configuration from `.stratum/config.toml` or use defaults
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = Self::path(project_root);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config = toml::from_str(&content).map_err(|e| {
                StratumError::Config(format!(
                    "Failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?;
            tracing::debug!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.stratum/config.toml`
    pub fn write_default(project_root: &Path) -> Result<()> {
        let config_dir = project_root.join(STRATUM_DIR);
        std::fs::create_dir_all(&config_dir)?;

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| StratumError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(Self::path(project_root), content)?;
        Ok(())
    }
}

impl Default for StratumConfig {
    fn default() -> Self {
        Self {
            protected_files: default_protected_files(),
            context: ContextConfig::default(),
            verification: VerificationConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_tokens: default_budget_tokens(),
            recent_phases_full_detail: default_recent_phases(),
            max_decisions: default_max_decisions(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            test_timeout_secs: default_test_timeout(),
            server_startup_timeout_secs: default_server_startup_timeout(),
            design_review_timeout_secs: default_design_review_timeout(),
            test_command: None,
            design_review_command: None,
            dev_server_script: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            review_concurrency: default_review_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StratumConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.context.recent_phases_full_detail, 2);
        assert_eq!(config.verification.test_timeout_secs, 300);
        assert_eq!(config.verification.server_startup_timeout_secs, 60);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(STRATUM_DIR)).unwrap();
        std::fs::write(
            StratumConfig::path(dir.path()),
            "[context]\nbudget_tokens = 8000\n",
        )
        .unwrap();

        let config = StratumConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.context.budget_tokens, 8000);
        assert_eq!(config.context.max_decisions, 5);
        assert_eq!(config.agent.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = TempDir::new().unwrap();
        StratumConfig::write_default(dir.path()).unwrap();
        let config = StratumConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.context.budget_tokens, default_budget_tokens());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(STRATUM_DIR)).unwrap();
        std::fs::write(StratumConfig::path(dir.path()), "context = [").unwrap();

        let err = StratumConfig::load_or_default(dir.path()).unwrap_err();
        assert!(matches!(err, StratumError::Config(_)));
    }
}
