//! Unified error types for Stratum

use thiserror::Error;

/// Unified error type for all Stratum operations
#[derive(Error, Debug)]
pub enum StratumError {
    // Agent boundary
    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Rate limited by agent backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Agent authentication required: {0}")]
    AuthRequired(String),

    // Planning
    #[error("Build plan error: {0}")]
    Plan(String),

    // Orchestration
    #[error("Phase error: {0}")]
    Phase(String),

    #[error("State error: {0}")]
    State(String),

    // Verification tooling
    #[error("Verification error: {0}")]
    Verification(String),

    #[error("Path validation failed: {0}")]
    PathValidation(String),

    // Configuration
    #[error("Config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl StratumError {
    /// Operator-facing remedy for errors that have an obvious next step
    pub fn remedy(&self) -> Option<String> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(format!(
                "Wait {} seconds and resume with `stratum build`",
                retry_after_secs
            )),
            Self::AuthRequired(_) => Some(
                "Re-authenticate: set CLAUDE_CODE_OAUTH_TOKEN or ANTHROPIC_API_KEY".to_string(),
            ),
            Self::Agent(_) => {
                Some("Check agent backend availability, then resume with `stratum build`".to_string())
            }
            Self::Io(_) => Some("Check disk space and permissions on .stratum/".to_string()),
            Self::Plan(_) => {
                Some("Fix the build phases section of the architecture document".to_string())
            }
            _ => None,
        }
    }

    /// Whether this error came from the agent boundary
    pub fn is_agent_failure(&self) -> bool {
        matches!(
            self,
            Self::Agent(_) | Self::RateLimited { .. } | Self::AuthRequired(_)
        )
    }
}

/// Result type alias using StratumError
pub type Result<T> = std::result::Result<T, StratumError>;
