//! Authentication for the Anthropic API
//!
//! Supports two authentication methods:
//! 1. Claude Code OAuth token (CLAUDE_CODE_OAUTH_TOKEN)
//! 2. An API key read from a configurable environment variable

use std::env;
use stratum_core::{Result, StratumError};

const OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// Get authentication token for the Anthropic API
///
/// The OAuth token wins over the API key when both are present.
pub fn get_auth_token(api_key_env: &str) -> Result<String> {
    if let Ok(oauth_token) = env::var(OAUTH_TOKEN_ENV) {
        tracing::debug!("Using Claude Code OAuth token");
        return Ok(oauth_token);
    }

    if let Ok(api_key) = env::var(api_key_env) {
        tracing::debug!("Using {}", api_key_env);
        return Ok(api_key);
    }

    Err(StratumError::AuthRequired(format!(
        "No credentials found. Set either:\n\
         - {}=sk-ant-oat01-...\n\
         - {}=sk-ant-api03-...",
        OAUTH_TOKEN_ENV, api_key_env
    )))
}
