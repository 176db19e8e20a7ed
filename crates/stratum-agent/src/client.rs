//! Anthropic API backend for the agent boundary
//!
//! Each invocation is a single fresh request with no conversation history.
//! Rate limits are reported, not retried: retry policy belongs to the caller.

use crate::auth;
use crate::invoker::AgentInvoker;
use crate::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use stratum_core::{AgentConfig, AgentRole, Result, StratumError};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const REQUEST_TIMEOUT_SECS: u64 = 600;

/// Agent backed by the Anthropic messages API
#[derive(Debug, Clone)]
pub struct AnthropicAgent {
    model: String,
    max_tokens: usize,
    api_key_env: String,
    client: reqwest::Client,
}

impl AnthropicAgent {
    /// Create a new agent from configuration
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StratumError::Agent(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key_env: config.api_key_env.clone(),
            client,
        })
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// System prompt framing each role
fn system_prompt(role: AgentRole, working_dir: &Path) -> String {
    let duty = match role {
        AgentRole::Interviewer => "You interview the product owner and produce a specification.",
        AgentRole::Architect => {
            "You turn a specification into an architecture document with an ordered list of build phases."
        }
        AgentRole::Builder => {
            "You implement exactly the current build phase. Write complete files, never patches."
        }
        AgentRole::Reviewer => "You critique the finished build and list concrete defects.",
    };
    format!(
        "{}\nProject root: {}",
        duty,
        working_dir.display()
    )
}

#[async_trait]
impl AgentInvoker for AnthropicAgent {
    async fn invoke(&self, role: AgentRole, prompt: &str, working_dir: &Path) -> Result<String> {
        tracing::info!(role = %role, model = %self.model, "Invoking agent");
        tracing::debug!("Prompt length: {} chars", prompt.len());

        let auth_token = auth::get_auth_token(&self.api_key_env)?;

        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(system_prompt(role, working_dir)),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &auth_token)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| StratumError::Agent(format!("Failed to send request: {}", e)))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            tracing::warn!("Rate limited (429), retry after {}s", retry_after_secs);
            return Err(StratumError::RateLimited { retry_after_secs });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(StratumError::AuthRequired(format!(
                "Anthropic API rejected credentials ({}): {}",
                status, error_text
            )));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(StratumError::Agent(format!(
                "Anthropic API error {}: {}",
                status, error_text
            )));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| StratumError::Agent(format!("Failed to parse response: {}", e)))?;

        let output = parsed.text();
        if output.trim().is_empty() {
            return Err(StratumError::Agent("Agent returned no text".to_string()));
        }

        if let Some(usage) = &parsed.usage {
            tracing::info!(
                "Agent {} complete ({} chars, {} input tokens, {} output tokens)",
                role,
                output.len(),
                usage.input_tokens,
                usage.output_tokens
            );
        } else {
            tracing::info!("Agent {} complete ({} chars)", role, output.len());
        }

        Ok(output)
    }
}
