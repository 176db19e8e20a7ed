//! Agent invocation trait and a scripted implementation for tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use stratum_core::{AgentRole, Result, StratumError};

/// Trait for invoking generative agents (allows mocking in tests)
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Send `prompt` to an agent playing `role` inside `working_dir`
    ///
    /// Rate limits surface as [`StratumError::RateLimited`], missing
    /// credentials as [`StratumError::AuthRequired`]; callers treat all errors
    /// as the current step failing.
    async fn invoke(&self, role: AgentRole, prompt: &str, working_dir: &Path) -> Result<String>;
}

/// A recorded call made against a [`ScriptedAgent`]
#[derive(Debug, Clone)]
pub struct Invocation {
    pub role: AgentRole,
    pub prompt: String,
    pub working_dir: PathBuf,
}

/// Agent that replays canned responses per role
///
/// Responses are consumed in order. When a role's queue is empty the
/// fallback response is returned, or an agent error if none was set.
#[derive(Default)]
pub struct ScriptedAgent {
    responses: Mutex<HashMap<AgentRole, VecDeque<Result<String>>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response for `role`
    pub fn with_response(self, role: AgentRole, output: impl Into<String>) -> Self {
        self.push(role, Ok(output.into()));
        self
    }

    /// Queue a failure for `role`
    pub fn with_error(self, role: AgentRole, error: StratumError) -> Self {
        self.push(role, Err(error));
        self
    }

    /// Response returned once a role's queue runs dry
    pub fn with_fallback(mut self, output: impl Into<String>) -> Self {
        self.fallback = Some(output.into());
        self
    }

    fn push(&self, role: AgentRole, response: Result<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.entry(role).or_default().push_back(response);
        }
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls made for a role
    pub fn call_count(&self, role: AgentRole) -> usize {
        self.calls().iter().filter(|c| c.role == role).count()
    }
}

#[async_trait]
impl AgentInvoker for ScriptedAgent {
    async fn invoke(&self, role: AgentRole, prompt: &str, working_dir: &Path) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Invocation {
                role,
                prompt: prompt.to_string(),
                working_dir: working_dir.to_path_buf(),
            });
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut r| r.get_mut(&role).and_then(|q| q.pop_front()));

        match next {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| StratumError::Agent(format!("No scripted response for {}", role))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_agent_replays_in_order() {
        let agent = ScriptedAgent::new()
            .with_response(AgentRole::Builder, "first")
            .with_response(AgentRole::Builder, "second");

        let dir = Path::new("/tmp/project");
        assert_eq!(agent.invoke(AgentRole::Builder, "p1", dir).await.unwrap(), "first");
        assert_eq!(agent.invoke(AgentRole::Builder, "p2", dir).await.unwrap(), "second");
        assert!(agent.invoke(AgentRole::Builder, "p3", dir).await.is_err());
        assert_eq!(agent.call_count(AgentRole::Builder), 3);
        assert_eq!(agent.calls()[1].prompt, "p2");
    }

    #[tokio::test]
    async fn test_scripted_agent_fallback_and_errors() {
        let agent = ScriptedAgent::new()
            .with_error(
                AgentRole::Reviewer,
                StratumError::RateLimited {
                    retry_after_secs: 5,
                },
            )
            .with_fallback("ok");

        let dir = Path::new(".");
        let err = agent.invoke(AgentRole::Reviewer, "p", dir).await.unwrap_err();
        assert!(matches!(err, StratumError::RateLimited { retry_after_secs: 5 }));
        assert_eq!(agent.invoke(AgentRole::Reviewer, "p", dir).await.unwrap(), "ok");
        assert_eq!(agent.call_count(AgentRole::Builder), 0);
    }
}
