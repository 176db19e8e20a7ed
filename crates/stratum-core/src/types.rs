//! Core type definitions for Stratum orchestration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How much verification a phase requires before it may advance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationLevel {
    /// Tests only
    #[default]
    Tests,
    /// Tests plus visual and design/accessibility checks (milestones)
    Full,
}

impl std::fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tests => write!(f, "tests"),
            Self::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for VerificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tests" | "test" => Ok(Self::Tests),
            "full" => Ok(Self::Full),
            _ => Err(format!("Invalid verification level: {}", s)),
        }
    }
}

/// One unit of the build plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    pub goal: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub is_milestone: bool,
    #[serde(default)]
    pub verification_level: VerificationLevel,
}

impl PhaseSpec {
    pub fn new(name: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: goal.into(),
            tasks: Vec::new(),
            is_milestone: false,
            verification_level: VerificationLevel::Tests,
        }
    }

    pub fn with_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as a milestone, which always implies full verification
    pub fn milestone(mut self) -> Self {
        self.is_milestone = true;
        self.verification_level = VerificationLevel::Full;
        self
    }
}

/// Runtime status of a phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a completed phase got there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Passed the verification gate
    Verified,
    /// Accepted by the operator despite failing verification
    Skipped,
}

/// Mutable runtime state, one per phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRuntimeState {
    pub status: PhaseStatus,
    #[serde(default)]
    pub fix_attempts: u32,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

impl PhaseRuntimeState {
    pub fn is_skipped(&self) -> bool {
        self.resolution == Some(Resolution::Skipped)
    }
}

/// Roles the orchestrator asks agents to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Interviewer,
    Architect,
    Builder,
    Reviewer,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interviewer => write!(f, "interviewer"),
            Self::Architect => write!(f, "architect"),
            Self::Builder => write!(f, "builder"),
            Self::Reviewer => write!(f, "reviewer"),
        }
    }
}

/// Kind of project being built; drives test command resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Ios,
    Android,
    Backend,
    Web,
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ios => write!(f, "ios"),
            Self::Android => write!(f, "android"),
            Self::Backend => write!(f, "backend"),
            Self::Web => write!(f, "web"),
        }
    }
}

/// Severity attached to visual and design review issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical = 0,
    Serious = 1,
    Moderate = 2,
    Minor = 3,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Serious => write!(f, "serious"),
            Self::Moderate => write!(f, "moderate"),
            Self::Minor => write!(f, "minor"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" | "error" => Ok(Self::Critical),
            "serious" | "high" => Ok(Self::Serious),
            "moderate" | "medium" | "warning" => Ok(Self::Moderate),
            "minor" | "low" | "info" => Ok(Self::Minor),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Stage of the overall pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    Interview,
    Architecture,
    Build,
    Review,
    Done,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interview => write!(f, "interview"),
            Self::Architecture => write!(f, "architecture"),
            Self::Build => write!(f, "build"),
            Self::Review => write!(f, "review"),
            Self::Done => write!(f, "done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milestone_implies_full_verification() {
        let phase = PhaseSpec::new("Shell", "App shell").milestone();
        assert!(phase.is_milestone);
        assert_eq!(phase.verification_level, VerificationLevel::Full);
    }

    #[test]
    fn test_phase_status_serializes_snake_case() {
        let json = serde_json::to_string(&PhaseStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical < Severity::Serious);
        assert!(Severity::Moderate < Severity::Minor);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::Serious);
        assert!("bogus".parse::<Severity>().is_err());
    }

    #[test]
    fn test_runtime_state_defaults() {
        let state: PhaseRuntimeState = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(state.fix_attempts, 0);
        assert!(state.completed_at.is_none());
        assert!(!state.is_skipped());
    }

    #[test]
    fn test_verification_level_from_str() {
        assert_eq!("FULL".parse::<VerificationLevel>().unwrap(), VerificationLevel::Full);
        assert_eq!("test".parse::<VerificationLevel>().unwrap(), VerificationLevel::Tests);
        assert!("visual".parse::<VerificationLevel>().is_err());
    }
}
