//! The persisted state document: `.stratum/state.json`

use crate::categorize::ErrorCategory;
use crate::state_machine::ChunkState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stratum_core::persist::{load_json, save_json};
use stratum_core::{PipelineStage, Result, StratumError, STRATUM_DIR};
use uuid::Uuid;

/// What happened to a phase at a history point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOutcome {
    Completed,
    Skipped,
    Paused,
    Retried,
}

impl std::fmt::Display for HistoryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Paused => write!(f, "paused"),
            Self::Retried => write!(f, "retried"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub phase_index: usize,
    pub phase_name: String,
    pub outcome: HistoryOutcome,
    /// Fix attempts used before this outcome
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
}

/// Project-relative paths of pipeline documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_spec: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<PathBuf>,
}

/// Everything needed to resume a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    pub run_id: Uuid,
    #[serde(default)]
    pub stage: PipelineStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkState>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub artifacts: Artifacts,
    /// One line per fix attempt of the current phase
    #[serde(default)]
    pub attempt_log: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl StateDocument {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage: PipelineStage::default(),
            chunk: None,
            history: Vec::new(),
            artifacts: Artifacts::default(),
            attempt_log: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn chunk(&self) -> Result<&ChunkState> {
        self.chunk
            .as_ref()
            .ok_or_else(|| StratumError::State("No build plan loaded; run `stratum build`".to_string()))
    }

    pub fn chunk_mut(&mut self) -> Result<&mut ChunkState> {
        self.chunk
            .as_mut()
            .ok_or_else(|| StratumError::State("No build plan loaded; run `stratum build`".to_string()))
    }

    pub fn record(
        &mut self,
        phase_index: usize,
        phase_name: &str,
        outcome: HistoryOutcome,
        attempts: u32,
        error_category: Option<ErrorCategory>,
    ) {
        self.history.push(HistoryEntry {
            at: Utc::now(),
            phase_index,
            phase_name: phase_name.to_string(),
            outcome,
            attempts,
            error_category,
        });
    }
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StateDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run: {}", self.run_id)?;
        writeln!(f, "Stage: {}", self.stage)?;
        writeln!(f, "Updated: {}", self.updated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        if let Some(chunk) = &self.chunk {
            writeln!(f)?;
            write!(f, "{}", chunk)?;
        }
        if !self.history.is_empty() {
            writeln!(f)?;
            writeln!(f, "Recent history:")?;
            let skip = self.history.len().saturating_sub(5);
            for entry in self.history.iter().skip(skip) {
                write!(
                    f,
                    "  {} {} {} (attempts: {})",
                    entry.at.format("%Y-%m-%d %H:%M"),
                    entry.phase_name,
                    entry.outcome,
                    entry.attempts
                )?;
                if let Some(category) = entry.error_category {
                    write!(f, " [{}]", category)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Loads and saves the state document for one project root
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(project_root: &Path) -> Self {
        Self {
            path: project_root.join(STRATUM_DIR).join("state.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<StateDocument>> {
        load_json(&self.path).await
    }

    /// Load the document or fail with a hint to run `stratum init`
    pub async fn load_required(&self) -> Result<StateDocument> {
        self.load().await?.ok_or_else(|| {
            StratumError::State(format!(
                "No state at {}; run `stratum init` first",
                self.path.display()
            ))
        })
    }

    /// Stamp and write the whole document
    pub async fn save(&self, doc: &mut StateDocument) -> Result<()> {
        doc.updated_at = Utc::now();
        save_json(&self.path, doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::PhaseSpec;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load().await.unwrap().is_none());
        assert!(store.load_required().await.is_err());

        let mut doc = StateDocument::new();
        doc.stage = PipelineStage::Build;
        doc.chunk = Some(ChunkState::new(vec![PhaseSpec::new("Shell", "App shell")]));
        doc.artifacts.spec = Some(PathBuf::from("SPEC.md"));
        doc.record(0, "Shell", HistoryOutcome::Skipped, 2, Some(ErrorCategory::TestFailure));
        store.save(&mut doc).await.unwrap();

        let loaded = store.load_required().await.unwrap();
        assert_eq!(loaded, doc);
        assert!(store.path().ends_with(".stratum/state.json"));
    }

    #[test]
    fn test_missing_chunk_is_state_error() {
        let mut doc = StateDocument::new();
        assert!(matches!(doc.chunk(), Err(StratumError::State(_))));
        assert!(doc.chunk_mut().is_err());
    }

    #[test]
    fn test_display() {
        let mut doc = StateDocument::new();
        doc.chunk = Some(ChunkState::new(vec![PhaseSpec::new("Shell", "App shell")]));
        doc.record(0, "Shell", HistoryOutcome::Paused, 2, Some(ErrorCategory::Network));
        let text = doc.to_string();
        assert!(text.contains("Stage: interview"));
        assert!(text.contains("Phases: 0/1 complete"));
        assert!(text.contains("Shell paused (attempts: 2) [network error]"));
    }
}
