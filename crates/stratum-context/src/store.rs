//! Build context: durable cross-phase memory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use stratum_core::persist::{load_json, save_json};
use stratum_core::{Result, STRATUM_DIR};

/// Summary of one completed phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPhase {
    pub name: String,
    pub goal: String,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub key_decisions: Vec<String>,
    #[serde(default)]
    pub design_tokens_used: Vec<String>,
}

impl CompletedPhase {
    pub fn file_count(&self) -> usize {
        self.files_created.len() + self.files_modified.len()
    }
}

/// A dated architectural decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitecturalDecision {
    pub date: String,
    pub decision: String,
}

/// Accumulated knowledge about the build so far
///
/// Only ever grows. Compression renders a smaller view of it and leaves the
/// value itself untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    #[serde(default)]
    pub completed_phases: Vec<CompletedPhase>,
    #[serde(default)]
    pub file_map: BTreeMap<String, String>,
    #[serde(default)]
    pub architectural_decisions: Vec<ArchitecturalDecision>,
    #[serde(default)]
    pub known_issues: Vec<String>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed phase; its files are added to the file map
    ///
    /// Existing purposes are kept unless `purposes` supplies a new one.
    pub fn record_phase(&mut self, phase: CompletedPhase, purposes: &BTreeMap<String, String>) {
        for path in phase.files_created.iter().chain(phase.files_modified.iter()) {
            let purpose = purposes
                .get(path)
                .cloned()
                .or_else(|| self.file_map.get(path).cloned())
                .unwrap_or_else(|| format!("Added in phase '{}'", phase.name));
            self.file_map.insert(path.clone(), purpose);
        }
        for (path, purpose) in purposes {
            self.file_map.insert(path.clone(), purpose.clone());
        }
        self.completed_phases.push(phase);
    }

    /// Record a decision stamped with the given time
    pub fn add_decision(&mut self, decision: impl Into<String>, at: DateTime<Utc>) {
        self.architectural_decisions.push(ArchitecturalDecision {
            date: at.format("%Y-%m-%d").to_string(),
            decision: decision.into(),
        });
    }

    /// Record a known issue, ignoring exact duplicates
    pub fn add_known_issue(&mut self, issue: impl Into<String>) {
        let issue = issue.into();
        if !self.known_issues.contains(&issue) {
            self.known_issues.push(issue);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.completed_phases.is_empty()
            && self.file_map.is_empty()
            && self.architectural_decisions.is_empty()
            && self.known_issues.is_empty()
    }
}

/// Persists the build context as `.stratum/build-context.json`
#[derive(Debug, Clone)]
pub struct BuildContextStore {
    path: PathBuf,
}

impl BuildContextStore {
    /// Store rooted at a project directory
    pub fn new(project_root: &Path) -> Self {
        Self {
            path: project_root.join(STRATUM_DIR).join("build-context.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the context, or an empty one if nothing was saved yet
    pub async fn load(&self) -> Result<BuildContext> {
        let context = load_json(&self.path).await?.unwrap_or_default();
        Ok(context)
    }

    /// Overwrite the stored context
    pub async fn save(&self, context: &BuildContext) -> Result<()> {
        save_json(&self.path, context).await?;
        tracing::debug!(
            phases = context.completed_phases.len(),
            files = context.file_map.len(),
            "Saved build context"
        );
        Ok(())
    }
}
