//! Build plan parsing
//!
//! The Architect writes the plan into the architecture document in one of two
//! shapes. A fenced JSON block:
//!
//! ````text
//! ```json
//! {"phases": [{"name": "Shell", "goal": "App shell", "tasks": ["Layout"], "milestone": true}]}
//! ```
//! ````
//!
//! or markdown headings:
//!
//! ```text
//! ### Phase 1: Shell (Milestone)
//! Goal: App shell with navigation
//! - Root layout
//! - Navigation bar
//! ```
//!
//! JSON wins when both are present. Document order is execution order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use stratum_core::{PhaseSpec, Result, StratumError, VerificationLevel};

static JSON_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json[ \t]*\r?\n(.*?)```").expect("JSON_BLOCK_RE regex should compile")
});

static PHASE_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{2,4}\s*Phase\s+\d+\s*[:.\-]\s*(.+?)\s*$")
        .expect("PHASE_HEADING_RE regex should compile")
});

static MILESTONE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[\(\[]\s*milestone\s*[\)\]]").expect("MILESTONE_TAG_RE regex should compile")
});

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(?:\[[ xX]\]\s+)?(.+?)\s*$")
        .expect("BULLET_RE regex should compile")
});

/// Ordered, immutable sequence of phases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    phases: Vec<PhaseSpec>,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    phases: Vec<RawPhase>,
}

#[derive(Debug, Deserialize)]
struct RawPhase {
    name: String,
    #[serde(default)]
    goal: String,
    #[serde(default)]
    tasks: Vec<String>,
    #[serde(default, alias = "milestone")]
    is_milestone: bool,
    #[serde(default)]
    verification_level: Option<VerificationLevel>,
}

impl From<RawPhase> for PhaseSpec {
    fn from(raw: RawPhase) -> Self {
        let mut phase = PhaseSpec::new(raw.name.trim(), raw.goal.trim()).with_tasks(raw.tasks);
        if raw.is_milestone {
            phase = phase.milestone();
        } else if let Some(level) = raw.verification_level {
            phase.verification_level = level;
        }
        phase
    }
}

fn parse_json_plan(doc: &str) -> Option<Vec<PhaseSpec>> {
    JSON_BLOCK_RE
        .captures_iter(doc)
        .filter_map(|caps| serde_json::from_str::<RawPlan>(caps[1].trim()).ok())
        .find(|plan| !plan.phases.is_empty())
        .map(|plan| plan.phases.into_iter().map(PhaseSpec::from).collect())
}

/// `**Goal:** x` and `Goal: x` both become `("goal", "x")`
fn labelled(line: &str) -> Option<(String, String)> {
    let plain = line.replace("**", "");
    let (label, value) = plain.trim().split_once(':')?;
    let label = label.trim().to_lowercase();
    if label.is_empty() || (label.contains(' ') && label != "verification level") {
        return None;
    }
    Some((label, value.trim().to_string()))
}

fn is_affirmative(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value.is_empty() || matches!(value.as_str(), "yes" | "true" | "y")
}

struct PhaseBuilder {
    name: String,
    goal: String,
    tasks: Vec<String>,
    milestone: bool,
    level: Option<VerificationLevel>,
}

impl PhaseBuilder {
    fn build(self) -> PhaseSpec {
        let mut phase = PhaseSpec::new(self.name, self.goal).with_tasks(self.tasks);
        if self.milestone {
            phase = phase.milestone();
        } else if let Some(level) = self.level {
            phase.verification_level = level;
        }
        phase
    }
}

fn parse_markdown_plan(doc: &str) -> Vec<PhaseSpec> {
    let mut phases = Vec::new();
    let mut current: Option<PhaseBuilder> = None;

    for line in doc.lines() {
        if let Some(caps) = PHASE_HEADING_RE.captures(line) {
            if let Some(done) = current.take() {
                phases.push(done.build());
            }
            let raw_name = &caps[1];
            let milestone = MILESTONE_TAG_RE.is_match(raw_name);
            let name = MILESTONE_TAG_RE.replace_all(raw_name, "").trim().to_string();
            current = Some(PhaseBuilder {
                name,
                goal: String::new(),
                tasks: Vec::new(),
                milestone,
                level: None,
            });
            continue;
        }

        let Some(phase) = current.as_mut() else {
            continue;
        };

        // Any other heading closes the phase
        if line.trim_start().starts_with('#') {
            if let Some(done) = current.take() {
                phases.push(done.build());
            }
            continue;
        }

        if let Some(caps) = BULLET_RE.captures(line) {
            let task = caps[1].replace("**", "");
            if let Some((label, value)) = labelled(&task) {
                if label == "milestone" {
                    phase.milestone = is_affirmative(&value);
                    continue;
                }
            }
            phase.tasks.push(task.trim().to_string());
            continue;
        }

        if let Some((label, value)) = labelled(line) {
            match label.as_str() {
                "goal" => phase.goal = value,
                "milestone" => phase.milestone = is_affirmative(&value),
                "verification" | "verification level" => phase.level = value.parse().ok(),
                _ => {}
            }
        }
    }

    if let Some(done) = current.take() {
        phases.push(done.build());
    }
    phases
}

impl BuildPlan {
    /// Parse the plan out of an architecture document
    pub fn parse(doc: &str) -> Result<Self> {
        let phases = match parse_json_plan(doc) {
            Some(phases) => phases,
            None => parse_markdown_plan(doc),
        };
        Self::from_phases(phases)
    }

    /// Build a plan from already-structured phases
    pub fn from_phases(phases: Vec<PhaseSpec>) -> Result<Self> {
        if phases.is_empty() {
            return Err(StratumError::Plan(
                "No build phases found in architecture document".to_string(),
            ));
        }
        if let Some(pos) = phases.iter().position(|p| p.name.trim().is_empty()) {
            return Err(StratumError::Plan(format!("Phase {} has no name", pos + 1)));
        }

        tracing::info!(phases = phases.len(), "Parsed build plan");
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    pub fn into_phases(self) -> Vec<PhaseSpec> {
        self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn milestone_count(&self) -> usize {
        self.phases.iter().filter(|p| p.is_milestone).count()
    }
}

impl std::fmt::Display for BuildPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Build plan: {} phases ({} milestones)",
            self.len(),
            self.milestone_count()
        )?;
        for (idx, phase) in self.phases.iter().enumerate() {
            let marker = if phase.is_milestone { " [milestone]" } else { "" };
            writeln!(f, "  {}. {}{} - {}", idx + 1, phase.name, marker, phase.goal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::example_architecture;

    #[test]
    fn test_parse_markdown_plan() {
        let plan = BuildPlan::parse(&example_architecture()).unwrap();
        assert_eq!(plan.len(), 3);

        let shell = &plan.phases()[0];
        assert_eq!(shell.name, "App Shell");
        assert!(shell.is_milestone);
        assert_eq!(shell.verification_level, VerificationLevel::Full);
        assert_eq!(shell.goal, "Navigable skeleton with routing and layout");
        assert_eq!(shell.tasks, vec!["Root layout with header", "Client-side routing"]);

        let data = &plan.phases()[1];
        assert_eq!(data.name, "Data Layer");
        assert!(!data.is_milestone);
        assert_eq!(data.verification_level, VerificationLevel::Tests);
        assert_eq!(data.tasks.len(), 2);

        assert!(plan.phases()[2].is_milestone);
    }

    #[test]
    fn test_json_plan_preferred() {
        let doc = "### Phase 1: Ignored\nGoal: nope\n\n```json\n{\"phases\": [\
                   {\"name\": \"Scaffold\", \"goal\": \"Project skeleton\", \"tasks\": [\"init\"]},\
                   {\"name\": \"Checkout\", \"goal\": \"Payments\", \"milestone\": true}]}\n```\n";
        let plan = BuildPlan::parse(doc).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.phases()[0].name, "Scaffold");
        assert_eq!(plan.phases()[0].tasks, vec!["init"]);
        assert!(plan.phases()[1].is_milestone);
        assert_eq!(plan.milestone_count(), 1);
    }

    #[test]
    fn test_unrelated_json_block_falls_back_to_markdown() {
        let doc = "```json\n{\"name\": \"pkg\"}\n```\n\n## Phase 1: Only\nGoal: One\n- task\n";
        let plan = BuildPlan::parse(doc).unwrap();
        assert_eq!(plan.phases()[0].name, "Only");
    }

    #[test]
    fn test_milestone_markers() {
        let doc = "### Phase 1: A\nGoal: a\n**Milestone:** yes\n\n\
                   ### Phase 2: B\nGoal: b\n- Milestone: no\n- Real task\n\n\
                   ### Phase 3: C [Milestone]\nGoal: c\n\n\
                   ### Phase 4: D\nGoal: d\nVerification: full\n";
        let plan = BuildPlan::parse(doc).unwrap();
        let phases = plan.phases();
        assert!(phases[0].is_milestone);
        assert!(!phases[1].is_milestone);
        assert_eq!(phases[1].tasks, vec!["Real task"]);
        assert!(phases[2].is_milestone);
        assert_eq!(phases[2].name, "C");
        assert!(!phases[3].is_milestone);
        assert_eq!(phases[3].verification_level, VerificationLevel::Full);
    }

    #[test]
    fn test_other_heading_closes_phase() {
        let doc = "### Phase 1: A\nGoal: a\n- one\n\n## Risks\n- not a task\n";
        let plan = BuildPlan::parse(doc).unwrap();
        assert_eq!(plan.phases()[0].tasks, vec!["one"]);
    }

    #[test]
    fn test_empty_plan_is_error() {
        let err = BuildPlan::parse("# Architecture\n\nNo phases here.").unwrap_err();
        assert!(matches!(err, StratumError::Plan(_)));
        assert!(BuildPlan::from_phases(vec![PhaseSpec::new(" ", "x")]).is_err());
    }

    #[test]
    fn test_display() {
        let plan = BuildPlan::parse(&example_architecture()).unwrap();
        let text = plan.to_string();
        assert!(text.starts_with("Build plan: 3 phases (2 milestones)"));
        assert!(text.contains("1. App Shell [milestone]"));
    }
}
