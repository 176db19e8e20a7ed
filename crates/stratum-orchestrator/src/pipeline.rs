//! Pipeline stages around the chunked build
//!
//! `init` records the specification, `architect` turns it into an
//! architecture document and build plan, and `review` fans the finished build
//! out to reviewer agents. The build itself lives in [`crate::Orchestrator`].

use crate::orchestrator::ProjectDocuments;
use crate::prompt::{build_architect_prompt, build_review_prompt, ARCHITECTURE_ARTIFACT, DESIGN_SPEC_ARTIFACT};
use crate::state::{StateDocument, StateStore};
use crate::state_machine::{transition, PhaseEvent};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use stratum_agent::{AgentInvoker, ArtifactExtractor, DelimitedExtractor};
use stratum_context::{BuildContext, BuildContextStore};
use stratum_core::persist::write_atomic;
use stratum_core::{AgentRole, PipelineStage, Result, StratumConfig, StratumError, STRATUM_DIR};
use stratum_planning::BuildPlan;
use tracing::{info, warn};

/// Focus areas of the review fan-out, one Reviewer call each
pub const REVIEW_FOCUS_AREAS: &[&str] = &["correctness", "security", "accessibility", "performance"];

fn relative_to(project_root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(project_root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Record the specification and write a default config
///
/// A spec outside the project root is copied to `.stratum/spec.md`.
pub async fn init_project(project_root: &Path, spec_path: &Path) -> Result<StateDocument> {
    let store = StateStore::new(project_root);
    if store.load().await?.is_some() {
        return Err(StratumError::State(format!(
            "Project already initialized ({}); delete it to start over",
            store.path().display()
        )));
    }

    let spec = tokio::fs::read_to_string(spec_path).await?;
    if spec.trim().is_empty() {
        return Err(StratumError::Config(format!(
            "Specification {} is empty",
            spec_path.display()
        )));
    }

    if !StratumConfig::path(project_root).exists() {
        StratumConfig::write_default(project_root)?;
    }

    let spec_artifact = match spec_path.canonicalize() {
        Ok(abs) if project_root.canonicalize().is_ok_and(|root| abs.starts_with(&root)) => {
            let root = project_root.canonicalize()?;
            relative_to(&root, &abs)
        }
        _ => {
            let copy = PathBuf::from(STRATUM_DIR).join("spec.md");
            write_atomic(&project_root.join(&copy), &spec).await?;
            copy
        }
    };

    let mut doc = StateDocument::new();
    doc.stage = PipelineStage::Architecture;
    doc.artifacts.spec = Some(spec_artifact);
    store.save(&mut doc).await?;

    info!(run_id = %doc.run_id, "Initialized project");
    Ok(doc)
}

/// Ask the Architect for an architecture document and parse its build plan
///
/// Re-running replaces the plan; the build restarts at phase 1.
pub async fn architect(project_root: &Path, agent: &dyn AgentInvoker) -> Result<BuildPlan> {
    let store = StateStore::new(project_root);
    let mut doc = store.load_required().await?;

    let spec_path = doc
        .artifacts
        .spec
        .clone()
        .ok_or_else(|| StratumError::State("No specification recorded; run `stratum init`".to_string()))?;
    let spec = tokio::fs::read_to_string(project_root.join(&spec_path)).await?;

    info!("Invoking architect");
    let output = agent
        .invoke(AgentRole::Architect, &build_architect_prompt(&spec), project_root)
        .await?;

    let extractor = DelimitedExtractor::new();
    let architecture = extractor
        .extract(&output, ARCHITECTURE_ARTIFACT)
        .unwrap_or_else(|| output.trim().to_string());
    let plan = BuildPlan::parse(&architecture)?;

    let architecture_path = PathBuf::from(STRATUM_DIR).join("architecture.md");
    write_atomic(&project_root.join(&architecture_path), &architecture).await?;
    doc.artifacts.architecture = Some(architecture_path);

    doc.artifacts.design_spec = match extractor.extract(&output, DESIGN_SPEC_ARTIFACT) {
        Some(design) => {
            let design_path = PathBuf::from(STRATUM_DIR).join("design-spec.md");
            write_atomic(&project_root.join(&design_path), &design).await?;
            Some(design_path)
        }
        None => None,
    };

    doc.stage = PipelineStage::Build;
    doc.chunk = None;
    doc.attempt_log.clear();
    store.save(&mut doc).await?;

    info!(phases = plan.len(), milestones = plan.milestone_count(), "Architecture ready");
    Ok(plan)
}

fn review_context(context: &BuildContext) -> String {
    let mut out = String::from("## BUILD SUMMARY\n\n");
    for phase in &context.completed_phases {
        out.push_str(&format!("- {}: {} ({} files)\n", phase.name, phase.goal, phase.file_count()));
    }
    if !context.file_map.is_empty() {
        out.push_str("\n### Files\n");
        for (path, purpose) in &context.file_map {
            out.push_str(&format!("- `{}`: {}\n", path, purpose));
        }
    }
    if !context.known_issues.is_empty() {
        out.push_str("\n### Known issues\n");
        for issue in &context.known_issues {
            out.push_str(&format!("- {}\n", issue));
        }
    }
    out
}

/// Run reviewer agents over the finished build and write `.stratum/review.md`
///
/// At most `review_concurrency` reviewers run at once. A failed reviewer is
/// noted in the report; the stage fails only if every reviewer failed.
pub async fn review(
    project_root: &Path,
    agent: &dyn AgentInvoker,
    config: &StratumConfig,
) -> Result<PathBuf> {
    let store = StateStore::new(project_root);
    let mut doc = store.load_required().await?;

    let build_done = doc.chunk().is_ok_and(|c| c.is_complete());
    if doc.stage < PipelineStage::Review || !build_done {
        return Err(StratumError::State(
            "Build is not complete; run `stratum build` first".to_string(),
        ));
    }

    let docs = ProjectDocuments::load(project_root, &doc.artifacts).await?;
    let context = BuildContextStore::new(project_root).load().await?;
    let summary = review_context(&context);

    let results: Vec<(&str, Result<String>)> = stream::iter(REVIEW_FOCUS_AREAS.iter().copied())
        .map(|focus| {
            let prompt = build_review_prompt(focus, &docs.spec, &summary);
            async move {
                let result = agent.invoke(AgentRole::Reviewer, &prompt, project_root).await;
                (focus, result)
            }
        })
        .buffered(config.agent.review_concurrency.max(1))
        .collect()
        .await;

    let mut report = format!("# Review\n\nGenerated {}\n\n", Utc::now().format("%Y-%m-%d %H:%M UTC"));
    let mut first_error = None;
    let mut succeeded = 0;
    for (focus, result) in results {
        report.push_str(&format!("## {}\n\n", focus));
        match result {
            Ok(text) => {
                succeeded += 1;
                report.push_str(text.trim());
                report.push_str("\n\n");
            }
            Err(e) => {
                warn!(focus, "Reviewer failed: {}", e);
                report.push_str(&format!("_Reviewer failed: {}_\n\n", e));
                first_error.get_or_insert(e);
            }
        }
    }

    if succeeded == 0 {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    let review_path = PathBuf::from(STRATUM_DIR).join("review.md");
    write_atomic(&project_root.join(&review_path), &report).await?;
    doc.artifacts.review = Some(review_path.clone());
    doc.stage = PipelineStage::Done;
    store.save(&mut doc).await?;

    info!(reviewers = succeeded, "Review written");
    Ok(project_root.join(review_path))
}

/// Put the current phase back to pending with a fresh attempt budget
///
/// Returns the name of the phase that was reset.
pub async fn reset_current_phase(project_root: &Path) -> Result<String> {
    let store = StateStore::new(project_root);
    let mut doc = store.load_required().await?;

    let chunk = doc.chunk_mut()?;
    let name = chunk
        .current()
        .map(|p| p.spec.name.clone())
        .ok_or_else(|| StratumError::State("Build is complete; nothing to reset".to_string()))?;
    transition(chunk, PhaseEvent::Reset, Utc::now())?;

    doc.attempt_log.clear();
    store.save(&mut doc).await?;
    info!(phase_name = %name, "Phase reset");
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::ChunkState;
    use stratum_agent::ScriptedAgent;
    use stratum_core::{PhaseSpec, PhaseStatus};
    use stratum_planning::example_architecture;
    use tempfile::TempDir;

    async fn initialized() -> TempDir {
        let dir = TempDir::new().unwrap();
        let spec = dir.path().join("SPEC.md");
        tokio::fs::write(&spec, "# Recipes\n\nShare recipes with friends.\n")
            .await
            .unwrap();
        init_project(dir.path(), &spec).await.unwrap();
        dir
    }

    #[tokio::test]
    async fn test_init_records_spec_and_config() {
        let dir = initialized().await;
        let doc = StateStore::new(dir.path()).load_required().await.unwrap();
        assert_eq!(doc.stage, PipelineStage::Architecture);
        assert_eq!(doc.artifacts.spec, Some(PathBuf::from("SPEC.md")));
        assert!(StratumConfig::path(dir.path()).exists());

        let spec = dir.path().join("SPEC.md");
        assert!(init_project(dir.path(), &spec).await.is_err());
    }

    #[tokio::test]
    async fn test_init_copies_outside_spec() {
        let outside = TempDir::new().unwrap();
        let spec = outside.path().join("idea.md");
        tokio::fs::write(&spec, "# Idea\n").await.unwrap();

        let dir = TempDir::new().unwrap();
        let doc = init_project(dir.path(), &spec).await.unwrap();
        assert_eq!(doc.artifacts.spec, Some(PathBuf::from(".stratum/spec.md")));
        assert!(dir.path().join(".stratum/spec.md").exists());
    }

    #[tokio::test]
    async fn test_architect_writes_plan_and_design_spec() {
        let dir = initialized().await;
        let output = format!(
            "Here you go.\n\n<artifact name=\"architecture\">\n{}\n</artifact>\n\n\
             <artifact name=\"design-spec\">\n:root {{ --color-primary: #0a84ff; }}\n</artifact>\n",
            example_architecture()
        );
        let agent = ScriptedAgent::new().with_response(AgentRole::Architect, output);

        let plan = architect(dir.path(), &agent).await.unwrap();
        assert_eq!(plan.len(), 3);
        assert!(agent.calls()[0].prompt.contains("Share recipes with friends."));

        let doc = StateStore::new(dir.path()).load_required().await.unwrap();
        assert_eq!(doc.stage, PipelineStage::Build);
        assert!(doc.chunk.is_none());
        let design = tokio::fs::read_to_string(dir.path().join(".stratum/design-spec.md"))
            .await
            .unwrap();
        assert!(design.contains("--color-primary"));
        let architecture = tokio::fs::read_to_string(dir.path().join(".stratum/architecture.md"))
            .await
            .unwrap();
        assert!(!architecture.contains("<artifact"));
    }

    #[tokio::test]
    async fn test_architect_rejects_planless_output() {
        let dir = initialized().await;
        let agent = ScriptedAgent::new().with_response(AgentRole::Architect, "I need more detail.");
        let err = architect(dir.path(), &agent).await.unwrap_err();
        assert!(matches!(err, StratumError::Plan(_)));

        let doc = StateStore::new(dir.path()).load_required().await.unwrap();
        assert_eq!(doc.stage, PipelineStage::Architecture);
        assert!(doc.artifacts.architecture.is_none());
    }

    async fn finished_build(dir: &TempDir) {
        let agent = ScriptedAgent::new().with_response(AgentRole::Architect, example_architecture());
        architect(dir.path(), &agent).await.unwrap();

        let store = StateStore::new(dir.path());
        let mut doc = store.load_required().await.unwrap();
        let mut chunk = ChunkState::new(vec![PhaseSpec::new("Shell", "App shell")]);
        transition(&mut chunk, PhaseEvent::Start, Utc::now()).unwrap();
        transition(&mut chunk, PhaseEvent::Pass, Utc::now()).unwrap();
        doc.chunk = Some(chunk);
        doc.stage = PipelineStage::Review;
        store.save(&mut doc).await.unwrap();
    }

    #[tokio::test]
    async fn test_review_fan_out() {
        let dir = initialized().await;
        finished_build(&dir).await;

        let agent = ScriptedAgent::new()
            .with_error(AgentRole::Reviewer, StratumError::Agent("overloaded".to_string()))
            .with_fallback("- [minor] src/app.tsx: missing alt text");
        let path = review(dir.path(), &agent, &StratumConfig::default())
            .await
            .unwrap();

        assert_eq!(agent.call_count(AgentRole::Reviewer), REVIEW_FOCUS_AREAS.len());
        let report = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(report.contains("## correctness"));
        assert!(report.contains("## performance"));
        assert!(report.contains("Reviewer failed"));
        assert!(report.contains("missing alt text"));

        let doc = StateStore::new(dir.path()).load_required().await.unwrap();
        assert_eq!(doc.stage, PipelineStage::Done);
        assert!(doc.artifacts.review.is_some());
    }

    #[tokio::test]
    async fn test_review_requires_finished_build() {
        let dir = initialized().await;
        let agent = ScriptedAgent::new().with_fallback("fine");
        let err = review(dir.path(), &agent, &StratumConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StratumError::State(_)));
        assert_eq!(agent.call_count(AgentRole::Reviewer), 0);
    }

    #[tokio::test]
    async fn test_reset_current_phase() {
        let dir = initialized().await;
        let store = StateStore::new(dir.path());
        let mut doc = store.load_required().await.unwrap();
        let mut chunk = ChunkState::new(vec![PhaseSpec::new("Shell", "App shell")]);
        transition(&mut chunk, PhaseEvent::Start, Utc::now()).unwrap();
        transition(&mut chunk, PhaseEvent::FixAttempt, Utc::now()).unwrap();
        doc.chunk = Some(chunk);
        doc.attempt_log.push("Changed src/app.tsx".to_string());
        store.save(&mut doc).await.unwrap();

        assert_eq!(reset_current_phase(dir.path()).await.unwrap(), "Shell");

        let doc = store.load_required().await.unwrap();
        let runtime = &doc.chunk().unwrap().phases[0].runtime;
        assert_eq!(runtime.status, PhaseStatus::Pending);
        assert_eq!(runtime.fix_attempts, 0);
        assert!(doc.attempt_log.is_empty());
    }
}
