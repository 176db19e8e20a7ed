//! Chunked build driver
//!
//! Runs the build plan one phase at a time. Each phase gets a fresh Builder
//! invocation with NO conversation history; continuity comes from:
//! - the build context store (completed phases, file map, decisions)
//! - the persisted chunk state (current phase, fix attempts)
//! - the verification error output of the previous attempt
//!
//! State is saved after every status change, so killing the process at any
//! point leaves a document `stratum build` can resume from.

use crate::activity::ActivityLogger;
use crate::prompt::{
    attempt_line, build_fix_prompt, build_phase_prompt, parse_phase_summary, PhaseSummary,
};
use crate::recovery::{write_manual_fix, FailureReport, RecoveryChoice, RecoveryDecider};
use crate::state::{Artifacts, HistoryOutcome, StateDocument, StateStore};
use crate::state_machine::{transition, ChunkState, PhaseEvent, MAX_FIX_ATTEMPTS};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stratum_agent::{
    execute_file_operations, AgentInvoker, ArtifactExtractor, DelimitedExtractor, ExecutionResult,
};
use stratum_context::{
    compress, render_full, should_compress, BuildContext, BuildContextStore, CompletedPhase,
    RenderRequest,
};
use stratum_core::{
    AgentRole, PhaseSpec, PhaseStatus, PipelineStage, ProjectType, Result, StratumConfig,
    StratumError,
};
use stratum_planning::BuildPlan;
use stratum_verify::{detect_project_types, VerificationGate, VerificationResult};
use tracing::{debug, info, warn};

/// How a `build` invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Every phase is completed (verified or skipped)
    Completed { phases: usize, skipped: usize },
    /// Operator chose to pause on a failed phase
    Paused {
        phase_index: usize,
        phase_name: String,
        manual_fix: PathBuf,
    },
}

/// Documents every phase prompt is built from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDocuments {
    pub spec: String,
    pub architecture: String,
    pub design_spec: Option<String>,
}

impl ProjectDocuments {
    /// Read the documents the state file points at
    pub async fn load(project_root: &Path, artifacts: &Artifacts) -> Result<Self> {
        let spec_path = artifacts.spec.as_ref().ok_or_else(|| {
            StratumError::State("No specification recorded; run `stratum init`".to_string())
        })?;
        let architecture_path = artifacts.architecture.as_ref().ok_or_else(|| {
            StratumError::State("No architecture document; run `stratum architect`".to_string())
        })?;

        let spec = tokio::fs::read_to_string(project_root.join(spec_path)).await?;
        let architecture = tokio::fs::read_to_string(project_root.join(architecture_path)).await?;
        let design_spec = match &artifacts.design_spec {
            Some(path) => Some(tokio::fs::read_to_string(project_root.join(path)).await?),
            None => None,
        };

        Ok(Self {
            spec,
            architecture,
            design_spec,
        })
    }
}

enum PhaseOutcome {
    Advanced,
    Retried,
    Paused(PathBuf),
}

/// Files and notes gathered across the Builder calls of one phase
#[derive(Default)]
struct PhaseWork {
    files_created: Vec<String>,
    files_modified: Vec<String>,
    summary: PhaseSummary,
}

impl PhaseWork {
    fn absorb(&mut self, execution: &ExecutionResult, summary: PhaseSummary) {
        for path in &execution.files_created {
            if !self.files_created.contains(path) {
                self.files_created.push(path.clone());
            }
        }
        for path in &execution.files_modified {
            if !self.files_created.contains(path) && !self.files_modified.contains(path) {
                self.files_modified.push(path.clone());
            }
        }
        self.summary.merge(summary);
    }

    fn into_completed(self, phase: &PhaseSpec) -> (CompletedPhase, PhaseSummary) {
        let completed = CompletedPhase {
            name: phase.name.clone(),
            goal: phase.goal.clone(),
            files_created: self.files_created,
            files_modified: self.files_modified,
            key_decisions: self.summary.decisions.clone(),
            design_tokens_used: self.summary.design_tokens.clone(),
        };
        (completed, self.summary)
    }
}

/// Fix attempts spent on the current phase
fn current_fix_attempts(doc: &StateDocument) -> Result<u32> {
    doc.chunk()?
        .current()
        .map(|p| p.runtime.fix_attempts)
        .ok_or_else(|| StratumError::State("No current phase".to_string()))
}

/// Drives the chunked build for one project root
pub struct Orchestrator {
    project_root: PathBuf,
    config: StratumConfig,
    agent: Arc<dyn AgentInvoker>,
    gate: VerificationGate,
    decider: Arc<dyn RecoveryDecider>,
    extractor: Box<dyn ArtifactExtractor>,
    state_store: StateStore,
    context_store: BuildContextStore,
    activity_logger: Option<ActivityLogger>,
}

impl Orchestrator {
    pub fn new(
        project_root: impl Into<PathBuf>,
        config: StratumConfig,
        agent: Arc<dyn AgentInvoker>,
        gate: VerificationGate,
        decider: Arc<dyn RecoveryDecider>,
    ) -> Self {
        let project_root = project_root.into();
        Self {
            state_store: StateStore::new(&project_root),
            context_store: BuildContextStore::new(&project_root),
            project_root,
            config,
            agent,
            gate,
            decider,
            extractor: Box::new(DelimitedExtractor::new()),
            activity_logger: None,
        }
    }

    /// Enable activity logging to `.stratum/activity.md`
    pub fn with_activity_logging(mut self) -> Self {
        self.activity_logger = Some(ActivityLogger::new(&self.project_root));
        self
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state_store
    }

    pub fn context_store(&self) -> &BuildContextStore {
        &self.context_store
    }

    /// Run (or resume) the chunked build until it completes or pauses
    pub async fn build(&self) -> Result<BuildOutcome> {
        let mut doc = self.state_store.load_required().await?;

        if doc.stage > PipelineStage::Build && doc.chunk().is_ok_and(ChunkState::is_complete) {
            info!("Build already complete");
            return Ok(self.completed_outcome(&doc));
        }

        let docs = ProjectDocuments::load(&self.project_root, &doc.artifacts).await?;

        if doc.chunk.is_none() {
            let plan = BuildPlan::parse(&docs.architecture)?;
            info!(phases = plan.len(), milestones = plan.milestone_count(), "Starting chunked build");
            doc.chunk = Some(ChunkState::new(plan.into_phases()));
        }
        doc.stage = PipelineStage::Build;
        self.state_store.save(&mut doc).await?;

        let (total, resume_index) = {
            let chunk = doc.chunk()?;
            (chunk.phases.len(), chunk.current_phase_index)
        };
        if let Some(logger) = &self.activity_logger {
            logger.log_build_start(total, resume_index).await;
        }

        while !doc.chunk()?.is_complete() {
            match self.run_phase(&mut doc, &docs).await? {
                PhaseOutcome::Advanced | PhaseOutcome::Retried => {}
                PhaseOutcome::Paused(manual_fix) => {
                    let chunk = doc.chunk()?;
                    let phase_index = chunk.current_phase_index;
                    let phase_name = chunk
                        .current()
                        .map(|p| p.spec.name.clone())
                        .unwrap_or_default();
                    if let Some(logger) = &self.activity_logger {
                        logger
                            .log_build_end(&format!("paused on phase '{}'", phase_name))
                            .await;
                    }
                    return Ok(BuildOutcome::Paused {
                        phase_index,
                        phase_name,
                        manual_fix,
                    });
                }
            }
        }

        doc.stage = PipelineStage::Review;
        self.state_store.save(&mut doc).await?;

        let outcome = self.completed_outcome(&doc);
        if let BuildOutcome::Completed { phases, skipped } = &outcome {
            info!(phases, skipped, "Chunked build complete");
            if let Some(logger) = &self.activity_logger {
                logger
                    .log_build_end(&format!("{} phases complete ({} skipped)", phases, skipped))
                    .await;
            }
        }
        Ok(outcome)
    }

    fn completed_outcome(&self, doc: &StateDocument) -> BuildOutcome {
        let (phases, skipped) = doc
            .chunk
            .as_ref()
            .map(|c| (c.phases.len(), c.skipped_count()))
            .unwrap_or_default();
        BuildOutcome::Completed { phases, skipped }
    }

    async fn apply(&self, doc: &mut StateDocument, event: PhaseEvent) -> Result<()> {
        transition(doc.chunk_mut()?, event, Utc::now())?;
        self.state_store.save(doc).await
    }

    fn render_context(
        &self,
        context: &BuildContext,
        phase_index: usize,
        total_phases: usize,
        phase: &PhaseSpec,
        docs: &ProjectDocuments,
    ) -> (String, bool) {
        let request = RenderRequest {
            context,
            phase_index,
            total_phases,
            current_phase: phase,
            spec: &docs.spec,
            architecture: &docs.architecture,
            design_spec: docs.design_spec.as_deref(),
        };

        let full = render_full(&request);
        let budget = self.config.context.budget_tokens;
        if !should_compress(&full, budget) {
            return (full, false);
        }

        let (compressed, stats) = compress(&request, &self.config.context);
        info!(
            original_tokens = stats.original_tokens,
            compressed_tokens = stats.compressed_tokens,
            saved_tokens = stats.saved_tokens,
            sections = ?stats.sections_compressed,
            "Compressed build context"
        );
        (compressed, true)
    }

    async fn invoke_builder(
        &self,
        label: &str,
        prompt: &str,
    ) -> Result<(String, ExecutionResult, PhaseSummary)> {
        debug!(prompt_chars = prompt.len(), "Invoking builder: {}", label);
        let output = self
            .agent
            .invoke(AgentRole::Builder, prompt, &self.project_root)
            .await?;

        let execution =
            execute_file_operations(&output, &self.project_root, &self.config.protected_files);
        info!("{}: {}", label, execution.summary());
        for error in &execution.errors {
            warn!("File operation rejected: {}", error);
        }

        if let Some(logger) = &self.activity_logger {
            logger
                .log_builder_output(label, &execution.touched(), &output)
                .await;
        }

        let summary = parse_phase_summary(&output, self.extractor.as_ref());
        Ok((output, execution, summary))
    }

    async fn verify(
        &self,
        phase: &PhaseSpec,
        docs: &ProjectDocuments,
        project_types: &[ProjectType],
    ) -> VerificationResult {
        let result = self
            .gate
            .verify(
                &self.project_root,
                phase.verification_level,
                &docs.spec,
                project_types,
            )
            .await;
        info!(
            phase_name = %phase.name,
            passed = result.passed,
            "Verification: {}",
            result.summary
        );
        if let Some(logger) = &self.activity_logger {
            logger.log_verification(&result).await;
        }
        result
    }

    async fn run_phase(
        &self,
        doc: &mut StateDocument,
        docs: &ProjectDocuments,
    ) -> Result<PhaseOutcome> {
        let (index, total, phase, status, fix_attempts) = {
            let chunk = doc.chunk()?;
            let entry = chunk
                .current()
                .ok_or_else(|| StratumError::State("No current phase".to_string()))?;
            (
                chunk.current_phase_index,
                chunk.phases.len(),
                entry.spec.clone(),
                entry.runtime.status,
                entry.runtime.fix_attempts,
            )
        };

        // A phase that already has fix attempts resumes by re-verifying
        let resuming_fix = match status {
            PhaseStatus::Failed => {
                self.apply(doc, PhaseEvent::Resume).await?;
                true
            }
            PhaseStatus::Pending | PhaseStatus::InProgress => {
                if status == PhaseStatus::Pending {
                    doc.attempt_log.clear();
                }
                self.apply(doc, PhaseEvent::Start).await?;
                fix_attempts > 0
            }
            PhaseStatus::Completed => {
                return Err(StratumError::State(format!(
                    "Phase '{}' is already completed but still current",
                    phase.name
                )));
            }
        };

        info!(
            phase_name = %phase.name,
            phase = index + 1,
            total,
            resuming_fix,
            "Phase started"
        );

        let mut context = self.context_store.load().await?;
        let project_types = detect_project_types(&self.project_root);
        let (rendered, compressed) = self.render_context(&context, index, total, &phase, docs);
        if let Some(logger) = &self.activity_logger {
            logger.log_phase_start(index, total, &phase.name, compressed).await;
        }

        let mut work = PhaseWork::default();
        if !resuming_fix {
            let prompt = build_phase_prompt(&phase, &rendered);
            let (_, execution, summary) = self.invoke_builder("Builder", &prompt).await?;
            work.absorb(&execution, summary);
        }

        let mut result = self.verify(&phase, docs, &project_types).await;

        loop {
            if result.passed {
                break;
            }
            let attempts = current_fix_attempts(doc)?;
            if attempts >= MAX_FIX_ATTEMPTS {
                break;
            }

            self.apply(doc, PhaseEvent::FixAttempt).await?;
            let attempt = attempts + 1;
            warn!(
                phase_name = %phase.name,
                attempt,
                max = MAX_FIX_ATTEMPTS,
                "Verification failed, attempting fix"
            );

            let prompt = build_fix_prompt(
                &phase,
                &rendered,
                &result.error_output,
                attempt,
                MAX_FIX_ATTEMPTS,
                &doc.attempt_log,
            );
            let label = format!("Fix attempt {}/{}", attempt, MAX_FIX_ATTEMPTS);
            let (output, execution, summary) = self.invoke_builder(&label, &prompt).await?;
            doc.attempt_log.push(attempt_line(&execution, &output));
            self.state_store.save(doc).await?;
            work.absorb(&execution, summary);

            result = self.verify(&phase, docs, &project_types).await;
        }

        if result.passed {
            self.complete_phase(doc, &mut context, index, &phase, work)
                .await?;
            Ok(PhaseOutcome::Advanced)
        } else {
            self.recover(doc, &mut context, index, total, &phase, work, &result)
                .await
        }
    }

    async fn complete_phase(
        &self,
        doc: &mut StateDocument,
        context: &mut BuildContext,
        index: usize,
        phase: &PhaseSpec,
        work: PhaseWork,
    ) -> Result<()> {
        let attempts = current_fix_attempts(doc)?;

        let now = Utc::now();
        let (completed, summary) = work.into_completed(phase);
        context.record_phase(completed, &summary.files);
        for decision in summary.decisions {
            context.add_decision(decision, now);
        }
        self.context_store.save(context).await?;

        transition(doc.chunk_mut()?, PhaseEvent::Pass, now)?;
        doc.record(index, &phase.name, HistoryOutcome::Completed, attempts, None);
        doc.attempt_log.clear();
        self.state_store.save(doc).await?;

        info!(phase_name = %phase.name, attempts, "Phase completed");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn recover(
        &self,
        doc: &mut StateDocument,
        context: &mut BuildContext,
        index: usize,
        total: usize,
        phase: &PhaseSpec,
        work: PhaseWork,
        result: &VerificationResult,
    ) -> Result<PhaseOutcome> {
        let attempts = current_fix_attempts(doc)?;
        self.apply(doc, PhaseEvent::Fail).await?;

        let report = FailureReport::from_verification(
            index,
            total,
            phase,
            attempts,
            result,
            &doc.attempt_log,
        );
        warn!(
            phase_name = %phase.name,
            attempts,
            category = %report.category,
            "Fix attempts exhausted"
        );

        let choice = self.decider.decide(&report).await;
        info!(phase_name = %phase.name, %choice, "Recovery decision");
        if let Some(logger) = &self.activity_logger {
            logger
                .log_note(&format!("Recovery for '{}': {} ({})", phase.name, choice, report.category))
                .await;
        }

        match choice {
            RecoveryChoice::Pause => {
                let path = write_manual_fix(&self.project_root, &report).await?;
                doc.record(index, &phase.name, HistoryOutcome::Paused, attempts, Some(report.category));
                self.state_store.save(doc).await?;
                Ok(PhaseOutcome::Paused(path))
            }
            RecoveryChoice::Skip => {
                let (completed, summary) = work.into_completed(phase);
                context.record_phase(completed, &summary.files);
                context.add_known_issue(report.known_issue());
                self.context_store.save(context).await?;

                transition(doc.chunk_mut()?, PhaseEvent::Skip, Utc::now())?;
                doc.record(index, &phase.name, HistoryOutcome::Skipped, attempts, Some(report.category));
                doc.attempt_log.clear();
                self.state_store.save(doc).await?;
                Ok(PhaseOutcome::Advanced)
            }
            RecoveryChoice::Retry => {
                transition(doc.chunk_mut()?, PhaseEvent::Retry, Utc::now())?;
                doc.record(index, &phase.name, HistoryOutcome::Retried, attempts, Some(report.category));
                doc.attempt_log.clear();
                self.state_store.save(doc).await?;
                Ok(PhaseOutcome::Retried)
            }
        }
    }
}
