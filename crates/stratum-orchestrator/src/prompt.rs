//! Prompt builders for the Builder, Architect and Reviewer roles
//!
//! Each prompt is self-contained: agents keep no conversation history, so
//! everything a Builder needs comes from the rendered build context.

use stratum_agent::{file_operation_instructions, ArtifactExtractor, ExecutionResult};
use stratum_core::PhaseSpec;
use stratum_planning::PLAN_FORMAT_INSTRUCTIONS;
use std::collections::BTreeMap;

/// Artifact carrying the Builder's notes about a phase
pub const PHASE_SUMMARY_ARTIFACT: &str = "phase-summary";
pub const ARCHITECTURE_ARTIFACT: &str = "architecture";
pub const DESIGN_SPEC_ARTIFACT: &str = "design-spec";

/// Error output kept in a fix prompt
pub const FIX_ERROR_CHARS: usize = 2000;
/// Length cap of one previous-attempt line
pub const ATTEMPT_LINE_CHARS: usize = 100;

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}\n...[truncated]", head)
    }
}

fn phase_summary_instructions() -> String {
    format!(
        "## PHASE SUMMARY\n\n\
         End your response with a summary artifact:\n\n\
         <artifact name=\"{}\">\n\
         FILES:\n\
         - path/to/file.ts - what the file is for\n\
         DECISION: any architectural decision you made\n\
         TOKEN: any design token you used, e.g. --color-primary\n\
         </artifact>\n",
        PHASE_SUMMARY_ARTIFACT
    )
}

/// Prompt for the first Builder pass over a phase
pub fn build_phase_prompt(phase: &PhaseSpec, rendered_context: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("# STRATUM BUILDER - {}\n\n", phase.name));
    prompt.push_str(
        "Implement ONLY the current phase described below. Earlier phases are done; \
         later phases will be handled separately.\n\n",
    );

    prompt.push_str(rendered_context.trim_end());
    prompt.push_str("\n\n");

    prompt.push_str(file_operation_instructions());
    prompt.push('\n');

    prompt.push_str("## OBJECTIVE\n\n");
    prompt.push_str(&format!("1. Achieve the goal: {}\n", phase.goal));
    prompt.push_str("2. Complete every task listed for this phase\n");
    prompt.push_str("3. Add or update tests that prove the phase works\n\n");

    prompt.push_str(&phase_summary_instructions());
    prompt
}

/// Prompt for one fix attempt
///
/// `previous_attempts` holds one line per earlier attempt of this phase.
pub fn build_fix_prompt(
    phase: &PhaseSpec,
    rendered_context: &str,
    error_output: &str,
    attempt: u32,
    max_attempts: u32,
    previous_attempts: &[String],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "# STRATUM BUILDER - FIX ATTEMPT {} of {} - {}\n\n",
        attempt, max_attempts, phase.name
    ));
    prompt.push_str("Verification failed for the current phase. Fix the errors below.\n\n");

    prompt.push_str("## ERRORS TO FIX\n\n```\n");
    prompt.push_str(&truncate(error_output.trim(), FIX_ERROR_CHARS));
    prompt.push_str("\n```\n\n");

    if !previous_attempts.is_empty() {
        prompt.push_str("## PREVIOUS ATTEMPTS\n\n");
        prompt.push_str("These did not fix the problem. Try something different.\n\n");
        for (idx, line) in previous_attempts.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", idx + 1, line));
        }
        prompt.push('\n');
    }

    prompt.push_str(rendered_context.trim_end());
    prompt.push_str("\n\n");

    prompt.push_str(file_operation_instructions());
    prompt.push('\n');
    prompt.push_str(&phase_summary_instructions());
    prompt
}

/// One line describing what a fix attempt did
///
/// Touched file names when there are any, otherwise the first non-trivial
/// line of the Builder output. Capped at [`ATTEMPT_LINE_CHARS`].
pub fn attempt_line(execution: &ExecutionResult, output: &str) -> String {
    let line = if execution.has_changes() {
        format!("Changed {}", execution.touched().join(", "))
    } else {
        output
            .lines()
            .map(str::trim)
            .find(|l| l.chars().filter(|c| c.is_alphanumeric()).count() >= 3)
            .unwrap_or("No file changes")
            .to_string()
    };

    if line.chars().count() > ATTEMPT_LINE_CHARS {
        let head: String = line.chars().take(ATTEMPT_LINE_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        line
    }
}

/// What the Builder reported about a phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseSummary {
    /// path -> purpose
    pub files: BTreeMap<String, String>,
    pub decisions: Vec<String>,
    pub design_tokens: Vec<String>,
}

impl PhaseSummary {
    pub fn merge(&mut self, other: PhaseSummary) {
        self.files.extend(other.files);
        for decision in other.decisions {
            if !self.decisions.contains(&decision) {
                self.decisions.push(decision);
            }
        }
        for token in other.design_tokens {
            if !self.design_tokens.contains(&token) {
                self.design_tokens.push(token);
            }
        }
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label)
        .then(|| line[label.len()..].trim())
}

/// Parse the phase-summary artifact out of Builder output
pub fn parse_phase_summary(output: &str, extractor: &dyn ArtifactExtractor) -> PhaseSummary {
    let mut summary = PhaseSummary::default();
    let Some(body) = extractor.extract(output, PHASE_SUMMARY_ARTIFACT) else {
        return summary;
    };

    for raw in body.lines() {
        let line = raw.trim().trim_start_matches(['-', '*']).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(decision) = strip_label(line, "DECISION:") {
            if !decision.is_empty() {
                summary.decisions.push(decision.to_string());
            }
        } else if let Some(tokens) = strip_label(line, "TOKEN:") {
            summary.design_tokens.extend(
                tokens
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from),
            );
        } else if let Some(rest) = strip_label(line, "FILES:") {
            if let Some((path, purpose)) = rest.split_once(" - ") {
                summary.files.insert(path.trim().to_string(), purpose.trim().to_string());
            }
        } else if let Some((path, purpose)) = line.split_once(" - ") {
            let path = path.trim().trim_matches('`');
            if !path.is_empty() && !path.contains(' ') {
                summary.files.insert(path.to_string(), purpose.trim().to_string());
            }
        }
    }

    summary
}

/// Prompt asking the Architect to turn a specification into a plan
pub fn build_architect_prompt(spec: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str("# STRATUM ARCHITECT\n\n");
    prompt.push_str("Design the architecture for the product specified below.\n\n");
    prompt.push_str("## SPECIFICATION\n\n");
    prompt.push_str(spec.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## OUTPUT\n\n");
    prompt.push_str(&format!(
        "Wrap the architecture document in <artifact name=\"{}\"> ... </artifact>. \
         Cover the overview, tech stack, data model and module layout.\n\n",
        ARCHITECTURE_ARTIFACT
    ));
    prompt.push_str(&format!(
        "If the product has a UI, also emit design tokens (colors, spacing, typography) \
         as CSS custom properties in <artifact name=\"{}\"> ... </artifact>.\n\n",
        DESIGN_SPEC_ARTIFACT
    ));
    prompt.push_str(PLAN_FORMAT_INSTRUCTIONS);
    prompt
}

/// Prompt for one reviewer in the review fan-out
pub fn build_review_prompt(focus: &str, spec: &str, rendered_context: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("# STRATUM REVIEWER - {}\n\n", focus.to_uppercase()));
    prompt.push_str(&format!(
        "Review the finished build with a focus on {}. The project files are in the \
         working directory.\n\n",
        focus
    ));
    prompt.push_str("## SPECIFICATION\n\n");
    prompt.push_str(spec.trim());
    prompt.push_str("\n\n");
    prompt.push_str(rendered_context.trim_end());
    prompt.push_str("\n\n");
    prompt.push_str("## OUTPUT\n\n");
    prompt.push_str(
        "List concrete defects, one per bullet, most severe first. Prefix each with \
         [critical], [serious], [moderate] or [minor] and name the file involved.\n",
    );
    prompt
}
