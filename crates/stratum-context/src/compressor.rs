//! Context compression
//!
//! Produces a phase-focused rendering of the build context that fits the
//! budget better than the full rendering. The policy is textual and
//! deterministic:
//!
//! 1. Only the most recent completed phases keep full detail; older ones
//!    shrink to a single line.
//! 2. The file map keeps entries that share a token with the current phase's
//!    tasks, plus an allowlist of project-wide files. The rest are counted.
//! 3. Specification and architecture documents are cut down to their
//!    overview, tech stack and sections matching the current phase.
//! 4. Design tokens are always included verbatim.
//! 5. Decisions are capped; known issues are kept as-is.
//!
//! Relevance is keyword overlap, nothing smarter. A file a later phase needs
//! can be filtered out if its path and purpose share no token with the tasks.

use crate::estimator::{analyze_context_health, estimate_tokens, HealthStatus};
use crate::store::{BuildContext, CompletedPhase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use stratum_core::{ContextConfig, PhaseSpec};

/// Compress earlier than the warning tier
const EARLY_COMPRESSION_PERCENT: usize = 70;

/// Paths always kept in the file map
const ALWAYS_INCLUDE: &[&str] = &["package.json", "tsconfig", "tailwind", "layout", "app.", "index."];

const GOAL_SNIPPET_CHARS: usize = 50;
const DESIGN_TOKENS_SHOWN: usize = 10;

const OVERVIEW_CAP: usize = 800;
const TECH_STACK_CAP: usize = 500;
const KEYWORD_SECTION_CAP: usize = 300;
const MAX_KEYWORD_SECTIONS: usize = 6;

/// Words too common to identify a relevant document section
const SECTION_STOPWORDS: &[&str] = &[
    "with", "that", "this", "from", "into", "using", "should", "will", "each", "when", "have",
    "make", "create", "implement", "build", "add", "update", "ensure", "basic", "setup", "phase",
    "their", "them", "then", "than", "also",
];

/// Everything needed to render the context for one phase
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub context: &'a BuildContext,
    /// Zero-based index of the phase about to run
    pub phase_index: usize,
    pub total_phases: usize,
    pub current_phase: &'a PhaseSpec,
    pub spec: &'a str,
    pub architecture: &'a str,
    pub design_spec: Option<&'a str>,
}

/// What compression achieved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionStats {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    /// Never negative: clamped to zero if compression grew the text
    pub saved_tokens: usize,
    pub sections_compressed: Vec<String>,
}

/// Whether `text` should be compressed before being sent to an agent
pub fn should_compress(text: &str, budget: usize) -> bool {
    let report = analyze_context_health(text, budget);
    report.status != HealthStatus::Healthy || report.percentage_used > EARLY_COMPRESSION_PERCENT
}

/// Lower-cased tokens longer than two characters, split on anything that is not alphanumeric
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
}

/// Relevance tokens drawn from a phase's task descriptions
pub fn relevance_tokens(tasks: &[String]) -> BTreeSet<String> {
    tasks.iter().flat_map(|t| tokenize(t)).collect()
}

fn section_keywords(phase: &PhaseSpec) -> BTreeSet<String> {
    std::iter::once(phase.name.as_str())
        .chain(std::iter::once(phase.goal.as_str()))
        .chain(phase.tasks.iter().map(String::as_str))
        .flat_map(tokenize)
        .filter(|t| t.chars().count() > 3 && !SECTION_STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn truncate_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        text.to_string()
    } else {
        let head: String = text.chars().take(cap).collect();
        format!("{}...", head.trim_end())
    }
}

fn render_header(req: &RenderRequest<'_>, out: &mut String) {
    let phase = req.current_phase;
    out.push_str("# BUILD CONTEXT\n\n");
    out.push_str(&format!(
        "Phase {} of {}: {}\n\n",
        req.phase_index + 1,
        req.total_phases,
        phase.name
    ));

    out.push_str("## CURRENT PHASE\n\n");
    out.push_str(&format!("**Goal:** {}\n\n", phase.goal));
    if !phase.tasks.is_empty() {
        out.push_str("**Tasks:**\n");
        for task in &phase.tasks {
            out.push_str(&format!("- {}\n", task));
        }
        out.push('\n');
    }
    if phase.is_milestone {
        out.push_str("**Milestone:** tests, visual and design checks must pass\n\n");
    }
}

fn render_document(title: &str, body: &str, out: &mut String) {
    let body = body.trim();
    if body.is_empty() {
        return;
    }
    out.push_str(&format!("## {}\n\n{}\n\n", title, body));
}

fn render_design(req: &RenderRequest<'_>, out: &mut String) {
    if let Some(design) = req.design_spec {
        render_document("DESIGN TOKENS", design, out);
    }
}

fn render_phase_full(phase: &CompletedPhase, max_tokens: Option<usize>, out: &mut String) {
    out.push_str(&format!("### {}\n", phase.name));
    out.push_str(&format!("Goal: {}\n", phase.goal));
    if !phase.files_created.is_empty() {
        out.push_str(&format!("Files created: {}\n", phase.files_created.join(", ")));
    }
    if !phase.files_modified.is_empty() {
        out.push_str(&format!("Files modified: {}\n", phase.files_modified.join(", ")));
    }
    if !phase.key_decisions.is_empty() {
        out.push_str("Decisions:\n");
        for decision in &phase.key_decisions {
            out.push_str(&format!("- {}\n", decision));
        }
    }
    if !phase.design_tokens_used.is_empty() {
        let shown = max_tokens.unwrap_or(phase.design_tokens_used.len());
        let tokens: Vec<&str> = phase
            .design_tokens_used
            .iter()
            .take(shown)
            .map(String::as_str)
            .collect();
        out.push_str(&format!("Design tokens: {}\n", tokens.join(", ")));
    }
    out.push('\n');
}

fn render_phase_line(phase: &CompletedPhase, out: &mut String) {
    out.push_str(&format!(
        "- {}: {} ({} files)\n",
        phase.name,
        truncate_chars(&phase.goal, GOAL_SNIPPET_CHARS),
        phase.file_count()
    ));
}

fn render_decisions(context: &BuildContext, keep_last: Option<usize>, out: &mut String) {
    let decisions = &context.architectural_decisions;
    if decisions.is_empty() {
        return;
    }
    let skip = keep_last.map_or(0, |n| decisions.len().saturating_sub(n));
    out.push_str("## ARCHITECTURAL DECISIONS\n\n");
    for decision in decisions.iter().skip(skip) {
        out.push_str(&format!("- [{}] {}\n", decision.date, decision.decision));
    }
    out.push('\n');
}

fn render_known_issues(context: &BuildContext, out: &mut String) {
    if context.known_issues.is_empty() {
        return;
    }
    out.push_str("## KNOWN ISSUES\n\n");
    for issue in &context.known_issues {
        out.push_str(&format!("- {}\n", issue));
    }
    out.push('\n');
}

/// Uncompressed rendering: every phase, file, decision and full documents
pub fn render_full(req: &RenderRequest<'_>) -> String {
    let mut out = String::new();
    render_header(req, &mut out);
    render_document("SPECIFICATION", req.spec, &mut out);
    render_document("ARCHITECTURE", req.architecture, &mut out);
    render_design(req, &mut out);

    let context = req.context;
    if !context.completed_phases.is_empty() {
        out.push_str("## COMPLETED PHASES\n\n");
        for phase in &context.completed_phases {
            render_phase_full(phase, None, &mut out);
        }
    }

    if !context.file_map.is_empty() {
        out.push_str("## FILE MAP\n\n");
        for (path, purpose) in &context.file_map {
            out.push_str(&format!("- `{}` - {}\n", path, purpose));
        }
        out.push('\n');
    }

    render_decisions(context, None, &mut out);
    render_known_issues(context, &mut out);
    out
}

/// A markdown section: heading line plus body up to the next heading
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    level: usize,
    heading: String,
    body: String,
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim()))
}

/// Split a markdown document into sections; text before the first heading is dropped
fn parse_sections(doc: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut in_fence = false;

    for line in doc.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let heading = if in_fence { None } else { parse_heading(line) };
        match heading {
            Some((level, text)) => sections.push(Section {
                level,
                heading: text.to_string(),
                body: String::new(),
            }),
            None => {
                if let Some(current) = sections.last_mut() {
                    current.body.push_str(line);
                    current.body.push('\n');
                }
            }
        }
    }

    for section in &mut sections {
        section.body = section.body.trim().to_string();
    }
    sections
}

fn is_overview(heading: &str) -> bool {
    heading.contains("overview") || heading.contains("summary")
}

fn is_tech_stack(heading: &str) -> bool {
    heading.contains("tech stack") || heading.contains("technology") || heading.contains("stack")
}

/// Reduce a document to overview, tech stack and phase-relevant sections
fn extract_sections(doc: &str, keywords: &BTreeSet<String>) -> String {
    let sections = parse_sections(doc);
    if sections.is_empty() {
        return truncate_chars(doc.trim(), OVERVIEW_CAP);
    }

    let mut out = String::new();
    let mut keyword_sections = 0;

    for section in &sections {
        let heading = section.heading.to_lowercase();
        let cap = if is_overview(&heading) {
            OVERVIEW_CAP
        } else if is_tech_stack(&heading) {
            TECH_STACK_CAP
        } else {
            if keyword_sections >= MAX_KEYWORD_SECTIONS {
                continue;
            }
            let body = section.body.to_lowercase();
            let relevant = keywords
                .iter()
                .any(|k| heading.contains(k.as_str()) || body.contains(k.as_str()));
            if !relevant {
                continue;
            }
            keyword_sections += 1;
            KEYWORD_SECTION_CAP
        };

        out.push_str(&format!(
            "{} {}\n",
            "#".repeat(section.level),
            section.heading
        ));
        if !section.body.is_empty() {
            out.push_str(&truncate_chars(&section.body, cap));
            out.push('\n');
        }
        out.push('\n');
    }

    out.trim_end().to_string()
}

/// Compressed rendering of the context for the current phase
///
/// Deterministic: the same request and config always yield the same text.
pub fn compress(req: &RenderRequest<'_>, config: &ContextConfig) -> (String, CompressionStats) {
    let original = render_full(req);
    let context = req.context;
    let mut sections_compressed = Vec::new();
    let mut out = String::new();

    render_header(req, &mut out);

    // Spec and architecture: overview, tech stack and matching sections only
    let keywords = section_keywords(req.current_phase);
    for (title, name, doc) in [
        ("SPECIFICATION (relevant sections)", "specification", req.spec),
        ("ARCHITECTURE (relevant sections)", "architecture", req.architecture),
    ] {
        if doc.trim().is_empty() {
            continue;
        }
        let extracted = extract_sections(doc, &keywords);
        if extracted != doc.trim() {
            sections_compressed.push(name.to_string());
        }
        render_document(title, &extracted, &mut out);
    }

    // Design tokens are consumed literally downstream
    render_design(req, &mut out);

    // Phase history: recent phases in full, older ones as one line each
    let phases = &context.completed_phases;
    if !phases.is_empty() {
        let split = phases.len().saturating_sub(config.recent_phases_full_detail);
        out.push_str("## COMPLETED PHASES\n\n");
        if split > 0 {
            sections_compressed.push("phase_history".to_string());
            out.push_str("Earlier phases:\n");
            for phase in &phases[..split] {
                render_phase_line(phase, &mut out);
            }
            out.push('\n');
        }
        for phase in &phases[split..] {
            render_phase_full(phase, Some(DESIGN_TOKENS_SHOWN), &mut out);
        }
    }

    // File map: only entries relevant to the current tasks
    if !context.file_map.is_empty() {
        let tokens = relevance_tokens(&req.current_phase.tasks);
        let mut excluded = 0usize;
        let mut kept = Vec::new();
        for (path, purpose) in &context.file_map {
            let path_lower = path.to_lowercase();
            let purpose_lower = purpose.to_lowercase();
            let always = ALWAYS_INCLUDE.iter().any(|p| path_lower.contains(p));
            let relevant = tokens
                .iter()
                .any(|t| path_lower.contains(t.as_str()) || purpose_lower.contains(t.as_str()));
            if always || relevant {
                kept.push((path, purpose));
            } else {
                excluded += 1;
            }
        }

        out.push_str("## FILE MAP (relevant to this phase)\n\n");
        for (path, purpose) in &kept {
            out.push_str(&format!("- `{}` - {}\n", path, purpose));
        }
        if excluded > 0 {
            sections_compressed.push("file_map".to_string());
            out.push_str(&format!("\n_{} other files not shown_\n", excluded));
        }
        out.push('\n');
    }

    if context.architectural_decisions.len() > config.max_decisions {
        sections_compressed.push("architectural_decisions".to_string());
    }
    render_decisions(context, Some(config.max_decisions), &mut out);
    render_known_issues(context, &mut out);

    let original_tokens = estimate_tokens(&original);
    let compressed_tokens = estimate_tokens(&out);
    let stats = CompressionStats {
        original_tokens,
        compressed_tokens,
        saved_tokens: original_tokens.saturating_sub(compressed_tokens),
        sections_compressed,
    };

    tracing::debug!(
        original = stats.original_tokens,
        compressed = stats.compressed_tokens,
        saved = stats.saved_tokens,
        sections = ?stats.sections_compressed,
        "Compressed build context"
    );

    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::analyze_context_health;

    fn phase_spec() -> PhaseSpec {
        PhaseSpec::new("Authentication", "Let users sign in with email").with_tasks([
            "Build login form",
            "Session token storage",
        ])
    }

    fn completed(name: &str, files: usize) -> CompletedPhase {
        CompletedPhase {
            name: name.to_string(),
            goal: format!("{} goal that is deliberately long enough to need a snippet cut", name),
            files_created: (0..files).map(|i| format!("src/{}/{}.ts", name.to_lowercase(), i)).collect(),
            key_decisions: vec![format!("{} decision", name)],
            design_tokens_used: (0..15).map(|i| format!("--token-{}", i)).collect(),
            ..Default::default()
        }
    }

    fn request<'a>(context: &'a BuildContext, phase: &'a PhaseSpec) -> RenderRequest<'a> {
        RenderRequest {
            context,
            phase_index: 3,
            total_phases: 6,
            current_phase: phase,
            spec: "",
            architecture: "",
            design_spec: None,
        }
    }

    #[test]
    fn test_should_compress_early_margin() {
        let budget = 1000;
        // 70% exactly: healthy and not above the margin
        assert!(!should_compress(&"a".repeat(700 * 4), budget));
        // 71%: still healthy, but past the early margin
        assert!(should_compress(&"a".repeat(710 * 4), budget));
        assert!(should_compress(&"a".repeat(900 * 4), budget));
    }

    #[test]
    fn test_critical_context_triggers_compression() {
        let text = "x".repeat(40_000);
        let report = analyze_context_health(&text, 8_000);
        assert_eq!(report.percentage_used, 125);
        assert_eq!(report.status, HealthStatus::Critical);
        assert!(should_compress(&text, 8_000));
    }

    #[test]
    fn test_relevance_tokens() {
        let tokens = relevance_tokens(&["Add a Login-form (v2)".to_string()]);
        let expected: BTreeSet<String> = ["add", "login", "form"].iter().map(|s| s.to_string()).collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_file_map_keeps_only_relevant_entries() {
        let mut context = BuildContext::new();
        let relevant = [
            ("src/auth/login.tsx", "Sign-in screen"),
            ("src/forms/FieldGroup.tsx", "Reusable form fields"),
            ("src/lib/tokens.ts", "Session persistence"),
        ];
        for (path, purpose) in relevant {
            context.file_map.insert(path.to_string(), purpose.to_string());
        }
        for i in 0..17 {
            context
                .file_map
                .insert(format!("src/widgets/chart{}.tsx", i), "Dashboard chart".to_string());
        }
        assert_eq!(context.file_map.len(), 20);

        let phase = phase_spec();
        let (text, stats) = compress(&request(&context, &phase), &ContextConfig::default());

        for (path, _) in relevant {
            assert!(text.contains(path), "missing {}", path);
        }
        assert!(!text.contains("chart"));
        assert_eq!(text.matches("\n- `").count(), 3);
        assert!(text.contains("17 other files not shown"));
        assert!(stats.sections_compressed.contains(&"file_map".to_string()));
    }

    #[test]
    fn test_always_include_allowlist() {
        let mut context = BuildContext::new();
        context.file_map.insert("package.json".to_string(), "Manifest".to_string());
        context.file_map.insert("src/app/layout.tsx".to_string(), "Root".to_string());
        context.file_map.insert("src/misc/util.ts".to_string(), "Helpers".to_string());

        let phase = phase_spec();
        let (text, _) = compress(&request(&context, &phase), &ContextConfig::default());
        assert!(text.contains("package.json"));
        assert!(text.contains("src/app/layout.tsx"));
        assert!(!text.contains("util.ts"));
        assert!(text.contains("1 other files not shown"));
    }

    #[test]
    fn test_phase_history_reduction() {
        let mut context = BuildContext::new();
        for name in ["Scaffold", "Data", "Api", "Ui"] {
            context.completed_phases.push(completed(name, 2));
        }
        let phase = phase_spec();
        let (text, stats) = compress(&request(&context, &phase), &ContextConfig::default());

        // Older phases reduced to one line with a goal snippet and file count
        assert!(text.contains("- Scaffold: Scaffold goal that is deliberately long enough to... (2 files)"));
        assert!(text.contains("- Data: "));
        assert!(!text.contains("Scaffold decision"));
        // Recent phases in full, with only the first ten design tokens
        assert!(text.contains("### Api"));
        assert!(text.contains("Ui decision"));
        assert!(text.contains("--token-9"));
        assert!(!text.contains("--token-10"));
        assert!(stats.sections_compressed.contains(&"phase_history".to_string()));
    }

    #[test]
    fn test_decisions_capped_and_issues_verbatim() {
        let mut context = BuildContext::new();
        for i in 0..8 {
            context.architectural_decisions.push(crate::store::ArchitecturalDecision {
                date: "2026-01-01".to_string(),
                decision: format!("decision-{}", i),
            });
        }
        context.add_known_issue("Safari layout glitch on settings page");
        let phase = phase_spec();
        let (text, stats) = compress(&request(&context, &phase), &ContextConfig::default());

        assert!(!text.contains("decision-2"));
        assert!(text.contains("decision-3"));
        assert!(text.contains("decision-7"));
        assert!(text.contains("Safari layout glitch on settings page"));
        assert!(stats
            .sections_compressed
            .contains(&"architectural_decisions".to_string()));
    }

    #[test]
    fn test_design_tokens_never_compressed() {
        let context = BuildContext::new();
        let phase = phase_spec();
        let design = format!("--color-primary: #0055ff;\n{}", "--space: 4px;\n".repeat(400));
        let mut req = request(&context, &phase);
        req.design_spec = Some(&design);

        let (text, _) = compress(&req, &ContextConfig::default());
        assert!(text.contains(design.trim()));
    }

    const SPEC: &str = "# Product\n\n## Overview\nA recipe sharing app.\n\n\
        ## Tech Stack\nNext.js, Postgres, Tailwind.\n\n\
        ## Authentication\nUsers sign in with a magic link sent to their email.\n\n\
        ## Recipes\nCooks publish recipes with photos.\n\n\
        ## Billing\nStripe subscriptions for premium plans.\n";

    #[test]
    fn test_spec_section_extraction() {
        let context = BuildContext::new();
        let phase = phase_spec();
        let mut req = request(&context, &phase);
        req.spec = SPEC;

        let (text, stats) = compress(&req, &ContextConfig::default());
        assert!(text.contains("A recipe sharing app."));
        assert!(text.contains("Next.js, Postgres, Tailwind."));
        assert!(text.contains("magic link"));
        assert!(!text.contains("Stripe"));
        assert!(!text.contains("photos"));
        assert!(stats.sections_compressed.contains(&"specification".to_string()));
    }

    #[test]
    fn test_section_caps_apply() {
        let doc = format!("## Overview\n{}\n\n## Login\n{}\n", "o".repeat(2000), "l".repeat(2000));
        let keywords: BTreeSet<String> = ["login".to_string()].into_iter().collect();
        let extracted = extract_sections(&doc, &keywords);
        assert!(extracted.contains(&format!("{}...", "o".repeat(OVERVIEW_CAP))));
        assert!(!extracted.contains(&"o".repeat(OVERVIEW_CAP + 1)));
        assert!(extracted.contains(&format!("{}...", "l".repeat(KEYWORD_SECTION_CAP))));
    }

    #[test]
    fn test_headings_inside_code_fences_ignored() {
        let doc = "## Overview\nIntro\n```sh\n# not a heading\n```\n## Billing\nStripe\n";
        let sections = parse_sections(doc);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].body.contains("# not a heading"));
    }

    #[test]
    fn test_extraction_is_a_fixed_point() {
        let keywords = section_keywords(&phase_spec());
        let once = extract_sections(SPEC, &keywords);
        let twice = extract_sections(&once, &keywords);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_compression_is_deterministic_and_never_negative() {
        let mut context = BuildContext::new();
        for name in ["Scaffold", "Data", "Api"] {
            context.completed_phases.push(completed(name, 3));
        }
        let phase = phase_spec();
        let mut req = request(&context, &phase);
        req.spec = SPEC;

        let (first, first_stats) = compress(&req, &ContextConfig::default());
        let (second, second_stats) = compress(&req, &ContextConfig::default());
        assert_eq!(first, second);
        assert_eq!(first_stats, second_stats);
        assert!(first_stats.saved_tokens > 0);
        assert_eq!(
            first_stats.saved_tokens,
            first_stats.original_tokens - first_stats.compressed_tokens
        );

        // Feeding the compressed spec back in does not shrink it further
        let spec_view = extract_sections(SPEC, &section_keywords(&phase));
        req.spec = &spec_view;
        let (third, _) = compress(&req, &ContextConfig::default());
        assert_eq!(estimate_tokens(&third), estimate_tokens(&first));
    }

    #[test]
    fn test_saved_tokens_clamped_when_nothing_to_compress() {
        let context = BuildContext::new();
        let phase = phase_spec();
        let (_, stats) = compress(&request(&context, &phase), &ContextConfig::default());
        assert_eq!(stats.saved_tokens, 0);
        assert!(stats.compressed_tokens >= stats.original_tokens);
    }

    #[test]
    fn test_render_full_includes_everything() {
        let mut context = BuildContext::new();
        context.completed_phases.push(completed("Scaffold", 1));
        context.file_map.insert("src/widgets/chart.tsx".to_string(), "Chart".to_string());
        let phase = phase_spec();
        let mut req = request(&context, &phase);
        req.spec = SPEC;

        let text = render_full(&req);
        assert!(text.contains("Phase 4 of 6: Authentication"));
        assert!(text.contains("Stripe"));
        assert!(text.contains("src/widgets/chart.tsx"));
        assert!(text.contains("--token-14"));
    }
}
