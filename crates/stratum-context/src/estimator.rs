//! Token budget estimation
//!
//! Not a tokenizer. Four characters count as one token, rounded up, which is
//! cheap, deterministic and close enough to steer compression.

use serde::{Deserialize, Serialize};

/// Characters per estimated token
pub const CHARS_PER_TOKEN: usize = 4;

const HEALTHY_MAX_PERCENT: usize = 80;
const WARNING_MAX_PERCENT: usize = 120;

/// Health tier of a context against its budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Token usage of one named section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionUsage {
    pub name: String,
    pub tokens: usize,
    pub percentage_of_budget: usize,
}

/// Result of classifying a context against a budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextHealthReport {
    pub total_tokens: usize,
    pub budget_tokens: usize,
    pub percentage_used: usize,
    pub status: HealthStatus,
    /// Per-section usage, largest first (empty for a plain text blob)
    pub breakdown: Vec<SectionUsage>,
    pub recommendations: Vec<String>,
}

/// Approximate token count: `ceil(chars / 4)`
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn percentage(tokens: usize, budget: usize) -> usize {
    if tokens == 0 {
        return 0;
    }
    (100.0 * tokens as f64 / budget.max(1) as f64).round() as usize
}

fn classify(percentage_used: usize, tokens: usize, budget: usize) -> HealthStatus {
    if budget == 0 && tokens > 0 {
        return HealthStatus::Critical;
    }
    if percentage_used <= HEALTHY_MAX_PERCENT {
        HealthStatus::Healthy
    } else if percentage_used <= WARNING_MAX_PERCENT {
        HealthStatus::Warning
    } else {
        HealthStatus::Critical
    }
}

fn base_recommendations(status: HealthStatus) -> Vec<String> {
    match status {
        HealthStatus::Healthy => Vec::new(),
        HealthStatus::Warning => vec![
            "Context is approaching its budget; compress phase history before the next phase"
                .to_string(),
        ],
        HealthStatus::Critical => vec![
            "Context exceeds its budget; compression is required before invoking the Builder"
                .to_string(),
            "Consider raising context.budget_tokens or splitting large phases".to_string(),
        ],
    }
}

/// Classify a text blob against a token budget
pub fn analyze_context_health(text: &str, budget: usize) -> ContextHealthReport {
    let total_tokens = estimate_tokens(text);
    let percentage_used = percentage(total_tokens, budget);
    let status = classify(percentage_used, total_tokens, budget);

    ContextHealthReport {
        total_tokens,
        budget_tokens: budget,
        percentage_used,
        status,
        breakdown: Vec::new(),
        recommendations: base_recommendations(status),
    }
}

/// Classify named sections against a budget, with a per-section breakdown
///
/// The total is the sum of per-section estimates, so it can exceed the
/// estimate of the concatenated text by at most one token per section.
pub fn analyze_sections(sections: &[(&str, &str)], budget: usize) -> ContextHealthReport {
    let mut breakdown: Vec<SectionUsage> = sections
        .iter()
        .map(|(name, text)| {
            let tokens = estimate_tokens(text);
            SectionUsage {
                name: (*name).to_string(),
                tokens,
                percentage_of_budget: percentage(tokens, budget),
            }
        })
        .collect();
    breakdown.sort_by(|a, b| b.tokens.cmp(&a.tokens).then_with(|| a.name.cmp(&b.name)));

    let total_tokens = breakdown.iter().map(|s| s.tokens).sum();
    let percentage_used = percentage(total_tokens, budget);
    let status = classify(percentage_used, total_tokens, budget);

    let mut recommendations = base_recommendations(status);
    if status != HealthStatus::Healthy {
        for section in breakdown.iter().take(3).filter(|s| s.tokens > 0) {
            recommendations.push(format!(
                "Section '{}' uses {} tokens ({}% of budget)",
                section.name, section.tokens, section.percentage_of_budget
            ));
        }
    }

    ContextHealthReport {
        total_tokens,
        budget_tokens: budget,
        percentage_used,
        status,
        breakdown,
        recommendations,
    }
}
