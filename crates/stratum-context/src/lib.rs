//! # stratum-context
//!
//! The build context and everything that keeps it within budget.
//!
//! - [`BuildContext`] accumulates what every completed phase produced and is
//!   persisted by [`BuildContextStore`] between phases.
//! - [`estimate_tokens`] / [`analyze_context_health`] classify rendered text
//!   against a token budget.
//! - [`compress`] renders a smaller, phase-focused view of the context. The
//!   stored context is never modified; compression only produces text.

mod compressor;
mod estimator;
mod store;

pub use compressor::{
    compress, relevance_tokens, render_full, should_compress, CompressionStats, RenderRequest,
};
pub use estimator::{
    analyze_context_health, analyze_sections, estimate_tokens, ContextHealthReport, HealthStatus,
    SectionUsage, CHARS_PER_TOKEN,
};
pub use store::{ArchitecturalDecision, BuildContext, BuildContextStore, CompletedPhase};
