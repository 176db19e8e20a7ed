//! Stratum Planning - build plans from architecture documents
//!
//! The Architect agent writes an architecture document that ends in a list
//! of build phases. This crate turns that document into a [`BuildPlan`], the
//! ordered phase list the orchestrator executes.

pub mod plan;
pub mod templates;

pub use plan::BuildPlan;
pub use templates::{example_architecture, PLAN_FORMAT_INSTRUCTIONS};
