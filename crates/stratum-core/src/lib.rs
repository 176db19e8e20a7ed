//! # stratum-core
//!
//! Core types for the Stratum chunked build orchestrator.
//!
//! A build is a fixed sequence of phases. Each phase is handed to a Builder
//! agent, checked by a verification gate, and only then allowed to advance.
//! Everything the orchestrator learns along the way is accumulated in a build
//! context that survives restarts.
//!
//! ## Layout
//!
//! - [`StratumError`] / [`Result`] - the single error type shared by all crates
//! - [`StratumConfig`] - `.stratum/config.toml`
//! - [`persist`] - atomic whole-file JSON persistence
//! - Domain types: phases, runtime status, agent roles, issue severities

pub mod config;
mod error;
pub mod fail_open;
pub mod persist;
mod types;

pub use config::{AgentConfig, ContextConfig, StratumConfig, VerificationConfig};
pub use error::{Result, StratumError};
pub use types::*;

/// Directory (relative to the project root) holding all Stratum state
pub const STRATUM_DIR: &str = ".stratum";
