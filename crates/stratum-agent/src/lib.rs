//! # stratum-agent
//!
//! The agent invocation boundary for Stratum.
//!
//! The orchestrator never talks to a model directly. It goes through
//! [`AgentInvoker`], which takes a role, a prompt and a working directory and
//! returns text. Everything downstream of that text is parsed here too:
//!
//! - [`ArtifactExtractor`] locates named artifacts in free-form output
//! - [`execute_file_operations`] applies `<write_to_file>` blocks to the project
//!
//! Each invocation is stateless. Continuity between phases comes from the
//! build context, not from conversation history.

mod auth;
mod client;
mod extract;
mod file_executor;
mod invoker;
mod types;

pub use auth::get_auth_token;
pub use client::AnthropicAgent;
pub use extract::{ArtifactExtractor, DelimitedExtractor};
pub use file_executor::{
    execute_file_operations, file_operation_instructions, validate_path, ExecutionResult,
    FileOperation,
};
pub use invoker::{AgentInvoker, Invocation, ScriptedAgent};
pub use types::*;
