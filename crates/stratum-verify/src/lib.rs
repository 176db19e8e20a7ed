//! # stratum-verify
//!
//! Decides whether a phase is allowed to advance.
//!
//! Every phase runs the project's tests when a test command can be resolved.
//! Milestone phases additionally start the dev server and run an external
//! design/accessibility reviewer over the UI sources. The
//! [`VerificationGate`] reduces all of it to pass/fail plus the error text
//! handed back to the Builder.

mod counts;
mod design;
mod detect;
mod gate;
mod review;
mod runner;
mod visual;

pub use counts::{parse_test_counts, TestCounts};
pub use design::{ui_files, CommandDesignReviewer};
pub use detect::{detect_project_types, PackageManager};
pub use gate::{VerificationGate, VerificationResult};
pub use review::{DesignReviewer, Issue, ReviewResult, StaticReviewer, VisualReviewer};
pub use runner::{
    resolve_test_command, CommandTestRunner, ScriptedTestRunner, TestCommand, TestResult,
    TestRunner,
};
pub use visual::DevServerCheck;
