//! Test command resolution and execution

use crate::counts::{parse_test_counts, TestCounts};
use crate::detect::{has_real_test_script, package_scripts, PackageManager};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stratum_core::{ProjectType, Result, StratumError};
use tokio::process::Command;

/// Outcome of one test run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    pub counts: Option<TestCounts>,
}

impl TestResult {
    pub fn passing(stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        Self {
            passed: true,
            counts: parse_test_counts(&stdout),
            stdout,
            stderr: String::new(),
        }
    }

    pub fn failing(stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        Self {
            passed: false,
            counts: parse_test_counts(&stderr),
            stdout: String::new(),
            stderr,
        }
    }

    /// Combined output, stderr first since that is where failures usually land
    pub fn output(&self) -> String {
        match (self.stderr.trim(), self.stdout.trim()) {
            ("", out) => out.to_string(),
            (err, "") => err.to_string(),
            (err, out) => format!("{}\n\n{}", err, out),
        }
    }
}

/// A resolved test command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TestCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Split a configured command line on whitespace
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: program.to_string(),
            args: parts.map(String::from).collect(),
        })
    }
}

impl std::fmt::Display for TestCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

fn backend_command(root: &Path) -> Option<TestCommand> {
    if ["pyproject.toml", "pytest.ini", "requirements.txt"]
        .iter()
        .any(|m| root.join(m).exists())
    {
        return Some(TestCommand::new("pytest", &[]));
    }
    if root.join("go.mod").exists() {
        return Some(TestCommand::new("go", &["test", "./..."]));
    }
    if root.join("Cargo.toml").exists() {
        return Some(TestCommand::new("cargo", &["test"]));
    }
    None
}

/// Resolve the test command for a project; first match wins
pub fn resolve_test_command(root: &Path, project_types: &[ProjectType]) -> Option<TestCommand> {
    if project_types.contains(&ProjectType::Ios) {
        return Some(TestCommand::new("xcodebuild", &["test"]));
    }
    if project_types.contains(&ProjectType::Android) {
        return Some(TestCommand::new("./gradlew", &["test"]));
    }
    if project_types.contains(&ProjectType::Backend) {
        if let Some(command) = backend_command(root) {
            return Some(command);
        }
    }

    if has_real_test_script(&package_scripts(root)) {
        let manager = PackageManager::detect(root);
        return Some(TestCommand::new(manager.program(), &["run", "test"]));
    }

    None
}

/// Trait for running a project's tests (allows scripting in tests)
#[async_trait]
pub trait TestRunner: Send + Sync {
    fn has_test_command(&self, project: &Path, project_types: &[ProjectType]) -> bool;

    /// Run the tests. `Err` means the runner could not be launched at all.
    async fn run(&self, project: &Path, project_types: &[ProjectType]) -> Result<TestResult>;
}

#[async_trait]
impl<T: TestRunner + ?Sized> TestRunner for Arc<T> {
    fn has_test_command(&self, project: &Path, project_types: &[ProjectType]) -> bool {
        (**self).has_test_command(project, project_types)
    }

    async fn run(&self, project: &Path, project_types: &[ProjectType]) -> Result<TestResult> {
        (**self).run(project, project_types).await
    }
}

/// Runs the resolved test command as a subprocess
pub struct CommandTestRunner {
    override_command: Option<TestCommand>,
    timeout: Duration,
}

impl CommandTestRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            override_command: None,
            timeout,
        }
    }

    /// Always run this command instead of resolving one
    pub fn with_command(mut self, command: Option<&str>) -> Self {
        self.override_command = command.and_then(TestCommand::parse);
        self
    }

    fn command_for(&self, project: &Path, project_types: &[ProjectType]) -> Option<TestCommand> {
        self.override_command
            .clone()
            .or_else(|| resolve_test_command(project, project_types))
    }
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    fn has_test_command(&self, project: &Path, project_types: &[ProjectType]) -> bool {
        self.command_for(project, project_types).is_some()
    }

    async fn run(&self, project: &Path, project_types: &[ProjectType]) -> Result<TestResult> {
        let command = self
            .command_for(project, project_types)
            .ok_or_else(|| StratumError::Verification("No test command resolved".to_string()))?;

        tracing::info!(command = %command, "Running tests in {:?}", project);

        let child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(project)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                StratumError::Verification(format!("Failed to launch `{}`: {}", command, e))
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(command = %command, "Test run timed out");
                return Ok(TestResult::failing(format!(
                    "`{}` timed out after {}s",
                    command,
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let counts = parse_test_counts(&stdout).or_else(|| parse_test_counts(&stderr));

        Ok(TestResult {
            passed: output.status.success(),
            stdout,
            stderr,
            counts,
        })
    }
}

/// Runner that replays canned results
///
/// Results are consumed in order; once exhausted the last result repeats.
#[derive(Default)]
pub struct ScriptedTestRunner {
    results: Mutex<VecDeque<TestResult>>,
    last: Mutex<Option<TestResult>>,
    no_command: bool,
    runs: Mutex<usize>,
}

impl ScriptedTestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, result: TestResult) -> Self {
        if let Ok(mut results) = self.results.lock() {
            results.push_back(result);
        }
        self
    }

    pub fn pass(self) -> Self {
        self.with_result(TestResult::passing("test result: ok. 1 passed; 0 failed"))
    }

    pub fn fail(self, stderr: &str) -> Self {
        self.with_result(TestResult::failing(stderr))
    }

    /// Pretend no test command can be resolved
    pub fn without_command(mut self) -> Self {
        self.no_command = true;
        self
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().map(|r| *r).unwrap_or(0)
    }
}

#[async_trait]
impl TestRunner for ScriptedTestRunner {
    fn has_test_command(&self, _project: &Path, _project_types: &[ProjectType]) -> bool {
        !self.no_command
    }

    async fn run(&self, _project: &Path, _project_types: &[ProjectType]) -> Result<TestResult> {
        if let Ok(mut runs) = self.runs.lock() {
            *runs += 1;
        }

        let next = self.results.lock().ok().and_then(|mut r| r.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| StratumError::Verification("Scripted runner poisoned".to_string()))?;

        match next {
            Some(result) => {
                *last = Some(result.clone());
                Ok(result)
            }
            None => last
                .clone()
                .ok_or_else(|| StratumError::Verification("No scripted test result".to_string())),
        }
    }
}
