//! Pass/fail counts from common test runner summaries

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Parsed test counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub passed: u32,
    pub failed: u32,
}

// cargo: "test result: ok. 12 passed; 0 failed; 0 ignored"
static CARGO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed").expect("valid regex")
});

// jest "Tests:  1 failed, 4 passed, 5 total" / vitest "Tests  1 failed | 4 passed (5)"
static JS_SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Tests:?\s+(.*)$").expect("valid regex"));

// pytest: "===== 3 passed, 1 failed in 0.12s ====="
static PYTEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^=+ (.*\d+ (?:passed|failed).*) in [\d.]+s").expect("valid regex"));

static PASSED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) passed").expect("valid regex"));
static FAILED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) failed").expect("valid regex"));

// go: per-test lines with -v, otherwise per-package lines
static GO_TEST_PASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*--- PASS:").expect("valid regex"));
static GO_TEST_FAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*--- FAIL:").expect("valid regex"));
static GO_PKG_OK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^ok\s+\S+").expect("valid regex"));
static GO_PKG_FAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^FAIL\s+\S+\s").expect("valid regex"));

fn capture_u32(re: &Regex, text: &str) -> u32 {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn parse_cargo(output: &str) -> Option<TestCounts> {
    let mut counts: Option<TestCounts> = None;
    // One summary per test binary
    for caps in CARGO_RE.captures_iter(output) {
        let entry = counts.get_or_insert_with(TestCounts::default);
        entry.passed += caps[1].parse::<u32>().unwrap_or(0);
        entry.failed += caps[2].parse::<u32>().unwrap_or(0);
    }
    counts
}

fn parse_summary_line(re: &Regex, output: &str) -> Option<TestCounts> {
    let line = re.captures_iter(output).last()?.get(1)?.as_str().to_string();
    if !PASSED_RE.is_match(&line) && !FAILED_RE.is_match(&line) {
        return None;
    }
    Some(TestCounts {
        passed: capture_u32(&PASSED_RE, &line),
        failed: capture_u32(&FAILED_RE, &line),
    })
}

fn parse_go(output: &str) -> Option<TestCounts> {
    let tests = TestCounts {
        passed: GO_TEST_PASS_RE.find_iter(output).count() as u32,
        failed: GO_TEST_FAIL_RE.find_iter(output).count() as u32,
    };
    if tests.passed + tests.failed > 0 {
        return Some(tests);
    }
    let packages = TestCounts {
        passed: GO_PKG_OK_RE.find_iter(output).count() as u32,
        failed: GO_PKG_FAIL_RE.find_iter(output).count() as u32,
    };
    (packages.passed + packages.failed > 0).then_some(packages)
}

/// Parse counts from runner output; `None` if no known summary was found
pub fn parse_test_counts(output: &str) -> Option<TestCounts> {
    parse_cargo(output)
        .or_else(|| parse_summary_line(&JS_SUMMARY_RE, output))
        .or_else(|| parse_summary_line(&PYTEST_RE, output))
        .or_else(|| parse_go(output))
}
