//! Error categorization for the recovery prompt
//!
//! Ordered `(pattern, category)` table matched against the lower-cased error
//! text. First match wins. Display only: nothing branches on the category.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    MissingDependency,
    TypeError,
    TestFailure,
    Permission,
    Network,
    Syntax,
    Uncategorized,
}

impl ErrorCategory {
    /// One-line hint shown next to the category
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::MissingDependency => "Install the missing package or fix the import path",
            Self::TypeError => "Fix the type mismatch reported by the compiler",
            Self::TestFailure => "Compare the failing assertion with the expected behavior",
            Self::Permission => "Check file permissions and that nothing else holds the files",
            Self::Network => "Check network access and that required services are running",
            Self::Syntax => "Fix the syntax error at the reported location",
            Self::Uncategorized => "Read the error output in .stratum/manual-fix.md",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::MissingDependency => "missing dependency",
            Self::TypeError => "type error",
            Self::TestFailure => "test failure",
            Self::Permission => "permission error",
            Self::Network => "network error",
            Self::Syntax => "syntax error",
            Self::Uncategorized => "uncategorized",
        };
        write!(f, "{}", label)
    }
}

static RULES: LazyLock<Vec<(Regex, ErrorCategory)>> = LazyLock::new(|| {
    [
        (
            r"cannot find module|module not found|no module named|unresolved import|could not resolve",
            ErrorCategory::MissingDependency,
        ),
        (
            r"type error|typeerror|\bts\d+\b|not assignable|mismatched types|e0308",
            ErrorCategory::TypeError,
        ),
        (r"assert|\bexpected\b|tests? failed", ErrorCategory::TestFailure),
        (r"permission denied|eacces|eperm", ErrorCategory::Permission),
        (r"econnrefused|enotfound|etimedout|network|timeout", ErrorCategory::Network),
        (r"syntaxerror|syntax error|unexpected token|parse error", ErrorCategory::Syntax),
    ]
    .into_iter()
    .map(|(pattern, category)| {
        (
            Regex::new(pattern).expect("error category regex should compile"),
            category,
        )
    })
    .collect()
});

/// Categorize error output
pub fn categorize(error_text: &str) -> ErrorCategory {
    let lower = error_text.to_lowercase();
    RULES
        .iter()
        .find(|(re, _)| re.is_match(&lower))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Uncategorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            categorize("Error: Cannot find module 'react-router'"),
            ErrorCategory::MissingDependency
        );
        assert_eq!(
            categorize("src/app.ts(3,5): error TS2322: Type 'string' is not assignable"),
            ErrorCategory::TypeError
        );
        assert_eq!(
            categorize("AssertionError: expected 3 to equal 4"),
            ErrorCategory::TestFailure
        );
        assert_eq!(categorize("EACCES: permission denied, open"), ErrorCategory::Permission);
        assert_eq!(categorize("connect ECONNREFUSED 127.0.0.1:5432"), ErrorCategory::Network);
        assert_eq!(categorize("SyntaxError: Unexpected token '}'"), ErrorCategory::Syntax);
        assert_eq!(categorize("segfault"), ErrorCategory::Uncategorized);
    }

    #[test]
    fn test_first_match_wins() {
        // Mentions both a missing module and an assertion
        let text = "ModuleNotFoundError: No module named 'requests'\nassert response.ok";
        assert_eq!(categorize(text), ErrorCategory::MissingDependency);
    }

    #[test]
    fn test_display_and_suggestion() {
        assert_eq!(ErrorCategory::Network.to_string(), "network error");
        assert!(!ErrorCategory::Uncategorized.suggestion().is_empty());
    }
}
