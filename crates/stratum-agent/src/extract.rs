//! Artifact extraction from free-form agent output
//!
//! Agents are asked to wrap named artifacts (an architecture document, a
//! phase summary) in delimiters. [`DelimitedExtractor`] accepts three forms,
//! tried in this order, with the artifact name matched case-insensitively:
//!
//! 1. `<artifact name="NAME">` ... `</artifact>`
//! 2. a fenced block opened with three backticks followed by `NAME` on its own line
//! 3. `=== NAME ===` ... `=== END NAME ===`
//!
//! The first form that matches wins, and within a form the first occurrence
//! wins. Bodies are returned trimmed. This is a heuristic over untrusted
//! text; swap in a stricter implementation of [`ArtifactExtractor`] if the
//! backend supports structured output.

use regex::Regex;

/// Capability for locating named artifacts inside agent output
pub trait ArtifactExtractor: Send + Sync {
    /// Whether `text` contains a complete artifact called `name`
    fn detect(&self, text: &str, name: &str) -> bool {
        self.extract(text, name).is_some()
    }

    /// The body of the first artifact called `name`, if any
    fn extract(&self, text: &str, name: &str) -> Option<String>;
}

/// Extractor implementing the delimiter grammar documented on this module
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedExtractor;

impl DelimitedExtractor {
    pub fn new() -> Self {
        Self
    }

    fn patterns(name: &str) -> Vec<String> {
        let name = regex::escape(name);
        vec![
            format!(r#"(?is)<artifact\s+name\s*=\s*"{}"\s*>(.*?)</artifact>"#, name),
            format!(r"(?ism)^```{}[ \t]*\r?\n(.*?)^```[ \t]*$", name),
            format!(r"(?is)===\s*{}\s*===[ \t]*\r?\n(.*?)===\s*END\s+{}\s*===", name, name),
        ]
    }
}

impl ArtifactExtractor for DelimitedExtractor {
    fn extract(&self, text: &str, name: &str) -> Option<String> {
        for pattern in Self::patterns(name) {
            let re = match Regex::new(&pattern) {
                Ok(re) => re,
                Err(e) => {
                    tracing::warn!("Invalid artifact pattern for {}: {}", name, e);
                    continue;
                }
            };
            if let Some(body) = re.captures(text).and_then(|c| c.get(1)) {
                return Some(body.as_str().trim().to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tag_form() {
        let text = r#"Here you go.
<artifact name="architecture">
# Overview
Things.
</artifact>
trailing"#;
        let body = DelimitedExtractor.extract(text, "architecture").unwrap();
        assert_eq!(body, "# Overview\nThings.");
    }

    #[test]
    fn test_extract_fenced_form() {
        let text = "intro\n```phase-summary\nFILES: src/a.ts - entry\n```\nafter";
        let body = DelimitedExtractor.extract(text, "phase-summary").unwrap();
        assert_eq!(body, "FILES: src/a.ts - entry");
    }

    #[test]
    fn test_extract_banner_form_case_insensitive() {
        let text = "=== Review ===\nlooks fine\n=== END REVIEW ===";
        assert_eq!(DelimitedExtractor.extract(text, "review").unwrap(), "looks fine");
    }

    #[test]
    fn test_tag_form_wins_over_fence() {
        let text = "```notes\nfenced\n```\n<artifact name=\"notes\">tagged</artifact>";
        assert_eq!(DelimitedExtractor.extract(text, "notes").unwrap(), "tagged");
    }

    #[test]
    fn test_unterminated_artifact_not_detected() {
        let text = "<artifact name=\"architecture\">\n# never closed";
        assert!(!DelimitedExtractor.detect(text, "architecture"));
        assert!(DelimitedExtractor.extract("nothing here", "architecture").is_none());
    }

    #[test]
    fn test_name_is_escaped() {
        let text = "```a.b\nbody\n```";
        assert!(DelimitedExtractor.detect(text, "a.b"));
        assert!(!DelimitedExtractor.detect("```axb\nbody\n```", "a.b"));
    }
}
