//! File Executor - applies file operations found in Builder output
//!
//! Builders emit complete files as XML blocks:
//! `<write_to_file><path>...</path><content>...</content></write_to_file>`
//!
//! Paths are resolved against the project root. Absolute paths, parent
//! traversal and protected files are rejected per block; one bad block does
//! not stop the others.

use std::fs;
use std::path::{Component, Path, PathBuf};
use stratum_core::{Result, StratumError};

/// A file operation parsed from agent output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOperation {
    /// Write complete content to a file
    WriteToFile { path: String, content: String },
}

/// Result of applying file operations from agent output
#[derive(Debug, Default, Clone)]
pub struct ExecutionResult {
    /// Files that were created
    pub files_created: Vec<String>,
    /// Files that were overwritten
    pub files_modified: Vec<String>,
    /// Errors encountered during execution
    pub errors: Vec<String>,
}

impl ExecutionResult {
    /// Generate a summary string
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.files_created.is_empty() {
            parts.push(format!("{} created", self.files_created.len()));
        }
        if !self.files_modified.is_empty() {
            parts.push(format!("{} modified", self.files_modified.len()));
        }
        if !self.errors.is_empty() {
            parts.push(format!("{} errors", self.errors.len()));
        }

        if parts.is_empty() {
            "no file operations".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Check if any changes were made
    pub fn has_changes(&self) -> bool {
        !self.files_created.is_empty() || !self.files_modified.is_empty()
    }

    /// All touched paths, created first
    pub fn touched(&self) -> Vec<String> {
        self.files_created
            .iter()
            .chain(self.files_modified.iter())
            .cloned()
            .collect()
    }
}

/// Parse and apply all file operations in agent output
pub fn execute_file_operations(
    output: &str,
    project_root: &Path,
    protected: &[String],
) -> ExecutionResult {
    let mut result = ExecutionResult::default();

    for op in parse_write_blocks(output) {
        let FileOperation::WriteToFile { path, content } = op;
        match execute_write(project_root, &path, &content, protected) {
            Ok(true) => result.files_created.push(path),
            Ok(false) => result.files_modified.push(path),
            Err(e) => result.errors.push(format!("Failed to write {}: {}", path, e)),
        }
    }

    result
}

/// Parse all `<write_to_file>` blocks from text
fn parse_write_blocks(text: &str) -> Vec<FileOperation> {
    let mut operations = Vec::new();
    let mut remaining = text;

    while let Some(start) = remaining.find("<write_to_file>") {
        let block_start = start + "<write_to_file>".len();

        if let Some(end) = remaining[block_start..].find("</write_to_file>") {
            let block_content = &remaining[block_start..block_start + end];

            if let Some(op) = parse_single_write_block(block_content) {
                operations.push(op);
            }

            remaining = &remaining[block_start + end + "</write_to_file>".len()..];
        } else {
            break;
        }
    }

    operations
}

fn parse_single_write_block(block: &str) -> Option<FileOperation> {
    let path = extract_tag_content(block, "path")?;
    let content = extract_tag_content(block, "content")?;

    // Blocks conventionally put content on its own line after <content>
    let content = content.strip_prefix('\n').unwrap_or(&content).to_string();

    Some(FileOperation::WriteToFile {
        path: path.trim().to_string(),
        content,
    })
}

/// Extract content between <tag> and </tag>
fn extract_tag_content(text: &str, tag: &str) -> Option<String> {
    let open_tag = format!("<{}>", tag);
    let close_tag = format!("</{}>", tag);

    let start = text.find(&open_tag)?;
    let content_start = start + open_tag.len();
    let end = text[content_start..].find(&close_tag)?;

    Some(text[content_start..content_start + end].to_string())
}

/// Validate that a relative path is safe to write to
pub fn validate_path(path: &str, protected: &[String]) -> Result<PathBuf> {
    let path = Path::new(path);

    if path.as_os_str().is_empty() {
        return Err(StratumError::PathValidation("Empty path".to_string()));
    }

    if path.is_absolute() {
        return Err(StratumError::PathValidation(format!(
            "Absolute paths not allowed: {}",
            path.display()
        )));
    }

    for component in path.components() {
        if let Component::ParentDir = component {
            return Err(StratumError::PathValidation(format!(
                "Path traversal not allowed: {}",
                path.display()
            )));
        }
    }

    for protected in protected {
        let name_matches = path
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|name| name == protected);
        if name_matches || path.starts_with(protected) {
            return Err(StratumError::PathValidation(format!(
                "Cannot write to protected path: {}",
                path.display()
            )));
        }
    }

    Ok(path.to_path_buf())
}

/// Returns Ok(true) if the file was created, Ok(false) if overwritten
fn execute_write(project_root: &Path, path: &str, content: &str, protected: &[String]) -> Result<bool> {
    let relative = validate_path(path, protected)?;
    let full_path = project_root.join(relative);
    let created = !full_path.exists();

    if let Some(parent) = full_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::debug!("Created directory: {}", parent.display());
        }
    }

    fs::write(&full_path, content)?;

    if created {
        tracing::info!("Created file: {}", path);
    } else {
        tracing::info!("Modified file: {}", path);
    }

    Ok(created)
}

/// Instructions for Builders on how to emit file operations
pub fn file_operation_instructions() -> &'static str {
    r#"## FILE OPERATIONS

To create or modify files, use XML blocks in your output:

<write_to_file>
<path>relative/path/to/file.ts</path>
<content>
// complete file content
</content>
</write_to_file>

IMPORTANT:
- Use paths relative to the project root
- Parent directories are created automatically
- Include COMPLETE file content (not patches)
- You can write multiple files in one response
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn protected() -> Vec<String> {
        vec![".git".to_string(), ".stratum".to_string(), ".env".to_string()]
    }

    #[test]
    fn test_validate_path_rejects_unsafe() {
        assert!(validate_path("/etc/passwd", &protected()).is_err());
        assert!(validate_path("../outside.txt", &protected()).is_err());
        assert!(validate_path("src/../../x", &protected()).is_err());
        assert!(validate_path(".env", &protected()).is_err());
        assert!(validate_path(".stratum/state.json", &protected()).is_err());
        assert!(validate_path("", &protected()).is_err());
    }

    #[test]
    fn test_validate_path_accepts_relative() {
        let path = validate_path("src/components/Button.tsx", &protected()).unwrap();
        assert_eq!(path, PathBuf::from("src/components/Button.tsx"));
    }

    #[test]
    fn test_execute_creates_then_modifies() {
        let dir = TempDir::new().unwrap();
        let output = "<write_to_file>\n<path>src/app.ts</path>\n<content>\nexport {};\n</content>\n</write_to_file>";

        let first = execute_file_operations(output, dir.path(), &protected());
        assert_eq!(first.files_created, vec!["src/app.ts"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src/app.ts")).unwrap(),
            "export {};\n"
        );

        let second = execute_file_operations(output, dir.path(), &protected());
        assert_eq!(second.files_modified, vec!["src/app.ts"]);
        assert_eq!(second.summary(), "1 modified");
    }

    #[test]
    fn test_bad_block_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let output = "<write_to_file><path>../evil</path><content>x</content></write_to_file>\n\
                      <write_to_file><path>ok.txt</path><content>fine</content></write_to_file>";

        let result = execute_file_operations(output, dir.path(), &protected());
        assert_eq!(result.files_created, vec!["ok.txt"]);
        assert_eq!(result.errors.len(), 1);
        assert!(result.has_changes());
        assert_eq!(result.touched(), vec!["ok.txt"]);
    }

    #[test]
    fn test_no_operations() {
        let dir = TempDir::new().unwrap();
        let result = execute_file_operations("just prose", dir.path(), &protected());
        assert!(!result.has_changes());
        assert_eq!(result.summary(), "no file operations");
    }
}
