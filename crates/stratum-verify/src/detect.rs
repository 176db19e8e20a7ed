//! Project type and package manager detection from marker files

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use stratum_core::ProjectType;

/// npm's generated placeholder test script
const NPM_PLACEHOLDER_TEST: &str = "no test specified";

fn has_extension_entry(root: &Path, extensions: &[&str]) -> bool {
    let Ok(entries) = std::fs::read_dir(root) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|entry| {
        entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext))
    })
}

fn any_exists(root: &Path, markers: &[&str]) -> bool {
    markers.iter().any(|m| root.join(m).exists())
}

/// Detect every project type present at `root`, in resolution priority order
pub fn detect_project_types(root: &Path) -> Vec<ProjectType> {
    let mut types = Vec::new();

    if has_extension_entry(root, &["xcodeproj", "xcworkspace"]) {
        types.push(ProjectType::Ios);
    }
    if any_exists(root, &["gradlew", "build.gradle", "build.gradle.kts", "settings.gradle"]) {
        types.push(ProjectType::Android);
    }
    if any_exists(
        root,
        &["pyproject.toml", "pytest.ini", "requirements.txt", "go.mod", "Cargo.toml"],
    ) {
        types.push(ProjectType::Backend);
    }
    if root.join("package.json").exists() {
        types.push(ProjectType::Web);
    }

    tracing::debug!(?types, "Detected project types in {:?}", root);
    types
}

/// JavaScript package manager, chosen by lockfile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    /// Pick the package manager whose lockfile is present; npm otherwise
    pub fn detect(root: &Path) -> Self {
        if any_exists(root, &["bun.lockb", "bun.lock"]) {
            Self::Bun
        } else if root.join("pnpm-lock.yaml").exists() {
            Self::Pnpm
        } else if root.join("yarn.lock").exists() {
            Self::Yarn
        } else {
            Self::Npm
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

/// Scripts declared in `package.json`, empty if missing or unreadable
pub fn package_scripts(root: &Path) -> BTreeMap<String, String> {
    std::fs::read_to_string(root.join("package.json"))
        .ok()
        .and_then(|content| serde_json::from_str::<PackageJson>(&content).ok())
        .map(|pkg| pkg.scripts)
        .unwrap_or_default()
}

/// Whether the `test` script exists and is not npm's placeholder
pub fn has_real_test_script(scripts: &BTreeMap<String, String>) -> bool {
    scripts
        .get("test")
        .is_some_and(|s| !s.trim().is_empty() && !s.contains(NPM_PLACEHOLDER_TEST))
}
