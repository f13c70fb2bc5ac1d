//! Project structure checks: required entries, README sections and imports of
//! undeclared packages.
//!
//! Everything here is read-only. Problems are collected and returned, never
//! raised; callers surface them as warnings.

mod imports;
mod scanner;

pub use imports::{imported_packages, known_dependencies, package_name, scan_imports};
pub use scanner::{snapshot, source_files, ScanOptions, SourceFile, TreeNode};

use crate::config::StructureConfig;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Result of [`validate_structure`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureReport {
    pub is_valid: bool,
    /// One entry per missing directory or file, in the order checked
    pub errors: Vec<String>,
}

/// A non-fatal structure finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructureWarning {
    /// Required directory or file is missing
    MissingEntry { message: String },
    MissingDocumentation { files: Vec<String> },
    /// README exists but lacks a required heading
    MissingSection { file: String, section: String },
    UnknownImport { file: String, package: String },
    /// A check could not run at all
    CheckFailed { message: String },
}

impl fmt::Display for StructureWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureWarning::MissingEntry { message } => f.write_str(message),
            StructureWarning::MissingDocumentation { files } => {
                write!(f, "Missing documentation files: {}", files.join(", "))
            }
            StructureWarning::MissingSection { file, section } => {
                write!(f, "{} is missing section '{}'", file, section)
            }
            StructureWarning::UnknownImport { file, package } => {
                write!(f, "{} imports '{}' which is not a declared dependency", file, package)
            }
            StructureWarning::CheckFailed { message } => {
                write!(f, "Structure check failed: {}", message)
            }
        }
    }
}

/// Check that `root` contains every required directory and file.
///
/// Paths are relative to `root`. All missing entries are reported, not just
/// the first, and running it twice on an unchanged tree gives the same list.
pub fn validate_structure<D, F>(
    root: &Path,
    required_dirs: &[D],
    required_files: &[F],
) -> StructureReport
where
    D: AsRef<str>,
    F: AsRef<str>,
{
    let mut errors = Vec::new();

    for dir in required_dirs {
        let dir = dir.as_ref();
        if !root.join(dir).is_dir() {
            errors.push(format!("Missing required directory: {}", dir));
        }
    }

    for file in required_files {
        let file = file.as_ref();
        if !root.join(file).is_file() {
            errors.push(format!("Missing required file: {}", file));
        }
    }

    StructureReport {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Check that `root/README.md` contains each of `sections`.
pub fn check_documentation<S: AsRef<str>>(root: &Path, sections: &[S]) -> Vec<StructureWarning> {
    const README: &str = "README.md";

    let content = match fs::read_to_string(root.join(README)) {
        Ok(content) => content,
        Err(_) => {
            return vec![StructureWarning::MissingDocumentation {
                files: vec![README.to_string()],
            }];
        }
    };

    sections
        .iter()
        .map(AsRef::as_ref)
        .filter(|section| !content.contains(section))
        .map(|section| StructureWarning::MissingSection {
            file: README.to_string(),
            section: section.to_string(),
        })
        .collect()
}

/// Run every configured check against `root` and collect the findings.
///
/// Blocking; call it from `spawn_blocking` inside async code.
pub fn run_checks(root: &Path, config: &StructureConfig) -> Vec<StructureWarning> {
    let mut warnings: Vec<StructureWarning> =
        validate_structure(root, &config.required_dirs, &config.required_files)
            .errors
            .into_iter()
            .map(|message| StructureWarning::MissingEntry { message })
            .collect();

    if !config.required_sections.is_empty() {
        warnings.extend(check_documentation(root, &config.required_sections));
    }

    if config.check_imports {
        match known_dependencies(root) {
            Ok(known) => match scan_imports(root, &known, &ScanOptions::default()) {
                Ok(found) => warnings.extend(found),
                Err(message) => warnings.push(StructureWarning::CheckFailed { message }),
            },
            Err(e) => log::debug!("Skipping import scan: {}", e),
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_structure_collects_all() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("src")).unwrap();
        fs::write(temp_dir.path().join("package.json"), "{}").unwrap();

        let report = validate_structure(
            temp_dir.path(),
            &["src", "docs", "public"],
            &["package.json", "README.md"],
        );

        assert!(!report.is_valid);
        assert_eq!(
            report.errors,
            vec![
                "Missing required directory: docs",
                "Missing required directory: public",
                "Missing required file: README.md",
            ]
        );
    }

    #[test]
    fn test_validate_structure_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("src")).unwrap();

        let first = validate_structure(temp_dir.path(), &["src", "mcp"], &["tsconfig.json"]);
        let second = validate_structure(temp_dir.path(), &["src", "mcp"], &["tsconfig.json"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("docs"), "").unwrap();

        let report = validate_structure::<&str, &str>(temp_dir.path(), &["docs"], &[]);
        assert_eq!(report.errors, vec!["Missing required directory: docs"]);
    }

    #[test]
    fn test_check_documentation() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            check_documentation(temp_dir.path(), &["## Project Overview"]),
            vec![StructureWarning::MissingDocumentation {
                files: vec!["README.md".to_string()]
            }]
        );

        fs::write(temp_dir.path().join("README.md"), "# App\n\n## Setup\n").unwrap();
        let warnings = check_documentation(temp_dir.path(), &["## Project Overview", "## Setup"]);
        assert_eq!(
            warnings,
            vec![StructureWarning::MissingSection {
                file: "README.md".to_string(),
                section: "## Project Overview".to_string(),
            }]
        );
    }

    #[test]
    fn test_run_checks() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("src")).unwrap();
        fs::write(temp_dir.path().join("README.md"), "## Project Overview\n").unwrap();
        fs::write(
            temp_dir.path().join("package.json"),
            r#"{"dependencies": {"react": "^18"}}"#,
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("src/main.tsx"),
            "import React from 'react';\nimport { z } from 'zod';\n",
        )
        .unwrap();

        let config = StructureConfig {
            required_dirs: vec!["src".to_string()],
            required_files: vec!["README.md".to_string(), "package.json".to_string()],
            ..StructureConfig::default()
        };
        let warnings = run_checks(temp_dir.path(), &config);
        assert_eq!(
            warnings,
            vec![StructureWarning::UnknownImport {
                file: "src/main.tsx".to_string(),
                package: "zod".to_string(),
            }]
        );
        assert_eq!(
            warnings[0].to_string(),
            "src/main.tsx imports 'zod' which is not a declared dependency"
        );
    }
}
