//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code
//! - The relay layer never reaches into the conversation store or controller
//!
//! The helpers here locate the workspace and walk its production sources.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["chat/core/src", "chat/cli/src"];

/// Workspace root (two levels above this crate)
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// A Rust source file with its lines
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// File content
    pub content: String,
}

impl SourceFile {
    /// Lines with trailing `//` comments removed
    pub fn code_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.content
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.split("//").next().unwrap_or(line)))
    }
}

/// Every `.rs` file under `dir` (relative to the workspace root)
pub fn rust_files(dir: &str) -> Vec<SourceFile> {
    let root = workspace_root();
    let path = root.join(dir);
    if !path.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(&path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|e| {
            let content = fs::read_to_string(e.path()).ok()?;
            let relative = e.path().strip_prefix(&root).unwrap_or(e.path()).to_path_buf();
            Some(SourceFile {
                path: relative,
                content,
            })
        })
        .collect()
}

/// Index of the first `#[cfg(test)]` line, if any
///
/// Everything from there to the end of the file is treated as test code.
pub fn test_module_start(file: &SourceFile) -> Option<usize> {
    file.content
        .lines()
        .position(|line| line.trim_start().starts_with("#[cfg(test)]"))
        .map(|idx| idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_has_production_dirs() {
        for dir in PRODUCTION_DIRS {
            assert!(
                workspace_root().join(dir).exists(),
                "missing production dir {dir}"
            );
        }
    }

    #[test]
    fn test_rust_files_found() {
        let files = rust_files("chat/core/src");
        assert!(files.iter().any(|f| f.path.ends_with("lib.rs")));
    }

    #[test]
    fn test_code_lines_strip_comments() {
        let file = SourceFile {
            path: PathBuf::from("x.rs"),
            content: "let a = 1; // note\n// whole line\nlet b = 2;".to_string(),
        };
        let lines: Vec<(usize, &str)> = file.code_lines().collect();
        assert_eq!(lines, vec![(1, "let a = 1; "), (2, ""), (3, "let b = 2;")]);
    }
}
