//! `.mdignore` rules and directory entry ordering.
//!
//! Each directory may carry a `.mdignore` file with one glob pattern per
//! line. Rules apply only to the entries of that directory; subdirectories
//! start with a clean slate.
//!
//! ```text
//! docs/
//! ├── .mdignore        # "draft-*" and "scratch"
//! ├── draft-intro.md   # excluded
//! ├── guide.md
//! ├── scratch/         # excluded, not recursed into
//! └── sub/
//!     └── draft-x.md   # included: rules are not inherited
//! ```
//!
//! Independent of any rule, hidden entries (leading `.`) are never
//! considered and files without the `.md` extension are skipped.

use glob::Pattern;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const IGNORE_FILENAME: &str = ".mdignore";

/// Extension (without dot) of source documents.
pub const DOCUMENT_EXTENSION: &str = "md";

#[derive(Error, Debug)]
pub enum IgnoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pattern {rule:?} in {path}: {source}")]
    Pattern {
        path: PathBuf,
        rule: String,
        source: glob::PatternError,
    },
    #[error("rule {rule:?} in {path} contains '/': rules match names within one directory")]
    RuleWithSlash { path: PathBuf, rule: String },
}

/// Exclusion patterns of a single directory.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    /// Read `.mdignore` from `dir`. A missing file yields no rules.
    pub fn load(dir: &Path) -> Result<Self, IgnoreError> {
        let path = dir.join(IGNORE_FILENAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)?;
        Self::parse(&text, &path)
    }

    /// Parse rule text. `origin` is used in error messages only.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, IgnoreError> {
        let mut patterns = Vec::new();
        for line in text.lines() {
            let rule = line.trim();
            if rule.is_empty() || rule.starts_with('#') {
                continue;
            }
            if rule.contains('/') {
                return Err(IgnoreError::RuleWithSlash {
                    path: origin.to_path_buf(),
                    rule: rule.to_string(),
                });
            }
            let pattern = Pattern::new(rule).map_err(|source| IgnoreError::Pattern {
                path: origin.to_path_buf(),
                rule: rule.to_string(),
                source,
            })?;
            patterns.push(pattern);
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True when any rule matches the entry name.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    /// Whether an entry of this directory takes part in synchronization.
    pub fn admits(&self, name: &str, is_dir: bool) -> bool {
        if name.starts_with('.') {
            return false;
        }
        if !is_dir && !has_document_extension(name) {
            return false;
        }
        !self.matches(name)
    }
}

/// True for `*.md` file names.
pub fn has_document_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext == DOCUMENT_EXTENSION)
}

/// Sibling order: directories first, then case-insensitive name, then
/// case-sensitive name as a tie-breaker.
pub fn entry_order(a_name: &str, a_is_dir: bool, b_name: &str, b_is_dir: bool) -> Ordering {
    b_is_dir
        .cmp(&a_is_dir)
        .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
        .then_with(|| a_name.cmp(b_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rules(text: &str) -> IgnoreRules {
        IgnoreRules::parse(text, Path::new(".mdignore")).unwrap()
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let r = rules("# comment\n\n  \ndraft-*\n");
        assert!(r.matches("draft-intro.md"));
        assert!(!r.matches("intro.md"));
    }

    #[test]
    fn rule_with_slash_is_error() {
        let err = IgnoreRules::parse("docs/*.md\n", Path::new(".mdignore")).unwrap_err();
        assert!(matches!(err, IgnoreError::RuleWithSlash { .. }));
    }

    #[test]
    fn invalid_glob_is_error() {
        let err = IgnoreRules::parse("[unclosed\n", Path::new(".mdignore")).unwrap_err();
        assert!(matches!(err, IgnoreError::Pattern { .. }));
    }

    #[test]
    fn hidden_entries_never_admitted() {
        let r = IgnoreRules::default();
        assert!(!r.admits(".hidden.md", false));
        assert!(!r.admits(".git", true));
    }

    #[test]
    fn non_markdown_files_skipped() {
        let r = IgnoreRules::default();
        assert!(r.admits("guide.md", false));
        assert!(!r.admits("image.png", false));
        assert!(!r.admits("README", false));
        assert!(r.admits("assets", true));
    }

    #[test]
    fn rules_exclude_directories_too() {
        let r = rules("scratch\n");
        assert!(!r.admits("scratch", true));
    }

    #[test]
    fn load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(IgnoreRules::load(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn load_reads_directory_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(IGNORE_FILENAME), "wip.md\n").unwrap();
        let r = IgnoreRules::load(tmp.path()).unwrap();
        assert!(r.matches("wip.md"));
    }

    #[test]
    fn ordering_dirs_first_then_names() {
        let mut entries = vec![
            ("b.md", false),
            ("Zeta", true),
            ("a.md", false),
            ("B.md", false),
            ("alpha", true),
        ];
        entries.sort_by(|a, b| entry_order(a.0, a.1, b.0, b.1));
        let names: Vec<_> = entries.iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["alpha", "Zeta", "a.md", "B.md", "b.md"]);
    }
}
