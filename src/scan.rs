//! Directory scanning.
//!
//! The first stage of a run: one walk over the synchronization root that
//! fixes the set of documents for the whole run. Nothing rescans later, so a
//! file created mid-run is picked up on the next run only.
//!
//! ```text
//! docs/                       # Synchronization root
//! ├── md2wiki.toml            # Configuration (optional, not a document)
//! ├── index.md                # Root index document
//! ├── install.md
//! ├── .mdignore               # Rules for this directory only
//! ├── .drafts/                # Hidden: never recursed into
//! ├── diagrams/
//! │   └── flow.mmd            # Not a document; may be referenced as image
//! └── api/
//!     ├── README.md           # Index document of api/
//!     └── auth.md
//! ```
//!
//! Index documents are `index.md` or `README.md`. A directory containing both
//! is rejected, since either could claim the parent role.
//!
//! Entries are visited directories first, then by case-insensitive name (see
//! [`crate::ignore::entry_order`]). The order is deterministic, so derived
//! state such as duplicate-title detection is stable across runs.

use crate::ignore::{IgnoreError, IgnoreRules, entry_order};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File names that make a document the index of its directory.
pub const INDEX_NAMES: &[&str] = &["index.md", "README.md"];

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Ignore file error: {0}")]
    Ignore(#[from] IgnoreError),
    #[error("Synchronization root is not a directory: {0}")]
    RootNotDirectory(PathBuf),
    #[error("Directory {0} has both index.md and README.md")]
    AmbiguousIndex(PathBuf),
}

/// A Markdown file found by the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDocument {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the root, `/`-separated.
    pub relative: String,
    /// Directory part of `relative`; empty for the root.
    pub directory: String,
    /// Whether this is the index document of its directory.
    pub is_index: bool,
}

/// Result of scanning the synchronization root.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Canonical absolute root.
    pub root: PathBuf,
    /// Documents in visit order.
    pub documents: Vec<DiscoveredDocument>,
}

impl ScanResult {
    /// The index document of `directory`, if any.
    pub fn index_of(&self, directory: &str) -> Option<&DiscoveredDocument> {
        self.documents
            .iter()
            .find(|d| d.is_index && d.directory == directory)
    }
}

/// Render a relative path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `root` and collect every admitted Markdown document.
pub fn scan(root: &Path) -> Result<ScanResult, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::RootNotDirectory(root.to_path_buf()));
    }
    let root = root.canonicalize()?;

    let mut rules: HashMap<PathBuf, IgnoreRules> = HashMap::new();
    let mut rule_error: Option<IgnoreError> = None;
    let mut documents = Vec::new();

    {
        let walker = WalkDir::new(&root)
            .sort_by(|a, b| {
                entry_order(
                    &a.file_name().to_string_lossy(),
                    a.file_type().is_dir(),
                    &b.file_name().to_string_lossy(),
                    b.file_type().is_dir(),
                )
            })
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let Some(parent) = entry.path().parent() else {
                    return false;
                };
                if !rules.contains_key(parent) {
                    let loaded = IgnoreRules::load(parent).unwrap_or_else(|e| {
                        rule_error.get_or_insert(e);
                        IgnoreRules::default()
                    });
                    rules.insert(parent.to_path_buf(), loaded);
                }
                let name = entry.file_name().to_string_lossy();
                rules
                    .get(parent)
                    .is_some_and(|r| r.admits(&name, entry.file_type().is_dir()))
            });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative_path = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            let relative = to_slash(relative_path);
            let directory = relative_path
                .parent()
                .map(to_slash)
                .unwrap_or_default();
            let name = entry.file_name().to_string_lossy();
            documents.push(DiscoveredDocument {
                path: entry.path().to_path_buf(),
                relative,
                directory,
                is_index: INDEX_NAMES.contains(&name.as_ref()),
            });
        }
    }

    if let Some(err) = rule_error {
        return Err(err.into());
    }

    let mut index_dirs: HashMap<&str, usize> = HashMap::new();
    for doc in documents.iter().filter(|d| d.is_index) {
        let count = index_dirs.entry(doc.directory.as_str()).or_default();
        *count += 1;
        if *count > 1 {
            return Err(ScanError::AmbiguousIndex(root.join(&doc.directory)));
        }
    }

    log::debug!("scanned {} documents under {}", documents.len(), root.display());
    Ok(ScanResult { root, documents })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_tree;
    use tempfile::TempDir;

    fn relatives(result: &ScanResult) -> Vec<&str> {
        result.documents.iter().map(|d| d.relative.as_str()).collect()
    }

    #[test]
    fn finds_markdown_in_order() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "# Root"),
                ("b.md", "b"),
                ("A.md", "a"),
                ("sub/README.md", "# Sub"),
                ("sub/page.md", "p"),
                ("notes.txt", "skip"),
            ],
        );
        let result = scan(tmp.path()).unwrap();
        assert_eq!(
            relatives(&result),
            vec!["sub/page.md", "sub/README.md", "A.md", "b.md", "index.md"]
        );
    }

    #[test]
    fn index_documents_flagged() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", ""), ("sub/README.md", ""), ("x.md", "")]);
        let result = scan(tmp.path()).unwrap();
        assert!(result.index_of("").is_some());
        assert_eq!(result.index_of("sub").unwrap().relative, "sub/README.md");
        assert!(!result.documents.iter().find(|d| d.relative == "x.md").unwrap().is_index);
    }

    #[test]
    fn hidden_directories_skipped() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", ""), (".drafts/a.md", ""), (".x.md", "")]);
        let result = scan(tmp.path()).unwrap();
        assert_eq!(relatives(&result), vec!["index.md"]);
    }

    #[test]
    fn ignore_rules_scoped_to_directory() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                (".mdignore", "# drafts\ndraft-*\nscratch\n"),
                ("index.md", ""),
                ("draft-one.md", ""),
                ("scratch/a.md", ""),
                ("sub/draft-two.md", ""),
            ],
        );
        let result = scan(tmp.path()).unwrap();
        assert_eq!(relatives(&result), vec!["sub/draft-two.md", "index.md"]);
    }

    #[test]
    fn invalid_ignore_rule_fails_scan() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[(".mdignore", "sub/x.md\n"), ("index.md", "")]);
        assert!(matches!(scan(tmp.path()), Err(ScanError::Ignore(_))));
    }

    #[test]
    fn both_index_names_rejected() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", ""), ("README.md", "")]);
        assert!(matches!(scan(tmp.path()), Err(ScanError::AmbiguousIndex(_))));
    }

    #[test]
    fn missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(scan(&missing), Err(ScanError::RootNotDirectory(_))));
    }

    #[test]
    fn to_slash_joins_components() {
        assert_eq!(to_slash(Path::new("a/b/c.md")), "a/b/c.md");
        assert_eq!(to_slash(Path::new("")), "");
    }
}
