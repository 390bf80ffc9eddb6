//! Shared types used across pipeline stages.
//!
//! Every document ends a run in exactly one [`DocumentState`]. A failure is
//! attributed to one source file and one [`Stage`], so the run report can
//! say where and why each document stopped.

use crate::convert::ConvertError;
use crate::frontmatter::FrontMatterError;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Pipeline stage a document was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Index,
    Allocate,
    Convert,
    Publish,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Index => "index",
            Stage::Allocate => "allocate",
            Stage::Convert => "convert",
            Stage::Publish => "publish",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Error confined to a single document. The run continues.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    FrontMatter(#[from] FrontMatterError),
    #[error("title {title:?} is already used by {first}")]
    DuplicateTitle { title: String, first: String },
    #[error("{0}")]
    Convert(#[from] ConvertError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("parent document {0} has no page id")]
    ParentUnallocated(String),
    #[error("placeholder page for directory {0}/ has no page id")]
    PlaceholderUnallocated(String),
    #[error("no space key: set space_key in md2wiki.toml or add a confluence-space-key directive")]
    MissingSpace,
    #[error("page {page_id} is published but its id could not be written back: {source}")]
    IdentityPersist {
        page_id: String,
        source: std::io::Error,
    },
}

/// A document-level failure, attributed to one source file.
#[derive(Debug)]
pub struct DocumentFailure {
    /// Source path relative to the synchronization root.
    pub relative: String,
    pub stage: Stage,
    pub error: DocumentError,
}

impl DocumentFailure {
    pub fn new(relative: impl Into<String>, stage: Stage, error: impl Into<DocumentError>) -> Self {
        Self {
            relative: relative.into(),
            stage,
            error: error.into(),
        }
    }
}

/// Final state of one document after a run.
#[derive(Debug)]
pub enum DocumentState {
    /// Content, title or metadata was sent to the store.
    Published,
    /// The store already held identical content; nothing was sent.
    Unchanged,
    /// `synchronized: false` in front matter.
    Skipped,
    Failed(DocumentFailure),
}

#[derive(Debug)]
pub struct DocumentReport {
    pub relative: String,
    pub title: Option<String>,
    pub page_id: Option<String>,
    /// The page was created during this run.
    pub created: bool,
    pub state: DocumentState,
}

/// Outcome of a synchronization run, one entry per discovered document.
#[derive(Debug, Default)]
pub struct RunReport {
    pub documents: Vec<DocumentReport>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DocumentFailure> {
        self.documents.iter().filter_map(|d| match &d.state {
            DocumentState::Failed(failure) => Some(failure),
            _ => None,
        })
    }

    pub fn get(&self, relative: &str) -> Option<&DocumentReport> {
        self.documents.iter().find(|d| d.relative == relative)
    }

    /// Counts of published, unchanged, skipped and failed documents.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0);
        for doc in &self.documents {
            match doc.state {
                DocumentState::Published => counts.0 += 1,
                DocumentState::Unchanged => counts.1 += 1,
                DocumentState::Skipped => counts.2 += 1,
                DocumentState::Failed(_) => counts.3 += 1,
            }
        }
        counts
    }
}
