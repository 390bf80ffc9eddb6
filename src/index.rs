//! Page index: titles, identities and parent candidates for every document.
//!
//! Built in one pass over the scan result, before anything is published.
//! Any document may link to any other, so conversion only starts once the
//! whole tree is indexed and every identity is allocated.
//!
//! ## Titles
//!
//! First match wins:
//!
//! 1. `title` in front matter
//! 2. the text of the single heading at the smallest level present
//! 3. file stem plus an 8-digit content hash, e.g. `notes [1a2b3c4d]`
//!
//! `title_prefix` from the config is prepended. Titles must be unique per
//! space (case-insensitive). Titles are claimed top-down, index documents
//! before their siblings, so on a clash the deeper document fails.
//!
//! ## Parents
//!
//! ```text
//! docs/
//! ├── index.md          parent: root_page_id, or top level of the space
//! ├── guide.md          parent: index.md
//! ├── api/
//! │   ├── README.md     parent: index.md
//! │   └── auth.md       parent: api/README.md
//! └── misc/             (no index document)
//!     └── faq.md        parent: index.md
//! ```
//!
//! A document that already carries a page id keeps its existing parent.
//! When an index document fails to index, its children still name it as
//! their parent and fail allocation instead of landing elsewhere.
//!
//! With `keep_hierarchy`, a directory without an index document gets a
//! [`Placeholder`] page titled after the directory, and `misc/faq.md` above
//! is parented under it instead of `index.md`. Placeholder titles yield to
//! document titles; on a clash the placeholder takes a hash suffix.

use crate::config::SyncConfig;
use crate::digest;
use crate::frontmatter::{self, ParsedSource};
use crate::markdown::{self, Document};
use crate::naming;
use crate::scan::{DiscoveredDocument, ScanResult};
use crate::types::{DocumentError, DocumentFailure, Stage};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(
        "no index.md or README.md in {0} and no root_page_id configured: cannot place the root of the page tree"
    )]
    MissingRootIndex(PathBuf),
}

/// Where a new page is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parent {
    /// Under the page of another document (relative path).
    Document(String),
    /// Under an existing page given by id.
    Page(String),
    /// Under the placeholder page of a directory without an index document.
    Directory(String),
    /// At the top level of the space.
    SpaceRoot,
    /// Already has an identity; never re-parented.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSource {
    FrontMatter,
    Heading,
    FileStem,
}

#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub relative: String,
    pub path: PathBuf,
    /// Directory of the document relative to the root; empty for the root.
    pub directory: String,
    pub is_index: bool,
    /// Full source text as read from disk.
    pub text: String,
    pub source: ParsedSource,
    pub tree: Document,
    pub title: String,
    pub title_source: TitleSource,
    /// Block position of the heading the title came from.
    pub title_heading: Option<usize>,
    pub page_id: Option<String>,
    pub parent: Parent,
    pub space_key: Option<String>,
}

impl IndexedDocument {
    pub fn synchronized(&self) -> bool {
        self.source.meta.synchronized
    }

    /// Nesting depth: number of directory components.
    pub fn depth(&self) -> usize {
        if self.directory.is_empty() {
            0
        } else {
            self.directory.split('/').count()
        }
    }
}

/// Stand-in page for a directory that has no index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Directory relative to the root.
    pub directory: String,
    pub title: String,
    pub parent: Parent,
    pub space_key: Option<String>,
}

impl Placeholder {
    /// Same scale as [`IndexedDocument::depth`]: a placeholder sits where the
    /// index document of its directory would.
    pub fn depth(&self) -> usize {
        self.directory.split('/').count()
    }
}

/// Output of the index pass.
#[derive(Debug)]
pub struct IndexPlan {
    pub root: PathBuf,
    pub documents: Vec<IndexedDocument>,
    /// Empty unless `keep_hierarchy` is set. Parents come before children.
    pub placeholders: Vec<Placeholder>,
    pub failures: Vec<DocumentFailure>,
}

/// Index every scanned document.
///
/// A missing root index without `root_page_id` is fatal. Per-document
/// problems (unreadable file, bad front matter, duplicate title) are
/// collected in [`IndexPlan::failures`] and the document is left out.
pub fn build_index(scan: &ScanResult, config: &SyncConfig) -> Result<IndexPlan, IndexError> {
    if scan.index_of("").is_none() && config.root_page_id.is_none() {
        return Err(IndexError::MissingRootIndex(scan.root.clone()));
    }

    let mut read = Vec::new();
    let mut failures = Vec::new();
    for (position, discovered) in scan.documents.iter().enumerate() {
        match read_document(discovered, config) {
            Ok(doc) => read.push(Some(doc)),
            Err(error) => {
                failures.push((
                    position,
                    DocumentFailure::new(&discovered.relative, Stage::Index, error),
                ));
                read.push(None);
            }
        }
    }

    // Titles are claimed top-down so a parent never loses a clash to one
    // of its descendants.
    let mut order: Vec<usize> = (0..read.len()).filter(|&i| read[i].is_some()).collect();
    order.sort_by_key(|&i| {
        let doc = &scan.documents[i];
        (tree_depth(doc), !doc.is_index, i)
    });
    let mut seen_titles: HashMap<(Option<String>, String), String> = HashMap::new();
    for i in order {
        let Some(doc) = &read[i] else { continue };
        let key = (doc.space_key.clone(), doc.title.to_lowercase());
        if let Some(first) = seen_titles.get(&key) {
            let failure = DocumentFailure::new(
                &doc.relative,
                Stage::Index,
                DocumentError::DuplicateTitle {
                    title: doc.title.clone(),
                    first: first.clone(),
                },
            );
            failures.push((i, failure));
            read[i] = None;
            continue;
        }
        seen_titles.insert(key, doc.relative.clone());
    }
    failures.sort_by_key(|(position, _)| *position);
    let failures: Vec<DocumentFailure> = failures.into_iter().map(|(_, f)| f).collect();

    // Parents are looked up among every scanned index document. A child of
    // an index document that failed above must not fall through to the
    // top of the space.
    let index_documents: HashSet<&str> = scan
        .documents
        .iter()
        .filter(|d| d.is_index)
        .map(|d| d.relative.as_str())
        .collect();
    let mut documents: Vec<IndexedDocument> = read.into_iter().flatten().collect();
    for doc in &mut documents {
        doc.parent = match doc.page_id {
            Some(_) => Parent::Fixed,
            None => parent_candidate(doc, &index_documents, config),
        };
    }

    let placeholders = placeholders(&documents, &index_documents, &mut seen_titles, config);

    log::debug!(
        "indexed {} documents, {} placeholders, {} failures",
        documents.len(),
        placeholders.len(),
        failures.len()
    );
    Ok(IndexPlan {
        root: scan.root.clone(),
        documents,
        placeholders,
        failures,
    })
}

/// Placeholders for every directory a new page is parented under,
/// including the chain of index-less ancestors above them.
fn placeholders(
    documents: &[IndexedDocument],
    index_documents: &HashSet<&str>,
    seen_titles: &mut HashMap<(Option<String>, String), String>,
    config: &SyncConfig,
) -> Vec<Placeholder> {
    let mut pending: Vec<String> = documents
        .iter()
        .filter_map(|d| match &d.parent {
            Parent::Directory(dir) => Some(dir.clone()),
            _ => None,
        })
        .collect();
    let mut found: BTreeMap<String, Parent> = BTreeMap::new();
    while let Some(directory) = pending.pop() {
        if found.contains_key(&directory) {
            continue;
        }
        let parent = directory_parent(&parent_directory(&directory), index_documents, config);
        if let Parent::Directory(above) = &parent {
            pending.push(above.clone());
        }
        found.insert(directory, parent);
    }

    let mut placeholders: Vec<Placeholder> = found
        .into_iter()
        .map(|(directory, parent)| {
            let name = directory.rsplit('/').next().unwrap_or(&directory);
            let title = format!("{}{name}", config.title_prefix.as_deref().unwrap_or(""));
            Placeholder {
                directory,
                title,
                parent,
                space_key: config.space_key.clone(),
            }
        })
        .collect();
    placeholders.sort_by(|a, b| (a.depth(), &a.directory).cmp(&(b.depth(), &b.directory)));

    for placeholder in &mut placeholders {
        let space = placeholder.space_key.clone();
        if seen_titles.contains_key(&(space.clone(), placeholder.title.to_lowercase())) {
            let suffix = digest::disambiguation_suffix(&placeholder.directory, "");
            placeholder.title = format!("{} [{suffix}]", placeholder.title);
        }
        seen_titles.insert(
            (space, placeholder.title.to_lowercase()),
            format!("{}/", placeholder.directory),
        );
    }
    placeholders
}

fn read_document(
    discovered: &DiscoveredDocument,
    config: &SyncConfig,
) -> Result<IndexedDocument, DocumentError> {
    let text = std::fs::read_to_string(&discovered.path)?;
    let source = frontmatter::parse_source(&text)?;
    let tree = markdown::parse(&source.body);

    let (base_title, title_source, title_heading) = match &source.meta.title {
        Some(title) => (title.clone(), TitleSource::FrontMatter, None),
        None => match tree.single_top_heading() {
            Some((index, heading)) if !heading.is_empty() => {
                (heading, TitleSource::Heading, Some(index))
            }
            _ => {
                let name = discovered
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| discovered.relative.clone());
                let suffix = digest::disambiguation_suffix(&discovered.relative, &source.body);
                (naming::stem_title(&name, &suffix), TitleSource::FileStem, None)
            }
        },
    };
    let title = match &config.title_prefix {
        Some(prefix) => format!("{prefix}{base_title}"),
        None => base_title,
    };

    Ok(IndexedDocument {
        relative: discovered.relative.clone(),
        path: discovered.path.clone(),
        directory: discovered.directory.clone(),
        is_index: discovered.is_index,
        page_id: source.meta.page_id.clone(),
        space_key: source
            .meta
            .space_key
            .clone()
            .or_else(|| config.space_key.clone()),
        text,
        source,
        tree,
        title,
        title_source,
        title_heading,
        parent: Parent::Fixed,
    })
}

/// Position of a document in the page tree: an index document sits at the
/// level of its directory, every other document one below.
fn tree_depth(doc: &DiscoveredDocument) -> usize {
    let levels = if doc.directory.is_empty() {
        0
    } else {
        doc.directory.split('/').count()
    };
    if doc.is_index { levels } else { levels + 1 }
}

/// Nearest index document above `doc`, else the configured root.
fn parent_candidate(
    doc: &IndexedDocument,
    index_documents: &HashSet<&str>,
    config: &SyncConfig,
) -> Parent {
    if doc.is_index && doc.directory.is_empty() {
        return top_level(config);
    }
    let start = if doc.is_index {
        parent_directory(&doc.directory)
    } else {
        doc.directory.clone()
    };
    directory_parent(&start, index_documents, config)
}

/// Parent of a page placed in `start`: the nearest index document at or
/// above it. With `keep_hierarchy` the first index-less directory stops the
/// walk instead.
fn directory_parent(start: &str, index_documents: &HashSet<&str>, config: &SyncConfig) -> Parent {
    let mut directory = Some(start.to_string());
    while let Some(dir) = directory {
        for name in crate::scan::INDEX_NAMES {
            let candidate = join(&dir, name);
            if index_documents.contains(candidate.as_str()) {
                return Parent::Document(candidate);
            }
        }
        if dir.is_empty() {
            break;
        }
        if config.keep_hierarchy {
            return Parent::Directory(dir);
        }
        directory = Some(parent_directory(&dir));
    }
    top_level(config)
}

fn top_level(config: &SyncConfig) -> Parent {
    match &config.root_page_id {
        Some(id) => Parent::Page(id.clone()),
        None => Parent::SpaceRoot,
    }
}

fn parent_directory(dir: &str) -> String {
    match dir.rfind('/') {
        Some(pos) => dir[..pos].to_string(),
        None => String::new(),
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Identity and title of one indexed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageIndexEntry {
    pub page_id: Option<String>,
    pub title: String,
    pub space_key: Option<String>,
    pub is_index: bool,
}

/// Read-only view of all indexed documents, keyed by relative path.
///
/// Built once allocation has finished and shared by every conversion.
#[derive(Debug, Clone, Default)]
pub struct PageIndex {
    root: PathBuf,
    entries: BTreeMap<String, PageIndexEntry>,
}

impl PageIndex {
    pub fn new(root: &Path, documents: &[IndexedDocument]) -> Self {
        let entries = documents
            .iter()
            .map(|d| {
                (
                    d.relative.clone(),
                    PageIndexEntry {
                        page_id: d.page_id.clone(),
                        title: d.title.clone(),
                        space_key: d.space_key.clone(),
                        is_index: d.is_index,
                    },
                )
            })
            .collect();
        Self {
            root: root.to_path_buf(),
            entries,
        }
    }

    /// Canonical synchronization root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, relative: &str) -> Option<&PageIndexEntry> {
        self.entries.get(relative)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PageIndexEntry)> {
        self.entries.iter()
    }
}
