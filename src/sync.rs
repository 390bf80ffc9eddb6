//! Synchronization pipeline.
//!
//! One run takes every document of the tree through these stages:
//!
//! ```text
//! scan ──▶ index ──▶ allocate ──▶ convert ──▶ publish ──▶ persist
//!          (one pass, single-threaded)   (per document, parallel)
//! ```
//!
//! | Stage    | What happens                                                 |
//! |----------|--------------------------------------------------------------|
//! | scan     | fixed document set for the run                              |
//! | index    | titles, identities, parent candidates                       |
//! | allocate | pages without an id are adopted by title or created empty   |
//! | convert  | storage-format body and attachments against the snapshot    |
//! | publish  | skipped when title and digest match, else update + upload    |
//! | persist  | the page id is written back into the source file             |
//!
//! Scan and index errors abort the run before anything is published. Every
//! later problem fails only its own document; the [`RunReport`] lists each
//! document once, in scan order.
//!
//! Allocation runs parents first so a child is always created under an
//! existing page. With `keep_hierarchy`, placeholder pages for index-less
//! directories are allocated in the same pass. Once it completes, the [`PageIndex`] snapshot is frozen
//! and documents no longer depend on each other.

use crate::config::SyncConfig;
use crate::convert::{ConvertedDocument, Converter};
use crate::diagram::DiagramRenderer;
use crate::digest;
use crate::frontmatter;
use crate::index::{IndexError, IndexedDocument, PageIndex, Parent, Placeholder, build_index};
use crate::scan::{ScanError, scan};
use crate::storage::{self, StorageElement, Widget};
use crate::store::{PageStore, SYNC_PROPERTY, StoreError, digest_property};
use crate::types::{
    DocumentError, DocumentFailure, DocumentReport, DocumentState, RunReport, Stage,
};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

/// Run-wide failure. Nothing has been published when one is returned.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{0}")]
    Scan(#[from] ScanError),
    #[error("{0}")]
    Index(#[from] IndexError),
}

/// Switches that differ between the remote and the local command.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Write each converted body next to its source as `<name>.csf`.
    pub write_csf: bool,
}

/// Progress reported while a run is underway.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Indexed {
        documents: usize,
        failures: usize,
    },
    Allocated {
        relative: String,
        title: String,
        page_id: String,
        created: bool,
    },
    Finished {
        relative: String,
        title: String,
        page_id: Option<String>,
        outcome: Outcome,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Published,
    Unchanged,
    Skipped,
    Failed { stage: Stage, message: String },
}

/// Synchronize the tree under `root` into `store`.
pub fn sync(
    root: &Path,
    config: &SyncConfig,
    store: &dyn PageStore,
    renderer: &dyn DiagramRenderer,
    options: &SyncOptions,
    events: Option<Sender<SyncEvent>>,
) -> Result<RunReport, SyncError> {
    let scanned = scan(root)?;
    let mut plan = build_index(&scanned, config)?;
    notify(
        &events,
        SyncEvent::Indexed {
            documents: plan.documents.len(),
            failures: plan.failures.len(),
        },
    );

    let mut failures: HashMap<String, DocumentFailure> = plan
        .failures
        .drain(..)
        .map(|f| (f.relative.clone(), f))
        .collect();
    let created = allocate(
        &mut plan.documents,
        &plan.placeholders,
        store,
        &mut failures,
        &events,
    );

    let index = PageIndex::new(&plan.root, &plan.documents);
    let converter = Converter::new(config, &index, renderer);
    let context = Publisher {
        config,
        store,
        converter: &converter,
        options,
    };

    let mut outcomes: HashMap<String, DocumentReport> = plan
        .documents
        .par_iter()
        .filter(|doc| !failures.contains_key(&doc.relative))
        .map(|doc| {
            let report = context.run(doc, created.contains(&doc.relative));
            notify(&events, finished_event(&report, &doc.title));
            (doc.relative.clone(), report)
        })
        .collect();

    let titles: HashMap<&str, &str> = plan
        .documents
        .iter()
        .map(|d| (d.relative.as_str(), d.title.as_str()))
        .collect();
    let ids: HashMap<&str, Option<String>> = plan
        .documents
        .iter()
        .map(|d| (d.relative.as_str(), d.page_id.clone()))
        .collect();

    let mut report = RunReport::default();
    for discovered in &scanned.documents {
        let relative = discovered.relative.as_str();
        if let Some(failure) = failures.remove(relative) {
            let entry = DocumentReport {
                relative: relative.to_string(),
                title: titles.get(relative).map(|t| t.to_string()),
                page_id: ids.get(relative).cloned().flatten(),
                created: created.contains(relative),
                state: DocumentState::Failed(failure),
            };
            let title = titles.get(relative).copied().unwrap_or(relative);
            notify(&events, finished_event(&entry, title));
            report.documents.push(entry);
        } else if let Some(entry) = outcomes.remove(relative) {
            report.documents.push(entry);
        }
    }
    Ok(report)
}

fn notify(events: &Option<Sender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

fn finished_event(report: &DocumentReport, title: &str) -> SyncEvent {
    let outcome = match &report.state {
        DocumentState::Published => Outcome::Published,
        DocumentState::Unchanged => Outcome::Unchanged,
        DocumentState::Skipped => Outcome::Skipped,
        DocumentState::Failed(failure) => Outcome::Failed {
            stage: failure.stage,
            message: failure.error.to_string(),
        },
    };
    SyncEvent::Finished {
        relative: report.relative.clone(),
        title: title.to_string(),
        page_id: report.page_id.clone(),
        outcome,
    }
}

// ============================================================================
// Allocation
// ============================================================================

/// A page the allocation pass provides.
enum Slot {
    Document(usize),
    Placeholder(usize),
}

/// Give every synchronized document without an identity a page.
///
/// Parents come first: documents and placeholders are visited by depth,
/// index documents and placeholders before their siblings. An existing page
/// with the same title in the space is adopted instead of creating a
/// duplicate. Returns the documents whose page was created in this run.
fn allocate(
    documents: &mut [IndexedDocument],
    placeholders: &[Placeholder],
    store: &dyn PageStore,
    failures: &mut HashMap<String, DocumentFailure>,
    events: &Option<Sender<SyncEvent>>,
) -> HashSet<String> {
    let mut order: Vec<(usize, bool, String, Slot)> = documents
        .iter()
        .enumerate()
        .map(|(i, d)| (d.depth(), !d.is_index, d.relative.clone(), Slot::Document(i)))
        .chain(
            placeholders
                .iter()
                .enumerate()
                .map(|(i, p)| (p.depth(), false, p.directory.clone(), Slot::Placeholder(i))),
        )
        .collect();
    order.sort_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));
    let position: HashMap<String, usize> = documents
        .iter()
        .enumerate()
        .map(|(i, d)| (d.relative.clone(), i))
        .collect();

    let mut directory_pages: HashMap<String, String> = HashMap::new();
    let mut created = HashSet::new();
    for (_, _, _, slot) in order {
        match slot {
            Slot::Placeholder(i) => {
                let placeholder = &placeholders[i];
                let label = format!("{}/", placeholder.directory);
                match allocate_placeholder(placeholder, documents, &position, &directory_pages, store)
                {
                    Ok((page_id, was_created)) => {
                        notify(
                            events,
                            SyncEvent::Allocated {
                                relative: label,
                                title: placeholder.title.clone(),
                                page_id: page_id.clone(),
                                created: was_created,
                            },
                        );
                        directory_pages.insert(placeholder.directory.clone(), page_id);
                    }
                    Err(error) => log::warn!("{label}: no placeholder page: {error}"),
                }
            }
            Slot::Document(i) => {
                let doc = &documents[i];
                if doc.page_id.is_some() || !doc.synchronized() {
                    continue;
                }
                let result = parent_page(&doc.parent, documents, &position, &directory_pages)
                    .and_then(|parent| {
                        let space = doc.space_key.as_deref().ok_or(DocumentError::MissingSpace)?;
                        Ok(find_or_create(store, space, parent.as_deref(), &doc.title, "")?)
                    });
                let (page_id, was_created) = match result {
                    Ok(allocated) => allocated,
                    Err(error) => {
                        failures.insert(
                            doc.relative.clone(),
                            DocumentFailure::new(&doc.relative, Stage::Allocate, error),
                        );
                        continue;
                    }
                };
                if !was_created {
                    log::info!("{}: adopting existing page {page_id}", doc.relative);
                }
                notify(
                    events,
                    SyncEvent::Allocated {
                        relative: doc.relative.clone(),
                        title: doc.title.clone(),
                        page_id: page_id.clone(),
                        created: was_created,
                    },
                );
                if was_created {
                    created.insert(doc.relative.clone());
                }
                documents[i].page_id = Some(page_id);
            }
        }
    }
    created
}

/// Page id a new page is created under, or the reason there is none yet.
fn parent_page(
    parent: &Parent,
    documents: &[IndexedDocument],
    position: &HashMap<String, usize>,
    directory_pages: &HashMap<String, String>,
) -> Result<Option<String>, DocumentError> {
    match parent {
        Parent::Document(relative) => position
            .get(relative)
            .and_then(|&p| documents[p].page_id.clone())
            .map(Some)
            .ok_or_else(|| DocumentError::ParentUnallocated(relative.clone())),
        Parent::Directory(directory) => directory_pages
            .get(directory)
            .cloned()
            .map(Some)
            .ok_or_else(|| DocumentError::PlaceholderUnallocated(directory.clone())),
        Parent::Page(id) => Ok(Some(id.clone())),
        Parent::SpaceRoot | Parent::Fixed => Ok(None),
    }
}

/// Adopt the page titled `title` in `space`, or create it with `body`.
fn find_or_create(
    store: &dyn PageStore,
    space: &str,
    parent: Option<&str>,
    title: &str,
    body: &str,
) -> Result<(String, bool), StoreError> {
    if let Some(id) = store.find_page(title, Some(space))? {
        return Ok((id, false));
    }
    let id = store.create_page(Some(space), parent, title, body)?;
    Ok((id, true))
}

/// Placeholder pages list their children and are never updated afterwards.
fn allocate_placeholder(
    placeholder: &Placeholder,
    documents: &[IndexedDocument],
    position: &HashMap<String, usize>,
    directory_pages: &HashMap<String, String>,
    store: &dyn PageStore,
) -> Result<(String, bool), DocumentError> {
    let parent = parent_page(&placeholder.parent, documents, position, directory_pages)?;
    let space = placeholder
        .space_key
        .as_deref()
        .ok_or(DocumentError::MissingSpace)?;
    let body = storage::serialize(&[StorageElement::Widget(Widget::ChildListing)]);
    Ok(find_or_create(store, space, parent.as_deref(), &placeholder.title, &body)?)
}

// ============================================================================
// Convert, publish, persist
// ============================================================================

struct Publisher<'a> {
    config: &'a SyncConfig,
    store: &'a dyn PageStore,
    converter: &'a Converter<'a>,
    options: &'a SyncOptions,
}

impl Publisher<'_> {
    fn run(&self, doc: &IndexedDocument, created: bool) -> DocumentReport {
        let state = match self.stages(doc) {
            Ok(state) => state,
            Err(failure) => {
                log::warn!("{}: {} failed: {}", failure.relative, failure.stage, failure.error);
                DocumentState::Failed(failure)
            }
        };
        DocumentReport {
            relative: doc.relative.clone(),
            title: Some(doc.title.clone()),
            page_id: doc.page_id.clone(),
            created,
            state,
        }
    }

    fn stages(&self, doc: &IndexedDocument) -> Result<DocumentState, DocumentFailure> {
        let fail = |stage: Stage| {
            move |e: DocumentError| DocumentFailure::new(&doc.relative, stage, e)
        };
        let Some(page_id) = doc.page_id.as_deref().filter(|_| doc.synchronized()) else {
            log::debug!("{}: not synchronized", doc.relative);
            return Ok(DocumentState::Skipped);
        };

        let converted = self
            .converter
            .convert(doc)
            .map_err(|e| fail(Stage::Convert)(e.into()))?;
        if self.options.write_csf {
            write_csf(&doc.path, &converted.body).map_err(|e| fail(Stage::Convert)(e.into()))?;
        }

        let state = self
            .publish(doc, page_id, &converted)
            .map_err(fail(Stage::Publish))?;

        let persisted = doc.source.meta.page_id.as_deref() == Some(page_id);
        if !self.config.skip_update && !persisted {
            let text = frontmatter::write_page_id(&doc.text, page_id);
            std::fs::write(&doc.path, text).map_err(|source| {
                fail(Stage::Persist)(DocumentError::IdentityPersist {
                    page_id: page_id.to_string(),
                    source,
                })
            })?;
            log::debug!("{}: recorded page id {page_id}", doc.relative);
        }
        Ok(state)
    }

    fn publish(
        &self,
        doc: &IndexedDocument,
        page_id: &str,
        converted: &ConvertedDocument,
    ) -> Result<DocumentState, DocumentError> {
        let snapshot = self.store.fetch_page(page_id)?;
        let digest = publish_digest(&doc.source.sync_digest, converted)?;
        if snapshot.title == doc.title && snapshot.sync_digest.as_deref() == Some(digest.as_str())
        {
            log::debug!("{}: page {page_id} is up to date", doc.relative);
            return Ok(DocumentState::Unchanged);
        }

        self.store
            .update_page(page_id, &doc.title, &converted.body, snapshot.version)?;
        for attachment in &converted.attachments {
            self.store.upload_attachment(page_id, attachment)?;
        }
        self.store.set_labels(page_id, &doc.source.meta.tags)?;
        let mut properties: BTreeMap<String, serde_json::Value> =
            doc.source.meta.properties.clone();
        properties.insert(SYNC_PROPERTY.to_string(), digest_property(&digest));
        self.store.set_properties(page_id, &properties)?;

        log::info!(
            "{}: published page {page_id} with {} attachments",
            doc.relative,
            converted.attachments.len()
        );
        Ok(DocumentState::Published)
    }
}

/// Digest recorded on the page: source, converted body and attachment
/// contents. Any change to one of them causes a republish.
fn publish_digest(
    source_digest: &str,
    converted: &ConvertedDocument,
) -> Result<String, std::io::Error> {
    let mut hasher = Sha256::new();
    hasher.update(source_digest.as_bytes());
    hasher.update([0]);
    hasher.update(digest::hash_bytes(converted.body.as_bytes()).as_bytes());
    for attachment in &converted.attachments {
        hasher.update([0]);
        hasher.update(attachment.name.as_bytes());
        hasher.update([0]);
        hasher.update(digest::hash_bytes(&attachment.bytes()?).as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Path of the storage-format sibling of a source file.
pub fn csf_path(source: &Path) -> PathBuf {
    source.with_extension("csf")
}

/// Write `body` next to `source` unless the file already holds it.
fn write_csf(source: &Path, body: &str) -> std::io::Result<()> {
    let path = csf_path(source);
    if std::fs::read_to_string(&path).is_ok_and(|existing| existing == body) {
        return Ok(());
    }
    std::fs::write(path, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::tests::MockRenderer;
    use crate::store::tests::{MemoryStore, RecordedOp};
    use crate::test_helpers::{find_report, page_id_in_file, write_png, write_tree};
    use tempfile::TempDir;

    fn config() -> SyncConfig {
        SyncConfig {
            space_key: Some("DOCS".into()),
            generated_by: String::new(),
            ..SyncConfig::default()
        }
    }

    fn run(tmp: &TempDir, config: &SyncConfig, store: &MemoryStore) -> RunReport {
        sync(
            tmp.path(),
            config,
            store,
            &MockRenderer::new(),
            &SyncOptions::default(),
            None,
        )
        .unwrap()
    }

    fn creates(store: &MemoryStore) -> Vec<RecordedOp> {
        store
            .get_operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::Create { .. }))
            .collect()
    }

    // =========================================================================
    // Allocation and identity write-back
    // =========================================================================

    #[test]
    fn new_tree_is_allocated_and_persisted() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[("index.md", "# Root\n\nWelcome.\n"), ("child.md", "Just text.\n")],
        );
        let store = MemoryStore::new();
        let report = run(&tmp, &config(), &store);
        assert!(!report.has_failures());

        let root = find_report(&report, "index.md");
        let child = find_report(&report, "child.md");
        assert!(root.created && child.created);
        let root_id = root.page_id.clone().unwrap();
        let child_id = child.page_id.clone().unwrap();
        assert_eq!(store.page(&child_id).unwrap().parent.as_deref(), Some(root_id.as_str()));
        assert_eq!(store.page(&root_id).unwrap().parent, None);

        assert_eq!(page_id_in_file(&tmp.path().join("index.md")), Some(root_id));
        assert_eq!(page_id_in_file(&tmp.path().join("child.md")), Some(child_id));
    }

    #[test]
    fn second_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "# Root\n\nSee [child](child.md).\n"),
                ("child.md", "Just text with a diagram.\n\n```mermaid\ngraph TD; A-->B\n```\n"),
                ("sub/README.md", "# Sub\n"),
                ("sub/leaf.md", "# Leaf\n\n![shot](shot.png)\n"),
            ],
        );
        write_png(&tmp.path().join("sub/shot.png"), 8, 8);
        let store = MemoryStore::new();
        let first = run(&tmp, &config(), &store);
        assert!(!first.has_failures());
        let bodies: Vec<String> = store
            .pages
            .lock()
            .unwrap()
            .values()
            .map(|p| p.body.clone())
            .collect();

        store.clear_operations();
        let second = run(&tmp, &config(), &store);
        assert!(!second.has_failures());
        assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());
        assert_eq!(second.counts(), (0, 4, 0, 0));
        let again: Vec<String> = store
            .pages
            .lock()
            .unwrap()
            .values()
            .map(|p| p.body.clone())
            .collect();
        assert_eq!(bodies, again);
    }

    #[test]
    fn parents_allocated_before_children() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "# Root\n"),
                ("a/z.md", "# Z\n"),
                ("a/README.md", "# A\n"),
            ],
        );
        let store = MemoryStore::new();
        run(&tmp, &config(), &store);
        let titles: Vec<String> = creates(&store)
            .into_iter()
            .map(|op| match op {
                RecordedOp::Create { title, .. } => title,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(titles, ["Root", "A", "Z"]);
    }

    #[test]
    fn existing_page_adopted_by_title() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", "# Root\n")]);
        let store = MemoryStore::new();
        let orphan = store.create_page(Some("DOCS"), None, "Root", "").unwrap();
        store.clear_operations();

        let report = run(&tmp, &config(), &store);
        let root = find_report(&report, "index.md");
        assert_eq!(root.page_id.as_deref(), Some(orphan.as_str()));
        assert!(!root.created);
        assert!(creates(&store).is_empty());
    }

    #[test]
    fn skip_update_leaves_sources_untouched() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", "# Root\n")]);
        let mut config = config();
        config.skip_update = true;
        let report = run(&tmp, &config, &MemoryStore::new());
        assert!(matches!(find_report(&report, "index.md").state, DocumentState::Published));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("index.md")).unwrap(),
            "# Root\n"
        );
    }

    #[test]
    fn missing_space_fails_allocation() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", "# Root\n"), ("a.md", "# A\n")]);
        let mut config = config();
        config.space_key = None;
        let report = run(&tmp, &config, &MemoryStore::new());
        let DocumentState::Failed(failure) = &find_report(&report, "index.md").state else {
            panic!("expected failure");
        };
        assert_eq!(failure.stage, Stage::Allocate);
        assert!(matches!(failure.error, DocumentError::MissingSpace));
        let DocumentState::Failed(child) = &find_report(&report, "a.md").state else {
            panic!("expected failure");
        };
        assert!(matches!(child.error, DocumentError::ParentUnallocated(_)));
    }

    #[test]
    fn unsynchronized_document_skipped() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[("index.md", "# Root\n"), ("draft.md", "---\nsynchronized: false\n---\n# Draft\n")],
        );
        let store = MemoryStore::new();
        let report = run(&tmp, &config(), &store);
        let draft = find_report(&report, "draft.md");
        assert!(matches!(draft.state, DocumentState::Skipped));
        assert_eq!(draft.page_id, None);
        assert_eq!(creates(&store).len(), 1);
    }

    // =========================================================================
    // Failure isolation
    // =========================================================================

    #[test]
    fn invalid_csf_block_fails_only_its_document() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "# Root\n"),
                ("broken.md", "# Broken\n\n```csf\n<p><b>unterminated</p>\n```\n"),
                ("fine.md", "# Fine\n"),
            ],
        );
        let store = MemoryStore::new();
        let report = run(&tmp, &config(), &store);

        let DocumentState::Failed(failure) = &find_report(&report, "broken.md").state else {
            panic!("expected failure");
        };
        assert_eq!(failure.stage, Stage::Convert);
        assert!(matches!(find_report(&report, "fine.md").state, DocumentState::Published));
        assert!(report.has_failures());
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn link_outside_root_rejected_strict_and_lenient() {
        for strict in [true, false] {
            let tmp = TempDir::new().unwrap();
            write_tree(
                tmp.path(),
                &[("docs/index.md", "# Root\n\n[up](../outside.md)\n"), ("outside.md", "# Out\n")],
            );
            let mut config = config();
            config.converter.force_valid_url = strict;
            let store = MemoryStore::new();
            let report = sync(
                &tmp.path().join("docs"),
                &config,
                &store,
                &MockRenderer::new(),
                &SyncOptions::default(),
                None,
            )
            .unwrap();
            let entry = find_report(&report, "index.md");
            if strict {
                assert!(matches!(entry.state, DocumentState::Failed(_)));
            } else {
                let body = store.page(entry.page_id.as_deref().unwrap()).unwrap().body;
                assert!(!body.contains("outside.md"));
                assert!(body.contains("<p>up</p>"));
            }
        }
    }

    #[test]
    fn duplicate_title_reported_once() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[("index.md", "# Root\n"), ("a.md", "# Same\n"), ("b.md", "# same\n")],
        );
        let report = run(&tmp, &config(), &MemoryStore::new());
        assert_eq!(report.documents.len(), 3);
        let DocumentState::Failed(failure) = &find_report(&report, "b.md").state else {
            panic!("expected failure");
        };
        assert_eq!(failure.stage, Stage::Index);
    }

    #[test]
    fn failed_root_index_blocks_its_children() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "---\ntitle: [x\n---\n# Root\n"),
                ("child.md", "# Child\n"),
                ("sub/README.md", "# Sub\n"),
            ],
        );
        let store = MemoryStore::new();
        let report = run(&tmp, &config(), &store);

        for relative in ["child.md", "sub/README.md"] {
            let DocumentState::Failed(failure) = &find_report(&report, relative).state else {
                panic!("{relative} should fail");
            };
            assert_eq!(failure.stage, Stage::Allocate);
            assert!(matches!(&failure.error, DocumentError::ParentUnallocated(p) if p == "index.md"));
        }
        assert!(creates(&store).is_empty());
    }

    #[test]
    fn root_index_keeps_title_against_nested_index() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "# Root\n"),
                ("sub/README.md", "# Root\n"),
                ("sub/page.md", "# Page\n"),
            ],
        );
        let store = MemoryStore::new();
        let report = run(&tmp, &config(), &store);

        let root = find_report(&report, "index.md");
        assert!(matches!(root.state, DocumentState::Published));
        assert!(matches!(
            find_report(&report, "sub/README.md").state,
            DocumentState::Failed(_)
        ));
        assert!(matches!(
            &find_report(&report, "sub/page.md").state,
            DocumentState::Failed(f) if matches!(f.error, DocumentError::ParentUnallocated(_))
        ));
        assert_eq!(creates(&store).len(), 1);
        assert_eq!(store.page(root.page_id.as_deref().unwrap()).unwrap().parent, None);
    }

    #[test]
    fn keep_hierarchy_places_pages_under_directory_pages() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "# Root\n"),
                ("misc/faq.md", "# FAQ\n"),
                ("misc/deep/notes.md", "# Notes\n"),
            ],
        );
        let config = SyncConfig {
            keep_hierarchy: true,
            ..config()
        };
        let store = MemoryStore::new();
        let report = run(&tmp, &config, &store);
        assert!(!report.has_failures(), "{:?}", report.failures().collect::<Vec<_>>());
        assert!(report.get("misc/").is_none());

        let root = find_report(&report, "index.md").page_id.clone().unwrap();
        let misc = store.find_page("misc", Some("DOCS")).unwrap().expect("misc page");
        let deep = store.find_page("deep", Some("DOCS")).unwrap().expect("deep page");
        let faq = find_report(&report, "misc/faq.md").page_id.clone().unwrap();
        let notes = find_report(&report, "misc/deep/notes.md").page_id.clone().unwrap();
        assert_eq!(store.page(&misc).unwrap().parent, Some(root));
        assert_eq!(store.page(&deep).unwrap().parent, Some(misc.clone()));
        assert_eq!(store.page(&faq).unwrap().parent, Some(misc.clone()));
        assert_eq!(store.page(&notes).unwrap().parent, Some(deep));
        assert!(store.page(&misc).unwrap().body.contains("ac:name=\"children\""));

        store.clear_operations();
        let second = run(&tmp, &config, &store);
        assert!(!second.has_failures());
        assert!(creates(&store).is_empty());
        assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());
    }

    #[test]
    fn placeholder_without_space_fails_its_children() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "<!-- confluence-space-key: DOCS -->\n# Root\n"),
                ("misc/faq.md", "<!-- confluence-space-key: DOCS -->\n# FAQ\n"),
            ],
        );
        let config = SyncConfig {
            keep_hierarchy: true,
            space_key: None,
            generated_by: String::new(),
            ..SyncConfig::default()
        };
        let store = MemoryStore::new();
        let report = run(&tmp, &config, &store);
        let DocumentState::Failed(failure) = &find_report(&report, "misc/faq.md").state else {
            panic!("faq.md should fail");
        };
        assert_eq!(failure.stage, Stage::Allocate);
        assert!(matches!(&failure.error, DocumentError::PlaceholderUnallocated(d) if d == "misc"));
        assert_eq!(creates(&store).len(), 1);
    }

    #[test]
    fn missing_root_index_is_fatal() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("a.md", "# A\n")]);
        let store = MemoryStore::new();
        let result = sync(
            tmp.path(),
            &config(),
            &store,
            &MockRenderer::new(),
            &SyncOptions::default(),
            None,
        );
        assert!(matches!(result, Err(SyncError::Index(_))));
        assert!(store.get_operations().is_empty());
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    #[test]
    fn labels_properties_and_attachments_published() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[(
                "index.md",
                "---\ntags: [guide, howto]\nproperties:\n  owner: docs-team\n---\n# Root\n\n![fig](fig.svg)\n",
            )],
        );
        write_png(&tmp.path().join("fig.png"), 4, 4);
        std::fs::write(tmp.path().join("fig.svg"), "<svg/>").unwrap();
        let store = MemoryStore::new();
        let report = run(&tmp, &config(), &store);
        let page = store
            .page(find_report(&report, "index.md").page_id.as_deref().unwrap())
            .unwrap();

        assert_eq!(
            page.labels.iter().map(String::as_str).collect::<Vec<_>>(),
            ["guide", "howto"]
        );
        assert_eq!(page.properties["owner"], serde_json::json!("docs-team"));
        assert!(page.properties.contains_key(SYNC_PROPERTY));
        assert_eq!(page.attachments.keys().collect::<Vec<_>>(), ["fig.png"]);
        assert!(!page.body.contains("fig.svg"));
    }

    #[test]
    fn source_change_republishes() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", "# Root\n\nOne.\n")]);
        let store = MemoryStore::new();
        run(&tmp, &config(), &store);

        let path = tmp.path().join("index.md");
        let text = std::fs::read_to_string(&path).unwrap().replace("One.", "Two.");
        std::fs::write(&path, text).unwrap();
        store.clear_operations();
        let report = run(&tmp, &config(), &store);

        assert!(matches!(find_report(&report, "index.md").state, DocumentState::Published));
        assert!(store.writes().iter().any(|op| matches!(op, RecordedOp::Update { .. })));
        assert!(creates(&store).is_empty());
    }

    #[test]
    fn csf_siblings_written_in_local_mode() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", "# Root\n\nBody.\n")]);
        let options = SyncOptions { write_csf: true };
        sync(
            tmp.path(),
            &config(),
            &MemoryStore::new(),
            &MockRenderer::new(),
            &options,
            None,
        )
        .unwrap();
        let csf = std::fs::read_to_string(tmp.path().join("index.csf")).unwrap();
        assert!(csf.contains("<p>Body.</p>"));
    }

    #[test]
    fn events_cover_every_document() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", "# Root\n"), ("a.md", "# A\n")]);
        let (tx, rx) = std::sync::mpsc::channel();
        sync(
            tmp.path(),
            &config(),
            &MemoryStore::new(),
            &MockRenderer::new(),
            &SyncOptions::default(),
            Some(tx),
        )
        .unwrap();
        let events: Vec<SyncEvent> = rx.iter().collect();
        assert!(matches!(events[0], SyncEvent::Indexed { documents: 2, failures: 0 }));
        let allocated = events
            .iter()
            .filter(|e| matches!(e, SyncEvent::Allocated { created: true, .. }))
            .count();
        let finished = events
            .iter()
            .filter(|e| matches!(e, SyncEvent::Finished { .. }))
            .count();
        assert_eq!((allocated, finished), (2, 2));
    }
}
