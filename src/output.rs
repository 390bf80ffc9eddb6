//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every document is shown by its page title first, with the source path as
//! an indented `Source:` line. The output reads as an inventory of wiki
//! pages while still letting users trace each line back to a file.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Pages
//! 001 Home [1001]
//!     Source: index.md
//!     001 API [1004]
//!         Source: api/README.md
//!     002 Install (new)
//!         Source: install.md
//!
//! Directory pages
//!     Misc
//!         Source: misc/
//!
//! Problems
//!     notes.md (index): title "Install" is already used by install.md
//! ```
//!
//! The directory pages section only appears with `keep_hierarchy`.
//!
//! ## Sync
//!
//! ```text
//! Indexed 3 documents
//! Created Install → page 1005
//! Install → page 1005: published
//!     Source: install.md
//! Home → page 1001: unchanged
//!     Source: index.md
//!
//! Published 1, unchanged 1, skipped 0, failed 0
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function returning `Vec<String>` for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::index::{IndexPlan, IndexedDocument};
use crate::sync::{Outcome, SyncEvent};
use crate::types::{DocumentState, RunReport, Stage};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Page header: position, title and page id, or `(new)` before allocation.
///
/// ```text
/// 001 Home [1001]
/// 002 Install (new)
/// ```
fn page_header(index: usize, title: &str, page_id: Option<&str>, synchronized: bool) -> String {
    let identity = match page_id {
        Some(id) => format!("[{id}]"),
        None => "(new)".to_string(),
    };
    let marker = if synchronized { "" } else { " (not synchronized)" };
    format!("{} {} {}{}", format_index(index), title, identity, marker)
}

// ============================================================================
// Tree walker
// ============================================================================

/// A flattened node of the page hierarchy.
struct TreeNode<'a> {
    depth: usize,
    position: usize,
    doc: &'a IndexedDocument,
}

/// Relative path of the document a page sits under, if any.
fn tree_parent<'a>(doc: &IndexedDocument, documents: &'a [IndexedDocument]) -> Option<&'a str> {
    let index_in = |dir: &str| {
        documents.iter().find(|d| {
            d.is_index && d.directory == dir && d.relative != doc.relative
        })
    };
    let mut directory = if doc.is_index {
        if doc.directory.is_empty() {
            return None;
        }
        parent_directory(&doc.directory)
    } else {
        doc.directory.clone()
    };
    loop {
        if let Some(parent) = index_in(&directory) {
            return Some(parent.relative.as_str());
        }
        if directory.is_empty() {
            return None;
        }
        directory = parent_directory(&directory);
    }
}

fn parent_directory(dir: &str) -> String {
    dir.rfind('/').map(|p| dir[..p].to_string()).unwrap_or_default()
}

/// Walk the page hierarchy, assigning positional indices per sibling level.
fn walk_page_tree(documents: &[IndexedDocument]) -> Vec<TreeNode<'_>> {
    let parents: Vec<Option<&str>> = documents.iter().map(|d| tree_parent(d, documents)).collect();
    let mut nodes = Vec::new();
    walk_recursive(documents, &parents, None, 0, &mut nodes);
    nodes
}

fn walk_recursive<'a>(
    documents: &'a [IndexedDocument],
    parents: &[Option<&str>],
    parent: Option<&str>,
    depth: usize,
    nodes: &mut Vec<TreeNode<'a>>,
) {
    let children = documents
        .iter()
        .zip(parents)
        .filter(|(_, p)| **p == parent)
        .map(|(d, _)| d);
    for (i, doc) in children.enumerate() {
        nodes.push(TreeNode {
            depth,
            position: i + 1,
            doc,
        });
        walk_recursive(documents, parents, Some(&doc.relative), depth + 1, nodes);
    }
}

// ============================================================================
// Check output
// ============================================================================

/// Format the indexed page tree and any per-document problems.
pub fn format_check_output(plan: &IndexPlan) -> Vec<String> {
    let mut lines = vec!["Pages".to_string()];
    for node in walk_page_tree(&plan.documents) {
        let base = indent(node.depth);
        lines.push(format!(
            "{}{}",
            base,
            page_header(
                node.position,
                &node.doc.title,
                node.doc.page_id.as_deref(),
                node.doc.synchronized()
            )
        ));
        lines.push(format!("{}    Source: {}", base, node.doc.relative));
    }

    if !plan.placeholders.is_empty() {
        lines.push(String::new());
        lines.push("Directory pages".to_string());
        for placeholder in &plan.placeholders {
            lines.push(format!("    {}", placeholder.title));
            lines.push(format!("        Source: {}/", placeholder.directory));
        }
    }

    if !plan.failures.is_empty() {
        lines.push(String::new());
        lines.push("Problems".to_string());
        for failure in &plan.failures {
            lines.push(format!(
                "    {} ({}): {}",
                failure.relative, failure.stage, failure.error
            ));
        }
    }
    lines
}

/// Print check output to stdout.
pub fn print_check_output(plan: &IndexPlan) {
    for line in format_check_output(plan) {
        println!("{}", line);
    }
}

// ============================================================================
// Sync output
// ============================================================================

/// Format a single progress event as display lines.
pub fn format_sync_event(event: &SyncEvent) -> Vec<String> {
    match event {
        SyncEvent::Indexed {
            documents,
            failures,
        } => match failures {
            0 => vec![format!("Indexed {} documents", documents)],
            n => vec![format!("Indexed {} documents, {} rejected", documents, n)],
        },
        SyncEvent::Allocated {
            title,
            page_id,
            created,
            ..
        } => {
            let verb = if *created { "Created" } else { "Adopted" };
            vec![format!("{} {} \u{2192} page {}", verb, title, page_id)]
        }
        SyncEvent::Finished {
            relative,
            title,
            page_id,
            outcome,
        } => {
            let target = match page_id {
                Some(id) => format!("{} \u{2192} page {}", title, id),
                None => title.clone(),
            };
            let mut lines = match outcome {
                Outcome::Published => vec![format!("{}: published", target)],
                Outcome::Unchanged => vec![format!("{}: unchanged", target)],
                Outcome::Skipped => vec![format!("{}: not synchronized", target)],
                Outcome::Failed { stage, .. } => vec![format!("{}: FAILED at {}", target, stage)],
            };
            lines.push(format!("    Source: {}", relative));
            if let Outcome::Failed { message, .. } = outcome {
                lines.push(format!("    {}", message));
            }
            lines
        }
    }
}

/// Format the closing summary of a run.
pub fn format_run_summary(report: &RunReport) -> Vec<String> {
    let (published, unchanged, skipped, failed) = report.counts();
    let mut lines = vec![format!(
        "Published {}, unchanged {}, skipped {}, failed {}",
        published, unchanged, skipped, failed
    )];
    for doc in &report.documents {
        let DocumentState::Failed(failure) = &doc.state else {
            continue;
        };
        lines.push(format!(
            "    {} ({}): {}",
            failure.relative, failure.stage, failure.error
        ));
        if failure.stage == Stage::Persist
            && let Some(id) = &doc.page_id
        {
            lines.push(format!(
                "        page {} was published; the next run adopts it by title",
                id
            ));
        }
    }
    lines
}

/// Print the run summary to stdout.
pub fn print_run_summary(report: &RunReport) {
    for line in format_run_summary(report) {
        println!("{}", line);
    }
}
