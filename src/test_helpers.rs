//! Shared test utilities for the md2wiki test suite.
//!
//! Builds throwaway document trees and offers lookup helpers over the index
//! and run report that panic with the available names on a miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_tree(tmp.path(), &[
//!     ("index.md", "# Home\n"),
//!     ("guide/index.md", "# Guide\n"),
//! ]);
//! write_png(&tmp.path().join("guide/shot.png"), 40, 30);
//!
//! let plan = build_index(&scan(tmp.path()).unwrap(), &config).unwrap();
//! let guide = find_document(&plan, "guide/index.md");
//! assert_eq!(guide.title, "Guide");
//! ```

use std::io::Cursor;
use std::path::Path;

use crate::index::{IndexPlan, IndexedDocument};
use crate::types::{DocumentReport, RunReport};

// =========================================================================
// Fixture setup
// =========================================================================

/// Write `(relative path, content)` pairs below `root`, creating directories.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
    }
}

/// Encode a solid-gray PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Write a PNG of the given size to `path`, creating directories.
pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, png_bytes(width, height)).unwrap();
}

// =========================================================================
// Lookups: panic with the available entries on a miss
// =========================================================================

/// Find an indexed document by relative path. Panics if not found.
pub fn find_document<'a>(plan: &'a IndexPlan, relative: &str) -> &'a IndexedDocument {
    plan.documents
        .iter()
        .find(|d| d.relative == relative)
        .unwrap_or_else(|| {
            let paths: Vec<&str> = plan.documents.iter().map(|d| d.relative.as_str()).collect();
            panic!("document '{relative}' not indexed. Available: {paths:?}")
        })
}

/// Find a document's outcome in a run report. Panics if not found.
pub fn find_report<'a>(report: &'a RunReport, relative: &str) -> &'a DocumentReport {
    report.get(relative).unwrap_or_else(|| {
        let paths: Vec<&str> = report
            .documents
            .iter()
            .map(|d| d.relative.as_str())
            .collect();
        panic!("document '{relative}' not in report. Available: {paths:?}")
    })
}

/// Page id a document now carries in its source file.
pub fn page_id_in_file(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).unwrap();
    crate::frontmatter::parse_source(&text)
        .unwrap()
        .meta
        .page_id
}
