//! # md2wiki
//!
//! Publishes a directory of Markdown files as a Confluence page hierarchy.
//! The directory tree is the data source: index files become parent pages,
//! every other Markdown file becomes a child page, and relative links between
//! files become links between pages.
//!
//! # Architecture: Index, Then Publish
//!
//! ```text
//! 1. Scan      root/     →  document set        (filesystem walk, ignore rules)
//! 2. Index     documents →  IndexPlan            (titles, page ids, parents)
//! 3. Allocate  IndexPlan →  PageIndex snapshot   (create missing pages, parents first)
//! 4. Convert   document  →  storage format body  (per document, parallel)
//! 5. Publish   body      →  wiki page            (update, attachments, labels)
//! 6. Persist   page id   →  source file          (identity written back)
//! ```
//!
//! Stages 1 to 3 see the whole tree. Once allocation finishes, every page has
//! an id and documents are converted and published independently, so one
//! broken file never stops the others.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Walks the root, applies ignore files, yields the document set |
//! | [`ignore`] | `.mdignore` pattern matching |
//! | [`frontmatter`] | YAML front matter and HTML-comment directives |
//! | [`markdown`] | CommonMark + GFM parse into a block tree |
//! | [`index`] | Titles, identities and parent relations; the `PageIndex` snapshot |
//! | [`links`] | Relative link resolution against the snapshot |
//! | [`convert`] | Block tree to Confluence storage format |
//! | [`storage`] | Storage-format writer helpers (macros, escaping) |
//! | [`images`] | Image attachments, raster preference, dimensions |
//! | [`diagram`] | Mermaid, PlantUML, draw.io and LaTeX rendering |
//! | [`drawio`] | Diagram data embedded in draw.io PNG and SVG exports |
//! | [`store`] | `PageStore` trait with the REST and local backends |
//! | [`sync`] | The pipeline above |
//! | [`config`] | `md2wiki.toml` loading, validation and merging |
//! | [`digest`] | Content hashes used for change detection and names |
//! | [`naming`] | Title derivation from file names |
//! | [`types`] | Per-document failures and the run report |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Identity Lives in the Source
//!
//! Once a page is created its id is written into the Markdown file as a
//! `confluence-page-id` directive. Renaming a file or retitling a page then
//! keeps updating the same wiki page. The `local` backend and `skip_update`
//! turn the write-back off.
//!
//! ## Frozen Snapshot
//!
//! Links are resolved against a [`index::PageIndex`] taken after allocation.
//! Conversion never talks to the store, which keeps it a pure function of the
//! document, the config and the snapshot.
//!
//! ## Digest-Based Change Detection
//!
//! The wiki normalizes storage markup on save, so comparing bodies would
//! republish every page on every run. Each published page carries a digest
//! property instead, and a page is left alone when its title and digest match.

pub mod config;
pub mod convert;
pub mod diagram;
pub mod digest;
pub mod drawio;
pub mod frontmatter;
pub mod ignore;
pub mod images;
pub mod index;
pub mod links;
pub mod markdown;
pub mod naming;
pub mod output;
pub mod scan;
pub mod storage;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
