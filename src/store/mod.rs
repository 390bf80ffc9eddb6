//! Page store backend trait and shared types.
//!
//! The [`PageStore`] trait is the only way the synchronizer talks to a wiki.
//! Two implementations ship with the crate:
//!
//! - [`ConfluenceStore`](confluence::ConfluenceStore): REST API over HTTPS
//! - [`LocalStore`](local::LocalStore): JSON state file under the root,
//!   used by `md2wiki local` and the end-to-end tests
//!
//! Every call is a single request. There are no retries or timeouts on top
//! of what the transport enforces; a failed call fails its document and the
//! next run picks up where this one stopped.

pub mod confluence;
pub mod local;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use thiserror::Error;

/// Page property holding the synchronization digest.
pub const SYNC_PROPERTY: &str = "md2wiki";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} {url} failed with status {status}: {message}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        message: String,
    },
    #[error("version conflict on page {0}: it was changed since it was fetched")]
    Conflict(String),
    #[error("page {0} not found")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store configuration error: {0}")]
    Config(String),
}

/// Current state of a page as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    pub id: String,
    pub title: String,
    /// Storage-format body.
    pub body: String,
    pub version: u64,
    /// Digest recorded by the last successful publish.
    pub sync_digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentData {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// A file to attach to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub name: String,
    pub content_type: String,
    pub data: AttachmentData,
}

impl AttachmentUpload {
    pub fn bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.data {
            AttachmentData::File(path) => std::fs::read(path),
            AttachmentData::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Wiki page storage.
///
/// Implementations must be `Sync`: documents are published in parallel and
/// share one store.
pub trait PageStore: Sync {
    /// Fetch body, title, version and sync digest of a page.
    fn fetch_page(&self, page_id: &str) -> Result<PageSnapshot, StoreError>;

    /// Look a page up by exact title within a space.
    fn find_page(&self, title: &str, space_key: Option<&str>)
    -> Result<Option<String>, StoreError>;

    /// Create a page and return its id. `parent` of `None` creates a
    /// top-level page of the space.
    fn create_page(
        &self,
        space_key: Option<&str>,
        parent: Option<&str>,
        title: &str,
        body: &str,
    ) -> Result<String, StoreError>;

    /// Replace title and body. `version` is the version last fetched.
    fn update_page(
        &self,
        page_id: &str,
        title: &str,
        body: &str,
        version: u64,
    ) -> Result<(), StoreError>;

    /// Attach a file, replacing an existing attachment of the same name.
    fn upload_attachment(
        &self,
        page_id: &str,
        attachment: &AttachmentUpload,
    ) -> Result<(), StoreError>;

    /// Replace the page's labels.
    fn set_labels(&self, page_id: &str, labels: &BTreeSet<String>) -> Result<(), StoreError>;

    /// Set each given property, replacing any previous value of that key.
    fn set_properties(
        &self,
        page_id: &str,
        properties: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), StoreError>;
}

/// Extract the digest from the value stored under [`SYNC_PROPERTY`].
pub fn digest_from_property(value: &serde_json::Value) -> Option<String> {
    value
        .get("digest")
        .and_then(|d| d.as_str())
        .map(str::to_string)
}

/// Property value recording a digest.
pub fn digest_property(digest: &str) -> serde_json::Value {
    serde_json::json!({ "digest": digest })
}
