//! File-backed page store.
//!
//! Keeps every page in a JSON manifest at `<root>/.md2wiki/pages.json` and
//! attachments under `<root>/.md2wiki/attachments/<page id>/`. The state
//! directory is hidden, so the scanner never picks it up.
//!
//! Page ids are numeric and derived from a SHA-256 of space key and title,
//! so the same tree gets the same ids on every machine. A collision with a
//! different page bumps the id until a free one is found.
//!
//! The manifest is rewritten after each mutation. A run that stops half way
//! leaves a consistent state that the next run continues from.

use super::{
    AttachmentUpload, PageSnapshot, PageStore, SYNC_PROPERTY, StoreError, digest_from_property,
};
use crate::digest;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Directory under the root holding the store state.
pub const STATE_DIR: &str = ".md2wiki";

const MANIFEST_FILENAME: &str = "pages.json";

/// Bump to discard manifests written in an older format.
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalPage {
    pub title: String,
    pub space_key: Option<String>,
    pub parent: Option<String>,
    pub body: String,
    pub version: u64,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Attachment name to content hash.
    #[serde(default)]
    pub attachments: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    pages: BTreeMap<String, LocalPage>,
}

impl Manifest {
    fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            pages: BTreeMap::new(),
        }
    }
}

pub struct LocalStore {
    state_dir: PathBuf,
    manifest: Mutex<Manifest>,
}

impl LocalStore {
    /// Open the store under `root`. A missing or outdated manifest starts
    /// an empty store; a corrupt one is an error.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let state_dir = root.join(STATE_DIR);
        let path = state_dir.join(MANIFEST_FILENAME);
        let manifest = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let manifest: Manifest = serde_json::from_str(&content)?;
                if manifest.version == MANIFEST_VERSION {
                    manifest
                } else {
                    log::warn!(
                        "discarding {} written by an older version",
                        path.display()
                    );
                    Manifest::empty()
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Manifest::empty(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            state_dir,
            manifest: Mutex::new(manifest),
        })
    }

    /// Copy of a stored page.
    pub fn page(&self, page_id: &str) -> Option<LocalPage> {
        self.lock().ok()?.pages.get(page_id).cloned()
    }

    /// Ids of all stored pages.
    pub fn page_ids(&self) -> Vec<String> {
        self.lock()
            .map(|m| m.pages.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Path an attachment of `page_id` is stored at.
    pub fn attachment_path(&self, page_id: &str, name: &str) -> PathBuf {
        self.state_dir.join("attachments").join(page_id).join(name)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Manifest>, StoreError> {
        self.manifest
            .lock()
            .map_err(|_| StoreError::Config("local store state is poisoned".into()))
    }

    fn save(&self, manifest: &Manifest) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.state_dir)?;
        let json = serde_json::to_string_pretty(manifest)?;
        std::fs::write(self.state_dir.join(MANIFEST_FILENAME), json)?;
        Ok(())
    }

    /// Apply `change` to one page and persist the manifest.
    fn modify<T>(
        &self,
        page_id: &str,
        change: impl FnOnce(&mut LocalPage) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut manifest = self.lock()?;
        let page = manifest
            .pages
            .get_mut(page_id)
            .ok_or_else(|| StoreError::NotFound(page_id.to_string()))?;
        let result = change(page)?;
        self.save(&manifest)?;
        Ok(result)
    }
}

/// Numeric id from the digest of space and title.
fn derived_id(space_key: Option<&str>, title: &str) -> u64 {
    let hex = digest::hash_bytes(format!("{}\0{}", space_key.unwrap_or(""), title).as_bytes());
    // 12 hex digits keep the id well inside i64 for tools that parse it.
    u64::from_str_radix(&hex[..12], 16).unwrap_or(1).max(1)
}

impl PageStore for LocalStore {
    fn fetch_page(&self, page_id: &str) -> Result<PageSnapshot, StoreError> {
        let manifest = self.lock()?;
        let page = manifest
            .pages
            .get(page_id)
            .ok_or_else(|| StoreError::NotFound(page_id.to_string()))?;
        Ok(PageSnapshot {
            id: page_id.to_string(),
            title: page.title.clone(),
            body: page.body.clone(),
            version: page.version,
            sync_digest: page
                .properties
                .get(SYNC_PROPERTY)
                .and_then(digest_from_property),
        })
    }

    fn find_page(
        &self,
        title: &str,
        space_key: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let manifest = self.lock()?;
        Ok(manifest
            .pages
            .iter()
            .find(|(_, p)| p.title == title && p.space_key.as_deref() == space_key)
            .map(|(id, _)| id.clone()))
    }

    fn create_page(
        &self,
        space_key: Option<&str>,
        parent: Option<&str>,
        title: &str,
        body: &str,
    ) -> Result<String, StoreError> {
        let mut manifest = self.lock()?;
        let mut id = derived_id(space_key, title);
        while manifest.pages.contains_key(&id.to_string()) {
            id = id.wrapping_add(1).max(1);
        }
        let id = id.to_string();
        manifest.pages.insert(
            id.clone(),
            LocalPage {
                title: title.to_string(),
                space_key: space_key.map(str::to_string),
                parent: parent.map(str::to_string),
                body: body.to_string(),
                version: 1,
                ..Default::default()
            },
        );
        self.save(&manifest)?;
        log::debug!("created local page {id} {title:?}");
        Ok(id)
    }

    fn update_page(
        &self,
        page_id: &str,
        title: &str,
        body: &str,
        version: u64,
    ) -> Result<(), StoreError> {
        self.modify(page_id, |page| {
            if page.version != version {
                return Err(StoreError::Conflict(page_id.to_string()));
            }
            page.title = title.to_string();
            page.body = body.to_string();
            page.version += 1;
            Ok(())
        })
    }

    fn upload_attachment(
        &self,
        page_id: &str,
        attachment: &AttachmentUpload,
    ) -> Result<(), StoreError> {
        let bytes = attachment.bytes()?;
        let path = self.attachment_path(page_id, &attachment.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &bytes)?;
        let hash = digest::hash_bytes(&bytes);
        self.modify(page_id, |page| {
            page.attachments.insert(attachment.name.clone(), hash);
            Ok(())
        })
    }

    fn set_labels(&self, page_id: &str, labels: &BTreeSet<String>) -> Result<(), StoreError> {
        self.modify(page_id, |page| {
            page.labels = labels.clone();
            Ok(())
        })
    }

    fn set_properties(
        &self,
        page_id: &str,
        properties: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), StoreError> {
        self.modify(page_id, |page| {
            for (key, value) in properties {
                page.properties.insert(key.clone(), value.clone());
            }
            Ok(())
        })
    }
}
