//! Content hashing.
//!
//! Every identifier this crate derives from content goes through here, so the
//! same input always yields the same output across runs. That property backs
//! the idempotence guarantee: titles, attachment names and macro ids never
//! change unless the underlying source changes.
//!
//! - **Sync digest**: SHA-256 of a document source with identity directives
//!   removed. Stored as a page property and compared on the next run.
//! - **Disambiguation suffix**: short hash of relative path plus content,
//!   appended to file-stem titles.
//! - **Attachment digest**: names rendered diagrams `embedded_<hash>.<ext>`.
//! - **Macro ids**: UUID-shaped strings derived from the hash, for the
//!   `ac:macro-id` attributes some macros require.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use uuid::Uuid;

/// SHA-256 of arbitrary bytes, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// Short suffix used to make file-stem titles unique.
///
/// Inputs: the path relative to the synchronization root and the file
/// content. Two files with the same stem always differ in path, so their
/// suffixes differ even when their contents are identical.
pub fn disambiguation_suffix(relative_path: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"title\0");
    hasher.update(relative_path.as_bytes());
    hasher.update([0]);
    hasher.update(content.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..8].to_string()
}

/// Deterministic UUID-formatted identifier for a piece of content.
pub fn content_uuid(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_bytes_deterministic() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_eq!(hash_bytes(b"abc").len(), 64);
    }

    #[test]
    fn hash_file_matches_hash_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        std::fs::write(&path, "# Title\n").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"# Title\n"));
    }

    #[test]
    fn suffix_differs_by_path_with_same_content() {
        let a = disambiguation_suffix("notes.md", "same");
        let b = disambiguation_suffix("Notes.md", "same");
        assert_ne!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn suffix_is_stable() {
        assert_eq!(
            disambiguation_suffix("dir/a.md", "text"),
            disambiguation_suffix("dir/a.md", "text")
        );
    }

    #[test]
    fn content_uuid_has_uuid_shape() {
        let id = content_uuid(b"graph TD; A-->B");
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        assert_eq!(id, content_uuid(b"graph TD; A-->B"));
    }
}
