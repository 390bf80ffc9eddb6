//! Link and image target resolution.
//!
//! A target written in a document resolves to one of:
//!
//! | Target                        | Resolution                             |
//! |-------------------------------|----------------------------------------|
//! | `https://…`, `mailto:…`, `//…`| external, passed through unchanged     |
//! | `#section`                    | same-page anchor                       |
//! | `guide.md#setup`              | page reference (needs a page id)       |
//! | `img/diagram.png`             | attachment of the current page         |
//! | `../../etc/passwd`            | invalid: outside the root              |
//! | `missing.md`                  | invalid: not found                     |
//!
//! Containment is checked on the lexical path first, before the file system
//! is touched, then once more on the canonical path of existing targets so
//! symbolic links cannot lead out of the root either.

use crate::config::SiteConfig;
use crate::index::PageIndex;
use crate::naming;
use crate::scan::INDEX_NAMES;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("{0:?} points outside the synchronization root")]
    OutsideRoot(String),
    #[error("{0:?} does not exist")]
    NotFound(String),
    #[error("{0:?} refers to a document that has no page id")]
    Unallocated(String),
    #[error("{0:?} is an absolute path; use a path relative to the document")]
    AbsolutePath(String),
}

impl LinkError {
    /// Escapes are rejected in every configuration.
    pub fn is_containment(&self) -> bool {
        matches!(self, LinkError::OutsideRoot(_) | LinkError::AbsolutePath(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    External(String),
    Anchor(String),
    Page {
        page_id: String,
        title: String,
        space_key: Option<String>,
        fragment: Option<String>,
    },
    Attachment {
        path: PathBuf,
        /// Path as written, relative to the document, percent-decoded.
        written: String,
    },
}

/// Resolves targets for one document against the completed page index.
pub struct LinkResolver<'a> {
    index: &'a PageIndex,
    /// Directory of the issuing document, relative to the root.
    directory: &'a str,
    heading_anchors: bool,
}

impl<'a> LinkResolver<'a> {
    pub fn new(index: &'a PageIndex, directory: &'a str, heading_anchors: bool) -> Self {
        Self {
            index,
            directory,
            heading_anchors,
        }
    }

    pub fn resolve(&self, target: &str) -> Result<Resolution, LinkError> {
        let target = target.trim();
        if target.is_empty() || is_external(target) {
            return Ok(Resolution::External(target.to_string()));
        }
        if let Some(fragment) = target.strip_prefix('#') {
            if self.heading_anchors {
                return Ok(Resolution::Anchor(naming::heading_slug(&decode(fragment))));
            }
            return Ok(Resolution::External(target.to_string()));
        }
        if target.starts_with('/') || target.starts_with('\\') {
            return Err(LinkError::AbsolutePath(target.to_string()));
        }

        let (path_part, fragment) = match target.split_once('#') {
            Some((p, f)) => (p, Some(f.to_string())),
            None => (target, None),
        };
        let path_part = path_part.split('?').next().unwrap_or(path_part);
        let written = decode(path_part);
        let relative = normalize(self.directory, &written)
            .ok_or_else(|| LinkError::OutsideRoot(target.to_string()))?;

        if let Some(resolution) = self.page(&relative, target, fragment.clone())? {
            return Ok(resolution);
        }

        let path = self.index.root().join(&relative);
        if path.is_dir() {
            for name in INDEX_NAMES {
                let index_doc = join(&relative, name);
                if let Some(resolution) = self.page(&index_doc, target, fragment.clone())? {
                    return Ok(resolution);
                }
            }
            return Err(LinkError::NotFound(target.to_string()));
        }
        if !path.is_file() {
            return Err(LinkError::NotFound(target.to_string()));
        }
        let canonical = path
            .canonicalize()
            .map_err(|_| LinkError::NotFound(target.to_string()))?;
        if !canonical.starts_with(self.index.root()) {
            return Err(LinkError::OutsideRoot(target.to_string()));
        }
        Ok(Resolution::Attachment { path, written })
    }

    fn page(
        &self,
        relative: &str,
        target: &str,
        fragment: Option<String>,
    ) -> Result<Option<Resolution>, LinkError> {
        let Some(entry) = self.index.get(relative) else {
            return Ok(None);
        };
        let page_id = entry
            .page_id
            .clone()
            .ok_or_else(|| LinkError::Unallocated(target.to_string()))?;
        let fragment = fragment.map(|f| {
            if self.heading_anchors {
                naming::heading_slug(&decode(&f))
            } else {
                f
            }
        });
        Ok(Some(Resolution::Page {
            page_id,
            title: entry.title.clone(),
            space_key: entry.space_key.clone(),
            fragment,
        }))
    }
}

/// True for targets with a URL scheme or a network-path reference.
pub fn is_external(target: &str) -> bool {
    if target.starts_with("//") {
        return true;
    }
    match url::Url::parse(target) {
        // A single letter scheme is a Windows drive, not a URL.
        Ok(url) => url.scheme().len() > 1,
        Err(_) => false,
    }
}

fn decode(text: &str) -> String {
    urlencoding::decode(text)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

/// Join `target` onto `directory` lexically.
///
/// Returns `None` when a `..` segment would climb above the root.
pub fn normalize(directory: &str, target: &str) -> Option<String> {
    let mut stack: Vec<&str> = directory.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            other => stack.push(other),
        }
    }
    Some(stack.join("/"))
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Absolute URL of a wiki page.
///
/// `{base}spaces/{space}/pages/{id}/{title}` or, with `webui_links`,
/// `{base}pages/viewpage.action?pageId={id}`. The fragment is appended in
/// both cases.
pub fn page_url(
    site: &SiteConfig,
    webui_links: bool,
    space_key: Option<&str>,
    page_id: &str,
    title: &str,
    fragment: Option<&str>,
) -> String {
    let base = site.base_url();
    let mut url = match (webui_links, space_key) {
        (false, Some(space)) => format!(
            "{base}spaces/{space}/pages/{page_id}/{}",
            urlencoding::encode(title)
        ),
        _ => format!("{base}pages/viewpage.action?pageId={page_id}"),
    };
    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        url.push('#');
        url.push_str(fragment);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::index::build_index;
    use crate::scan::scan;
    use crate::test_helpers::write_tree;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PageIndex) {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "<!-- confluence-page-id: 1 -->\n# Root\n"),
                ("guide.md", "<!-- confluence-page-id: 2 -->\n# Getting Started\n"),
                ("draft.md", "# Draft\n"),
                ("api/README.md", "<!-- confluence-page-id: 3 -->\n# API\n"),
                ("api/auth.md", "<!-- confluence-page-id: 4 -->\n# Auth\n"),
                ("img/logo v2.png", "png"),
            ],
        );
        let scanned = scan(tmp.path()).unwrap();
        let plan = build_index(&scanned, &SyncConfig::default()).unwrap();
        let index = PageIndex::new(&plan.root, &plan.documents);
        (tmp, index)
    }

    // =========================================================================
    // Pass-through
    // =========================================================================

    #[test]
    fn external_targets_unchanged() {
        let (_tmp, index) = fixture();
        let r = LinkResolver::new(&index, "", false);
        for target in [
            "https://example.com/a?b#c",
            "mailto:someone@example.com",
            "//cdn.example.com/x.png",
        ] {
            assert_eq!(r.resolve(target), Ok(Resolution::External(target.into())));
        }
    }

    #[test]
    fn fragment_only_depends_on_anchor_mode() {
        let (_tmp, index) = fixture();
        let plain = LinkResolver::new(&index, "", false);
        assert_eq!(
            plain.resolve("#Getting Started"),
            Ok(Resolution::External("#Getting Started".into()))
        );
        let anchored = LinkResolver::new(&index, "", true);
        assert_eq!(
            anchored.resolve("#Getting%20Started"),
            Ok(Resolution::Anchor("getting-started".into()))
        );
    }

    // =========================================================================
    // Documents and attachments
    // =========================================================================

    #[test]
    fn document_link_becomes_page_reference() {
        let (_tmp, index) = fixture();
        let r = LinkResolver::new(&index, "api", false);
        let resolved = r.resolve("../guide.md#setup").unwrap();
        assert_eq!(
            resolved,
            Resolution::Page {
                page_id: "2".into(),
                title: "Getting Started".into(),
                space_key: None,
                fragment: Some("setup".into()),
            }
        );
        assert!(matches!(
            r.resolve("auth.md"),
            Ok(Resolution::Page { page_id, .. }) if page_id == "4"
        ));
    }

    #[test]
    fn directory_link_uses_its_index_document() {
        let (_tmp, index) = fixture();
        let r = LinkResolver::new(&index, "", false);
        assert!(matches!(
            r.resolve("api/"),
            Ok(Resolution::Page { page_id, .. }) if page_id == "3"
        ));
    }

    #[test]
    fn unallocated_document_is_invalid() {
        let (_tmp, index) = fixture();
        let r = LinkResolver::new(&index, "", false);
        assert_eq!(
            r.resolve("draft.md"),
            Err(LinkError::Unallocated("draft.md".into()))
        );
    }

    #[test]
    fn existing_file_becomes_attachment() {
        let (_tmp, index) = fixture();
        let r = LinkResolver::new(&index, "api", false);
        let Resolution::Attachment { path, written } = r.resolve("../img/logo%20v2.png").unwrap()
        else {
            panic!("expected attachment");
        };
        assert_eq!(written, "../img/logo v2.png");
        assert!(path.ends_with("img/logo v2.png"));
        assert_eq!(naming::attachment_name(&written), "PAR_img_logo_v2.png");
    }

    #[test]
    fn missing_target_not_found() {
        let (_tmp, index) = fixture();
        let r = LinkResolver::new(&index, "", false);
        assert_eq!(
            r.resolve("nope.md"),
            Err(LinkError::NotFound("nope.md".into()))
        );
    }

    // =========================================================================
    // Containment
    // =========================================================================

    #[test]
    fn escapes_rejected_at_any_depth() {
        let (_tmp, index) = fixture();
        for directory in ["", "api"] {
            let r = LinkResolver::new(&index, directory, false);
            for depth in 1..6 {
                let target = format!("{}outside.md", "../".repeat(depth + directory.len().min(1)));
                let err = r.resolve(&target).unwrap_err();
                assert!(err.is_containment(), "{target} from {directory:?}: {err:?}");
            }
        }
    }

    #[test]
    fn leaving_and_reentering_the_root_rejected() {
        let (_tmp, index) = fixture();
        let root_name = index
            .root()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        let r = LinkResolver::new(&index, "api", false);
        for target in [
            format!("../../{root_name}/guide.md"),
            format!("../../{root_name}/api/auth.md"),
            format!("../../{root_name}/img/logo%20v2.png"),
            format!("./../../{root_name}/index.md#top"),
        ] {
            assert_eq!(r.resolve(&target), Err(LinkError::OutsideRoot(target.clone())));
        }
    }

    #[test]
    fn climbing_back_inside_is_allowed() {
        assert_eq!(normalize("api", "../api/auth.md").as_deref(), Some("api/auth.md"));
        assert_eq!(normalize("", "../x.md"), None);
        assert_eq!(normalize("a/b", "../../../x.md"), None);
        assert_eq!(normalize("a", "./b/../c.md").as_deref(), Some("a/c.md"));
    }

    #[test]
    fn absolute_path_rejected() {
        let (_tmp, index) = fixture();
        let r = LinkResolver::new(&index, "", false);
        assert!(matches!(
            r.resolve("/etc/passwd"),
            Err(LinkError::AbsolutePath(_))
        ));
    }

    // =========================================================================
    // Page URLs
    // =========================================================================

    #[test]
    fn page_url_forms() {
        let site = SiteConfig {
            domain: "example.atlassian.net".into(),
            base_path: "/wiki/".into(),
        };
        assert_eq!(
            page_url(&site, false, Some("DOCS"), "42", "Getting Started", Some("setup")),
            "https://example.atlassian.net/wiki/spaces/DOCS/pages/42/Getting%20Started#setup"
        );
        assert_eq!(
            page_url(&site, true, Some("DOCS"), "42", "Getting Started", None),
            "https://example.atlassian.net/wiki/pages/viewpage.action?pageId=42"
        );
    }
}
