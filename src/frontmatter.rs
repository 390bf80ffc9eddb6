//! Front matter and in-body directive extraction.
//!
//! A source document may open with a metadata block, either YAML/JSON between
//! `---` fences or YAML inside a leading `<!--` / `-->` comment:
//!
//! ```text
//! ---
//! title: Deployment guide
//! tags: [ops, k8s]
//! properties:
//!   content-appearance-published: full-width
//! synchronized: true
//! layout:
//!   image:
//!     max_width: 800
//! ---
//! <!-- confluence-page-id: 123456 -->
//! # Deployment guide
//! ```
//!
//! Directive comments may appear anywhere in the body. They are removed from
//! the text handed to the converter:
//!
//! - `<!-- confluence-page-id: 123456 -->`
//! - `<!-- confluence-space-key: DOCS -->`
//! - `<!-- generated-by: text -->`
//!
//! A directive overrides the equivalent front-matter key. Directives inside
//! fenced code blocks are left alone.

use crate::config::{Alignment, LayoutOverride};
use crate::digest;
use crate::markdown;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontMatterError {
    #[error("malformed YAML front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("malformed JSON front matter: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid page id {0:?}: expected digits")]
    InvalidPageId(String),
}

static YAML_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?\n)?---[ \t]*(?:\r?\n|\z)").expect("static regex")
});
static COMMENT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A<!--[ \t]*\r?\n(.*?\n)?-->[ \t]*(?:\r?\n|\z)").expect("static regex")
});
static PAGE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*confluence-page-id:\s*(\d+)\s*-->").expect("static regex")
});
static SPACE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*confluence-space-key:\s*(\S+?)\s*-->").expect("static regex")
});
static GENERATED_BY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*generated-by:\s*(.*?)\s*-->").expect("static regex")
});

/// Page id written as either a YAML string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(u64),
}

/// `generated-by` may be a banner text or `false` to suppress the banner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GeneratedBy {
    Enabled(bool),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawFrontMatter {
    title: Option<String>,
    confluence_page_id: Option<IdValue>,
    confluence_space_key: Option<String>,
    generated_by: Option<GeneratedBy>,
    tags: Vec<String>,
    properties: BTreeMap<String, serde_json::Value>,
    synchronized: bool,
    alignment: Option<Alignment>,
    layout: Option<LayoutOverride>,
}

impl Default for RawFrontMatter {
    fn default() -> Self {
        Self {
            title: None,
            confluence_page_id: None,
            confluence_space_key: None,
            generated_by: None,
            tags: Vec::new(),
            properties: BTreeMap::new(),
            synchronized: true,
            alignment: None,
            layout: None,
        }
    }
}

/// Metadata of one document, front matter and directives combined.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMeta {
    pub title: Option<String>,
    pub page_id: Option<String>,
    pub space_key: Option<String>,
    pub generated_by: Option<GeneratedBy>,
    pub tags: BTreeSet<String>,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub synchronized: bool,
    pub layout: LayoutOverride,
}

impl Default for DocumentMeta {
    fn default() -> Self {
        Self {
            title: None,
            page_id: None,
            space_key: None,
            generated_by: None,
            tags: BTreeSet::new(),
            properties: BTreeMap::new(),
            synchronized: true,
            layout: LayoutOverride::default(),
        }
    }
}

impl DocumentMeta {
    /// Banner text for this document given the configured default.
    pub fn banner<'a>(&'a self, default: Option<&'a str>) -> Option<&'a str> {
        match &self.generated_by {
            Some(GeneratedBy::Enabled(false)) => None,
            Some(GeneratedBy::Enabled(true)) | None => default,
            Some(GeneratedBy::Text(text)) if text.trim().is_empty() => None,
            Some(GeneratedBy::Text(text)) => Some(text.as_str()),
        }
    }
}

/// A document split into metadata and Markdown body.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub meta: DocumentMeta,
    /// Markdown with the front matter and directives removed.
    pub body: String,
    /// Whether the page id came from a directive comment.
    pub page_id_directive: bool,
    /// Hash of the source with page-id directives removed.
    pub sync_digest: String,
}

/// Parse front matter and directives out of a document source.
pub fn parse_source(text: &str) -> Result<ParsedSource, FrontMatterError> {
    let (raw, rest) = split_front_matter(text)?;

    let mut body = rest.to_string();
    let directive_page_id = take_directive(&mut body, &PAGE_ID);
    let directive_space_key = take_directive(&mut body, &SPACE_KEY);
    let directive_generated_by = take_directive(&mut body, &GENERATED_BY);

    let front_page_id = match raw.confluence_page_id {
        Some(IdValue::Number(n)) => Some(n.to_string()),
        Some(IdValue::Text(s)) => {
            let s = s.trim().to_string();
            if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
                return Err(FrontMatterError::InvalidPageId(s));
            }
            Some(s)
        }
        None => None,
    };

    let mut layout = raw.layout.unwrap_or_default();
    if layout.alignment.is_none() {
        layout.alignment = raw.alignment;
    }

    let page_id_directive = directive_page_id.is_some();
    let meta = DocumentMeta {
        title: raw.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        page_id: directive_page_id.or(front_page_id),
        space_key: directive_space_key.or(raw.confluence_space_key),
        generated_by: directive_generated_by
            .map(GeneratedBy::Text)
            .or(raw.generated_by),
        tags: raw.tags.into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect(),
        properties: raw.properties,
        synchronized: raw.synchronized,
        layout,
    };

    Ok(ParsedSource {
        meta,
        body,
        page_id_directive,
        sync_digest: sync_digest(text),
    })
}

/// Locate the front-matter block and deserialize it.
fn split_front_matter(text: &str) -> Result<(RawFrontMatter, &str), FrontMatterError> {
    let captures = YAML_BLOCK
        .captures(text)
        .or_else(|| COMMENT_BLOCK.captures(text));
    let Some(captures) = captures else {
        return Ok((RawFrontMatter::default(), text));
    };
    let end = captures.get(0).map(|m| m.end()).unwrap_or(0);
    let content = captures.get(1).map(|m| m.as_str()).unwrap_or("");
    let trimmed = content.trim();

    let raw = if trimmed.is_empty() {
        RawFrontMatter::default()
    } else if trimmed.starts_with('{') {
        serde_json::from_str(trimmed)?
    } else {
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        if value.is_null() {
            RawFrontMatter::default()
        } else {
            serde_yaml::from_value(value)?
        }
    };
    Ok((raw, &text[end..]))
}

/// Remove every match of a directive, returning the first captured value.
///
/// A directive alone on its line is removed together with its line break.
/// Matches inside fenced code blocks are sample text and stay.
fn take_directive(text: &mut String, pattern: &Regex) -> Option<String> {
    let mut value = None;
    loop {
        let fenced = markdown::fenced_ranges(text);
        let found = pattern.captures_iter(text).find_map(|captures| {
            let whole = captures.get(0)?;
            if fenced.iter().any(|r| r.contains(&whole.start())) {
                return None;
            }
            let captured = captures.get(1).map(|m| m.as_str().to_string());
            Some((whole.start(), whole.end(), captured))
        });
        let Some((start, end, captured)) = found else {
            break;
        };
        if value.is_none() {
            value = captured;
        }
        let (start, end) = line_span(text, start, end);
        text.replace_range(start..end, "");
    }
    value
}

/// Widen `start..end` to the full line when only whitespace surrounds it.
fn line_span(text: &str, start: usize, end: usize) -> (usize, usize) {
    let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let before_blank = text[line_start..start].trim().is_empty();
    let rest = &text[end..];
    let after_len = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
    let after_blank = rest[..after_len].trim().is_empty();
    if before_blank && after_blank {
        (line_start, end + after_len)
    } else {
        (start, end)
    }
}

/// Digest of a source with page-id directives removed.
///
/// Inserting or rewriting the identity directive does not change the digest,
/// so a document synchronized once compares equal on the next run.
pub fn sync_digest(text: &str) -> String {
    let mut stripped = text.to_string();
    take_directive(&mut stripped, &PAGE_ID);
    digest::hash_bytes(stripped.as_bytes())
}

/// Return `text` with its page-id directive set to `page_id`.
///
/// Existing page-id directives are removed. The new directive is placed on its
/// own line immediately after the front matter, or at the top of the file.
pub fn write_page_id(text: &str, page_id: &str) -> String {
    let mut stripped = text.to_string();
    take_directive(&mut stripped, &PAGE_ID);
    let insert_at = YAML_BLOCK
        .find(&stripped)
        .or_else(|| COMMENT_BLOCK.find(&stripped))
        .map(|m| m.end())
        .unwrap_or(0);
    let mut prefix = stripped[..insert_at].to_string();
    if !prefix.is_empty() && !prefix.ends_with('\n') {
        prefix.push('\n');
    }
    format!(
        "{prefix}<!-- confluence-page-id: {page_id} -->\n{}",
        &stripped[insert_at..]
    )
}
