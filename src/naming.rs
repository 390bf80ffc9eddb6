//! Centralized name derivation.
//!
//! Every identifier the converter derives from user text goes through one of
//! these functions, so links and anchors agree across documents:
//!
//! - `heading_slug("Getting Started!")` → `"getting-started"` (anchor names)
//! - `attachment_name("../img/logo v2.png")` → `"PAR_img_logo_v2.png"`
//! - `stem_title("notes.md", "1a2b3c4d")` → `"notes [1a2b3c4d]"`

use std::path::Path;

/// GitHub-style identifier for a heading.
///
/// Lowercases, drops everything except ASCII letters, digits, spaces, hyphens
/// and underscores, then turns whitespace into hyphens.
pub fn heading_slug(text: &str) -> String {
    let kept: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect();
    kept.split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Attachment file name for a path relative to the referencing document.
///
/// Parent segments become `PAR`, separators become `_`, and any character
/// the wiki rejects in attachment names is replaced by `_`.
pub fn attachment_name(relative: &str) -> String {
    relative
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .map(|part| if part == ".." { "PAR".to_string() } else { sanitize(part) })
        .collect::<Vec<_>>()
        .join("_")
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Fallback page title: file stem plus disambiguation suffix.
pub fn stem_title(file_name: &str, suffix: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    format!("{stem} [{suffix}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_lowercases_and_hyphenates() {
        assert_eq!(heading_slug("Getting Started"), "getting-started");
    }

    #[test]
    fn slug_strips_punctuation() {
        assert_eq!(heading_slug("What's new? (v2.0)"), "whats-new-v20");
    }

    #[test]
    fn slug_collapses_runs_of_spaces() {
        assert_eq!(heading_slug("  A   B  "), "a-b");
    }

    #[test]
    fn slug_keeps_existing_hyphens_and_underscores() {
        assert_eq!(heading_slug("snake_case and kebab-case"), "snake_case-and-kebab-case");
    }

    #[test]
    fn slug_drops_non_ascii() {
        assert_eq!(heading_slug("Café menu"), "caf-menu");
    }

    #[test]
    fn attachment_name_plain() {
        assert_eq!(attachment_name("figure.png"), "figure.png");
    }

    #[test]
    fn attachment_name_nested_and_parent() {
        assert_eq!(attachment_name("../img/logo v2.png"), "PAR_img_logo_v2.png");
        assert_eq!(attachment_name("./a/b.svg"), "a_b.svg");
    }

    #[test]
    fn stem_title_formats_suffix() {
        assert_eq!(stem_title("notes.md", "1a2b3c4d"), "notes [1a2b3c4d]");
    }
}
