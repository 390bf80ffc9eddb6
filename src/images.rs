//! Image classification and natural-size probing.
//!
//! Local image references are sorted by suffix:
//!
//! | Suffix                         | Kind            |
//! |--------------------------------|-----------------|
//! | png, jpg, jpeg, gif, webp, bmp | raster          |
//! | svg                            | vector          |
//! | mmd, mermaid                   | Mermaid source  |
//! | puml, plantuml                 | PlantUML source |
//! | drawio, drawio.xml             | draw.io source  |
//! | drawio.png, drawio.svg         | draw.io export  |
//!
//! Anything else is still attached, but carries no size information.

use crate::diagram::DiagramKind;
use crate::drawio;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::Cursor;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Raster,
    Vector,
    Diagram(DiagramKind),
    /// PNG or SVG export that embeds an editable draw.io diagram.
    DrawioExport,
    Other,
}

const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Classify a file by its extension, case-insensitively.
pub fn classify(path: &Path) -> ImageKind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.ends_with(".drawio.xml") {
        return ImageKind::Diagram(DiagramKind::Drawio);
    }
    if drawio::is_embedded_export(&name) {
        return ImageKind::DrawioExport;
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "svg" => ImageKind::Vector,
        "mmd" | "mermaid" => ImageKind::Diagram(DiagramKind::Mermaid),
        "puml" | "plantuml" => ImageKind::Diagram(DiagramKind::PlantUml),
        "drawio" => ImageKind::Diagram(DiagramKind::Drawio),
        e if RASTER_EXTENSIONS.contains(&e) => ImageKind::Raster,
        _ => ImageKind::Other,
    }
}

/// Replace a vector image with its co-located raster twin, if one exists.
///
/// `fig.svg` becomes `fig.png` when `fig.png` is a file in the same
/// directory. Other paths are returned unchanged.
pub fn prefer_raster(path: &Path) -> PathBuf {
    if classify(path) != ImageKind::Vector {
        return path.to_path_buf();
    }
    let candidate = path.with_extension("png");
    if candidate.is_file() {
        log::debug!(
            "using {} instead of {}",
            candidate.display(),
            path.display()
        );
        candidate
    } else {
        path.to_path_buf()
    }
}

/// Width and height of an image file in pixels, when they can be determined.
pub fn natural_size(path: &Path) -> Option<(u32, u32)> {
    match classify(path) {
        ImageKind::Raster => image::image_dimensions(path).ok(),
        ImageKind::Vector => std::fs::read(path).ok().and_then(|b| svg_dimensions(&b)),
        ImageKind::DrawioExport => dimensions_from_bytes(&std::fs::read(path).ok()?),
        ImageKind::Diagram(_) | ImageKind::Other => None,
    }
}

/// Width and height of in-memory image bytes, such as a rendered diagram.
pub fn dimensions_from_bytes(bytes: &[u8]) -> Option<(u32, u32)> {
    if looks_like_svg(bytes) {
        return svg_dimensions(bytes);
    }
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    String::from_utf8_lossy(head).contains("<svg")
}

/// Read `width`/`height` from the root `<svg>` element, falling back to the
/// `viewBox` size. Percentages and unknown units yield `None`.
pub fn svg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() != b"svg" {
                    return None;
                }
                let mut width = None;
                let mut height = None;
                let mut view_box = None;
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    match attr.key.local_name().as_ref() {
                        b"width" => width = parse_length(&value),
                        b"height" => height = parse_length(&value),
                        b"viewBox" => view_box = parse_view_box(&value),
                        _ => {}
                    }
                }
                return match (width, height, view_box) {
                    (Some(w), Some(h), _) => Some((w, h)),
                    (Some(w), None, Some((vw, vh))) if vw > 0.0 => {
                        Some((w, (f64::from(w) * vh / vw).round() as u32))
                    }
                    (None, Some(h), Some((vw, vh))) if vh > 0.0 => {
                        Some(((f64::from(h) * vw / vh).round() as u32, h))
                    }
                    (_, _, Some((vw, vh))) => Some((vw.round() as u32, vh.round() as u32)),
                    _ => None,
                };
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
        buf.clear();
    }
}

fn parse_length(value: &str) -> Option<u32> {
    let number = value.trim().trim_end_matches("px");
    let parsed: f64 = number.parse().ok()?;
    (parsed > 0.0).then(|| parsed.round() as u32)
}

fn parse_view_box(value: &str) -> Option<(f64, f64)> {
    let parts: Vec<f64> = value
        .split([' ', ','])
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.parse().ok())
        .collect();
    match parts.as_slice() {
        [_, _, w, h] => Some((*w, *h)),
        _ => None,
    }
}

/// MIME type for an attachment file name.
pub fn content_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" | "mmd" | "mermaid" | "puml" | "plantuml" => "text/plain",
        "drawio" | "xml" => "application/vnd.jgraph.mxfile",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
