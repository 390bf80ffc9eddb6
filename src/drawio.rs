//! Editable diagram data embedded in draw.io exports.
//!
//! draw.io can export a diagram as PNG or SVG that still carries the
//! editable `<mxfile>` document:
//!
//! - PNG: a `tEXt` chunk with keyword `mxfile`, URL-encoded.
//! - SVG: the `content` attribute of the root `<svg>` element.
//!
//! Inside the `<mxfile>`, each `<diagram>` holds either an `<mxGraphModel>`
//! tree or the same tree URL-encoded, raw-deflated and base64-encoded.
//! [`extract_diagram`] returns the document with the first diagram expanded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::DeflateDecoder;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DrawioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a PNG file")]
    NotPng,
    #[error("corrupted PNG: {0}")]
    CorruptPng(String),
    #[error("no draw.io diagram embedded in {0}")]
    NotEmbedded(&'static str),
    #[error("invalid XML: {0}")]
    Xml(String),
    #[error("`<diagram>` element not found")]
    NoDiagram,
    #[error("`<diagram>` data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported file type {0}")]
    Unsupported(String),
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Whether the file name marks a PNG or SVG export with an embedded diagram.
pub fn is_embedded_export(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".drawio.png") || lower.ends_with(".drawio.svg")
}

/// Read an export and return the editable `<mxfile>` document.
pub fn extract_diagram(path: &Path) -> Result<Vec<u8>, DrawioError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let data = std::fs::read(path)?;
    if name.ends_with(".drawio.png") {
        decompress_diagram(&mxfile_from_png(&data)?)
    } else if name.ends_with(".drawio.svg") {
        decompress_diagram(&mxfile_from_svg(&data)?)
    } else {
        Err(DrawioError::Unsupported(name))
    }
}

/// The URL-decoded `mxfile` text chunk of a PNG.
fn mxfile_from_png(data: &[u8]) -> Result<Vec<u8>, DrawioError> {
    if !data.starts_with(PNG_SIGNATURE) {
        return Err(DrawioError::NotPng);
    }
    let mut offset = PNG_SIGNATURE.len();
    while offset < data.len() {
        let header = data
            .get(offset..offset + 8)
            .ok_or_else(|| DrawioError::CorruptPng("incomplete chunk header".into()))?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = &header[4..8];
        offset += 8;
        let chunk = data.get(offset..offset + length).ok_or_else(|| {
            DrawioError::CorruptPng(format!(
                "incomplete data for chunk {}",
                String::from_utf8_lossy(kind)
            ))
        })?;
        // Data, then a CRC that is not verified.
        offset += length + 4;

        if kind != b"tEXt" {
            continue;
        }
        let Some(nul) = chunk.iter().position(|&b| b == 0) else {
            return Err(DrawioError::CorruptPng("tEXt chunk without keyword".into()));
        };
        if &chunk[..nul] == b"mxfile" {
            return Ok(urlencoding::decode_binary(&chunk[nul + 1..]).into_owned());
        }
    }
    Err(DrawioError::NotEmbedded("PNG"))
}

/// The `content` attribute of the root `<svg>` element.
fn mxfile_from_svg(data: &[u8]) -> Result<Vec<u8>, DrawioError> {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| DrawioError::Xml(e.to_string()))?;
                    if attr.key.as_ref() == b"content" {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| DrawioError::Xml(e.to_string()))?;
                        return Ok(value.into_owned().into_bytes());
                    }
                }
                return Err(DrawioError::NotEmbedded("SVG"));
            }
            Ok(Event::Eof) => return Err(DrawioError::NotEmbedded("SVG")),
            Err(e) => return Err(DrawioError::Xml(e.to_string())),
            Ok(_) => {}
        }
        buf.clear();
    }
}

/// Expand the compressed payload of the first `<diagram>` in place.
///
/// A diagram that already contains elements is returned unchanged.
pub fn decompress_diagram(mxfile: &[u8]) -> Result<Vec<u8>, DrawioError> {
    let mut reader = Reader::from_reader(mxfile);
    let mut buf = Vec::new();
    let mut root_seen = false;
    let mut content_start = None;
    let mut has_children = false;
    let mut text = String::new();
    loop {
        let before = reader.buffer_position() as usize;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| DrawioError::Xml(e.to_string()))?;
        match event {
            Event::Start(e) | Event::Empty(e) if !root_seen => {
                if e.name().as_ref() != b"mxfile" {
                    return Err(DrawioError::Xml("root element is not <mxfile>".into()));
                }
                root_seen = true;
            }
            Event::Start(e) if content_start.is_none() && e.name().as_ref() == b"diagram" => {
                content_start = Some(reader.buffer_position() as usize);
            }
            Event::Start(_) | Event::Empty(_) if content_start.is_some() => {
                has_children = true;
            }
            Event::Text(t) if content_start.is_some() => {
                let part = t.unescape().map_err(|e| DrawioError::Xml(e.to_string()))?;
                text.push_str(&part);
            }
            Event::End(e) if e.name().as_ref() == b"diagram" => {
                let Some(start) = content_start else {
                    return Err(DrawioError::NoDiagram);
                };
                if has_children {
                    return Ok(mxfile.to_vec());
                }
                let inner = inflate_payload(text.trim())?;
                let mut out = Vec::with_capacity(mxfile.len() + inner.len());
                out.extend_from_slice(&mxfile[..start]);
                out.extend_from_slice(&inner);
                out.extend_from_slice(&mxfile[before..]);
                return Ok(out);
            }
            Event::Eof => return Err(DrawioError::NoDiagram),
            _ => {}
        }
        buf.clear();
    }
}

/// base64, then raw DEFLATE, then URL decoding. The result must be XML.
fn inflate_payload(encoded: &str) -> Result<Vec<u8>, DrawioError> {
    if encoded.is_empty() {
        return Err(DrawioError::Xml("`<diagram>` element has no data".into()));
    }
    let compressed = STANDARD.decode(encoded)?;
    let mut inflated = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|e| DrawioError::Xml(format!("cannot inflate diagram data: {e}")))?;
    let decoded = urlencoding::decode_binary(&inflated).into_owned();
    check_xml(&decoded)?;
    Ok(decoded)
}

fn check_xml(data: &[u8]) -> Result<(), DrawioError> {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut elements = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => {
                depth += 1;
                elements += 1;
            }
            Ok(Event::Empty(_)) => elements += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) if depth == 0 && elements > 0 => return Ok(()),
            Ok(Event::Eof) => {
                return Err(DrawioError::Xml("inner diagram is not an XML tree".into()));
            }
            Err(e) => return Err(DrawioError::Xml(format!("inner diagram: {e}"))),
            Ok(_) => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    pub const MODEL: &str =
        r#"<mxGraphModel><root><mxCell id="0"/><mxCell id="1" parent="0"/></root></mxGraphModel>"#;

    /// `<mxfile>` with `MODEL` compressed the way draw.io stores it.
    pub fn compressed_mxfile() -> String {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(urlencoding::encode(MODEL).as_bytes())
            .unwrap();
        let payload = STANDARD.encode(encoder.finish().unwrap());
        format!(r#"<mxfile host="app"><diagram id="d1" name="Page-1">{payload}</diagram></mxfile>"#)
    }

    /// PNG bytes with an `mxfile` text chunk after the header chunk.
    pub fn drawio_png(mxfile: &str) -> Vec<u8> {
        let plain = crate::test_helpers::png_bytes(4, 4);
        let ihdr_end = PNG_SIGNATURE.len() + 8 + 13 + 4;
        let mut data = b"mxfile\0".to_vec();
        data.extend_from_slice(urlencoding::encode(mxfile).as_bytes());
        let mut out = plain[..ihdr_end].to_vec();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(b"tEXt");
        out.extend_from_slice(&data);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&plain[ihdr_end..]);
        out
    }

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    // =========================================================================
    // Decompression
    // =========================================================================

    #[test]
    fn compressed_diagram_is_expanded() {
        let out = String::from_utf8(decompress_diagram(compressed_mxfile().as_bytes()).unwrap())
            .unwrap();
        assert_eq!(
            out,
            format!(r#"<mxfile host="app"><diagram id="d1" name="Page-1">{MODEL}</diagram></mxfile>"#)
        );
    }

    #[test]
    fn expanded_diagram_passes_through() {
        let plain = format!("<mxfile><diagram>{MODEL}</diagram></mxfile>");
        assert_eq!(decompress_diagram(plain.as_bytes()).unwrap(), plain.as_bytes());
    }

    #[test]
    fn malformed_documents_rejected() {
        assert!(matches!(
            decompress_diagram(b"<svg><diagram>x</diagram></svg>"),
            Err(DrawioError::Xml(_))
        ));
        assert!(matches!(
            decompress_diagram(b"<mxfile></mxfile>"),
            Err(DrawioError::NoDiagram)
        ));
        assert!(matches!(
            decompress_diagram(b"<mxfile><diagram>***</diagram></mxfile>"),
            Err(DrawioError::Base64(_))
        ));
    }

    // =========================================================================
    // Exports
    // =========================================================================

    #[test]
    fn diagram_extracted_from_png() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "flow.drawio.png", &drawio_png(&compressed_mxfile()));
        let out = String::from_utf8(extract_diagram(&path).unwrap()).unwrap();
        assert!(out.starts_with("<mxfile"));
        assert!(out.contains(MODEL));
    }

    #[test]
    fn diagram_extracted_from_svg() {
        let tmp = TempDir::new().unwrap();
        let escaped = compressed_mxfile().replace('"', "&quot;").replace('<', "&lt;");
        let svg = format!(r#"<svg xmlns="http://www.w3.org/2000/svg" content="{escaped}"><rect/></svg>"#);
        let path = write(&tmp, "flow.drawio.svg", svg.as_bytes());
        let out = String::from_utf8(extract_diagram(&path).unwrap()).unwrap();
        assert!(out.contains(MODEL));
    }

    #[test]
    fn plain_exports_have_nothing_embedded() {
        let tmp = TempDir::new().unwrap();
        let png = write(&tmp, "plain.drawio.png", &crate::test_helpers::png_bytes(2, 2));
        assert!(matches!(extract_diagram(&png), Err(DrawioError::NotEmbedded("PNG"))));
        let svg = write(&tmp, "plain.drawio.svg", b"<svg><rect/></svg>");
        assert!(matches!(extract_diagram(&svg), Err(DrawioError::NotEmbedded("SVG"))));
        let other = write(&tmp, "flow.png", b"x");
        assert!(matches!(extract_diagram(&other), Err(DrawioError::Unsupported(_))));
    }

    #[test]
    fn export_names() {
        assert!(is_embedded_export("a/Flow.DrawIO.png"));
        assert!(is_embedded_export("flow.drawio.svg"));
        assert!(!is_embedded_export("flow.drawio"));
        assert!(!is_embedded_export("flow.png"));
    }
}
