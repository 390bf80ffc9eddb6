//! Target structured-format elements and their XHTML serialization.
//!
//! The converter produces a `Vec<StorageElement>`; [`serialize`] turns it
//! into Confluence storage format, an XHTML dialect with `ac:` (macro) and
//! `ri:` (resource identifier) elements.
//!
//! ## Element Mapping
//!
//! ```text
//! Paragraph            <p>…</p>
//! Heading              [anchor macro] <hN>…</hN>
//! List                 <ul>/<ol start=…> or <ac:task-list>
//! Table                <table><thead>…</thead><tbody>…</tbody></table>
//! CodeBlock            code macro with CDATA body
//! Image                <ac:image><ri:attachment/> | <ri:url/></ac:image>
//! Callout              info / tip / note / warning macro, or panel macro
//! CollapsedSection     expand macro
//! Widget               toc / children macro
//! Formula              easy-math-block macro
//! Diagram              mermaid-cloud / plantumlcloud macro
//! Raw                  inserted verbatim (already valid storage format)
//! ```
//!
//! Plain elements serialize exactly like a generic Markdown→HTML renderer,
//! so output without target macros reads as ordinary XHTML.

use crate::config::{Alignment, TableDisplayMode};
use crate::digest;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Block-level element of a page body.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageElement {
    Paragraph(Vec<Inline>),
    /// Inline content not wrapped in `<p>`, as in tight list items.
    Plain(Vec<Inline>),
    Heading {
        level: u8,
        anchor: Option<String>,
        content: Vec<Inline>,
    },
    List(List),
    Table(Table),
    CodeBlock {
        language: Option<&'static str>,
        content: String,
        line_numbers: bool,
    },
    Image(Image),
    Callout(Callout),
    CollapsedSection {
        summary: String,
        body: CollapsedBody,
    },
    Widget(Widget),
    BlockQuote(Vec<StorageElement>),
    Rule,
    Formula {
        source: String,
        alignment: Alignment,
    },
    Diagram(DiagramMacro),
    Raw(String),
    Footnotes(Vec<Footnote>),
}

/// Inline content.
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    Code(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    Strikethrough(Vec<Inline>),
    Link {
        target: LinkTarget,
        content: Vec<Inline>,
    },
    Image(Image),
    Color {
        color: Option<String>,
        background: Option<String>,
        content: Vec<Inline>,
    },
    Status {
        color: StatusColor,
        label: String,
    },
    Date(String),
    Emoticon(&'static str),
    Formula(String),
    FootnoteRef {
        label: String,
        number: usize,
    },
    /// Inline HTML element carried through, e.g. `<sub>` or `<kbd>`.
    Tag {
        name: String,
        attributes: Vec<(String, String)>,
        content: Vec<Inline>,
    },
    LineBreak,
    SoftBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    /// Absolute URL or rendered page URL.
    Url(String),
    /// Heading anchor on the same page.
    Anchor(String),
    /// File attached to the current page.
    Attachment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListKind {
    Unordered,
    Ordered { start: u64 },
    Task,
}

#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub kind: ListKind,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    /// Task state; `None` for regular items.
    pub checked: Option<bool>,
    pub content: Vec<StorageElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAlign {
    None,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub alignments: Vec<ColumnAlign>,
    pub head: Vec<Vec<Inline>>,
    pub rows: Vec<Vec<Vec<Inline>>>,
    pub width: Option<u32>,
    pub display_mode: TableDisplayMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Attachment(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub source: ImageSource,
    pub alt: Option<String>,
    pub title: Option<String>,
    /// Set for block images only.
    pub caption: Option<String>,
    /// `Some` for block images, `None` for images inside running text.
    pub alignment: Option<Alignment>,
    /// Natural size in pixels, when known.
    pub natural: Option<(u32, u32)>,
    /// Display width cap.
    pub max_width: Option<u32>,
}

impl Image {
    pub fn new(source: ImageSource) -> Self {
        Self {
            source,
            alt: None,
            title: None,
            caption: None,
            alignment: None,
            natural: None,
            max_width: None,
        }
    }
}

/// Normalized callout kind, shared by admonitions and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalloutKind {
    Info,
    Tip,
    Note,
    Warning,
}

impl CalloutKind {
    pub fn macro_name(self) -> &'static str {
        match self {
            CalloutKind::Info => "info",
            CalloutKind::Tip => "tip",
            CalloutKind::Note => "note",
            CalloutKind::Warning => "warning",
        }
    }

    fn panel_style(self) -> (&'static str, &'static str, &'static str) {
        match self {
            CalloutKind::Info => ("#deebff", ":info:", "atlassian-info"),
            CalloutKind::Tip => ("#e3fcef", ":check_mark:", "atlassian-check_mark"),
            CalloutKind::Note => ("#eae6ff", ":note:", "atlassian-note"),
            CalloutKind::Warning => ("#fffae6", ":warning:", "atlassian-warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Callout {
    pub kind: CalloutKind,
    pub title: Option<String>,
    pub body: Vec<StorageElement>,
    /// Render as a colored panel macro instead of the kind's own macro.
    pub panel: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollapsedBody {
    Elements(Vec<StorageElement>),
    /// Well-formed markup carried through unmodified.
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    TableOfContents,
    ChildListing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Gray,
    Purple,
    Blue,
    Red,
    Yellow,
    Green,
}

impl StatusColor {
    /// Parse the color part of a `STATUS-<COLOR>` reference label.
    pub fn from_label(label: &str) -> Option<Self> {
        let color = label.strip_prefix("STATUS-").or_else(|| label.strip_prefix("status-"))?;
        match color.to_ascii_uppercase().as_str() {
            "GRAY" | "GREY" => Some(StatusColor::Gray),
            "PURPLE" => Some(StatusColor::Purple),
            "BLUE" => Some(StatusColor::Blue),
            "RED" => Some(StatusColor::Red),
            "YELLOW" => Some(StatusColor::Yellow),
            "GREEN" => Some(StatusColor::Green),
            _ => None,
        }
    }

    fn colour_parameter(self) -> &'static str {
        match self {
            StatusColor::Gray => "Grey",
            StatusColor::Purple => "Purple",
            StatusColor::Blue => "Blue",
            StatusColor::Red => "Red",
            StatusColor::Yellow => "Yellow",
            StatusColor::Green => "Green",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramMacroKind {
    Mermaid,
    PlantUml,
    /// The draw.io app reads the diagram named by the attachment.
    Drawio { centered: bool },
}

/// Diagram displayed by a wiki app from an attached source file.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramMacro {
    pub kind: DiagramMacroKind,
    pub attachment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Footnote {
    pub label: String,
    pub content: Vec<StorageElement>,
}

/// Anchor name used for a footnote definition.
pub fn footnote_anchor(label: &str) -> String {
    format!("footnote-def-{label}")
}

// ============================================================================
// Serialization
// ============================================================================

/// Serialize a page body to storage format.
pub fn serialize(elements: &[StorageElement]) -> String {
    let mut writer = Writer::default();
    writer.blocks(elements);
    writer.out
}

#[derive(Default)]
struct Writer {
    out: String,
    task_id: usize,
}

impl Writer {
    fn text(&mut self, text: &str) {
        escape_into(&mut self.out, text, false);
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        escape_into(&mut self.out, value, true);
        self.out.push('"');
    }

    fn macro_open(&mut self, name: &str) {
        self.out.push_str("<ac:structured-macro");
        self.attr("ac:name", name);
        self.attr("ac:schema-version", "1");
        self.out.push('>');
    }

    fn parameter(&mut self, name: &str, value: &str) {
        self.out.push_str("<ac:parameter");
        self.attr("ac:name", name);
        self.out.push('>');
        self.text(value);
        self.out.push_str("</ac:parameter>");
    }

    fn macro_close(&mut self) {
        self.out.push_str("</ac:structured-macro>");
    }

    fn anchor_macro(&mut self, name: &str) {
        self.macro_open("anchor");
        self.parameter("", name);
        self.macro_close();
    }

    fn cdata(&mut self, content: &str) {
        self.out.push_str("<![CDATA[");
        self.out.push_str(&content.replace("]]>", "]]]]><![CDATA[>"));
        self.out.push_str("]]>");
    }

    fn blocks(&mut self, elements: &[StorageElement]) {
        for element in elements {
            self.block(element);
        }
    }

    fn block(&mut self, element: &StorageElement) {
        match element {
            StorageElement::Paragraph(content) => {
                self.out.push_str("<p>");
                self.inlines(content);
                self.out.push_str("</p>\n");
            }
            StorageElement::Plain(content) => self.inlines(content),
            StorageElement::Heading {
                level,
                anchor,
                content,
            } => {
                if let Some(name) = anchor {
                    self.anchor_macro(name);
                }
                self.out.push_str(&format!("<h{level}>"));
                self.inlines(content);
                self.out.push_str(&format!("</h{level}>\n"));
            }
            StorageElement::List(list) => self.list(list),
            StorageElement::Table(table) => self.table(table),
            StorageElement::CodeBlock {
                language,
                content,
                line_numbers,
            } => {
                self.macro_open("code");
                if let Some(lang) = language {
                    self.parameter("language", lang);
                }
                if *line_numbers {
                    self.parameter("linenumbers", "true");
                }
                self.out.push_str("<ac:plain-text-body>");
                self.cdata(content);
                self.out.push_str("</ac:plain-text-body>");
                self.macro_close();
                self.out.push('\n');
            }
            StorageElement::Image(image) => {
                self.image(image);
                self.out.push('\n');
            }
            StorageElement::Callout(callout) => self.callout(callout),
            StorageElement::CollapsedSection { summary, body } => {
                self.macro_open("expand");
                self.parameter("title", summary);
                self.out.push_str("<ac:rich-text-body>");
                match body {
                    CollapsedBody::Elements(elements) => self.blocks(elements),
                    CollapsedBody::Literal(markup) => self.out.push_str(markup),
                }
                self.out.push_str("</ac:rich-text-body>");
                self.macro_close();
                self.out.push('\n');
            }
            StorageElement::Widget(Widget::TableOfContents) => {
                self.macro_open("toc");
                self.parameter("outline", "clear");
                self.parameter("style", "default");
                self.macro_close();
                self.out.push('\n');
            }
            StorageElement::Widget(Widget::ChildListing) => {
                self.macro_open("children");
                self.parameter("allChildren", "true");
                self.macro_close();
                self.out.push('\n');
            }
            StorageElement::BlockQuote(children) => {
                self.out.push_str("<blockquote>\n");
                self.blocks(children);
                self.out.push_str("</blockquote>\n");
            }
            StorageElement::Rule => self.out.push_str("<hr />\n"),
            StorageElement::Formula { source, alignment } => {
                self.macro_open("easy-math-block");
                self.parameter("body", source);
                self.parameter("align", alignment_name(*alignment));
                self.macro_close();
                self.out.push('\n');
            }
            StorageElement::Diagram(diagram) => {
                let name = match diagram.kind {
                    DiagramMacroKind::Mermaid => "mermaid-cloud",
                    DiagramMacroKind::PlantUml => "plantumlcloud",
                    DiagramMacroKind::Drawio { .. } => "drawio",
                };
                // Stable id so an unchanged diagram serializes identically.
                self.out.push_str("<ac:structured-macro");
                self.attr("ac:name", name);
                self.attr("ac:schema-version", "1");
                self.attr(
                    "ac:macro-id",
                    &digest::content_uuid(diagram.attachment.as_bytes()),
                );
                self.out.push('>');
                if let DiagramMacroKind::Drawio { centered } = diagram.kind {
                    self.parameter("diagramName", &diagram.attachment);
                    if centered {
                        self.parameter("pCenter", "1");
                    }
                } else {
                    self.parameter("filename", &diagram.attachment);
                    self.parameter("toolbar", "bottom");
                    if diagram.kind == DiagramMacroKind::Mermaid {
                        self.parameter("zoom", "fit");
                    }
                    self.parameter("revision", "1");
                }
                self.macro_close();
                self.out.push('\n');
            }
            StorageElement::Raw(markup) => {
                self.out.push_str(markup);
                if !markup.ends_with('\n') {
                    self.out.push('\n');
                }
            }
            StorageElement::Footnotes(notes) => {
                self.out.push_str("<hr />\n<ol>\n");
                for note in notes {
                    self.out.push_str("<li>");
                    self.anchor_macro(&footnote_anchor(&note.label));
                    self.blocks(&note.content);
                    self.out.push_str("</li>\n");
                }
                self.out.push_str("</ol>\n");
            }
        }
    }

    fn list(&mut self, list: &List) {
        match list.kind {
            ListKind::Task => {
                self.out.push_str("<ac:task-list>\n");
                for item in &list.items {
                    self.task_id += 1;
                    let status = if item.checked == Some(true) {
                        "complete"
                    } else {
                        "incomplete"
                    };
                    self.out.push_str(&format!(
                        "<ac:task><ac:task-id>{}</ac:task-id><ac:task-status>{status}</ac:task-status><ac:task-body>",
                        self.task_id
                    ));
                    self.blocks(&item.content);
                    self.out.push_str("</ac:task-body></ac:task>\n");
                }
                self.out.push_str("</ac:task-list>\n");
            }
            ListKind::Unordered | ListKind::Ordered { .. } => {
                let tag = match list.kind {
                    ListKind::Ordered { start } => {
                        if start == 1 {
                            self.out.push_str("<ol>\n");
                        } else {
                            self.out.push_str(&format!("<ol start=\"{start}\">\n"));
                        }
                        "ol"
                    }
                    _ => {
                        self.out.push_str("<ul>\n");
                        "ul"
                    }
                };
                for item in &list.items {
                    self.out.push_str("<li>");
                    match item.checked {
                        Some(true) => self.out.push_str("\u{2611} "),
                        Some(false) => self.out.push_str("\u{2610} "),
                        None => {}
                    }
                    self.blocks(&item.content);
                    self.out.push_str("</li>\n");
                }
                self.out.push_str(&format!("</{tag}>\n"));
            }
        }
    }

    fn table(&mut self, table: &Table) {
        self.out.push_str("<table");
        if let Some(width) = table.width {
            self.attr("data-table-width", &width.to_string());
        }
        if table.display_mode == TableDisplayMode::Fixed {
            self.attr("data-table-display-mode", "fixed");
        }
        self.out.push_str(">\n<thead><tr>");
        for (i, cell) in table.head.iter().enumerate() {
            self.cell("th", table.alignments.get(i).copied(), cell);
        }
        self.out.push_str("</tr></thead>\n<tbody>\n");
        for row in &table.rows {
            self.out.push_str("<tr>");
            for (i, cell) in row.iter().enumerate() {
                self.cell("td", table.alignments.get(i).copied(), cell);
            }
            self.out.push_str("</tr>\n");
        }
        self.out.push_str("</tbody></table>\n");
    }

    fn cell(&mut self, tag: &str, align: Option<ColumnAlign>, content: &[Inline]) {
        self.out.push('<');
        self.out.push_str(tag);
        match align {
            Some(ColumnAlign::Left) => self.attr("style", "text-align: left"),
            Some(ColumnAlign::Center) => self.attr("style", "text-align: center"),
            Some(ColumnAlign::Right) => self.attr("style", "text-align: right"),
            Some(ColumnAlign::None) | None => {}
        }
        self.out.push('>');
        self.inlines(content);
        self.out.push_str(&format!("</{tag}>"));
    }

    fn callout(&mut self, callout: &Callout) {
        if callout.panel {
            let (color, icon, icon_id) = callout.kind.panel_style();
            self.macro_open("panel");
            self.parameter("bgColor", color);
            self.parameter("panelIcon", icon);
            self.parameter("panelIconId", icon_id);
            self.parameter("panelIconText", icon);
        } else {
            self.macro_open(callout.kind.macro_name());
        }
        if let Some(title) = &callout.title {
            self.parameter("title", title);
        }
        self.out.push_str("<ac:rich-text-body>");
        self.blocks(&callout.body);
        self.out.push_str("</ac:rich-text-body>");
        self.macro_close();
        self.out.push('\n');
    }

    fn image(&mut self, image: &Image) {
        self.out.push_str("<ac:image");
        match image.alignment {
            Some(alignment) => {
                let (align, layout) = match alignment {
                    Alignment::Left => ("left", "align-start"),
                    Alignment::Right => ("right", "align-end"),
                    Alignment::Center => ("center", "center"),
                };
                self.attr("ac:align", align);
                self.attr("ac:layout", layout);
                if let Some((width, height)) = image.natural {
                    self.attr("ac:original-width", &width.to_string());
                    self.attr("ac:original-height", &height.to_string());
                    self.attr("ac:custom-width", "true");
                    let display = match image.max_width {
                        Some(max) if width > max => max,
                        _ => width,
                    };
                    self.attr("ac:width", &display.to_string());
                }
            }
            None => {
                if let Some((width, height)) = image.natural {
                    let display = match image.max_width {
                        Some(max) if width > max => max,
                        _ => width,
                    };
                    self.attr("ac:width", &display.to_string());
                    if display == width {
                        self.attr("ac:height", &height.to_string());
                    }
                }
            }
        }
        if let Some(alt) = &image.alt {
            self.attr("ac:alt", alt);
        }
        if let Some(title) = &image.title {
            self.attr("ac:title", title);
        }
        self.out.push('>');
        match &image.source {
            ImageSource::Attachment(name) => {
                self.out.push_str("<ri:attachment");
                self.attr("ri:filename", name);
                self.out.push_str(" />");
            }
            ImageSource::Url(url) => {
                self.out.push_str("<ri:url");
                self.attr("ri:value", url);
                self.out.push_str(" />");
            }
        }
        if let Some(caption) = &image.caption {
            self.out.push_str("<ac:caption><p>");
            self.text(caption);
            self.out.push_str("</p></ac:caption>");
        }
        self.out.push_str("</ac:image>");
    }

    fn inlines(&mut self, inlines: &[Inline]) {
        for inline in inlines {
            self.inline(inline);
        }
    }

    fn inline(&mut self, inline: &Inline) {
        match inline {
            Inline::Text(text) => self.text(text),
            Inline::Code(code) => {
                self.out.push_str("<code>");
                self.text(code);
                self.out.push_str("</code>");
            }
            Inline::Emphasis(content) => self.wrap("em", content),
            Inline::Strong(content) => self.wrap("strong", content),
            Inline::Strikethrough(content) => self.wrap("del", content),
            Inline::Link { target, content } => match target {
                LinkTarget::Url(url) => {
                    self.out.push_str("<a");
                    self.attr("href", url);
                    self.out.push('>');
                    self.inlines(content);
                    self.out.push_str("</a>");
                }
                LinkTarget::Anchor(anchor) => {
                    self.out.push_str("<ac:link");
                    self.attr("ac:anchor", anchor);
                    self.out.push_str("><ac:link-body>");
                    self.inlines(content);
                    self.out.push_str("</ac:link-body></ac:link>");
                }
                LinkTarget::Attachment(name) => {
                    self.out.push_str("<ac:link><ri:attachment");
                    self.attr("ri:filename", name);
                    self.out.push_str(" /><ac:link-body>");
                    self.inlines(content);
                    self.out.push_str("</ac:link-body></ac:link>");
                }
            },
            Inline::Image(image) => self.image(image),
            Inline::Color {
                color,
                background,
                content,
            } => {
                let mut style = Vec::new();
                if let Some(c) = color {
                    style.push(format!("color: {c};"));
                }
                if let Some(b) = background {
                    style.push(format!("background-color: {b};"));
                }
                self.out.push_str("<span");
                self.attr("style", &style.join(" "));
                self.out.push('>');
                self.inlines(content);
                self.out.push_str("</span>");
            }
            Inline::Status { color, label } => {
                self.macro_open("status");
                self.parameter("colour", color.colour_parameter());
                self.parameter("title", label);
                self.macro_close();
            }
            Inline::Date(date) => {
                self.out.push_str("<time");
                self.attr("datetime", date);
                self.out.push_str(" />");
            }
            Inline::Emoticon(name) => {
                self.out.push_str("<ac:emoticon");
                self.attr("ac:name", name);
                self.out.push_str(" />");
            }
            Inline::Formula(source) => {
                self.macro_open("eazy-math-inline");
                self.parameter("body", source);
                self.macro_close();
            }
            Inline::FootnoteRef { label, number } => {
                self.out.push_str("<sup><ac:link");
                self.attr("ac:anchor", &footnote_anchor(label));
                self.out
                    .push_str(&format!("><ac:link-body>{number}</ac:link-body></ac:link></sup>"));
            }
            Inline::Tag {
                name,
                attributes,
                content,
            } => {
                self.out.push('<');
                self.out.push_str(name);
                for (key, value) in attributes {
                    self.attr(key, value);
                }
                self.out.push('>');
                self.inlines(content);
                self.out.push_str(&format!("</{name}>"));
            }
            Inline::LineBreak => self.out.push_str("<br />\n"),
            Inline::SoftBreak => self.out.push('\n'),
        }
    }

    fn wrap(&mut self, tag: &str, content: &[Inline]) {
        self.out.push_str(&format!("<{tag}>"));
        self.inlines(content);
        self.out.push_str(&format!("</{tag}>"));
    }
}

fn alignment_name(alignment: Alignment) -> &'static str {
    match alignment {
        Alignment::Center => "center",
        Alignment::Left => "left",
        Alignment::Right => "right",
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// Check that a markup fragment is well-formed XML.
///
/// The fragment may have several top-level elements and text. Namespace
/// prefixes such as `ac:` need no declaration. Named entities such as
/// `&nbsp;` are accepted without a DTD; a bare `&` is not.
pub fn check_well_formed(fragment: &str) -> Result<(), String> {
    let wrapped = format!("<fragment>{fragment}</fragment>");
    let mut reader = Reader::from_str(&wrapped);
    reader.config_mut().check_end_names = true;
    let position = |reader: &Reader<&[u8]>| {
        reader
            .buffer_position()
            .saturating_sub("<fragment>".len() as u64)
    };
    let mut depth: usize = 0;
    loop {
        let checked = match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                check_attributes(&e)
            }
            Ok(Event::Empty(e)) => check_attributes(&e),
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                Ok(())
            }
            Ok(Event::Text(t)) => t
                .unescape_with(any_named_entity)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Ok(Event::Eof) => break,
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(detail) = checked {
            return Err(format!("{detail} at offset {}", position(&reader)));
        }
    }
    if depth != 0 {
        return Err("unclosed element at end of markup".to_string());
    }
    Ok(())
}

/// Attribute syntax is only checked when attributes are iterated.
fn check_attributes(element: &quick_xml::events::BytesStart<'_>) -> Result<(), String> {
    for attribute in element.attributes().with_checks(true) {
        let attribute = attribute.map_err(|e| e.to_string())?;
        attribute
            .unescape_value_with(any_named_entity)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Resolve every syntactically valid entity name; the wiki knows the HTML set.
fn any_named_entity(name: &str) -> Option<&'static str> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    valid.then_some("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Inline {
        Inline::Text(s.to_string())
    }

    // =========================================================================
    // Plain XHTML
    // =========================================================================

    #[test]
    fn paragraph_escapes_text() {
        let out = serialize(&[StorageElement::Paragraph(vec![text("a < b & c")])]);
        assert_eq!(out, "<p>a &lt; b &amp; c</p>\n");
    }

    #[test]
    fn heading_with_anchor_macro() {
        let out = serialize(&[StorageElement::Heading {
            level: 2,
            anchor: Some("intro".into()),
            content: vec![text("Intro")],
        }]);
        assert_eq!(
            out,
            "<ac:structured-macro ac:name=\"anchor\" ac:schema-version=\"1\"><ac:parameter ac:name=\"\">intro</ac:parameter></ac:structured-macro><h2>Intro</h2>\n"
        );
    }

    #[test]
    fn ordered_list_with_start() {
        let out = serialize(&[StorageElement::List(List {
            kind: ListKind::Ordered { start: 3 },
            items: vec![ListItem {
                checked: None,
                content: vec![StorageElement::Plain(vec![text("x")])],
            }],
        })]);
        assert_eq!(out, "<ol start=\"3\">\n<li>x</li>\n</ol>\n");
    }

    #[test]
    fn task_list_numbers_tasks() {
        let item = |checked| ListItem {
            checked: Some(checked),
            content: vec![StorageElement::Plain(vec![text("t")])],
        };
        let out = serialize(&[StorageElement::List(List {
            kind: ListKind::Task,
            items: vec![item(true), item(false)],
        })]);
        assert!(out.contains("<ac:task-id>1</ac:task-id><ac:task-status>complete</ac:task-status>"));
        assert!(out.contains("<ac:task-id>2</ac:task-id><ac:task-status>incomplete</ac:task-status>"));
    }

    #[test]
    fn table_layout_attributes() {
        let out = serialize(&[StorageElement::Table(Table {
            alignments: vec![ColumnAlign::Right],
            head: vec![vec![text("h")]],
            rows: vec![vec![vec![text("c")]]],
            width: Some(900),
            display_mode: TableDisplayMode::Fixed,
        })]);
        assert!(out.starts_with(
            "<table data-table-width=\"900\" data-table-display-mode=\"fixed\">"
        ));
        assert!(out.contains("<th style=\"text-align: right\">h</th>"));
        assert!(out.contains("<td style=\"text-align: right\">c</td>"));
    }

    // =========================================================================
    // Macros
    // =========================================================================

    #[test]
    fn code_block_cdata_is_split_on_terminator() {
        let out = serialize(&[StorageElement::CodeBlock {
            language: Some("xml"),
            content: "a ]]> b".into(),
            line_numbers: false,
        }]);
        assert!(out.contains("<ac:parameter ac:name=\"language\">xml</ac:parameter>"));
        assert!(out.contains("<![CDATA[a ]]]]><![CDATA[> b]]>"));
        assert!(check_well_formed(&out).is_ok());
    }

    #[test]
    fn callout_default_and_panel() {
        let callout = Callout {
            kind: CalloutKind::Warning,
            title: Some("Careful".into()),
            body: vec![StorageElement::Paragraph(vec![text("x")])],
            panel: false,
        };
        let out = serialize(&[StorageElement::Callout(callout.clone())]);
        assert!(out.starts_with("<ac:structured-macro ac:name=\"warning\""));
        assert!(out.contains("<ac:parameter ac:name=\"title\">Careful</ac:parameter>"));

        let out = serialize(&[StorageElement::Callout(Callout {
            panel: true,
            ..callout
        })]);
        assert!(out.starts_with("<ac:structured-macro ac:name=\"panel\""));
        assert!(out.contains("<ac:parameter ac:name=\"bgColor\">#fffae6</ac:parameter>"));
    }

    #[test]
    fn block_image_constrained_by_max_width() {
        let mut image = Image::new(ImageSource::Attachment("big.png".into()));
        image.alignment = Some(Alignment::Left);
        image.natural = Some((1600, 900));
        image.max_width = Some(800);
        image.caption = Some("Big".into());
        let out = serialize(&[StorageElement::Image(image)]);
        assert!(out.contains("ac:align=\"left\" ac:layout=\"align-start\""));
        assert!(out.contains("ac:original-width=\"1600\""));
        assert!(out.contains("ac:width=\"800\""));
        assert!(out.contains("<ri:attachment ri:filename=\"big.png\" />"));
        assert!(out.contains("<ac:caption><p>Big</p></ac:caption>"));
    }

    #[test]
    fn external_image_uses_url_resource() {
        let out = serialize(&[StorageElement::Paragraph(vec![Inline::Image(Image::new(
            ImageSource::Url("https://example.com/a.png".into()),
        ))])]);
        assert_eq!(
            out,
            "<p><ac:image><ri:url ri:value=\"https://example.com/a.png\" /></ac:image></p>\n"
        );
    }

    #[test]
    fn status_and_date_widgets() {
        let out = serialize(&[StorageElement::Paragraph(vec![
            Inline::Status {
                color: StatusColor::Gray,
                label: "Draft".into(),
            },
            Inline::Date("2024-05-01".into()),
        ])]);
        assert!(out.contains("<ac:parameter ac:name=\"colour\">Grey</ac:parameter>"));
        assert!(out.contains("<time datetime=\"2024-05-01\" />"));
    }

    #[test]
    fn status_color_from_label() {
        assert_eq!(StatusColor::from_label("STATUS-GREEN"), Some(StatusColor::Green));
        assert_eq!(StatusColor::from_label("STATUS-grey"), Some(StatusColor::Gray));
        assert_eq!(StatusColor::from_label("STATUS-PINK"), None);
        assert_eq!(StatusColor::from_label("GREEN"), None);
    }

    #[test]
    fn serialized_macros_are_well_formed() {
        let out = serialize(&[
            StorageElement::Widget(Widget::TableOfContents),
            StorageElement::Diagram(DiagramMacro {
                kind: DiagramMacroKind::Mermaid,
                attachment: "embedded_x.mmd".into(),
            }),
            StorageElement::Formula {
                source: "a < b".into(),
                alignment: Alignment::Center,
            },
        ]);
        assert!(check_well_formed(&out).is_ok());
    }

    #[test]
    fn diagram_macro_id_is_stable() {
        let diagram = StorageElement::Diagram(DiagramMacro {
            kind: DiagramMacroKind::PlantUml,
            attachment: "embedded_y.puml".into(),
        });
        let first = serialize(std::slice::from_ref(&diagram));
        assert_eq!(first, serialize(&[diagram]));
        assert!(first.contains("ac:macro-id=\""));
        assert!(first.contains("plantumlcloud"));
    }

    #[test]
    fn drawio_macro_names_the_diagram() {
        let out = serialize(&[StorageElement::Diagram(DiagramMacro {
            kind: DiagramMacroKind::Drawio { centered: true },
            attachment: "img_flow.drawio.xml".into(),
        })]);
        assert!(out.contains("ac:name=\"drawio\""));
        assert!(out.contains("<ac:parameter ac:name=\"diagramName\">img_flow.drawio.xml</ac:parameter>"));
        assert!(out.contains("<ac:parameter ac:name=\"pCenter\">1</ac:parameter>"));
        assert!(!out.contains("filename"));
        assert!(check_well_formed(&out).is_ok());
    }

    // =========================================================================
    // Well-formedness
    // =========================================================================

    #[test]
    fn well_formed_accepts_fragments() {
        assert!(check_well_formed("<p>a</p><p>b</p>text").is_ok());
        assert!(check_well_formed("<ac:emoticon ac:name=\"smile\" />").is_ok());
    }

    #[test]
    fn well_formed_rejects_unterminated() {
        assert!(check_well_formed("<p><b>bold</p>").is_err());
        assert!(check_well_formed("<div>").is_err());
        assert!(check_well_formed("</div>").is_err());
    }

    #[test]
    fn text_and_attribute_syntax_checked() {
        assert!(check_well_formed("<p>a & b</p>").is_err());
        assert!(check_well_formed("<p>a &amp; b &nbsp; &#169;</p>").is_ok());
        assert!(check_well_formed("<p class=x>text</p>").is_err());
        assert!(check_well_formed("<p a=\"1\" a=\"2\">text</p>").is_err());
        assert!(check_well_formed("<img src=\"a & b\" />").is_err());
        assert!(check_well_formed("<img src=\"a &amp; b\" />").is_ok());
    }
}
