//! Markdown tree to storage format.
//!
//! [`Converter`] walks the [`Document`] of one indexed source and produces
//! the page body together with every file the body references as an
//! attachment. Dispatch is exhaustive over block and span kinds; the few
//! tag-driven cases (code languages, callout keywords, alert markers) go
//! through closed enums.
//!
//! ## Code blocks
//!
//! | Info string          | Output                                              |
//! |----------------------|-----------------------------------------------------|
//! | empty or unknown     | code macro without language                         |
//! | known language/alias | code macro with the wiki's language name            |
//! | `math`               | formula macro, or rendered image with `render_latex` |
//! | `mermaid`/`plantuml` | rendered image attachment, or source + diagram macro |
//! | `csf`                | inserted verbatim after a well-formedness check     |
//!
//! ## Links
//!
//! With `force_valid_url` an unresolvable relative link fails the document.
//! Without it a warning is logged and the link is dropped: its text stays,
//! an image keeps only its alt text.
//!
//! ## draw.io
//!
//! Image references to `.drawio` sources are rendered like other diagrams,
//! or attached for the draw.io macro when `render_drawio` is off.
//! `.drawio.png` and `.drawio.svg` exports are plain images when rendering,
//! otherwise their embedded diagram is extracted and attached as XML.

use crate::config::{Alignment, LayoutConfig, SyncConfig};
use crate::diagram::{self, DiagramKind, DiagramRenderer, RenderError};
use crate::drawio::{self, DrawioError};
use crate::images::{self, ImageKind};
use crate::index::{IndexedDocument, PageIndex, TitleSource};
use crate::links::{self, LinkError, LinkResolver, Resolution};
use crate::markdown::{self, Block, DetailsBody, Document, Item, Span};
use crate::naming;
use crate::storage::{
    self, Callout, CalloutKind, CollapsedBody, ColumnAlign, DiagramMacro, DiagramMacroKind,
    Footnote, Image, ImageSource, Inline, LinkTarget, List, ListItem, ListKind, StatusColor,
    StorageElement, Table, Widget,
};
use crate::store::{AttachmentData, AttachmentUpload};
use pulldown_cmark::{BlockQuoteKind, LinkType};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([a-z0-9_+-]+):").expect("static regex"));
static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static VOID_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(br|hr|img|input|wbr)(\s[^<>]*?)?\s*/?>").expect("static regex")
});

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("invalid markup in {context}: {detail}")]
    InvalidMarkup {
        context: &'static str,
        detail: String,
    },
    #[error("unknown admonition kind {0:?}")]
    UnknownAdmonition(String),
    #[error("invalid link: {0}")]
    Link(#[from] LinkError),
    #[error("diagram rendering failed: {0}")]
    Render(#[from] RenderError),
    #[error("draw.io diagram: {0}")]
    Drawio(#[from] DrawioError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of converting one document.
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    /// Storage-format body.
    pub body: String,
    /// Files referenced by the body, unique by name, sorted by name.
    pub attachments: Vec<AttachmentUpload>,
}

/// Language of a fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLanguage {
    Plain,
    Math,
    Mermaid,
    PlantUml,
    Csf,
    /// A language the wiki's code macro highlights.
    Named(&'static str),
}

/// Language names understood by the code macro.
const LANGUAGES: &[&str] = &[
    "abap", "actionscript3", "ada", "applescript", "arduino", "autoit", "bash", "c", "clojure",
    "coffeescript", "coldfusion", "cpp", "csharp", "css", "cuda", "d", "dart", "delphi", "diff",
    "elixir", "erlang", "fortran", "foxpro", "go", "graphql", "groovy", "haskell", "haxe", "html",
    "java", "javafx", "javascript", "json", "jsx", "julia", "kotlin", "livescript", "lua",
    "mathematica", "matlab", "objectivec", "objectivej", "ocaml", "octave", "pascal", "perl",
    "php", "powershell", "prolog", "puppet", "python", "qml", "r", "racket", "rst", "ruby",
    "rust", "sass", "scala", "scheme", "shell", "smalltalk", "splunk", "sql", "standardml",
    "swift", "tcl", "tex", "tsx", "typescript", "vala", "vb", "verilog", "vhdl", "xml", "xquery",
    "yaml",
];

const LANGUAGE_ALIASES: &[(&str, &str)] = &[
    ("sh", "bash"),
    ("zsh", "bash"),
    ("console", "bash"),
    ("shell-session", "bash"),
    ("c++", "cpp"),
    ("cs", "csharp"),
    ("c#", "csharp"),
    ("golang", "go"),
    ("htm", "html"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("jsonc", "json"),
    ("kt", "kotlin"),
    ("objc", "objectivec"),
    ("ps1", "powershell"),
    ("pwsh", "powershell"),
    ("py", "python"),
    ("python3", "python"),
    ("rb", "ruby"),
    ("rs", "rust"),
    ("scss", "sass"),
    ("ts", "typescript"),
    ("latex", "tex"),
    ("svg", "xml"),
    ("yml", "yaml"),
];

impl CodeLanguage {
    /// Classify a fenced block by the first word of its info string.
    pub fn from_info(info: &str) -> Self {
        let tag = info
            .split(|c: char| c.is_whitespace() || c == '{' || c == ',')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match tag.as_str() {
            "" => CodeLanguage::Plain,
            "math" => CodeLanguage::Math,
            "mermaid" => CodeLanguage::Mermaid,
            "plantuml" | "puml" => CodeLanguage::PlantUml,
            "csf" => CodeLanguage::Csf,
            other => {
                if let Some(name) = LANGUAGES.iter().find(|l| **l == other) {
                    return CodeLanguage::Named(*name);
                }
                if let Some((_, name)) = LANGUAGE_ALIASES.iter().find(|(a, _)| *a == other) {
                    return CodeLanguage::Named(*name);
                }
                log::debug!("no highlighting for code language {other:?}");
                CodeLanguage::Plain
            }
        }
    }
}

impl CalloutKind {
    /// Kind for an admonition keyword, case-insensitively.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword.to_ascii_lowercase().as_str() {
            "info" | "todo" | "example" | "question" | "help" | "faq" | "quote" | "cite"
            | "success" | "check" | "done" => CalloutKind::Info,
            "tip" | "hint" | "important" => CalloutKind::Tip,
            "note" | "abstract" | "summary" | "tldr" => CalloutKind::Note,
            "warning" | "caution" | "attention" | "failure" | "fail" | "missing" | "danger"
            | "error" | "bug" => CalloutKind::Warning,
            _ => return None,
        })
    }

    fn from_alert(kind: BlockQuoteKind) -> Self {
        match kind {
            BlockQuoteKind::Note => CalloutKind::Note,
            BlockQuoteKind::Tip | BlockQuoteKind::Important => CalloutKind::Tip,
            BlockQuoteKind::Warning | BlockQuoteKind::Caution => CalloutKind::Warning,
        }
    }
}

/// Colon-terminated alert prefixes at the start of a blockquote.
const ALERT_PREFIXES: &[(&str, CalloutKind)] = &[
    ("FLAG:", CalloutKind::Note),
    ("NOTE:", CalloutKind::Note),
    ("WARNING:", CalloutKind::Warning),
    ("DISCLAIMER:", CalloutKind::Info),
];

const EMOTICONS: &[(&str, &str)] = &[
    ("grinning", "laugh"),
    ("laughing", "laugh"),
    ("heart", "heart"),
    ("slight_frown", "sad"),
    ("slight_smile", "smile"),
    ("smile", "smile"),
    ("stuck_out_tongue", "cheeky"),
    ("thumbsdown", "thumbs-down"),
    ("-1", "thumbs-down"),
    ("thumbsup", "thumbs-up"),
    ("+1", "thumbs-up"),
    ("wink", "wink"),
    ("white_check_mark", "tick"),
    ("heavy_check_mark", "tick"),
    ("x", "cross"),
    ("warning", "warning"),
    ("information_source", "information"),
    ("bulb", "light-on"),
    ("question", "question"),
    ("star", "yellow-star"),
];

/// Named text colors and their palette value.
const PALETTE: &[(&str, &str)] = &[
    ("black", "#172b4d"),
    ("blue", "#0747a6"),
    ("gray", "#97a0af"),
    ("grey", "#97a0af"),
    ("green", "#006644"),
    ("orange", "#ff8b00"),
    ("purple", "#403294"),
    ("red", "#bf2600"),
    ("teal", "#008da6"),
    ("white", "#ffffff"),
    ("yellow", "#ff991f"),
];

fn palette(value: &str) -> String {
    let value = value.trim();
    PALETTE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
        .map(|(_, hex)| hex.to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Converts indexed documents against one page index snapshot.
pub struct Converter<'a> {
    config: &'a SyncConfig,
    index: &'a PageIndex,
    renderer: &'a dyn DiagramRenderer,
}

impl<'a> Converter<'a> {
    pub fn new(
        config: &'a SyncConfig,
        index: &'a PageIndex,
        renderer: &'a dyn DiagramRenderer,
    ) -> Self {
        Self {
            config,
            index,
            renderer,
        }
    }

    pub fn convert(&self, doc: &IndexedDocument) -> Result<ConvertedDocument, ConvertError> {
        let mut state = DocumentConverter {
            config: self.config,
            renderer: self.renderer,
            resolver: LinkResolver::new(
                self.index,
                &doc.directory,
                self.config.converter.heading_anchors,
            ),
            layout: self.config.layout.overlaid(&doc.source.meta.layout),
            relative: &doc.relative,
            attachments: BTreeMap::new(),
            footnotes: Footnotes::collect(&doc.tree),
        };

        let skipped_heading = match doc.title_source {
            TitleSource::Heading if self.config.converter.skip_title_heading => doc.title_heading,
            _ => None,
        };

        let mut elements = Vec::new();
        if let Some(text) = doc.source.meta.banner(self.config.generated_by()) {
            elements.push(StorageElement::Callout(Callout {
                kind: CalloutKind::Info,
                title: None,
                body: vec![StorageElement::Paragraph(vec![Inline::Text(
                    text.to_string(),
                )])],
                panel: false,
            }));
        }
        for (position, block) in doc.tree.blocks.iter().enumerate() {
            if Some(position) == skipped_heading {
                continue;
            }
            state.block(block, &mut elements)?;
        }
        if let Some(notes) = state.footnote_section()? {
            elements.push(notes);
        }

        Ok(ConvertedDocument {
            body: storage::serialize(&elements),
            attachments: state.attachments.into_values().collect(),
        })
    }
}

/// Footnote definitions of a document and the order they are referenced in.
#[derive(Default)]
struct Footnotes {
    definitions: Vec<(String, Vec<Block>)>,
    numbers: HashMap<String, usize>,
    order: Vec<String>,
}

impl Footnotes {
    fn collect(document: &Document) -> Self {
        let mut footnotes = Footnotes::default();
        footnotes.gather(&document.blocks);
        footnotes
    }

    fn gather(&mut self, blocks: &[Block]) {
        for block in blocks {
            match block {
                Block::FootnoteDefinition { label, children } => {
                    self.definitions.push((label.clone(), children.clone()));
                }
                Block::BlockQuote { children, .. } | Block::Admonition { children, .. } => {
                    self.gather(children)
                }
                Block::List { items, .. } => {
                    for item in items {
                        self.gather(&item.children);
                    }
                }
                Block::Details {
                    body: DetailsBody::Markdown(children),
                    ..
                } => self.gather(children),
                _ => {}
            }
        }
    }

    /// Number of `label`, assigned on first reference.
    fn number(&mut self, label: &str) -> usize {
        if let Some(number) = self.numbers.get(label) {
            return *number;
        }
        self.order.push(label.to_string());
        let number = self.order.len();
        self.numbers.insert(label.to_string(), number);
        number
    }
}

enum Visual {
    Image(Image),
    Diagram(DiagramMacro),
    /// Diagram source attached for an inline reference in macro mode.
    SourceLink(String),
    /// The target could not be used; only the text remains.
    Text(String),
}

struct DocumentConverter<'a> {
    config: &'a SyncConfig,
    renderer: &'a dyn DiagramRenderer,
    resolver: LinkResolver<'a>,
    layout: LayoutConfig,
    relative: &'a str,
    attachments: BTreeMap<String, AttachmentUpload>,
    footnotes: Footnotes,
}

impl DocumentConverter<'_> {
    fn blocks(&mut self, blocks: &[Block]) -> Result<Vec<StorageElement>, ConvertError> {
        let mut out = Vec::new();
        for block in blocks {
            self.block(block, &mut out)?;
        }
        Ok(out)
    }

    fn block(&mut self, block: &Block, out: &mut Vec<StorageElement>) -> Result<(), ConvertError> {
        match block {
            Block::Paragraph { spans, source } => self.paragraph(spans, source, out)?,
            Block::Plain(spans) => out.push(StorageElement::Plain(self.inlines(spans)?)),
            Block::Heading { level, spans } => {
                let anchor = self
                    .config
                    .converter
                    .heading_anchors
                    .then(|| naming::heading_slug(&markdown::plain_text(spans)));
                out.push(StorageElement::Heading {
                    level: *level,
                    anchor,
                    content: self.inlines(spans)?,
                });
            }
            Block::BlockQuote { alert, children } => out.push(self.block_quote(*alert, children)?),
            Block::List { start, items } => out.push(self.list(*start, items)?),
            Block::CodeBlock { info, content } => out.push(self.code_block(info, content)?),
            Block::Html(html) => {
                if let Some(element) = self.html_block(html) {
                    out.push(element);
                }
            }
            Block::Rule => out.push(StorageElement::Rule),
            Block::Table {
                alignments,
                head,
                rows,
            } => {
                let head = head
                    .iter()
                    .map(|cell| self.inlines(cell))
                    .collect::<Result<Vec<_>, _>>()?;
                let rows = rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|cell| self.inlines(cell))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(StorageElement::Table(Table {
                    alignments: alignments.iter().map(column_align).collect(),
                    head,
                    rows,
                    width: self.layout.table.width,
                    display_mode: self.layout.table.display_mode,
                }));
            }
            // Emitted at the end of the page.
            Block::FootnoteDefinition { .. } => {}
            Block::Admonition {
                keyword,
                title,
                children,
            } => {
                let kind = CalloutKind::from_keyword(keyword)
                    .ok_or_else(|| ConvertError::UnknownAdmonition(keyword.clone()))?;
                out.push(self.callout(kind, title.clone(), children)?);
            }
            Block::Details { summary, body } => {
                let body = match body {
                    DetailsBody::Markdown(children) => {
                        CollapsedBody::Elements(self.blocks(children)?)
                    }
                    DetailsBody::Literal(markup) => {
                        storage::check_well_formed(markup).map_err(|detail| {
                            ConvertError::InvalidMarkup {
                                context: "details section",
                                detail,
                            }
                        })?;
                        CollapsedBody::Literal(markup.clone())
                    }
                };
                out.push(StorageElement::CollapsedSection {
                    summary: summary.clone(),
                    body,
                });
            }
        }
        Ok(())
    }

    fn paragraph(
        &mut self,
        spans: &[Span],
        source: &str,
        out: &mut Vec<StorageElement>,
    ) -> Result<(), ConvertError> {
        match source.trim() {
            "[[_TOC_]]" | "[TOC]" | "[[TOC]]" => {
                out.push(StorageElement::Widget(Widget::TableOfContents));
                return Ok(());
            }
            "[[_LISTING_]]" => {
                out.push(StorageElement::Widget(Widget::ChildListing));
                return Ok(());
            }
            _ => {}
        }

        let significant: Vec<&Span> = spans
            .iter()
            .filter(|s| !matches!(s, Span::Text(t) if t.trim().is_empty()))
            .collect();
        if let [only] = significant.as_slice() {
            match only {
                Span::Image {
                    dest,
                    title,
                    link_type,
                    alt,
                    ..
                } if status_label(dest, *link_type).is_none() => {
                    let alt = markdown::plain_text(alt);
                    match self.visual(dest, title, &alt, true)? {
                        Visual::Image(image) => out.push(StorageElement::Image(image)),
                        Visual::Diagram(diagram) => out.push(StorageElement::Diagram(diagram)),
                        Visual::SourceLink(name) => out.push(StorageElement::Paragraph(vec![
                            attachment_link(name, &alt),
                        ])),
                        Visual::Text(text) => {
                            out.push(StorageElement::Paragraph(vec![Inline::Text(text)]))
                        }
                    }
                    return Ok(());
                }
                Span::Math {
                    source,
                    display: true,
                } => {
                    out.push(self.formula(source)?);
                    return Ok(());
                }
                _ => {}
            }
        }

        out.push(StorageElement::Paragraph(self.inlines(spans)?));
        Ok(())
    }

    fn block_quote(
        &mut self,
        alert: Option<BlockQuoteKind>,
        children: &[Block],
    ) -> Result<StorageElement, ConvertError> {
        if let Some(kind) = alert {
            return self.callout(CalloutKind::from_alert(kind), None, children);
        }
        if let Some((kind, stripped)) = strip_alert_prefix(children) {
            return self.callout(kind, None, &stripped);
        }
        Ok(StorageElement::BlockQuote(self.blocks(children)?))
    }

    fn callout(
        &mut self,
        kind: CalloutKind,
        title: Option<String>,
        children: &[Block],
    ) -> Result<StorageElement, ConvertError> {
        Ok(StorageElement::Callout(Callout {
            kind,
            title: title.filter(|t| !t.trim().is_empty()),
            body: self.blocks(children)?,
            panel: self.config.converter.use_panel,
        }))
    }

    fn list(&mut self, start: Option<u64>, items: &[Item]) -> Result<StorageElement, ConvertError> {
        let kind = if !items.is_empty() && items.iter().all(|i| i.checked.is_some()) {
            ListKind::Task
        } else {
            match start {
                Some(start) => ListKind::Ordered { start },
                None => ListKind::Unordered,
            }
        };
        let items = items
            .iter()
            .map(|item| {
                Ok(ListItem {
                    checked: item.checked,
                    content: self.blocks(&item.children)?,
                })
            })
            .collect::<Result<Vec<_>, ConvertError>>()?;
        Ok(StorageElement::List(List { kind, items }))
    }

    fn code_block(&mut self, info: &str, content: &str) -> Result<StorageElement, ConvertError> {
        match CodeLanguage::from_info(info) {
            CodeLanguage::Plain => Ok(self.code(None, content)),
            CodeLanguage::Named(language) => Ok(self.code(Some(language), content)),
            CodeLanguage::Math => self.formula(content.trim_end()),
            CodeLanguage::Mermaid => Ok(self.diagram_block(content, DiagramKind::Mermaid)?),
            CodeLanguage::PlantUml => Ok(self.diagram_block(content, DiagramKind::PlantUml)?),
            CodeLanguage::Csf => {
                storage::check_well_formed(content).map_err(|detail| {
                    ConvertError::InvalidMarkup {
                        context: "csf code block",
                        detail,
                    }
                })?;
                Ok(StorageElement::Raw(content.trim().to_string()))
            }
        }
    }

    fn code(&self, language: Option<&'static str>, content: &str) -> StorageElement {
        StorageElement::CodeBlock {
            language,
            content: content.strip_suffix('\n').unwrap_or(content).to_string(),
            line_numbers: self.config.converter.code_line_numbers,
        }
    }

    fn formula(&mut self, source: &str) -> Result<StorageElement, ConvertError> {
        if self.config.converter.render_latex {
            let image = self.rendered_image(source, DiagramKind::Latex, true)?;
            return Ok(StorageElement::Image(image));
        }
        Ok(StorageElement::Formula {
            source: source.trim().to_string(),
            alignment: self.layout.alignment.unwrap_or_default(),
        })
    }

    fn diagram_block(
        &mut self,
        source: &str,
        kind: DiagramKind,
    ) -> Result<StorageElement, ConvertError> {
        Ok(match self.diagram(source, kind, true)? {
            Visual::Diagram(diagram) => StorageElement::Diagram(diagram),
            Visual::Image(image) => StorageElement::Image(image),
            Visual::SourceLink(name) => StorageElement::Paragraph(vec![attachment_link(name, "")]),
            Visual::Text(text) => StorageElement::Paragraph(vec![Inline::Text(text)]),
        })
    }

    fn renders(&self, kind: DiagramKind) -> bool {
        match kind {
            DiagramKind::Mermaid => self.config.converter.render_mermaid,
            DiagramKind::PlantUml => self.config.converter.render_plantuml,
            DiagramKind::Drawio => self.config.converter.render_drawio,
            DiagramKind::Latex => self.config.converter.render_latex,
        }
    }

    /// Diagram as a rendered image or as an attached source with a macro.
    fn diagram(
        &mut self,
        source: &str,
        kind: DiagramKind,
        block: bool,
    ) -> Result<Visual, ConvertError> {
        if self.renders(kind) {
            return Ok(Visual::Image(self.rendered_image(source, kind, block)?));
        }
        let name = diagram::source_attachment_name(source, kind);
        self.attach(AttachmentUpload {
            name: name.clone(),
            content_type: "text/plain".to_string(),
            data: AttachmentData::Bytes(source.as_bytes().to_vec()),
        });
        let macro_kind = match kind {
            DiagramKind::Mermaid => DiagramMacroKind::Mermaid,
            DiagramKind::PlantUml => DiagramMacroKind::PlantUml,
            DiagramKind::Drawio => self.drawio_macro_kind(),
            DiagramKind::Latex => return Ok(Visual::SourceLink(name)),
        };
        if block {
            Ok(Visual::Diagram(DiagramMacro {
                kind: macro_kind,
                attachment: name,
            }))
        } else {
            Ok(Visual::SourceLink(name))
        }
    }

    fn drawio_macro_kind(&self) -> DiagramMacroKind {
        DiagramMacroKind::Drawio {
            centered: self.layout.image_alignment() == Alignment::Center,
        }
    }

    /// draw.io source file or export in macro mode, or a source in render mode.
    fn drawio_file(
        &mut self,
        path: &Path,
        written: &str,
        export: bool,
        block: bool,
    ) -> Result<Visual, ConvertError> {
        if !export && self.renders(DiagramKind::Drawio) {
            let source = std::fs::read_to_string(path)?;
            return Ok(Visual::Image(self.rendered_image(
                &source,
                DiagramKind::Drawio,
                block,
            )?));
        }
        let (name, data) = if export {
            let xml = Path::new(written).with_extension("xml");
            let name = naming::attachment_name(&xml.to_string_lossy());
            (name, AttachmentData::Bytes(drawio::extract_diagram(path)?))
        } else {
            (naming::attachment_name(written), AttachmentData::File(path.to_path_buf()))
        };
        self.attach(AttachmentUpload {
            content_type: images::content_type(&name).to_string(),
            name: name.clone(),
            data,
        });
        if !block {
            return Ok(Visual::SourceLink(name));
        }
        Ok(Visual::Diagram(DiagramMacro {
            kind: self.drawio_macro_kind(),
            attachment: name,
        }))
    }

    fn rendered_image(
        &mut self,
        source: &str,
        kind: DiagramKind,
        block: bool,
    ) -> Result<Image, ConvertError> {
        let format = self.config.converter.diagram_format;
        let bytes = self.renderer.render(source, kind, format)?;
        let name = diagram::rendered_attachment_name(source, format);
        let mut image = Image::new(ImageSource::Attachment(name.clone()));
        image.natural = images::dimensions_from_bytes(&bytes);
        if block {
            image.alignment = Some(self.layout.image_alignment());
            image.max_width = self.layout.image.max_width;
        }
        self.attach(AttachmentUpload {
            content_type: images::content_type(&name).to_string(),
            name,
            data: AttachmentData::Bytes(bytes),
        });
        Ok(image)
    }

    /// Raw HTML block: comments dropped, void tags closed, then inserted
    /// verbatim if well-formed and escaped as text otherwise.
    fn html_block(&self, html: &str) -> Option<StorageElement> {
        let without_comments = HTML_COMMENT.replace_all(html, "");
        let trimmed = without_comments.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalized = VOID_TAG.replace_all(trimmed, "<$1$2 />");
        match storage::check_well_formed(&normalized) {
            Ok(()) => Some(StorageElement::Raw(normalized.into_owned())),
            Err(detail) => {
                log::warn!(
                    "{}: HTML block is not well-formed ({detail}); kept as text",
                    self.relative
                );
                Some(StorageElement::Paragraph(vec![Inline::Text(
                    trimmed.to_string(),
                )]))
            }
        }
    }

    fn footnote_section(&mut self) -> Result<Option<StorageElement>, ConvertError> {
        if self.footnotes.definitions.is_empty() {
            return Ok(None);
        }
        // Unreferenced definitions follow the referenced ones.
        let labels: Vec<String> = self
            .footnotes
            .definitions
            .iter()
            .map(|(label, _)| label.clone())
            .collect();
        for label in &labels {
            self.footnotes.number(label);
        }

        let mut notes = Vec::new();
        let mut position = 0;
        while position < self.footnotes.order.len() {
            let label = self.footnotes.order[position].clone();
            position += 1;
            let Some(children) = self
                .footnotes
                .definitions
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, c)| c.clone())
            else {
                log::warn!("{}: footnote [^{label}] has no definition", self.relative);
                continue;
            };
            let content = self.blocks(&children)?;
            notes.push(Footnote { label, content });
        }
        Ok(Some(StorageElement::Footnotes(notes)))
    }

    // ------------------------------------------------------------------------
    // Inline content
    // ------------------------------------------------------------------------

    fn inlines(&mut self, spans: &[Span]) -> Result<Vec<Inline>, ConvertError> {
        let mut out = Vec::new();
        for span in spans {
            self.inline(span, &mut out)?;
        }
        Ok(out)
    }

    fn inline(&mut self, span: &Span, out: &mut Vec<Inline>) -> Result<(), ConvertError> {
        match span {
            Span::Text(text) => push_text(text, out),
            Span::Code(code) => out.push(Inline::Code(code.clone())),
            Span::Emphasis(children) => out.push(Inline::Emphasis(self.inlines(children)?)),
            Span::Strong(children) => out.push(Inline::Strong(self.inlines(children)?)),
            Span::Strikethrough(children) => {
                out.push(Inline::Strikethrough(self.inlines(children)?))
            }
            Span::Link { dest, children, .. } => {
                let content = self.inlines(children)?;
                self.link(dest, content, out)?;
            }
            Span::Image {
                dest,
                title,
                link_type,
                alt,
                ..
            } => {
                let alt = markdown::plain_text(alt);
                if let Some(color) = status_label(dest, *link_type) {
                    out.push(Inline::Status { color, label: alt });
                    return Ok(());
                }
                self.inline_visual(dest, title, &alt, out)?;
            }
            Span::Math { source, .. } => out.push(Inline::Formula(source.trim().to_string())),
            Span::FootnoteRef(label) => {
                let number = self.footnotes.number(label);
                out.push(Inline::FootnoteRef {
                    label: label.clone(),
                    number,
                });
            }
            Span::Element {
                name,
                attributes,
                children,
            } => self.element(name, attributes, children, out)?,
            Span::Html(html) => out.push(Inline::Text(html.clone())),
            Span::TaskMarker(_) => {}
            Span::SoftBreak => out.push(Inline::SoftBreak),
            Span::HardBreak => out.push(Inline::LineBreak),
        }
        Ok(())
    }

    fn element(
        &mut self,
        name: &str,
        attributes: &[(String, String)],
        children: &[Span],
        out: &mut Vec<Inline>,
    ) -> Result<(), ConvertError> {
        let attr = |key: &str| {
            attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        match name {
            "input" if attr("type") == Some("date") => {
                if let Some(value) = attr("value").filter(|v| !v.is_empty()) {
                    out.push(Inline::Date(value.to_string()));
                }
            }
            "a" if attr("href").is_some() => {
                let content = self.inlines(children)?;
                self.link(attr("href").unwrap_or_default(), content, out)?;
            }
            "img" if attr("src").is_some() => {
                let alt = attr("alt").unwrap_or_default().to_string();
                let title = attr("title").unwrap_or_default().to_string();
                self.inline_visual(attr("src").unwrap_or_default(), &title, &alt, out)?;
            }
            "span" if attr("style").is_some() => {
                let content = self.inlines(children)?;
                let (color, background) = parse_colors(attr("style").unwrap_or_default());
                if color.is_none() && background.is_none() {
                    out.push(Inline::Tag {
                        name: name.to_string(),
                        attributes: attributes.to_vec(),
                        content,
                    });
                } else {
                    out.push(Inline::Color {
                        color,
                        background,
                        content,
                    });
                }
            }
            _ => {
                let content = self.inlines(children)?;
                out.push(Inline::Tag {
                    name: name.to_string(),
                    attributes: attributes.to_vec(),
                    content,
                });
            }
        }
        Ok(())
    }

    fn link(
        &mut self,
        dest: &str,
        content: Vec<Inline>,
        out: &mut Vec<Inline>,
    ) -> Result<(), ConvertError> {
        let target = match self.resolver.resolve(dest) {
            Ok(Resolution::External(url)) => LinkTarget::Url(url),
            Ok(Resolution::Anchor(anchor)) => LinkTarget::Anchor(anchor),
            Ok(Resolution::Page {
                page_id,
                title,
                space_key,
                fragment,
            }) => LinkTarget::Url(links::page_url(
                &self.config.site,
                self.config.converter.webui_links,
                space_key.as_deref(),
                &page_id,
                &title,
                fragment.as_deref(),
            )),
            Ok(Resolution::Attachment { path, written }) => {
                LinkTarget::Attachment(self.attach_file(&path, &written))
            }
            Err(error) => {
                self.tolerate(dest, error)?;
                out.extend(content);
                return Ok(());
            }
        };
        out.push(Inline::Link { target, content });
        Ok(())
    }

    /// An unresolvable target is an error in strict mode. Otherwise it is
    /// logged and the caller keeps only the visible text.
    fn tolerate(&self, dest: &str, error: LinkError) -> Result<(), ConvertError> {
        if self.config.converter.force_valid_url {
            return Err(ConvertError::Link(error));
        }
        log::warn!("{}: {error}; keeping {dest:?} as plain text", self.relative);
        Ok(())
    }

    fn inline_visual(
        &mut self,
        dest: &str,
        title: &str,
        alt: &str,
        out: &mut Vec<Inline>,
    ) -> Result<(), ConvertError> {
        match self.visual(dest, title, alt, false)? {
            Visual::Image(image) => out.push(Inline::Image(image)),
            Visual::SourceLink(name) => out.push(attachment_link(name, alt)),
            Visual::Text(text) => push_text(&text, out),
            // Only produced for block references.
            Visual::Diagram(diagram) => out.push(attachment_link(diagram.attachment, alt)),
        }
        Ok(())
    }

    /// Image reference, block or inline.
    fn visual(
        &mut self,
        dest: &str,
        title: &str,
        alt: &str,
        block: bool,
    ) -> Result<Visual, ConvertError> {
        let source = match self.resolver.resolve(dest) {
            Ok(Resolution::External(url)) => ImageSource::Url(url),
            Ok(Resolution::Anchor(anchor)) => ImageSource::Url(format!("#{anchor}")),
            Ok(Resolution::Page {
                page_id,
                title: page_title,
                space_key,
                fragment,
            }) => ImageSource::Url(links::page_url(
                &self.config.site,
                self.config.converter.webui_links,
                space_key.as_deref(),
                &page_id,
                &page_title,
                fragment.as_deref(),
            )),
            Ok(Resolution::Attachment { path, written }) => {
                match images::classify(&path) {
                    ImageKind::Diagram(DiagramKind::Drawio) => {
                        return self.drawio_file(&path, &written, false, block);
                    }
                    ImageKind::DrawioExport if !self.renders(DiagramKind::Drawio) => {
                        return self.drawio_file(&path, &written, true, block);
                    }
                    ImageKind::Diagram(kind) => {
                        let text = std::fs::read_to_string(&path)?;
                        return self.diagram(&text, kind, block);
                    }
                    _ => {}
                }
                let chosen = self.preferred(&path);
                let name = self.attach_file(&path, &written);
                let mut image = Image::new(ImageSource::Attachment(name));
                image.natural = images::natural_size(&chosen);
                return Ok(Visual::Image(self.decorate(image, title, alt, block)));
            }
            Err(error) => {
                self.tolerate(dest, error)?;
                return Ok(Visual::Text(alt.to_string()));
            }
        };
        Ok(Visual::Image(self.decorate(
            Image::new(source),
            title,
            alt,
            block,
        )))
    }

    fn decorate(&self, mut image: Image, title: &str, alt: &str, block: bool) -> Image {
        image.alt = (!alt.is_empty()).then(|| alt.to_string());
        image.title = (!title.is_empty()).then(|| title.to_string());
        if block {
            image.caption = image.title.clone().or_else(|| image.alt.clone());
            image.alignment = Some(self.layout.image_alignment());
            image.max_width = self.layout.image.max_width;
        }
        image
    }

    fn preferred(&self, path: &Path) -> PathBuf {
        if self.config.converter.prefer_raster {
            images::prefer_raster(path)
        } else {
            path.to_path_buf()
        }
    }

    /// Register a local file as an attachment and return its name.
    ///
    /// With raster preference a vector file is swapped for its raster twin
    /// and the written path follows the swap.
    fn attach_file(&mut self, path: &Path, written: &str) -> String {
        let chosen = self.preferred(path);
        let written = if chosen != path {
            Path::new(written)
                .with_extension("png")
                .to_string_lossy()
                .replace('\\', "/")
        } else {
            written.to_string()
        };
        let name = naming::attachment_name(&written);
        self.attach(AttachmentUpload {
            content_type: images::content_type(&name).to_string(),
            name: name.clone(),
            data: AttachmentData::File(chosen),
        });
        name
    }

    fn attach(&mut self, upload: AttachmentUpload) {
        if let Some(existing) = self.attachments.get(&upload.name)
            && existing.data != upload.data
        {
            log::warn!(
                "{}: two files map to attachment name {}; keeping the first",
                self.relative,
                upload.name
            );
            return;
        }
        self.attachments.insert(upload.name.clone(), upload);
    }
}

/// Status color of a `![label][STATUS-COLOR]` pseudo-image.
fn status_label(dest: &str, link_type: LinkType) -> Option<StatusColor> {
    match link_type {
        LinkType::Reference
        | LinkType::ReferenceUnknown
        | LinkType::Collapsed
        | LinkType::CollapsedUnknown
        | LinkType::Shortcut
        | LinkType::ShortcutUnknown => StatusColor::from_label(&dest.to_ascii_uppercase()),
        _ => None,
    }
}

/// Blockquote children without their `NOTE:`-style prefix, and its kind.
fn strip_alert_prefix(children: &[Block]) -> Option<(CalloutKind, Vec<Block>)> {
    let Some(Block::Paragraph { spans, source }) = children.first() else {
        return None;
    };
    let Some(Span::Text(first)) = spans.first() else {
        return None;
    };
    let trimmed = first.trim_start();
    let (prefix, kind) = ALERT_PREFIXES
        .iter()
        .find(|(prefix, _)| trimmed.starts_with(prefix))?;

    let mut spans = spans.clone();
    let rest = trimmed[prefix.len()..].trim_start().to_string();
    if rest.is_empty() {
        spans.remove(0);
        while matches!(spans.first(), Some(Span::SoftBreak | Span::HardBreak)) {
            spans.remove(0);
        }
    } else {
        spans[0] = Span::Text(rest);
    }
    let mut stripped = children.to_vec();
    if spans.is_empty() {
        stripped.remove(0);
    } else {
        stripped[0] = Block::Paragraph {
            spans,
            source: source.clone(),
        };
    }
    Some((*kind, stripped))
}

fn attachment_link(name: String, text: &str) -> Inline {
    let label = if text.is_empty() { name.clone() } else { text.to_string() };
    Inline::Link {
        target: LinkTarget::Attachment(name),
        content: vec![Inline::Text(label)],
    }
}

/// Push text, turning known `:shortcode:` emoji into emoticons.
fn push_text(text: &str, out: &mut Vec<Inline>) {
    let mut last = 0;
    for capture in EMOJI.captures_iter(text) {
        let (Some(whole), Some(code)) = (capture.get(0), capture.get(1)) else {
            continue;
        };
        let Some((_, emoticon)) = EMOTICONS.iter().find(|(c, _)| *c == code.as_str()) else {
            continue;
        };
        if whole.start() > last {
            out.push(Inline::Text(text[last..whole.start()].to_string()));
        }
        out.push(Inline::Emoticon(*emoticon));
        last = whole.end();
    }
    if last < text.len() {
        out.push(Inline::Text(text[last..].to_string()));
    }
}

/// `color` and `background-color` of an inline style, palette-mapped.
fn parse_colors(style: &str) -> (Option<String>, Option<String>) {
    let mut color = None;
    let mut background = None;
    for declaration in style.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        match property.trim().to_ascii_lowercase().as_str() {
            "color" => color = Some(palette(value)),
            "background-color" | "background" => background = Some(palette(value)),
            _ => {}
        }
    }
    (color, background)
}

fn column_align(alignment: &pulldown_cmark::Alignment) -> ColumnAlign {
    match alignment {
        pulldown_cmark::Alignment::None => ColumnAlign::None,
        pulldown_cmark::Alignment::Left => ColumnAlign::Left,
        pulldown_cmark::Alignment::Center => ColumnAlign::Center,
        pulldown_cmark::Alignment::Right => ColumnAlign::Right,
    }
}
