//! Markdown front end: source text to a light document tree.
//!
//! Generic CommonMark/GFM syntax is parsed by `pulldown-cmark`. Two block
//! constructs it does not know are split out first by a line scanner:
//!
//! ```text
//! !!! warning "Mind the gap"        admonition: keyword, optional title,
//!     Indented body, parsed         body is the indented lines below
//!     as Markdown.
//!
//! <details markdown="1">            collapsed section: summary plus body,
//! <summary>More</summary>           Markdown only with markdown="1",
//! Body text.                        opaque markup otherwise
//! </details>
//! ```
//!
//! Fenced code blocks are tracked so neither construct is detected inside
//! one. The event stream is folded into [`Block`]s and [`Span`]s; inline
//! HTML tags are paired into [`Span::Element`] where the closing tag is
//! found at the same level.

use pulldown_cmark::{
    BlockQuoteKind, BrokenLink, CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag,
    TagEnd,
};
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

static ADMONITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^!!!\s+([A-Za-z][\w-]*)(?:\s+"([^"]*)")?\s*$"#).expect("static regex")
});
static DETAILS_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}<details(\s[^>]*)?>").expect("static regex"));
static SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*<summary(?:\s[^>]*)?>(.*?)</summary>").expect("static regex")
});
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})").expect("static regex"));
static REFERENCE_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^ {0,3}\[([^\]]+)\]:\s*<?([^\s>]+)>?(?:\s+(?:"([^"]*)"|'([^']*)'|\(([^)]*)\)))?\s*$"#)
        .expect("static regex")
});
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A<([A-Za-z][A-Za-z0-9]*)((?:\s[^>]*?)?)\s*(/?)>\z").expect("static regex")
});
static HTML_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A</([A-Za-z][A-Za-z0-9]*)\s*>\z").expect("static regex"));
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("static regex")
});
static TAG_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

/// Elements without content.
const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input", "wbr"];

/// A parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph {
        spans: Vec<Span>,
        /// Markdown text of the paragraph, used for exact-token widgets.
        source: String,
    },
    /// Inline content outside a paragraph (tight list items).
    Plain(Vec<Span>),
    Heading {
        level: u8,
        spans: Vec<Span>,
    },
    BlockQuote {
        alert: Option<BlockQuoteKind>,
        children: Vec<Block>,
    },
    List {
        start: Option<u64>,
        items: Vec<Item>,
    },
    CodeBlock {
        info: String,
        content: String,
    },
    Html(String),
    Rule,
    Table {
        alignments: Vec<pulldown_cmark::Alignment>,
        head: Vec<Vec<Span>>,
        rows: Vec<Vec<Vec<Span>>>,
    },
    FootnoteDefinition {
        label: String,
        children: Vec<Block>,
    },
    Admonition {
        keyword: String,
        title: Option<String>,
        children: Vec<Block>,
    },
    Details {
        summary: String,
        body: DetailsBody,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailsBody {
    Markdown(Vec<Block>),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub checked: Option<bool>,
    pub children: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Span {
    Text(String),
    Code(String),
    Emphasis(Vec<Span>),
    Strong(Vec<Span>),
    Strikethrough(Vec<Span>),
    Link {
        dest: String,
        title: String,
        link_type: LinkType,
        children: Vec<Span>,
    },
    Image {
        dest: String,
        title: String,
        link_type: LinkType,
        /// Reference label, for `![alt][label]` forms.
        id: String,
        alt: Vec<Span>,
    },
    Math {
        source: String,
        display: bool,
    },
    FootnoteRef(String),
    /// Inline HTML element with its closing tag found.
    Element {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<Span>,
    },
    /// Unpaired inline HTML.
    Html(String),
    TaskMarker(bool),
    SoftBreak,
    HardBreak,
}

impl Document {
    /// Level and text of the only heading at the smallest level present.
    ///
    /// `None` when there are no headings or the top level occurs more than
    /// once. Only headings at the document level count.
    pub fn single_top_heading(&self) -> Option<(usize, String)> {
        let headings: Vec<(usize, u8, &[Span])> = self
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| match b {
                Block::Heading { level, spans } => Some((i, *level, spans.as_slice())),
                _ => None,
            })
            .collect();
        let top = headings.iter().map(|h| h.1).min()?;
        let mut at_top = headings.iter().filter(|h| h.1 == top);
        let (index, _, spans) = at_top.next()?;
        if at_top.next().is_some() {
            return None;
        }
        Some((*index, plain_text(spans).trim().to_string()))
    }
}

/// Concatenated text of spans, markup dropped.
pub fn plain_text(spans: &[Span]) -> String {
    let mut out = String::new();
    collect_text(spans, &mut out);
    out
}

fn collect_text(spans: &[Span], out: &mut String) {
    for span in spans {
        match span {
            Span::Text(t) | Span::Code(t) => out.push_str(t),
            Span::Math { source, .. } => out.push_str(source),
            Span::Emphasis(c) | Span::Strong(c) | Span::Strikethrough(c) => collect_text(c, out),
            Span::Link { children, .. } | Span::Element { children, .. } => {
                collect_text(children, out)
            }
            Span::Image { alt, .. } => collect_text(alt, out),
            Span::SoftBreak | Span::HardBreak => out.push(' '),
            Span::FootnoteRef(_) | Span::Html(_) | Span::TaskMarker(_) => {}
        }
    }
}

/// Parse a Markdown body.
pub fn parse(text: &str) -> Document {
    let definitions = reference_definitions(text);
    Document {
        blocks: parse_with(text, &definitions),
    }
}

fn parse_with(text: &str, definitions: &HashMap<String, (String, String)>) -> Vec<Block> {
    let mut blocks = Vec::new();
    for segment in segments(text) {
        match segment {
            Segment::Markdown(source) => blocks.extend(parse_markdown(&source, definitions)),
            Segment::Admonition {
                keyword,
                title,
                body,
            } => blocks.push(Block::Admonition {
                keyword,
                title,
                children: parse_with(&body, definitions),
            }),
            Segment::Details {
                summary,
                body,
                markdown,
            } => blocks.push(Block::Details {
                summary,
                body: if markdown {
                    DetailsBody::Markdown(parse_with(&body, definitions))
                } else {
                    DetailsBody::Literal(body.trim().to_string())
                },
            }),
        }
    }
    blocks
}

pub fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_MATH
        | Options::ENABLE_GFM
}

/// Link reference definitions of the whole document, keyed by lowercase
/// label. Segments are parsed separately, so definitions are shared
/// through the broken-link callback.
fn reference_definitions(text: &str) -> HashMap<String, (String, String)> {
    REFERENCE_DEF
        .captures_iter(text)
        .filter_map(|c| {
            let label = c.get(1)?.as_str().trim().to_lowercase();
            let dest = c.get(2)?.as_str().to_string();
            let title = c
                .get(3)
                .or_else(|| c.get(4))
                .or_else(|| c.get(5))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Some((label, (dest, title)))
        })
        .collect()
}

fn parse_markdown(text: &str, definitions: &HashMap<String, (String, String)>) -> Vec<Block> {
    let callback = |link: BrokenLink| {
        let reference = link.reference.to_string();
        if reference.to_ascii_uppercase().starts_with("STATUS-") {
            return Some((CowStr::from(reference), CowStr::from("")));
        }
        definitions
            .get(&reference.trim().to_lowercase())
            .map(|(dest, title)| (CowStr::from(dest.clone()), CowStr::from(title.clone())))
    };
    let parser =
        Parser::new_with_broken_link_callback(text, options(), Some(callback)).into_offset_iter();
    let mut builder = TreeBuilder {
        events: parser,
        source: text,
    };
    builder.blocks()
}

// ============================================================================
// Segment scanner
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Markdown(String),
    Admonition {
        keyword: String,
        title: Option<String>,
        body: String,
    },
    Details {
        summary: String,
        body: String,
        markdown: bool,
    },
}

fn segments(text: &str) -> Vec<Segment> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut out = Vec::new();
    let mut markdown = String::new();
    let mut fence: Option<String> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let bare = line.trim_end_matches(['\n', '\r']);

        if let Some(open) = &fence {
            if closes_fence(open, bare) {
                fence = None;
            }
            markdown.push_str(line);
            i += 1;
            continue;
        }
        if let Some(c) = FENCE.captures(bare) {
            fence = c.get(1).map(|m| m.as_str().to_string());
            markdown.push_str(line);
            i += 1;
            continue;
        }

        if let Some(c) = ADMONITION.captures(bare) {
            let keyword = c.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            let title = c.get(2).map(|m| m.as_str().to_string());
            let mut body = String::new();
            let mut j = i + 1;
            let mut last_content = i + 1;
            while j < lines.len() {
                let l = lines[j];
                if l.trim().is_empty() {
                    j += 1;
                    continue;
                }
                if dedent(l).is_none() {
                    break;
                }
                j += 1;
                last_content = j;
            }
            for l in &lines[i + 1..last_content] {
                if l.trim().is_empty() {
                    body.push('\n');
                } else {
                    body.push_str(dedent(l).unwrap_or(l));
                }
            }
            flush(&mut out, &mut markdown);
            out.push(Segment::Admonition {
                keyword,
                title,
                body,
            });
            i = last_content;
            continue;
        }

        if let Some(open) = DETAILS_OPEN.find(bare)
            && let Some(end) = details_end(&lines, i)
        {
            let raw: String = lines[i..=end].concat();
            let attributes = parse_attributes(
                DETAILS_OPEN
                    .captures(bare)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str())
                    .unwrap_or(""),
            );
            let after_open = &raw[open.end()..];
            let inner = match after_open.rfind("</details>") {
                Some(pos) => &after_open[..pos],
                None => after_open,
            };
            let (summary, body) = match SUMMARY.captures(inner) {
                Some(c) => {
                    let whole = c.get(0).map(|m| m.end()).unwrap_or(0);
                    let text = c.get(1).map(|m| m.as_str()).unwrap_or("");
                    (
                        TAG_MARKUP.replace_all(text, "").trim().to_string(),
                        inner[whole..].to_string(),
                    )
                }
                None => (String::new(), inner.to_string()),
            };
            let markdown_attr = attributes
                .iter()
                .any(|(k, v)| k == "markdown" && matches!(v.as_str(), "1" | "block"));
            flush(&mut out, &mut markdown);
            out.push(Segment::Details {
                summary,
                body,
                markdown: markdown_attr,
            });
            i = end + 1;
            continue;
        }

        markdown.push_str(line);
        i += 1;
    }
    flush(&mut out, &mut markdown);
    out
}

/// Whether `line` closes a code fence opened with `open`.
fn closes_fence(open: &str, line: &str) -> bool {
    let marker = open.chars().next().unwrap_or('`');
    line.trim_start().starts_with(open) && line.trim().chars().all(|c| c == marker)
}

/// Byte ranges of fenced code blocks, fences included. An unclosed fence
/// runs to the end of the text.
pub fn fenced_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut open: Option<(String, usize)> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']);
        let end = offset + line.len();
        match open.take() {
            Some((fence, start)) => {
                if closes_fence(&fence, bare) {
                    ranges.push(start..end);
                } else {
                    open = Some((fence, start));
                }
            }
            None => {
                if let Some(c) = FENCE.captures(bare) {
                    open = c.get(1).map(|m| (m.as_str().to_string(), offset));
                }
            }
        }
        offset = end;
    }
    if let Some((_, start)) = open {
        ranges.push(start..text.len());
    }
    ranges
}

fn flush(out: &mut Vec<Segment>, markdown: &mut String) {
    if !markdown.is_empty() {
        out.push(Segment::Markdown(std::mem::take(markdown)));
    }
}

/// Strip one level of admonition indentation: four spaces or a tab.
fn dedent(line: &str) -> Option<&str> {
    line.strip_prefix("    ").or_else(|| line.strip_prefix('\t'))
}

/// Line index holding the `</details>` that closes the one opened on `start`.
fn details_end(lines: &[&str], start: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    for (offset, line) in lines[start..].iter().enumerate() {
        depth += line.matches("<details").count() as i32;
        depth -= line.matches("</details>").count() as i32;
        if depth <= 0 {
            return Some(start + offset);
        }
    }
    None
}

/// Parse HTML attribute text into name/value pairs.
pub fn parse_attributes(text: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(text)
        .filter_map(|c| {
            let name = c.get(1)?.as_str().to_ascii_lowercase();
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

// ============================================================================
// Event folding
// ============================================================================

struct TreeBuilder<'a, I> {
    events: I,
    source: &'a str,
}

impl<'a, I> TreeBuilder<'a, I>
where
    I: Iterator<Item = (Event<'a>, Range<usize>)>,
{
    /// Blocks up to the end of the enclosing container.
    fn blocks(&mut self) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut pending: Vec<Span> = Vec::new();

        while let Some((event, range)) = self.events.next() {
            let block = match event {
                Event::End(_) => break,
                Event::Start(Tag::Paragraph) => Some(Block::Paragraph {
                    spans: group_html(self.spans()),
                    source: self.source.get(range).unwrap_or("").trim().to_string(),
                }),
                Event::Start(Tag::Heading { level, .. }) => Some(Block::Heading {
                    level: level as u8,
                    spans: group_html(self.spans()),
                }),
                Event::Start(Tag::BlockQuote(alert)) => Some(Block::BlockQuote {
                    alert,
                    children: self.blocks(),
                }),
                Event::Start(Tag::List(start)) => Some(Block::List {
                    start,
                    items: self.items(),
                }),
                Event::Start(Tag::CodeBlock(kind)) => {
                    let info = match kind {
                        CodeBlockKind::Fenced(info) => info.trim().to_string(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    Some(Block::CodeBlock {
                        info,
                        content: self.text_until_end(),
                    })
                }
                Event::Start(Tag::HtmlBlock) => Some(Block::Html(self.text_until_end())),
                Event::Start(Tag::Table(alignments)) => Some(self.table(alignments)),
                Event::Start(Tag::FootnoteDefinition(label)) => Some(Block::FootnoteDefinition {
                    label: label.to_string(),
                    children: self.blocks(),
                }),
                Event::Start(Tag::Item) => {
                    // Stray item outside a list; keep its content.
                    blocks.extend(self.blocks());
                    None
                }
                Event::Rule => Some(Block::Rule),
                Event::Html(html) => Some(Block::Html(html.to_string())),
                other => {
                    if let Some(span) = self.inline(other) {
                        pending.push(span);
                    }
                    None
                }
            };
            if let Some(block) = block {
                if !pending.is_empty() {
                    blocks.push(Block::Plain(group_html(std::mem::take(&mut pending))));
                }
                blocks.push(block);
            }
        }
        if !pending.is_empty() {
            blocks.push(Block::Plain(group_html(pending)));
        }
        blocks
    }

    fn items(&mut self) -> Vec<Item> {
        let mut items = Vec::new();
        while let Some((event, _)) = self.events.next() {
            match event {
                Event::Start(Tag::Item) => {
                    let mut children = self.blocks();
                    let checked = take_task_marker(&mut children);
                    items.push(Item { checked, children });
                }
                Event::End(_) => break,
                _ => {}
            }
        }
        items
    }

    fn table(&mut self, alignments: Vec<pulldown_cmark::Alignment>) -> Block {
        let mut head = Vec::new();
        let mut rows = Vec::new();
        while let Some((event, _)) = self.events.next() {
            match event {
                Event::Start(Tag::TableHead) => head = self.cells(),
                Event::Start(Tag::TableRow) => rows.push(self.cells()),
                Event::End(TagEnd::Table) => break,
                _ => {}
            }
        }
        Block::Table {
            alignments,
            head,
            rows,
        }
    }

    fn cells(&mut self) -> Vec<Vec<Span>> {
        let mut cells = Vec::new();
        while let Some((event, _)) = self.events.next() {
            match event {
                Event::Start(Tag::TableCell) => cells.push(group_html(self.spans())),
                Event::End(_) => break,
                _ => {}
            }
        }
        cells
    }

    fn text_until_end(&mut self) -> String {
        let mut text = String::new();
        for (event, _) in self.events.by_ref() {
            match event {
                Event::Text(t) | Event::Html(t) | Event::InlineHtml(t) => text.push_str(&t),
                Event::End(_) => break,
                _ => {}
            }
        }
        text
    }

    /// Inline spans up to the end of the enclosing inline container.
    fn spans(&mut self) -> Vec<Span> {
        let mut spans = Vec::new();
        while let Some((event, _)) = self.events.next() {
            if let Event::End(_) = event {
                break;
            }
            if let Some(span) = self.inline(event) {
                spans.push(span);
            }
        }
        spans
    }

    fn inline(&mut self, event: Event<'a>) -> Option<Span> {
        Some(match event {
            Event::Text(t) => Span::Text(t.to_string()),
            Event::Code(t) => Span::Code(t.to_string()),
            Event::InlineMath(t) => Span::Math {
                source: t.to_string(),
                display: false,
            },
            Event::DisplayMath(t) => Span::Math {
                source: t.to_string(),
                display: true,
            },
            Event::InlineHtml(h) | Event::Html(h) => Span::Html(h.to_string()),
            Event::FootnoteReference(label) => Span::FootnoteRef(label.to_string()),
            Event::SoftBreak => Span::SoftBreak,
            Event::HardBreak => Span::HardBreak,
            Event::TaskListMarker(checked) => Span::TaskMarker(checked),
            Event::Start(Tag::Emphasis) => Span::Emphasis(self.spans()),
            Event::Start(Tag::Strong) => Span::Strong(self.spans()),
            Event::Start(Tag::Strikethrough) => Span::Strikethrough(self.spans()),
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                ..
            }) => Span::Link {
                dest: dest_url.to_string(),
                title: title.to_string(),
                link_type,
                children: self.spans(),
            },
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => Span::Image {
                dest: dest_url.to_string(),
                title: title.to_string(),
                link_type,
                id: id.to_string(),
                alt: self.spans(),
            },
            Event::Start(_) => {
                // Inline container without a dedicated span; keep the text.
                let children = self.spans();
                return Some(Span::Element {
                    name: "span".to_string(),
                    attributes: Vec::new(),
                    children,
                });
            }
            Event::Rule | Event::End(_) => return None,
        })
    }
}

/// Remove the task marker that opens an item and return its state.
fn take_task_marker(children: &mut [Block]) -> Option<bool> {
    let spans = match children.first_mut()? {
        Block::Plain(spans) | Block::Paragraph { spans, .. } => spans,
        _ => return None,
    };
    match spans.first() {
        Some(Span::TaskMarker(checked)) => {
            let checked = *checked;
            spans.remove(0);
            if let Some(Span::Text(t)) = spans.first_mut() {
                *t = t.trim_start().to_string();
            }
            Some(checked)
        }
        _ => None,
    }
}

/// Pair opening and closing inline HTML tags into elements.
///
/// Void elements become childless elements, `<br>` a hard break, and
/// comments are dropped. Tags without a partner stay as raw HTML.
fn group_html(spans: Vec<Span>) -> Vec<Span> {
    let mut out = Vec::new();
    let mut iter = spans.into_iter();
    let mut rest: Vec<Span> = Vec::new();

    while let Some(span) = iter.next() {
        let Span::Html(html) = &span else {
            out.push(nest(span));
            continue;
        };
        let html = html.trim();
        if html.starts_with("<!--") {
            continue;
        }
        let Some(open) = HTML_TAG.captures(html) else {
            out.push(span);
            continue;
        };
        let name = open.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        let attributes = parse_attributes(open.get(2).map(|m| m.as_str()).unwrap_or(""));
        let self_closing = open.get(3).is_some_and(|m| !m.as_str().is_empty());
        if name == "br" {
            out.push(Span::HardBreak);
            continue;
        }
        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            out.push(Span::Element {
                name,
                attributes,
                children: Vec::new(),
            });
            continue;
        }

        // Look ahead for the matching close tag.
        rest.clear();
        rest.extend(iter.by_ref());
        match matching_close(&rest, &name) {
            Some(close) => {
                let tail = rest.split_off(close + 1);
                rest.pop();
                out.push(Span::Element {
                    name,
                    attributes,
                    children: group_html(std::mem::take(&mut rest)),
                });
                iter = tail.into_iter();
            }
            None => {
                out.push(span);
                iter = std::mem::take(&mut rest).into_iter();
            }
        }
    }
    out
}

fn nest(span: Span) -> Span {
    match span {
        Span::Emphasis(c) => Span::Emphasis(group_html(c)),
        Span::Strong(c) => Span::Strong(group_html(c)),
        Span::Strikethrough(c) => Span::Strikethrough(group_html(c)),
        Span::Link {
            dest,
            title,
            link_type,
            children,
        } => Span::Link {
            dest,
            title,
            link_type,
            children: group_html(children),
        },
        other => other,
    }
}

fn matching_close(spans: &[Span], name: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, span) in spans.iter().enumerate() {
        let Span::Html(html) = span else { continue };
        let html = html.trim();
        if let Some(c) = HTML_CLOSE.captures(html) {
            if c.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case(name)) {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
        } else if let Some(c) = HTML_TAG.captures(html)
            && c.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case(name))
            && c.get(3).is_none_or(|m| m.as_str().is_empty())
        {
            depth += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(text: &str) -> Vec<Block> {
        parse(text).blocks
    }

    fn text(s: &str) -> Span {
        Span::Text(s.to_string())
    }

    // =========================================================================
    // Segments
    // =========================================================================

    #[test]
    fn admonition_with_title_and_indented_body() {
        let doc = blocks("Intro\n\n!!! warning \"Mind the gap\"\n    Body *text*.\n\n    Second.\n\nAfter\n");
        assert_eq!(doc.len(), 3);
        let Block::Admonition {
            keyword,
            title,
            children,
        } = &doc[1]
        else {
            panic!("expected admonition, got {:?}", doc[1]);
        };
        assert_eq!(keyword, "warning");
        assert_eq!(title.as_deref(), Some("Mind the gap"));
        assert_eq!(children.len(), 2);
        assert!(matches!(&doc[2], Block::Paragraph { source, .. } if source == "After"));
    }

    #[test]
    fn admonition_inside_fence_is_code() {
        let doc = blocks("```\n!!! note\n    x\n```\n");
        assert!(matches!(&doc[0], Block::CodeBlock { content, .. } if content.contains("!!! note")));
    }

    #[test]
    fn fenced_ranges_cover_fences() {
        let text = "a\n```rust\nx\n```\nb\n~~~~\nopen\n";
        let ranges = fenced_ranges(text);
        assert_eq!(ranges.len(), 2);
        assert_eq!(&text[ranges[0].clone()], "```rust\nx\n```\n");
        assert_eq!(&text[ranges[1].clone()], "~~~~\nopen\n");
    }

    #[test]
    fn details_literal_body() {
        let doc = blocks("<details>\n<summary>More <b>info</b></summary>\n<p>Body</p>\n</details>\n");
        assert_eq!(
            doc,
            vec![Block::Details {
                summary: "More info".into(),
                body: DetailsBody::Literal("<p>Body</p>".into()),
            }]
        );
    }

    #[test]
    fn details_markdown_body() {
        let doc = blocks("<details markdown=\"1\">\n<summary>More</summary>\n\n*Body*\n\n</details>\n");
        let Block::Details {
            body: DetailsBody::Markdown(children),
            ..
        } = &doc[0]
        else {
            panic!("expected markdown details");
        };
        assert!(matches!(&children[0], Block::Paragraph { spans, .. } if matches!(spans[0], Span::Emphasis(_))));
    }

    #[test]
    fn nested_details_close_at_matching_tag() {
        let doc = blocks(
            "<details>\n<summary>Outer</summary>\n<details><summary>Inner</summary>x</details>\n</details>\nTail\n",
        );
        assert_eq!(doc.len(), 2);
        assert!(matches!(&doc[1], Block::Paragraph { source, .. } if source == "Tail"));
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    #[test]
    fn headings_and_paragraph_source() {
        let doc = blocks("# Title\n\n[[_TOC_]]\n");
        assert!(matches!(&doc[0], Block::Heading { level: 1, spans } if spans == &vec![text("Title")]));
        assert!(matches!(&doc[1], Block::Paragraph { source, .. } if source == "[[_TOC_]]"));
    }

    #[test]
    fn single_top_heading_detection() {
        assert_eq!(
            parse("# Only\n\n## Sub\n").single_top_heading(),
            Some((0, "Only".to_string()))
        );
        assert_eq!(parse("## A\n\n## B\n").single_top_heading(), None);
        assert_eq!(
            parse("Intro\n\n## A\n\n### B\n").single_top_heading(),
            Some((1, "A".to_string()))
        );
        assert_eq!(parse("No headings\n").single_top_heading(), None);
    }

    #[test]
    fn task_list_items() {
        let doc = blocks("- [x] done\n- [ ] open\n- plain\n");
        let Block::List { items, .. } = &doc[0] else {
            panic!("expected list");
        };
        assert_eq!(items[0].checked, Some(true));
        assert_eq!(items[1].checked, Some(false));
        assert_eq!(items[2].checked, None);
        assert_eq!(items[0].children, vec![Block::Plain(vec![text("done")])]);
    }

    #[test]
    fn github_alert_kind() {
        let doc = blocks("> [!WARNING]\n> Careful\n");
        assert!(matches!(
            &doc[0],
            Block::BlockQuote {
                alert: Some(BlockQuoteKind::Warning),
                ..
            }
        ));
    }

    #[test]
    fn code_block_info_string() {
        let doc = blocks("```mermaid\ngraph TD\n```\n");
        assert_eq!(
            doc[0],
            Block::CodeBlock {
                info: "mermaid".into(),
                content: "graph TD\n".into()
            }
        );
    }

    #[test]
    fn table_cells() {
        let doc = blocks("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        let Block::Table {
            alignments,
            head,
            rows,
        } = &doc[0]
        else {
            panic!("expected table");
        };
        assert_eq!(alignments.len(), 2);
        assert_eq!(head[1], vec![text("b")]);
        assert_eq!(rows[0][0], vec![text("1")]);
    }

    // =========================================================================
    // Inlines
    // =========================================================================

    #[test]
    fn status_reference_image_kept() {
        let doc = blocks("![Done][STATUS-GREEN]\n");
        let Block::Paragraph { spans, .. } = &doc[0] else {
            panic!("expected paragraph");
        };
        assert!(matches!(&spans[0], Span::Image { id, .. } if id == "STATUS-GREEN"));
    }

    #[test]
    fn reference_definitions_shared_across_segments() {
        let doc = blocks("!!! note\n    See [the guide][g].\n\n[g]: guide.md\n");
        let Block::Admonition { children, .. } = &doc[0] else {
            panic!("expected admonition");
        };
        let Block::Paragraph { spans, .. } = &children[0] else {
            panic!("expected paragraph");
        };
        assert!(spans.iter().any(|s| matches!(s, Span::Link { dest, .. } if dest == "guide.md")));
    }

    #[test]
    fn inline_html_paired() {
        let doc = blocks("Some <span style=\"color: red\">red <b>bold</b></span> text<br>end\n");
        let Block::Paragraph { spans, .. } = &doc[0] else {
            panic!("expected paragraph");
        };
        let Span::Element {
            name,
            attributes,
            children,
        } = &spans[1]
        else {
            panic!("expected element, got {:?}", spans[1]);
        };
        assert_eq!(name, "span");
        assert_eq!(attributes, &vec![("style".into(), "color: red".into())]);
        assert!(matches!(&children[1], Span::Element { name, .. } if name == "b"));
        assert!(spans.contains(&Span::HardBreak));
    }

    #[test]
    fn unpaired_html_left_raw() {
        let doc = blocks("a <span> b\n");
        let Block::Paragraph { spans, .. } = &doc[0] else {
            panic!("expected paragraph");
        };
        assert!(spans.iter().any(|s| matches!(s, Span::Html(h) if h == "<span>")));
    }

    #[test]
    fn math_spans() {
        let doc = blocks("Inline $x^2$ here\n");
        let Block::Paragraph { spans, .. } = &doc[0] else {
            panic!("expected paragraph");
        };
        assert!(spans.contains(&Span::Math {
            source: "x^2".into(),
            display: false
        }));
    }

    #[test]
    fn attributes_in_all_quote_styles() {
        assert_eq!(
            parse_attributes(" type=\"date\" value='2024-01-02' open data-x=y"),
            vec![
                ("type".to_string(), "date".to_string()),
                ("value".to_string(), "2024-01-02".to_string()),
                ("open".to_string(), String::new()),
                ("data-x".to_string(), "y".to_string()),
            ]
        );
    }
}
