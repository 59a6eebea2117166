//! Lightweight WordprocessingML helpers
//!
//! Document parts are edited as text: the scanner here only finds element
//! boundaries so that callers can splice replacement markup into the
//! original string. Everything outside the spliced range stays byte-for-byte
//! identical, which is what keeps the template's formatting intact.

use std::borrow::Cow;
use std::ops::Range;

/// An element located in a document part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified tag name, e.g. `w:p`
    pub name: String,
    /// From `<` of the start tag to just past the end tag
    pub range: Range<usize>,
    /// Content between the start and end tags (empty for `<x/>`)
    pub inner: Range<usize>,
}

impl Element {
    /// The start tag text, e.g. `<w:p w:rsidR="00AB">`
    pub fn start_tag<'x>(&self, xml: &'x str) -> &'x str {
        if self.inner.is_empty() && self.inner.start == self.range.end {
            &xml[self.range.clone()]
        } else {
            &xml[self.range.start..self.inner.start]
        }
    }

    pub fn is_self_closing(&self, xml: &str) -> bool {
        self.start_tag(xml).ends_with("/>")
    }
}

/// One markup tag found by [`scan_tag`]
#[derive(Debug, PartialEq, Eq)]
enum Tag<'x> {
    Start { name: &'x str, self_closing: bool },
    End,
    /// Comment, processing instruction, doctype or CDATA
    Other,
}

/// Find the `>` that closes a tag starting at `from`, ignoring quoted `>`
fn tag_end(xml: &str, from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, &b) in xml.as_bytes()[from..].iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (None, b'>') => return Some(from + offset),
            _ => {}
        }
    }
    None
}

/// Classify the tag starting at `at` (which must point at `<`)
///
/// Returns the tag and the offset just past it.
fn scan_tag(xml: &str, at: usize) -> Option<(Tag<'_>, usize)> {
    let rest = &xml[at..];
    for (open, close) in [("<!--", "-->"), ("<![CDATA[", "]]>"), ("<?", "?>")] {
        if rest.starts_with(open) {
            let end = rest.find(close)? + close.len();
            return Some((Tag::Other, at + end));
        }
    }
    let end = tag_end(xml, at)?;
    if rest.starts_with("<!") {
        return Some((Tag::Other, end + 1));
    }
    if rest.starts_with("</") {
        return Some((Tag::End, end + 1));
    }

    let body = &xml[at + 1..end];
    let name_len = body
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(body.len());
    let tag = Tag::Start {
        name: &body[..name_len],
        self_closing: body.ends_with('/'),
    };
    Some((tag, end + 1))
}

/// Direct child elements inside `range`
///
/// Text between children is skipped. Stops early on malformed markup.
pub fn children(xml: &str, range: Range<usize>) -> Vec<Element> {
    let mut out = Vec::new();
    let mut pos = range.start;
    let mut depth = 0usize;
    // (name, start, inner_start) of the child currently open at depth 1
    let mut open: Option<(String, usize, usize)> = None;

    while pos < range.end {
        let Some(offset) = xml[pos..range.end].find('<') else {
            break;
        };
        let at = pos + offset;
        let Some((tag, next)) = scan_tag(xml, at) else {
            break;
        };

        match tag {
            Tag::Start {
                name,
                self_closing: true,
            } => {
                if depth == 0 {
                    out.push(Element {
                        name: name.to_string(),
                        range: at..next,
                        inner: next..next,
                    });
                }
            }
            Tag::Start { name, .. } => {
                if depth == 0 {
                    open = Some((name.to_string(), at, next));
                }
                depth += 1;
            }
            Tag::End => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some((name, start, inner_start)) = open.take() {
                        out.push(Element {
                            name,
                            range: start..next,
                            inner: inner_start..at,
                        });
                    }
                }
            }
            Tag::Other => {}
        }
        pos = next;
    }

    out
}

/// Direct children with the given name
pub fn children_named(xml: &str, range: Range<usize>, name: &str) -> Vec<Element> {
    children(xml, range)
        .into_iter()
        .filter(|e| e.name == name)
        .collect()
}

/// First element with the given name anywhere inside `range` (depth-first)
pub fn find_first(xml: &str, range: Range<usize>, name: &str) -> Option<Element> {
    for child in children(xml, range) {
        if child.name == name {
            return Some(child);
        }
        if let Some(found) = find_first(xml, child.inner.clone(), name) {
            return Some(found);
        }
    }
    None
}

/// The root element of a part (skipping the XML declaration)
pub fn root_element(xml: &str) -> Option<Element> {
    children(xml, 0..xml.len()).into_iter().next()
}

/// Escape text for use in element content or attribute values
pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Resolve the predefined entities and numeric character references
pub fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let decoded = after.find(';').and_then(|semi| {
            let entity = &after[1..semi];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &after[len..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Escape a value for insertion inside an open `<w:t>` element
///
/// Line breaks and tabs close the current text element, emit `<w:br/>` /
/// `<w:tab/>`, and reopen a text element in the same run.
pub fn escape_run_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut first = true;
    for line in text.split('\n') {
        if !first {
            out.push_str("</w:t><w:br/><w:t xml:space=\"preserve\">");
        }
        first = false;
        let mut first_segment = true;
        for segment in line.trim_end_matches('\r').split('\t') {
            if !first_segment {
                out.push_str("</w:t><w:tab/><w:t xml:space=\"preserve\">");
            }
            first_segment = false;
            out.push_str(&escape(segment));
        }
    }
    out
}

/// Run content (`<w:t>` plus breaks/tabs) for a complete replacement text
fn run_content(text: &str) -> String {
    format!("<w:t xml:space=\"preserve\">{}</w:t>", escape_run_text(text))
}

/// Elements that may wrap runs inside a paragraph
const RUN_CONTAINERS: &[&str] = &["w:hyperlink", "w:ins", "w:smartTag", "w:customXml", "w:fldSimple"];

/// Runs of a paragraph in document order, looking through hyperlinks etc.
pub fn paragraph_runs(xml: &str, paragraph: &Element) -> Vec<Element> {
    fn collect(xml: &str, range: Range<usize>, out: &mut Vec<Element>) {
        for child in children(xml, range) {
            if child.name == "w:r" {
                out.push(child);
            } else if RUN_CONTAINERS.contains(&child.name.as_str()) {
                collect(xml, child.inner.clone(), out);
            }
        }
    }
    let mut runs = Vec::new();
    collect(xml, paragraph.inner.clone(), &mut runs);
    runs
}

/// Visible text of a paragraph (`w:t` content, tabs and breaks)
pub fn paragraph_text(xml: &str, paragraph: &Element) -> String {
    let mut text = String::new();
    for run in paragraph_runs(xml, paragraph) {
        for child in children(xml, run.inner.clone()) {
            match child.name.as_str() {
                "w:t" => text.push_str(&unescape(&xml[child.inner.clone()])),
                "w:tab" => text.push('\t'),
                "w:br" | "w:cr" => text.push('\n'),
                _ => {}
            }
        }
    }
    text
}

/// Rebuild a paragraph so that it holds exactly `text`
///
/// Paragraph properties and the first run's properties are kept; every other
/// run is dropped.
pub fn replace_paragraph_text(xml: &str, paragraph: &Element, text: &str) -> String {
    let start_tag = open_tag(xml, paragraph);

    let p_pr = children_named(xml, paragraph.inner.clone(), "w:pPr")
        .into_iter()
        .next()
        .map(|e| xml[e.range].to_string())
        .unwrap_or_default();

    let r_pr = paragraph_runs(xml, paragraph)
        .into_iter()
        .next()
        .and_then(|run| children_named(xml, run.inner.clone(), "w:rPr").into_iter().next())
        .map(|e| xml[e.range].to_string())
        .unwrap_or_default();

    format!(
        "{}{}<w:r>{}{}</w:r></w:p>",
        start_tag,
        p_pr,
        r_pr,
        run_content(text)
    )
}

/// Visible text of a table cell: its paragraphs joined by newlines
pub fn cell_text(xml: &str, cell: &Element) -> String {
    children_named(xml, cell.inner.clone(), "w:p")
        .iter()
        .map(|p| paragraph_text(xml, p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rebuild a table cell so that it holds a single paragraph with `text`
///
/// Cell properties are kept, as is the formatting of the first paragraph.
pub fn replace_cell_text(xml: &str, cell: &Element, text: &str) -> String {
    let tc_pr = children_named(xml, cell.inner.clone(), "w:tcPr")
        .into_iter()
        .next()
        .map(|e| xml[e.range].to_string())
        .unwrap_or_default();

    let paragraph = match children_named(xml, cell.inner.clone(), "w:p").into_iter().next() {
        Some(p) => replace_paragraph_text(xml, &p, text),
        None => format!("<w:p><w:r>{}</w:r></w:p>", run_content(text)),
    };

    format!("{}{}{}</w:tc>", open_tag(xml, cell), tc_pr, paragraph)
}

/// Start tag of an element, turned into a non-empty start tag if needed
fn open_tag(xml: &str, element: &Element) -> String {
    let tag = element.start_tag(xml);
    if element.is_self_closing(xml) {
        format!("{}>", tag[..tag.len() - 2].trim_end())
    } else {
        tag.to_string()
    }
}

/// Insert `snippet` just before the end tag of the root element
pub fn insert_before_root_end(xml: &str, snippet: &str) -> String {
    let Some(root) = root_element(xml) else {
        return xml.to_string();
    };
    if root.is_self_closing(xml) {
        return format!(
            "{}{}{}</{}>{}",
            &xml[..root.range.start],
            open_tag(xml, &root),
            snippet,
            root.name,
            &xml[root.range.end..]
        );
    }
    format!(
        "{}{}{}",
        &xml[..root.inner.end],
        snippet,
        &xml[root.inner.end..]
    )
}

/// Make sure the root element declares `xmlns:{prefix}`
pub fn ensure_namespace(xml: &str, prefix: &str, uri: &str) -> String {
    let Some(root) = root_element(xml) else {
        return xml.to_string();
    };
    let tag = root.start_tag(xml);
    if tag.contains(&format!("xmlns:{}=", prefix)) {
        return xml.to_string();
    }
    let insert_at = root.range.start + tag.len() - if tag.ends_with("/>") { 2 } else { 1 };
    format!(
        "{} xmlns:{}=\"{}\"{}",
        &xml[..insert_at],
        prefix,
        uri,
        &xml[insert_at..]
    )
}
