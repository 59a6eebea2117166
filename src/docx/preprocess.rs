//! Repair template tags before parsing
//!
//! Word freely splits typed text into several runs (spell-check marks, edit
//! sessions, formatting changes), so a tag the author typed as
//! `{{ full_name }}` is often stored as
//! `{{ full_</w:t></w:r><w:r><w:t>name }}`. The passes here glue such tags
//! back together and expand the structural `{%p ... %}` family.

use std::sync::OnceLock;

use regex::Regex;

use super::xml::unescape;

/// Tag prefixes that swallow their enclosing element, outermost first
const STRUCTURAL_TAGS: &[(&str, &str)] = &[("tr", "w:tr"), ("tc", "w:tc"), ("p", "w:p"), ("r", "w:r")];

fn split_opener() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(?:<[^>]*>)+([{%#])").expect("valid regex"))
}

fn split_closer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([%}#])(?:<[^>]*>)+\}").expect("valid regex"))
}

fn markup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// Run every pass in order
pub fn preprocess(xml: &str) -> String {
    let joined = join_split_delimiters(xml);
    let cleaned = clean_tags(&joined);
    expand_structural_tags(&cleaned)
}

/// `{</w:t><w:t>{` -> `{{` and `}</w:t><w:t>}` -> `}}` (same for `%` and `#`)
pub fn join_split_delimiters(xml: &str) -> String {
    let opened = split_opener().replace_all(xml, "{$1");
    split_closer().replace_all(&opened, "${1}}").into_owned()
}

fn closer_for(opener: &str) -> &'static str {
    match opener {
        "{{" => "}}",
        "{%" => "%}",
        _ => "#}",
    }
}

/// Strip markup from inside tags, decode entities and straighten quotes
pub fn clean_tags(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut pos = 0;

    while let Some((at, opener)) = ["{{", "{%", "{#"]
        .iter()
        .filter_map(|o| xml[pos..].find(o).map(|i| (pos + i, *o)))
        .min_by_key(|(i, _)| *i)
    {
        let body_start = at + 2;
        let Some(close_offset) = xml[body_start..].find(closer_for(opener)) else {
            break;
        };
        let close = body_start + close_offset;

        out.push_str(&xml[pos..body_start]);
        let stripped = markup().replace_all(&xml[body_start..close], "");
        out.push_str(&straighten_quotes(&unescape(&stripped)));
        pos = close;
    }

    out.push_str(&xml[pos..]);
    out
}

fn straighten_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' => '\'',
            // Word tends to insert non-breaking spaces after typed quotes
            '\u{00A0}' => ' ',
            other => other,
        })
        .collect()
}

/// Start of the innermost `<{name}>` / `<{name} ...>` opened before `at`
fn enclosing_start(xml: &str, at: usize, name: &str) -> Option<usize> {
    let needle = format!("<{}", name);
    let mut search_end = at;
    while let Some(found) = xml[..search_end].rfind(&needle) {
        let next = xml.as_bytes().get(found + needle.len()).copied();
        if matches!(next, Some(b' ') | Some(b'>')) {
            return Some(found);
        }
        search_end = found;
    }
    None
}

/// Replace the element enclosing each `{%tr ... %}` (etc.) with the bare tag
///
/// `{%tr for x in rows %}` inside a table row becomes `{% for x in rows %}`
/// in place of that whole row, so loops and conditions can repeat or drop
/// rows, cells, paragraphs and runs. Only statement tags are structural:
/// an output tag must stay inside a run to produce valid markup.
pub fn expand_structural_tags(xml: &str) -> String {
    let mut xml = xml.to_string();

    for (prefix, element) in STRUCTURAL_TAGS {
        let marker = format!("{{%{} ", prefix);
        let mut from = 0;
        while let Some(offset) = xml[from..].find(&marker) {
            let at = from + offset;
            let body_start = at + marker.len();
            let Some(close_offset) = xml[body_start..].find("%}") else {
                break;
            };
            let tag_end = body_start + close_offset + 2;
            let tag = format!("{{% {}", &xml[body_start..tag_end]);

            let end_tag = format!("</{}>", element);
            let span = enclosing_start(&xml, at, element).and_then(|start| {
                xml[tag_end..]
                    .find(&end_tag)
                    .map(|end| start..tag_end + end + end_tag.len())
            });
            let span = span.unwrap_or(at..tag_end);

            xml.replace_range(span.clone(), &tag);
            from = span.start + tag.len();
        }
    }

    xml
}
