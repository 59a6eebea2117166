//! Writing values next to located labels

use std::sync::OnceLock;

use regex::Regex;

use super::similarity::{normalize, score};
use crate::docx::xml::{
    cell_text, children, children_named, find_first, paragraph_text, replace_cell_text,
    replace_paragraph_text, Element,
};

/// Text that counts as an empty value after a label
const DASHES: &[&str] = &["—", "-", "–"];

/// Three or more underscores mark a blank
fn blank_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_{3,}").expect("valid regex"))
}

/// Where a label was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Index among the top-level body paragraphs
    Paragraph(usize),
    /// Table, row and cell index among the top-level body tables
    Cell { table: usize, row: usize, col: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub location: Location,
    pub score: f64,
}

/// Top-level paragraphs and table cells of `word/document.xml`
#[derive(Debug)]
struct Body {
    paragraphs: Vec<Element>,
    /// `tables[t][r][c]`
    tables: Vec<Vec<Vec<Element>>>,
}

impl Body {
    fn scan(xml: &str) -> Self {
        let mut body = Body {
            paragraphs: Vec::new(),
            tables: Vec::new(),
        };
        let Some(root) = find_first(xml, 0..xml.len(), "w:body") else {
            return body;
        };

        for child in children(xml, root.inner) {
            match child.name.as_str() {
                "w:p" => body.paragraphs.push(child),
                "w:tbl" => body.tables.push(
                    children_named(xml, child.inner, "w:tr")
                        .into_iter()
                        .map(|row| children_named(xml, row.inner, "w:tc"))
                        .collect(),
                ),
                _ => {}
            }
        }
        body
    }

    fn cell(&self, table: usize, row: usize, col: usize) -> Option<&Element> {
        self.tables.get(table)?.get(row)?.get(col)
    }
}

/// Find the paragraph or cell that best matches `anchor`
///
/// Paragraphs are scored before cells; on equal scores the first candidate
/// wins. Returns `None` when nothing reaches `min_score`.
pub fn find_anchor(xml: &str, anchor: &str, min_score: f64) -> Option<Match> {
    let label = normalize(anchor);
    let body = Body::scan(xml);
    let mut best: Option<Match> = None;

    let mut consider = |location: Location, text: String| {
        if text.trim().is_empty() {
            return;
        }
        let score = score(&label, &text);
        if best.map_or(true, |b| score > b.score) {
            best = Some(Match { location, score });
        }
    };

    for (i, p) in body.paragraphs.iter().enumerate() {
        consider(Location::Paragraph(i), paragraph_text(xml, p));
    }
    for (t, rows) in body.tables.iter().enumerate() {
        for (r, cells) in rows.iter().enumerate() {
            for (c, cell) in cells.iter().enumerate() {
                consider(
                    Location::Cell {
                        table: t,
                        row: r,
                        col: c,
                    },
                    cell_text(xml, cell),
                );
            }
        }
    }

    best.filter(|m| m.score >= min_score)
}

/// Replace the first blank (`___`) in `text`
fn replace_blank(text: &str, value: &str) -> Option<String> {
    let found = blank_line().find(text)?;
    Some(format!("{}{}{}", &text[..found.start()], value, &text[found.end()..]))
}

fn is_dash(text: &str) -> bool {
    DASHES.contains(&text.trim())
}

fn splice(xml: &str, element: &Element, replacement: &str) -> String {
    format!(
        "{}{}{}",
        &xml[..element.range.start],
        replacement,
        &xml[element.range.end..]
    )
}

/// Fill `value` around the matched location and return the new XML
///
/// `value` must already be non-empty (the caller substitutes the
/// placeholder for blank values).
pub fn fill_match(xml: &str, location: Location, value: &str) -> String {
    let body = Body::scan(xml);
    match location {
        Location::Paragraph(index) => fill_paragraph(xml, &body, index, value),
        Location::Cell { table, row, col } => fill_cell(xml, &body, table, row, col, value),
    }
}

fn fill_paragraph(xml: &str, body: &Body, index: usize, value: &str) -> String {
    let Some(paragraph) = body.paragraphs.get(index) else {
        return xml.to_string();
    };
    let original = paragraph_text(xml, paragraph);

    // Label ____
    if let Some(text) = replace_blank(&original, value) {
        return splice(xml, paragraph, &replace_paragraph_text(xml, paragraph, &text));
    }

    // Label: <nothing or a dash>
    if let Some((left, right)) = original.split_once(':') {
        if right.trim().is_empty() || is_dash(right) {
            let text = format!("{}: {}", left.trim(), value);
            return splice(xml, paragraph, &replace_paragraph_text(xml, paragraph, &text));
        }
    }

    // Label
    // ____
    if let Some(next) = body.paragraphs.get(index + 1) {
        let next_text = paragraph_text(xml, next);
        if next_text.trim().is_empty() || blank_line().is_match(&next_text) {
            let text = replace_blank(&next_text, value)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| value.to_string());
            return splice(xml, next, &replace_paragraph_text(xml, next, &text));
        }
    }

    let text = format!("{} {}", original.trim_end(), value);
    splice(xml, paragraph, &replace_paragraph_text(xml, paragraph, &text))
}

fn fill_cell(xml: &str, body: &Body, table: usize, row: usize, col: usize, value: &str) -> String {
    if let Some(target) = body.cell(table, row, col + 1) {
        let current = cell_text(xml, target);
        let text = if let Some(text) = replace_blank(&current, value) {
            text
        } else if current.trim().is_empty() || is_dash(&current) {
            value.to_string()
        } else {
            format!("{} {}", current.trim_end(), value)
        };
        return splice(xml, target, &replace_cell_text(xml, target, &text));
    }

    let Some(cell) = body.cell(table, row, col) else {
        return xml.to_string();
    };
    let current = cell_text(xml, cell);
    let text = replace_blank(&current, value)
        .unwrap_or_else(|| format!("{} {}", current.trim_end(), value));
    splice(xml, cell, &replace_cell_text(xml, cell, &text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn p(text: &str) -> String {
        format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", text)
    }

    fn tc(text: &str) -> String {
        format!("<w:tc>{}</w:tc>", p(text))
    }

    fn doc(body: &str) -> String {
        format!("<w:document><w:body>{}<w:sectPr/></w:body></w:document>", body)
    }

    fn texts(xml: &str) -> Vec<String> {
        let body = Body::scan(xml);
        let mut out: Vec<String> = body.paragraphs.iter().map(|e| paragraph_text(xml, e)).collect();
        for rows in &body.tables {
            for cells in rows {
                for cell in cells {
                    out.push(cell_text(xml, cell));
                }
            }
        }
        out
    }

    #[test]
    fn test_find_prefers_exact_paragraph() {
        let xml = doc(&[p("Full name: ____"), p("Date of birth: ____")].concat());
        let m = find_anchor(&xml, "date of birth", 0.62).expect("found");
        assert_eq!(m.location, Location::Paragraph(1));
        assert_eq!(m.score, 0.95);
    }

    #[test]
    fn test_find_in_table_cell() {
        let xml = doc(&format!("{}<w:tbl><w:tr>{}{}</w:tr></w:tbl>", p("Intro"), tc("Passport"), tc("")));
        let m = find_anchor(&xml, "Passport", 0.62).expect("found");
        assert_eq!(m.location, Location::Cell { table: 0, row: 0, col: 0 });
    }

    #[test]
    fn test_find_below_threshold() {
        let xml = doc(&p("Something unrelated"));
        assert_eq!(find_anchor(&xml, "Passport number", 0.62), None);
    }

    #[test]
    fn test_fill_underscores() {
        let xml = doc(&p("Name: ______ (print)"));
        let out = fill_match(&xml, Location::Paragraph(0), "Ivan");
        assert_eq!(texts(&out), vec!["Name: Ivan (print)"]);
    }

    #[test]
    fn test_fill_after_colon() {
        let xml = doc(&[p("City:  -"), p("Phone:")].concat());
        let out = fill_match(&xml, Location::Paragraph(0), "Moscow");
        let out = fill_match(&out, Location::Paragraph(1), "123");
        assert_eq!(texts(&out), vec!["City: Moscow", "Phone: 123"]);
    }

    #[test]
    fn test_fill_next_paragraph() {
        let xml = doc(&[p("Address"), p(""), p("Other")].concat());
        let out = fill_match(&xml, Location::Paragraph(0), "Main st. 1");
        assert_eq!(texts(&out), vec!["Address", "Main st. 1", "Other"]);
    }

    #[test]
    fn test_fill_appends_as_last_resort() {
        let xml = doc(&[p("Citizenship"), p("Next")].concat());
        let out = fill_match(&xml, Location::Paragraph(0), "RU");
        assert_eq!(texts(&out), vec!["Citizenship RU", "Next"]);
    }

    #[test]
    fn test_fill_right_cell() {
        let xml = doc(&format!(
            "<w:tbl><w:tr>{}{}</w:tr><w:tr>{}{}</w:tr><w:tr>{}{}</w:tr></w:tbl>",
            tc("Name"),
            tc(""),
            tc("INN"),
            tc("____"),
            tc("Note"),
            tc("old")
        ));
        let out = fill_match(&xml, Location::Cell { table: 0, row: 0, col: 0 }, "Ivan");
        let out = fill_match(&out, Location::Cell { table: 0, row: 1, col: 0 }, "7701");
        let out = fill_match(&out, Location::Cell { table: 0, row: 2, col: 0 }, "new");
        assert_eq!(texts(&out), vec!["Name", "Ivan", "INN", "7701", "Note", "old new"]);
    }

    #[test]
    fn test_fill_last_cell_itself() {
        let xml = doc(&format!("<w:tbl><w:tr>{}</w:tr></w:tbl>", tc("Signature")));
        let out = fill_match(&xml, Location::Cell { table: 0, row: 0, col: 0 }, "Ivan");
        assert_eq!(texts(&out), vec!["Signature Ivan"]);
    }
}
