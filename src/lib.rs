//! docx-fill - fill DOCX templates with JSON data
//!
//! Templates carry Jinja-style tags (`{{ name }}`, `{% if %}`, `{% for %}`)
//! typed directly into the document. Filling keeps every byte of the
//! document outside the tags, so the template's formatting survives.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use docx_fill::{fill_template, ConfigOverrides, FillConfig};
//!
//! let report = fill_template(
//!     Path::new("form.docx"),
//!     Path::new("data.json"),
//!     Path::new("filled.docx"),
//!     FillConfig::default(),
//!     &ConfigOverrides::default(),
//! )
//! .unwrap();
//! println!("rendered {} parts", report.parts);
//! ```

pub mod anchors;
pub mod config;
pub mod data;
pub mod docx;
pub mod error;
pub mod parser;
pub mod render;

pub use anchors::AnchorReport;
pub use config::{ConfigError, ConfigOverrides, FillConfig};
pub use data::DataError;
pub use docx::{Package, PackageError};
pub use error::ParseError;
pub use parser::{parse, Template};
pub use render::RenderError;

use std::path::Path;

use serde_json::Value as JsonValue;
use thiserror::Error;

use docx::PartMedia;
use render::Context;

/// Errors that can occur during a fill
#[derive(Debug, Error)]
pub enum FillError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Package(#[from] PackageError),

    /// Syntax errors in one document part
    #[error("template errors in {part}: {}", format_parse_errors(.errors))]
    Template {
        part: String,
        /// Part XML after tag repair, as it was parsed
        source_text: String,
        errors: Vec<ParseError>,
    },

    #[error("error rendering {part}: {error}")]
    Render {
        part: String,
        source_text: String,
        #[source]
        error: RenderError,
    },
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Bytes of context kept on each side of an error in a report
const EXCERPT_CONTEXT: usize = 80;

/// Cut the text around `span` out of a (usually single-line) part
fn excerpt(source: &str, span: &error::Span) -> (String, error::Span) {
    let mut start = span.start.saturating_sub(EXCERPT_CONTEXT).min(source.len());
    while !source.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (span.end + EXCERPT_CONTEXT).min(source.len());
    while !source.is_char_boundary(end) {
        end += 1;
    }
    let shifted = span.start.saturating_sub(start)..span.end.min(end).saturating_sub(start);
    (source[start..end].to_string(), shifted)
}

impl FillError {
    /// Human-readable report, with source context for template errors
    pub fn report(&self) -> String {
        match self {
            FillError::Template {
                part,
                source_text,
                errors,
            } => errors
                .iter()
                .map(|e| {
                    let (text, span) = excerpt(source_text, e.span());
                    let shifted = match e.clone() {
                        ParseError::Syntax {
                            message, expected, ..
                        } => ParseError::Syntax {
                            span,
                            message,
                            expected,
                        },
                        ParseError::Unclosed { closing, .. } => {
                            ParseError::Unclosed { span, closing }
                        }
                    };
                    shifted.format(&text, part)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            FillError::Render {
                part,
                source_text,
                error,
            } => {
                let (text, span) = excerpt(source_text, error.span());
                error::report(&text, part, span, &error.to_string(), error.to_string())
                    .unwrap_or_else(|| self.to_string())
            }
            other => other.to_string(),
        }
    }
}

/// Summary of a template fill
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Parts that contained tags and were rendered
    pub parts: usize,
    /// Inline drawings inserted
    pub images: usize,
}

/// Render every template part of an opened package in place
///
/// `data` must be a JSON object. Relative image paths are resolved against
/// `base_dir`. Settings embedded in the data are NOT applied here; callers
/// layer them into `config` first.
pub fn fill_package(
    package: &mut Package,
    data: &JsonValue,
    config: &FillConfig,
    base_dir: Option<&Path>,
) -> Result<FillReport, FillError> {
    if !data.is_object() {
        return Err(DataError::NotAnObject.into());
    }
    let images = data::image_specs(data, base_dir)?;
    let context = Context::new(data, config).with_images(images);
    let mut report = FillReport::default();

    for part in package.template_parts() {
        let source = docx::preprocess(package.part_str(&part)?);
        if !["{{", "{%", "{#"].iter().any(|o| source.contains(o)) {
            continue;
        }

        let template = parse(&source).map_err(|errors| FillError::Template {
            part: part.clone(),
            source_text: source.clone(),
            errors,
        })?;

        let mut media = PartMedia::new(package, part.as_str());
        let rendered = match render::render(&template, &context, &mut media) {
            Ok(xml) => xml,
            Err(error) => {
                return Err(FillError::Render {
                    part,
                    source_text: source,
                    error,
                })
            }
        };
        report.images += media.drawings();
        let xml = media.finish(rendered);

        tracing::info!(part = %part, "rendered part");
        package.set_part(&part, xml);
        report.parts += 1;
    }

    Ok(report)
}

/// Fill a template file with a JSON data file and save the result
///
/// Settings embedded in the data file override `config`; `overrides` win
/// over both.
pub fn fill_template(
    template: &Path,
    data_path: &Path,
    output: &Path,
    config: FillConfig,
    overrides: &ConfigOverrides,
) -> Result<FillReport, FillError> {
    let data = data::load_data(data_path)?;
    let config = config.layered(Some(&data), overrides);

    let mut package = Package::open(template)?;
    let report = fill_package(&mut package, &data, &config, data_path.parent())?;
    package.save(output)?;
    tracing::info!(
        parts = report.parts,
        images = report.images,
        output = %output.display(),
        "template fill complete"
    );
    Ok(report)
}

/// Fill a document by label matching and save the result
///
/// The data file is a field list here, so only `overrides` are layered
/// over `config`.
pub fn fill_by_anchors(
    template: &Path,
    data_path: &Path,
    output: &Path,
    config: FillConfig,
    overrides: &ConfigOverrides,
) -> Result<AnchorReport, FillError> {
    let data = data::load_data(data_path)?;
    let fields = anchors::load_fields(&data)?;
    let config = config.layered(None, overrides);

    let mut package = Package::open(template)?;
    let report = anchors::fill_anchors(&mut package, &fields, &config)?;
    package.save(output)?;
    tracing::info!(
        filled = report.filled,
        not_found = report.not_found.len(),
        "anchor fill complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_shifts_span() {
        let source = format!("{}{{{{ bad ) }}}}{}", "x".repeat(200), "y".repeat(200));
        let (text, span) = excerpt(&source, &(207..208));
        assert_eq!(&text[span.clone()], ")");
        assert!(text.len() <= 2 * EXCERPT_CONTEXT + 1);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let source = "é".repeat(100);
        let (text, _) = excerpt(&source, &(101..103));
        assert!(text.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_non_object_data_rejected() {
        let mut package = {
            use std::io::Write;
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<w:document/>").unwrap();
            Package::from_bytes(&zip.finish().unwrap().into_inner()).unwrap()
        };
        let err = fill_package(
            &mut package,
            &serde_json::json!([1, 2]),
            &FillConfig::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, FillError::Data(DataError::NotAnObject)));
    }
}
