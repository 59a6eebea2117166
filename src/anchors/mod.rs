//! Label-matching fills for documents without template tags
//!
//! Each field's label is located in the main document body by fuzzy
//! matching, and its value is written into the blank next to it.

mod fields;
mod fill;
pub mod similarity;

pub use fields::{load_fields, Field};
pub use fill::{find_anchor, fill_match, Location, Match};

use crate::config::FillConfig;
use crate::docx::package::{Package, PackageError, MAIN_PART};

/// Outcome of an anchor fill
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorReport {
    /// Number of fields written into the document
    pub filled: usize,
    /// Labels that no paragraph or cell matched well enough
    pub not_found: Vec<String>,
}

/// Fill every field into the main document part
pub fn fill_anchors(
    package: &mut Package,
    fields: &[Field],
    config: &FillConfig,
) -> Result<AnchorReport, PackageError> {
    let mut xml = package.part_str(MAIN_PART)?.to_string();
    let mut report = AnchorReport::default();

    for field in fields {
        let Some(found) = find_anchor(&xml, &field.anchor, config.anchors.min_score) else {
            tracing::info!(anchor = %field.anchor, "anchor not found");
            report.not_found.push(field.anchor.clone());
            continue;
        };
        tracing::debug!(
            anchor = %field.anchor,
            score = found.score,
            location = ?found.location,
            "anchor matched"
        );

        let value = if field.value.is_empty() {
            config.empty_placeholder.as_str()
        } else {
            field.value.as_str()
        };
        xml = fill_match(&xml, found.location, value);
        report.filled += 1;
    }

    package.set_part(MAIN_PART, xml);
    Ok(report)
}
