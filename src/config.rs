//! Fill configuration
//!
//! Settings come from four layers, each overriding the one before: built-in
//! defaults, an optional TOML file, keys embedded in the data file itself
//! (`empty_placeholder`, `checkbox_symbols`), and CLI flags.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors that can occur when loading or parsing a config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Settings given on the command line, layered over every other source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub empty_placeholder: Option<String>,
    pub min_score: Option<f64>,
    /// Only ever switches strict mode on
    pub strict: bool,
}

/// Symbols written by `checkbox(group, option)`
#[derive(Debug, Clone, PartialEq)]
pub struct CheckboxSymbols {
    pub checked: String,
    pub unchecked: String,
}

impl Default for CheckboxSymbols {
    fn default() -> Self {
        Self {
            checked: "☑".to_string(),
            unchecked: "☐".to_string(),
        }
    }
}

/// Settings for label-matching fills
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorConfig {
    /// Minimum similarity (0..1) for a label to count as found
    pub min_score: f64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self { min_score: 0.62 }
    }
}

/// Configuration for a fill run
#[derive(Debug, Clone, PartialEq)]
pub struct FillConfig {
    /// Written wherever a value is missing or blank
    pub empty_placeholder: String,
    pub checkbox: CheckboxSymbols,
    pub anchors: AnchorConfig,
    /// Treat undefined template variables as errors instead of empty text
    pub strict: bool,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            empty_placeholder: "—".to_string(),
            checkbox: CheckboxSymbols::default(),
            anchors: AnchorConfig::default(),
            strict: false,
        }
    }
}

/// TOML structure for deserializing config files
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    empty_placeholder: Option<String>,
    strict: Option<bool>,
    checkbox: Option<TomlCheckbox>,
    anchors: Option<TomlAnchors>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlCheckbox {
    checked: Option<String>,
    unchecked: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlAnchors {
    min_score: Option<f64>,
}

impl FillConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;
        let mut config = Self::default();

        if let Some(placeholder) = parsed.empty_placeholder {
            config.empty_placeholder = placeholder;
        }
        if let Some(strict) = parsed.strict {
            config.strict = strict;
        }
        if let Some(checkbox) = parsed.checkbox {
            if let Some(checked) = checkbox.checked {
                config.checkbox.checked = checked;
            }
            if let Some(unchecked) = checkbox.unchecked {
                config.checkbox.unchecked = unchecked;
            }
        }
        if let Some(min_score) = parsed.anchors.and_then(|a| a.min_score) {
            config.anchors.min_score = min_score;
        }

        Ok(config)
    }

    /// Apply settings carried inside the data file
    ///
    /// Recognizes top-level `empty_placeholder` (string) and
    /// `checkbox_symbols` (`{checked, unchecked}`); anything else is left
    /// alone. Keys with a non-string value are ignored.
    pub fn apply_data_overrides(&mut self, data: &JsonValue) {
        if let Some(placeholder) = data.get("empty_placeholder").and_then(JsonValue::as_str) {
            self.empty_placeholder = placeholder.to_string();
        }
        if let Some(symbols) = data.get("checkbox_symbols") {
            if let Some(checked) = symbols.get("checked").and_then(JsonValue::as_str) {
                self.checkbox.checked = checked.to_string();
            }
            if let Some(unchecked) = symbols.get("unchecked").and_then(JsonValue::as_str) {
                self.checkbox.unchecked = unchecked.to_string();
            }
        }
    }

    /// Layer data-file settings (when given) and then `overrides` on top
    pub fn layered(mut self, data: Option<&JsonValue>, overrides: &ConfigOverrides) -> Self {
        if let Some(data) = data {
            self.apply_data_overrides(data);
        }
        if let Some(placeholder) = &overrides.empty_placeholder {
            self.empty_placeholder = placeholder.clone();
        }
        if let Some(min_score) = overrides.min_score {
            self.anchors.min_score = min_score;
        }
        if overrides.strict {
            self.strict = true;
        }
        self
    }

    /// Set the placeholder for missing values
    pub fn with_empty_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.empty_placeholder = placeholder.into();
        self
    }

    /// Set the checkbox symbols
    pub fn with_checkbox_symbols(
        mut self,
        checked: impl Into<String>,
        unchecked: impl Into<String>,
    ) -> Self {
        self.checkbox = CheckboxSymbols {
            checked: checked.into(),
            unchecked: unchecked.into(),
        };
        self
    }

    /// Set the minimum anchor similarity
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.anchors.min_score = min_score;
        self
    }

    /// Enable or disable strict undefined handling
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
