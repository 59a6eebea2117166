//! Variables visible to a template

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use super::value::Value;
use crate::config::FillConfig;
use crate::docx::image::ImageSpec;

/// Read-only environment a part is rendered against
///
/// Names resolve to declared images first, then to top-level data keys.
/// Loop variables and `set` bindings live in the renderer and shadow both.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    data: &'a JsonValue,
    config: &'a FillConfig,
    images: BTreeMap<String, ImageSpec>,
}

impl<'a> Context<'a> {
    pub fn new(data: &'a JsonValue, config: &'a FillConfig) -> Self {
        Self {
            data,
            config,
            images: BTreeMap::new(),
        }
    }

    /// Make declared images available by name
    pub fn with_images(mut self, images: impl IntoIterator<Item = (String, ImageSpec)>) -> Self {
        self.images.extend(images);
        self
    }

    pub fn data(&self) -> &'a JsonValue {
        self.data
    }

    pub fn config(&self) -> &'a FillConfig {
        self.config
    }

    pub fn image(&self, name: &str) -> Option<&ImageSpec> {
        self.images.get(name)
    }

    /// Global lookup (images, then data keys)
    pub fn lookup(&self, name: &str) -> Value {
        if self.images.contains_key(name) {
            return Value::Image(name.to_string());
        }
        self.data
            .get(name)
            .map(Value::from)
            .unwrap_or(Value::Undefined)
    }

    /// The placeholder written for missing values
    pub fn placeholder(&self) -> Value {
        Value::Str(self.config.empty_placeholder.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::image::ImageSource;
    use serde_json::json;

    #[test]
    fn test_images_shadow_data_keys() {
        let data = json!({"logo": "text", "name": "Ivan"});
        let config = FillConfig::default();
        let spec = ImageSpec {
            source: ImageSource::Path("logo.png".into()),
            width_mm: None,
            height_mm: None,
        };
        let ctx = Context::new(&data, &config).with_images([("logo".to_string(), spec)]);

        assert_eq!(ctx.lookup("logo"), Value::Image("logo".to_string()));
        assert_eq!(ctx.lookup("name"), Value::from("Ivan"));
        assert_eq!(ctx.lookup("missing"), Value::Undefined);
        assert!(ctx.image("logo").is_some());
    }

    #[test]
    fn test_placeholder_from_config() {
        let data = json!({});
        let config = FillConfig::default().with_empty_placeholder("n/a");
        assert_eq!(Context::new(&data, &config).placeholder(), Value::from("n/a"));
    }
}
