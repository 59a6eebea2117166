//! Template evaluation
//!
//! A parsed [`Template`](crate::parser::Template) is rendered against a
//! [`Context`] into the final part XML. Text nodes are copied verbatim;
//! values are escaped for use inside a `<w:t>` element.

mod builtins;
pub mod context;
mod engine;
pub mod value;

use thiserror::Error;

use crate::docx::image::{ImageError, ImageSpec};
use crate::error::{report, Span};

pub use context::Context;
pub use engine::render;
pub use value::Value;

/// Errors that can occur while evaluating a template
#[derive(Debug, Error)]
pub enum RenderError {
    /// Raised in strict mode, and in lenient mode for arithmetic on an undefined value
    #[error("undefined variable '{name}'")]
    Undefined { name: String, span: Span },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String, span: Span },

    #[error("unknown filter '{name}'")]
    UnknownFilter { name: String, span: Span },

    #[error("unknown test '{name}'")]
    UnknownTest { name: String, span: Span },

    #[error("bad arguments to '{name}': {message}")]
    Arguments {
        name: String,
        message: String,
        span: Span,
    },

    #[error("{message}")]
    Type { message: String, span: Span },

    #[error("cannot insert image '{name}': {source}")]
    Image {
        name: String,
        span: Span,
        #[source]
        source: ImageError,
    },
}

impl RenderError {
    pub fn span(&self) -> &Span {
        match self {
            RenderError::Undefined { span, .. }
            | RenderError::UnknownFunction { span, .. }
            | RenderError::UnknownFilter { span, .. }
            | RenderError::UnknownTest { span, .. }
            | RenderError::Arguments { span, .. }
            | RenderError::Type { span, .. }
            | RenderError::Image { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let message = self.to_string();
        report(source, filename, self.span().clone(), &message, message.clone())
            .unwrap_or(message)
    }
}

/// Receives inline images as they are rendered
pub trait MediaSink {
    /// Store the image and return the markup that displays it
    ///
    /// The markup is inserted inside an open `<w:t>`.
    fn embed_image(&mut self, name: &str, spec: &ImageSpec) -> Result<String, ImageError>;
}
