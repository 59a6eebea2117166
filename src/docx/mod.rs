//! DOCX container, part XML and media handling

pub mod image;
pub mod package;
pub mod preprocess;
pub mod xml;

pub use image::{ImageError, ImageFormat, ImageSource, ImageSpec};
pub use package::{Package, PackageError, PartMedia};
pub use preprocess::preprocess;
