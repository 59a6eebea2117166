//! Inline images: formats, sizing and drawing markup

use std::path::PathBuf;

use thiserror::Error;

/// EMU (English Metric Units) per millimetre
const EMU_PER_MM: f64 = 36_000.0;
/// EMU per pixel at 96 DPI
const EMU_PER_PX: u64 = 9_525;

/// Errors that can occur while loading an image
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported image format ({what}); expected PNG, JPEG, GIF or BMP")]
    UnknownFormat { what: String },

    #[error("could not read the pixel size of this {format} image")]
    BadHeader { format: &'static str },

    #[error("image '{name}' is not declared under \"images\"")]
    Undeclared { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl ImageFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    /// Detect the format from magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.starts_with(b"BM") {
            Some(ImageFormat::Bmp)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Gif => "GIF",
            ImageFormat::Bmp => "BMP",
        }
    }
}

/// Where the image bytes come from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes { bytes: Vec<u8>, format: ImageFormat },
}

/// An image declared in the data file
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpec {
    pub source: ImageSource,
    pub width_mm: Option<f64>,
    pub height_mm: Option<f64>,
}

/// Image bytes with their detected format and pixel size
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width_px: u32,
    pub height_px: u32,
}

impl ImageSpec {
    pub fn load(&self) -> Result<LoadedImage, ImageError> {
        let (bytes, declared) = match &self.source {
            ImageSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
                    path: path.clone(),
                    source,
                })?;
                (bytes, None)
            }
            ImageSource::Bytes { bytes, format } => (bytes.clone(), Some(*format)),
        };

        let format = ImageFormat::sniff(&bytes)
            .or(declared)
            .ok_or_else(|| ImageError::UnknownFormat {
                what: match &self.source {
                    ImageSource::Path(path) => path.display().to_string(),
                    ImageSource::Bytes { .. } => "inline data".to_string(),
                },
            })?;
        let (width_px, height_px) = pixel_size(&bytes, format)?;

        Ok(LoadedImage {
            bytes,
            format,
            width_px,
            height_px,
        })
    }

    /// Displayed size in EMU
    ///
    /// Missing dimensions follow the pixel aspect ratio; with neither set the
    /// image is shown at its pixel size at 96 DPI.
    pub fn extent_emu(&self, width_px: u32, height_px: u32) -> (u64, u64) {
        let px_w = width_px.max(1) as f64;
        let px_h = height_px.max(1) as f64;
        match (self.width_mm, self.height_mm) {
            (Some(w), Some(h)) => (mm_to_emu(w), mm_to_emu(h)),
            (Some(w), None) => {
                let cx = mm_to_emu(w);
                (cx, (cx as f64 * px_h / px_w).round() as u64)
            }
            (None, Some(h)) => {
                let cy = mm_to_emu(h);
                ((cy as f64 * px_w / px_h).round() as u64, cy)
            }
            (None, None) => (
                width_px as u64 * EMU_PER_PX,
                height_px as u64 * EMU_PER_PX,
            ),
        }
    }
}

fn mm_to_emu(mm: f64) -> u64 {
    (mm * EMU_PER_MM).round() as u64
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u16::from_be_bytes([*bytes.get(at)?, *bytes.get(at + 1)?]) as u32)
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u16::from_le_bytes([*bytes.get(at)?, *bytes.get(at + 1)?]) as u32)
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn le_i32(bytes: &[u8], at: usize) -> Option<i32> {
    Some(i32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

/// Walk JPEG segments up to the first start-of-frame marker
fn jpeg_size(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 3 < bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        match marker {
            // Fill bytes
            0xFF => i += 1,
            // Standalone markers
            0x01 | 0xD0..=0xD7 => i += 2,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let height = be_u16(bytes, i + 5)?;
                let width = be_u16(bytes, i + 7)?;
                return Some((width, height));
            }
            _ => i += 2 + be_u16(bytes, i + 2)? as usize,
        }
    }
    None
}

/// Read the pixel size from the image header
pub fn pixel_size(bytes: &[u8], format: ImageFormat) -> Result<(u32, u32), ImageError> {
    let size = match format {
        ImageFormat::Png => be_u32(bytes, 16).zip(be_u32(bytes, 20)),
        ImageFormat::Gif => le_u16(bytes, 6).zip(le_u16(bytes, 8)),
        ImageFormat::Bmp => le_i32(bytes, 18)
            .zip(le_i32(bytes, 22))
            .map(|(w, h)| (w.unsigned_abs(), h.unsigned_abs())),
        ImageFormat::Jpeg => jpeg_size(bytes),
    };
    size.filter(|(w, h)| *w > 0 && *h > 0)
        .ok_or(ImageError::BadHeader {
            format: format.label(),
        })
}

/// `wp:inline` drawing wrapped so it can be dropped inside an open `<w:t>`
///
/// The markup closes the current text and run, adds a run holding the
/// drawing, and reopens a run so the rest of the original run still fits.
pub fn inline_drawing_xml(rel_id: &str, drawing_id: u32, file_name: &str, cx: u64, cy: u64) -> String {
    format!(
        concat!(
            "</w:t></w:r><w:r><w:drawing>",
            "<wp:inline distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\">",
            "<wp:extent cx=\"{cx}\" cy=\"{cy}\"/>",
            "<wp:docPr id=\"{id}\" name=\"Picture {id}\"/>",
            "<wp:cNvGraphicFramePr>",
            "<a:graphicFrameLocks xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" noChangeAspect=\"1\"/>",
            "</wp:cNvGraphicFramePr>",
            "<a:graphic xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\">",
            "<a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">",
            "<pic:pic xmlns:pic=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">",
            "<pic:nvPicPr><pic:cNvPr id=\"0\" name=\"{name}\"/><pic:cNvPicPr/></pic:nvPicPr>",
            "<pic:blipFill><a:blip r:embed=\"{rel}\"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>",
            "<pic:spPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>",
            "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></pic:spPr>",
            "</pic:pic></a:graphicData></a:graphic></wp:inline>",
            "</w:drawing></w:r><w:r><w:t xml:space=\"preserve\">"
        ),
        cx = cx,
        cy = cy,
        id = drawing_id,
        name = super::xml::escape(file_name),
        rel = rel_id,
    )
}
