//! DOCX package (ZIP container) access

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::image::{inline_drawing_xml, ImageError, ImageSpec};
use super::xml::{ensure_namespace, escape, insert_before_root_end};
use crate::render::MediaSink;

pub const MAIN_PART: &str = "word/document.xml";
const CONTENT_TYPES: &str = "[Content_Types].xml";

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const WP_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const R_NAMESPACE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const EMPTY_RELS: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"></Relationships>"
);

const EMPTY_CONTENT_TYPES: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"></Types>"
);

/// Errors that can occur while reading or writing a package
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("failed to access {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid DOCX container: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("package I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a DOCX document: missing {MAIN_PART}")]
    NotADocx,

    #[error("part {0} is not valid UTF-8")]
    NotUtf8(String),

    #[error("package has no part named {0}")]
    MissingPart(String),
}

fn rel_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bId="rId(\d+)""#).expect("valid regex"))
}

fn drawing_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<wp:docPr\b[^>]*?\bid="(\d+)""#).expect("valid regex"))
}

/// Whether a part holds document text that may contain template tags
pub fn is_template_part(name: &str) -> bool {
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    if file.contains('/') || !file.ends_with(".xml") {
        return false;
    }
    file == "document.xml"
        || file == "footnotes.xml"
        || file == "endnotes.xml"
        || file.starts_with("header")
        || file.starts_with("footer")
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`
pub fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// `target` written relative to the directory of `part`
fn relative_target(part: &str, target: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, _)) => target
            .strip_prefix(dir)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
            .unwrap_or_else(|| format!("/{}", target)),
        None => target.to_string(),
    }
}

/// An opened DOCX package, kept as raw entries in archive order
#[derive(Debug, Clone)]
pub struct Package {
    entries: Vec<(String, Vec<u8>)>,
    next_drawing_id: u32,
}

impl Package {
    /// Open a package from disk
    pub fn open(path: &Path) -> Result<Self, PackageError> {
        let file = std::fs::File::open(path).map_err(|source| PackageError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read(std::io::BufReader::new(file))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PackageError> {
        Self::read(Cursor::new(bytes))
    }

    /// Read every entry of a ZIP archive
    pub fn read<R: Read + Seek>(reader: R) -> Result<Self, PackageError> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            entries.push((file.name().to_string(), bytes));
        }

        if !entries.iter().any(|(name, _)| name == MAIN_PART) {
            return Err(PackageError::NotADocx);
        }

        let mut package = Self {
            entries,
            next_drawing_id: 1,
        };
        package.next_drawing_id = package.max_drawing_id() + 1;
        tracing::debug!(entries = package.entries.len(), "opened package");
        Ok(package)
    }

    /// Highest `wp:docPr` id used by any template part
    fn max_drawing_id(&self) -> u32 {
        self.entries
            .iter()
            .filter(|(name, _)| is_template_part(name))
            .flat_map(|(_, bytes)| {
                let text = String::from_utf8_lossy(bytes);
                drawing_id_pattern()
                    .captures_iter(&text)
                    .filter_map(|c| c[1].parse::<u32>().ok())
                    .collect::<Vec<_>>()
            })
            .max()
            .unwrap_or(0)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// A part decoded as UTF-8
    pub fn part_str(&self, name: &str) -> Result<&str, PackageError> {
        let bytes = self
            .part(name)
            .ok_or_else(|| PackageError::MissingPart(name.to_string()))?;
        std::str::from_utf8(bytes).map_err(|_| PackageError::NotUtf8(name.to_string()))
    }

    /// Replace a part, or append it when the package does not have it yet
    pub fn set_part(&mut self, name: &str, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = bytes,
            None => self.entries.push((name.to_string(), bytes)),
        }
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Parts that may contain template tags, in archive order
    pub fn template_parts(&self) -> Vec<String> {
        self.part_names()
            .filter(|name| is_template_part(name))
            .map(str::to_string)
            .collect()
    }

    /// Write the package to any seekable sink
    pub fn write<W: Write + Seek>(&self, writer: W) -> Result<W, PackageError> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, bytes) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        Ok(zip.finish()?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PackageError> {
        Ok(self.write(Cursor::new(Vec::new()))?.into_inner())
    }

    /// Save the package to disk, creating parent directories when needed
    pub fn save(&self, path: &Path) -> Result<(), PackageError> {
        let io_err = |source| PackageError::File {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = std::fs::File::create(path).map_err(io_err)?;
        self.write(std::io::BufWriter::new(file))?
            .flush()
            .map_err(io_err)?;
        Ok(())
    }

    /// Add a relationship from `part` to the package path `target`
    ///
    /// Creates the part's `.rels` file when it does not exist. Returns the
    /// new relationship id.
    pub fn add_relationship(&mut self, part: &str, rel_type: &str, target: &str) -> String {
        let path = rels_path(part);
        let rels = self
            .part(&path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_else(|| EMPTY_RELS.to_string());

        let next = rel_id_pattern()
            .captures_iter(&rels)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let id = format!("rId{}", next);

        let entry = format!(
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"/>",
            id,
            rel_type,
            escape(&relative_target(part, target))
        );
        self.set_part(&path, insert_before_root_end(&rels, &entry));
        id
    }

    /// Declare a `Default` content type for a file extension if missing
    pub fn ensure_default_content_type(&mut self, extension: &str, content_type: &str) {
        let types = self
            .part(CONTENT_TYPES)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_else(|| EMPTY_CONTENT_TYPES.to_string());

        let needle = format!("extension=\"{}\"", extension.to_ascii_lowercase());
        if types.to_ascii_lowercase().contains(&needle) {
            return;
        }

        let entry = format!(
            "<Default Extension=\"{}\" ContentType=\"{}\"/>",
            extension, content_type
        );
        self.set_part(CONTENT_TYPES, insert_before_root_end(&types, &entry));
    }

    /// First unused `word/media/imageN.ext`
    pub fn next_media_name(&self, extension: &str) -> String {
        (1..)
            .map(|n| format!("word/media/image{}.{}", n, extension))
            .find(|name| self.part(name).is_none())
            .unwrap_or_default()
    }

    /// A `wp:docPr` id not used anywhere in the document yet
    pub fn allocate_drawing_id(&mut self) -> u32 {
        let id = self.next_drawing_id;
        self.next_drawing_id += 1;
        id
    }
}

/// Embedded image ready for reuse within one part
#[derive(Debug, Clone)]
struct EmbeddedImage {
    rel_id: String,
    file_name: String,
    cx: u64,
    cy: u64,
}

/// Embeds images into the package on behalf of one part being rendered
///
/// Each image is stored once per part; every occurrence still gets its own
/// drawing id.
pub struct PartMedia<'p> {
    package: &'p mut Package,
    part: String,
    embedded: HashMap<String, EmbeddedImage>,
    drawings: usize,
}

impl<'p> PartMedia<'p> {
    pub fn new(package: &'p mut Package, part: impl Into<String>) -> Self {
        Self {
            package,
            part: part.into(),
            embedded: HashMap::new(),
            drawings: 0,
        }
    }

    /// Number of drawings written so far
    pub fn drawings(&self) -> usize {
        self.drawings
    }

    /// Declare the drawing namespaces on the rendered part if it needs them
    pub fn finish(self, xml: String) -> String {
        if self.drawings == 0 {
            return xml;
        }
        let xml = ensure_namespace(&xml, "wp", WP_NAMESPACE);
        ensure_namespace(&xml, "r", R_NAMESPACE)
    }

    fn embed(&mut self, name: &str, spec: &ImageSpec) -> Result<EmbeddedImage, ImageError> {
        if let Some(found) = self.embedded.get(name) {
            return Ok(found.clone());
        }

        let image = spec.load()?;
        let media_name = self.package.next_media_name(image.format.extension());
        let file_name = media_name.rsplit('/').next().unwrap_or_default().to_string();

        self.package.set_part(&media_name, image.bytes.as_slice());
        self.package
            .ensure_default_content_type(image.format.extension(), image.format.content_type());
        let rel_id = self
            .package
            .add_relationship(&self.part, IMAGE_REL_TYPE, &media_name);

        let (cx, cy) = spec.extent_emu(image.width_px, image.height_px);
        tracing::debug!(image = name, part = %self.part, media = %media_name, "embedded image");

        let embedded = EmbeddedImage {
            rel_id,
            file_name,
            cx,
            cy,
        };
        self.embedded.insert(name.to_string(), embedded.clone());
        Ok(embedded)
    }
}

impl MediaSink for PartMedia<'_> {
    fn embed_image(&mut self, name: &str, spec: &ImageSpec) -> Result<String, ImageError> {
        let image = self.embed(name, spec)?;
        let drawing_id = self.package.allocate_drawing_id();
        self.drawings += 1;
        Ok(inline_drawing_xml(
            &image.rel_id,
            drawing_id,
            &image.file_name,
            image.cx,
            image.cy,
        ))
    }
}
