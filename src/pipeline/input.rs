//! Input resolution: classify paths, load raster and text inputs, and
//! derive collision-free output names for batch runs.
//!
//! PDFs are only checked here (existence, permission, `%PDF` magic);
//! rasterisation happens in [`crate::pipeline::rasterize`].

use crate::error::Ocr2DocError;
use image::{DynamicImage, ImageReader};
use std::collections::HashSet;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raster extensions accepted as single-page inputs.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// Already-recognised text; parsed without calling the engine.
pub const TEXT_EXTENSIONS: [&str; 2] = ["mmd", "txt"];

/// What kind of source a path holds, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
    Text,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if ext == "pdf" {
            Some(InputKind::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(InputKind::Image)
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            Some(InputKind::Text)
        } else {
            None
        }
    }
}

fn open_error(path: &Path, e: std::io::Error) -> Ocr2DocError {
    match e.kind() {
        ErrorKind::PermissionDenied => Ocr2DocError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Ocr2DocError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}

/// Validate a single input file and classify it.
pub fn resolve_local(path: &Path) -> Result<InputKind, Ocr2DocError> {
    if !path.is_file() {
        return Err(Ocr2DocError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let kind = InputKind::from_path(path).ok_or_else(|| Ocr2DocError::UnsupportedInput {
        path: path.to_path_buf(),
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })?;

    let mut file = std::fs::File::open(path).map_err(|e| open_error(path, e))?;
    if kind == InputKind::Pdf {
        let mut magic = [0u8; 4];
        if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
            return Err(Ocr2DocError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("missing %PDF header (found {:02x?})", magic),
            });
        }
    }

    debug!("Resolved {:?} input: {}", kind, path.display());
    Ok(kind)
}

/// Every supported file directly inside `dir`, sorted by path.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>, Ocr2DocError> {
    let entries = std::fs::read_dir(dir).map_err(|e| open_error(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && InputKind::from_path(p).is_some())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(Ocr2DocError::EmptyDirectory {
            path: dir.to_path_buf(),
        });
    }
    info!("Found {} input file(s) in {}", files.len(), dir.display());
    Ok(files)
}

/// Decode a raster input, apply its EXIF orientation and drop alpha.
pub fn load_image(path: &Path) -> Result<DynamicImage, Ocr2DocError> {
    let decode_err = |source| Ocr2DocError::ImageDecode {
        path: path.to_path_buf(),
        source,
    };
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| open_error(path, e))?;
    let mut decoder = reader.into_decoder().map_err(decode_err)?;
    let orientation = image::ImageDecoder::orientation(&mut decoder).map_err(decode_err)?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);

    debug!("Loaded {} ({}x{})", path.display(), img.width(), img.height());
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// Read a text input as one page of raw model output.
pub fn load_text(path: &Path) -> Result<String, Ocr2DocError> {
    let bytes = std::fs::read(path).map_err(|e| open_error(path, e))?;
    String::from_utf8(bytes).map_err(|_| Ocr2DocError::TextDecode {
        path: path.to_path_buf(),
    })
}

/// Replace everything outside `[A-Za-z0-9._-]` with `_` and strip leading
/// dots. Never returns an empty string.
pub fn sanitize_base_name(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Hands out unique sanitised base names within one batch.
#[derive(Debug, Default)]
pub struct BaseNames {
    used: HashSet<String>,
}

impl BaseNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name`, then `name_2`, `name_3`, … for later collisions.
    pub fn claim(&mut self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base = sanitize_base_name(&stem);
        let mut candidate = base.clone();
        let mut n = 2;
        while !self.used.insert(candidate.to_ascii_lowercase()) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        candidate
    }
}

/// Image subdirectory name used for one file of a batch.
pub fn batch_image_dir(base: &str) -> String {
    format!("{base}_images")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn classifies_by_extension() {
        assert_eq!(InputKind::from_path(Path::new("a.PDF")), Some(InputKind::Pdf));
        assert_eq!(InputKind::from_path(Path::new("scan.tif")), Some(InputKind::Image));
        assert_eq!(InputKind::from_path(Path::new("out_raw.mmd")), Some(InputKind::Text));
        assert_eq!(InputKind::from_path(Path::new("notes.docx")), None);
        assert_eq!(InputKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn sanitises_names() {
        assert_eq!(sanitize_base_name("Annual Report (2024)"), "Annual_Report__2024_");
        assert_eq!(sanitize_base_name("..hidden"), "hidden");
        assert_eq!(sanitize_base_name("报告"), "__");
        assert_eq!(sanitize_base_name(""), "document");
    }

    #[test]
    fn base_names_are_unique() {
        let mut names = BaseNames::new();
        assert_eq!(names.claim(Path::new("a b.pdf")), "a_b");
        assert_eq!(names.claim(Path::new("a_b.png")), "a_b_2");
        assert_eq!(names.claim(Path::new("a?b.jpg")), "a_b_3");
        assert_eq!(names.claim(Path::new("other.pdf")), "other");
        assert_eq!(batch_image_dir("a_b_2"), "a_b_2_images");
    }

    #[test]
    fn resolve_rejects_missing_unsupported_and_fake_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.pdf");
        assert!(matches!(resolve_local(&missing), Err(Ocr2DocError::FileNotFound { .. })));

        let docx = dir.path().join("x.docx");
        std::fs::write(&docx, b"PK").unwrap();
        assert!(matches!(
            resolve_local(&docx),
            Err(Ocr2DocError::UnsupportedInput { extension, .. }) if extension == "docx"
        ));

        let fake = dir.path().join("fake.pdf");
        std::fs::write(&fake, b"hello").unwrap();
        assert!(matches!(resolve_local(&fake), Err(Ocr2DocError::CorruptPdf { .. })));

        let real = dir.path().join("ok.pdf");
        std::fs::write(&real, b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_local(&real).unwrap(), InputKind::Pdf);
    }

    #[test]
    fn discovery_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.pdf", "notes.docx", "c.mmd"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();
        let found: Vec<_> = discover_inputs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, ["a.pdf", "b.png", "c.mmd"]);

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_inputs(empty.path()),
            Err(Ocr2DocError::EmptyDirectory { .. })
        ));
    }

    #[test]
    fn loads_png_as_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255])).save(&path).unwrap();
        let img = load_image(&path).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
        assert!(matches!(img, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn undecodable_image_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png at all").unwrap();
        assert!(matches!(load_image(&path), Err(Ocr2DocError::ImageDecode { .. })));
    }

    #[test]
    fn text_must_be_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.mmd");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(load_text(&path), Err(Ocr2DocError::TextDecode { .. })));
        std::fs::write(&path, "## Hi").unwrap();
        assert_eq!(load_text(&path).unwrap(), "## Hi");
    }
}
