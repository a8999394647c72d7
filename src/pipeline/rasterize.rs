//! PDF rasterisation and embedded-image extraction via pdfium.
//!
//! pdfium is blocking and keeps thread-local state, so the whole document is
//! processed inside `spawn_blocking`. Pages are rendered at `dpi / 72` times
//! their point size.

use crate::error::Ocr2DocError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// One rendered page.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub image: DynamicImage,
    /// Image objects found on the page, in content-stream order. Empty unless
    /// extraction was requested.
    pub embedded: Vec<DynamicImage>,
}

/// Rasterise every page of `pdf_path`.
pub async fn rasterize_pdf(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
    extract_embedded: bool,
) -> Result<Vec<RasterPage>, Ocr2DocError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || rasterize_blocking(&path, dpi, password.as_deref(), extract_embedded))
        .await
        .map_err(|e| Ocr2DocError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, falling back to the system library.
fn bind_pdfium() -> Result<Pdfium, Ocr2DocError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from) {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Ocr2DocError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn rasterize_blocking(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
    extract_embedded: bool,
) -> Result<Vec<RasterPage>, Ocr2DocError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                Ocr2DocError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Ocr2DocError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Ocr2DocError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages, rendering at {} DPI", pages.len(), dpi);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
    let mut results = Vec::with_capacity(pages.len() as usize);

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| Ocr2DocError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());

        let embedded = if extract_embedded {
            embedded_images(&page, idx + 1)
        } else {
            Vec::new()
        };
        results.push(RasterPage { image, embedded });
    }

    Ok(results)
}

/// Raw pixels of every image object on `page`. Objects pdfium cannot decode
/// are skipped with a warning.
fn embedded_images(page: &PdfPage, page_num: usize) -> Vec<DynamicImage> {
    let mut images = Vec::new();
    for object in page.objects().iter() {
        if let Some(image_object) = object.as_image_object() {
            match image_object.get_raw_image() {
                Ok(img) => images.push(img),
                Err(e) => warn!("Page {}: skipping undecodable image object: {:?}", page_num, e),
            }
        }
    }
    debug!("Page {}: {} embedded image(s)", page_num, images.len());
    images
}
