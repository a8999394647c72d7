//! Geometry resolution: normalised box + page raster → saved JPEG region.
//!
//! ## Pixel rectangle
//!
//! `(round(x1·W), round(y1·H), round(x2·W), round(y2·H))`, each axis clamped
//! to `[0, W]` / `[0, H]`. A rectangle with no area after clamping is
//! reported as [`Unavailable::DegenerateRegion`], never as an error.
//!
//! ## Colour
//!
//! JPEG has no alpha channel. Regions with alpha are composited onto opaque
//! white before the alpha is dropped. Palette images are expanded to RGB(A)
//! by the decoder, so they follow the same path.
//!
//! ## Numbering
//!
//! An [`ImageStore`] belongs to one rendering session. It hands out
//! `image_1.jpg`, `image_2.jpg`, … in resolution order and memoises each
//! block's outcome, so asking twice for the same block neither writes a
//! second file nor advances the counter.

use crate::bbox::BoundingBox;
use crate::blocks::ContentBlock;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default JPEG quality for saved regions.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Absolute pixel rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Why a block produced no image. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("no source image for page {page}")]
    NoSourceImage { page: usize },

    #[error("block has no bounding box")]
    NoBoundingBox,

    #[error("region has no area after clamping")]
    DegenerateRegion,

    #[error("could not encode region: {0}")]
    EncodeFailed(String),

    #[error("could not write '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },
}

/// A region that was cropped (or taken from an embedded image) and encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImage {
    /// Session-scoped sequence number, starting at 1.
    pub index: usize,
    /// `image_<index>.jpg`
    pub file_name: String,
    /// `<image_dir>/image_<index>.jpg`, for references from the document.
    pub relative_path: String,
    /// Where the file was written; `None` for an in-memory store.
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    /// Encoded JPEG bytes.
    pub jpeg: Vec<u8>,
}

/// Convert a normalised box into a clamped pixel rectangle on a `width` ×
/// `height` image.
pub fn pixel_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<PixelRect> {
    let scale = |v: f64, dim: u32| -> u32 { (v * dim as f64).round().clamp(0.0, dim as f64) as u32 };
    let rect = PixelRect {
        left: scale(bbox.x1, width),
        top: scale(bbox.y1, height),
        right: scale(bbox.x2, width),
        bottom: scale(bbox.y2, height),
    };
    if rect.right <= rect.left || rect.bottom <= rect.top {
        return None;
    }
    Some(rect)
}

/// Crop `rect` out of `image`.
pub fn crop_region(image: &DynamicImage, rect: PixelRect) -> DynamicImage {
    image.crop_imm(rect.left, rect.top, rect.width(), rect.height())
}

/// Drop alpha by compositing onto white; images without alpha are converted
/// straight to RGB.
pub fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut out = RgbImage::from_pixel(rgba.width(), rgba.height(), Rgb([255, 255, 255]));
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = px[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

/// Encode an RGB image as JPEG.
pub fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(rgb)?;
    Ok(buf)
}

/// Per-session image numbering, memoisation and file output.
#[derive(Debug)]
pub struct ImageStore {
    output_dir: Option<PathBuf>,
    image_dir: String,
    quality: u8,
    next_index: usize,
    outcomes: HashMap<usize, Result<Arc<ResolvedImage>, Unavailable>>,
}

impl ImageStore {
    /// Store writing into `<output_dir>/<image_dir>/`.
    pub fn new(output_dir: impl Into<PathBuf>, image_dir: impl Into<String>, quality: u8) -> Self {
        Self {
            output_dir: Some(output_dir.into()),
            ..Self::in_memory(image_dir, quality)
        }
    }

    /// Store that encodes regions but writes nothing to disk.
    pub fn in_memory(image_dir: impl Into<String>, quality: u8) -> Self {
        Self {
            output_dir: None,
            image_dir: image_dir.into(),
            quality,
            next_index: 1,
            outcomes: HashMap::new(),
        }
    }

    pub fn image_dir(&self) -> &str {
        &self.image_dir
    }

    /// Number of images successfully resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_ok()).count()
    }

    /// Number of image blocks that could not be resolved so far.
    pub fn unavailable_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_err()).count()
    }

    /// Resolve the image for the block at position `key` of the sequence
    /// being rendered. `pages` are the source rasters indexed by
    /// [`ContentBlock::page`].
    ///
    /// An embedded image on the block wins over cropping. Outcomes are
    /// memoised per `key`.
    pub fn resolve(
        &mut self,
        key: usize,
        block: &ContentBlock,
        pages: &[DynamicImage],
    ) -> Result<Arc<ResolvedImage>, Unavailable> {
        if let Some(outcome) = self.outcomes.get(&key) {
            return outcome.clone();
        }
        let outcome = self.resolve_uncached(block, pages);
        if let Err(ref reason) = outcome {
            warn!("Image block {} (page {}) unavailable: {}", key, block.page + 1, reason);
        }
        self.outcomes.insert(key, outcome.clone());
        outcome
    }

    fn resolve_uncached(
        &mut self,
        block: &ContentBlock,
        pages: &[DynamicImage],
    ) -> Result<Arc<ResolvedImage>, Unavailable> {
        if let Some(embedded) = &block.embedded_image {
            match encode_jpeg(&flatten_to_rgb(embedded), self.quality) {
                Ok(jpeg) => return self.save(jpeg, embedded.width(), embedded.height()),
                Err(e) => warn!("Embedded image could not be encoded, cropping instead: {}", e),
            }
        }

        let source = pages
            .get(block.page)
            .ok_or(Unavailable::NoSourceImage { page: block.page + 1 })?;
        let bbox = block.bounding_box.as_ref().ok_or(Unavailable::NoBoundingBox)?;
        let rect = pixel_rect(bbox, source.width(), source.height())
            .ok_or(Unavailable::DegenerateRegion)?;
        debug!("Cropping {:?} from {}x{} page", rect, source.width(), source.height());

        let rgb = flatten_to_rgb(&crop_region(source, rect));
        let jpeg = encode_jpeg(&rgb, self.quality).map_err(|e| Unavailable::EncodeFailed(e.to_string()))?;
        self.save(jpeg, rect.width(), rect.height())
    }

    fn save(&mut self, jpeg: Vec<u8>, width: u32, height: u32) -> Result<Arc<ResolvedImage>, Unavailable> {
        let index = self.next_index;
        let file_name = format!("image_{index}.jpg");
        let path = match &self.output_dir {
            Some(dir) => Some(write_image(&dir.join(&self.image_dir), &file_name, &jpeg)?),
            None => None,
        };
        self.next_index += 1;

        Ok(Arc::new(ResolvedImage {
            index,
            relative_path: format!("{}/{}", self.image_dir, file_name),
            file_name,
            path,
            width,
            height,
            jpeg,
        }))
    }
}

fn write_image(dir: &Path, file_name: &str, jpeg: &[u8]) -> Result<PathBuf, Unavailable> {
    let path = dir.join(file_name);
    std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&path, jpeg))
        .map_err(|e| Unavailable::WriteFailed {
            path: path.clone(),
            detail: e.to_string(),
        })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockKind;
    use image::{Rgba, RgbaImage};

    fn page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])))
    }

    fn image_block(coords: &str) -> ContentBlock {
        ContentBlock::image(BoundingBox::from_coordinates(coords))
    }

    #[test]
    fn full_page_box_covers_whole_image() {
        let bbox = BoundingBox::from_coordinates("[[0, 0, 999, 999]]").unwrap();
        let rect = pixel_rect(&bbox, 1000, 2000).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                left: 0,
                top: 0,
                right: 1000,
                bottom: 2000
            }
        );
    }

    #[test]
    fn coordinates_round_to_nearest_pixel() {
        let bbox = BoundingBox::new(0.1004, 0.25, 0.5, 0.7506).unwrap();
        let rect = pixel_rect(&bbox, 1000, 1000).unwrap();
        assert_eq!((rect.left, rect.top, rect.right, rect.bottom), (100, 250, 500, 751));
    }

    #[test]
    fn degenerate_box_is_unavailable() {
        let bbox = BoundingBox::new(0.5, 0.1, 0.5, 0.9).unwrap();
        assert_eq!(pixel_rect(&bbox, 800, 600), None);
        let thin = BoundingBox::new(0.5, 0.1, 0.5004, 0.9).unwrap();
        assert_eq!(pixel_rect(&thin, 800, 600), None);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut rgba = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([200, 100, 50, 255]));
        let rgb = flatten_to_rgb(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([200, 100, 50]));
    }

    #[test]
    fn half_alpha_blends_towards_white() {
        let rgba = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let rgb = flatten_to_rgb(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([127, 127, 127]));
    }

    #[test]
    fn indices_increase_and_are_memoised_per_block() {
        let pages = [page(100, 100)];
        let mut store = ImageStore::in_memory("images", 90);
        let a = image_block("[[0, 0, 499, 499]]");
        let b = image_block("[[500, 500, 999, 999]]");

        let first = store.resolve(0, &a, &pages).unwrap();
        let again = store.resolve(0, &a, &pages).unwrap();
        let second = store.resolve(3, &b, &pages).unwrap();

        assert_eq!(first.index, 1);
        assert_eq!(again.index, 1);
        assert_eq!(second.index, 2);
        assert_eq!(second.relative_path, "images/image_2.jpg");
        assert_eq!((first.width, first.height), (50, 50));
        assert_eq!(store.resolved_count(), 2);
    }

    #[test]
    fn failures_do_not_consume_indices() {
        let pages = [page(100, 100)];
        let mut store = ImageStore::in_memory("images", 90);
        let no_box = ContentBlock::new(BlockKind::Image, "");
        let other_page = image_block("[[0, 0, 999, 999]]").with_page(4);
        let flat = image_block("[[10, 10, 10, 500]]");

        assert_eq!(store.resolve(0, &no_box, &pages), Err(Unavailable::NoBoundingBox));
        assert_eq!(
            store.resolve(1, &other_page, &pages),
            Err(Unavailable::NoSourceImage { page: 5 })
        );
        assert_eq!(store.resolve(2, &flat, &pages), Err(Unavailable::DegenerateRegion));
        let ok = store.resolve(3, &image_block("[[0, 0, 999, 999]]"), &pages).unwrap();
        assert_eq!(ok.index, 1);
        assert_eq!(store.unavailable_count(), 3);
    }

    #[test]
    fn embedded_image_wins_over_cropping() {
        let embedded = Arc::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            7,
            3,
            Rgba([0, 0, 255, 0]),
        )));
        let block = ContentBlock::image(None).with_embedded_image(embedded);
        let mut store = ImageStore::in_memory("images", 90);
        let resolved = store.resolve(0, &block, &[]).unwrap();
        assert_eq!((resolved.width, resolved.height), (7, 3));
    }

    #[test]
    fn writes_jpeg_files() {
        let dir = tempfile::tempdir().unwrap();
        let pages = [page(64, 64)];
        let mut store = ImageStore::new(dir.path(), "figs", DEFAULT_JPEG_QUALITY);
        let resolved = store.resolve(0, &image_block("[[0, 0, 999, 999]]"), &pages).unwrap();

        let path = resolved.path.clone().unwrap();
        assert_eq!(path, dir.path().join("figs").join("image_1.jpg"));
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }
}
