//! Page image → base64 PNG `ImageData` for the recognition request.
//!
//! PNG keeps glyph edges intact; JPEG artefacts around small print cost
//! recognition accuracy. `detail: "high"` asks tiling providers for the full
//! tile budget.

use crate::error::Ocr2DocError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

pub const PAGE_MIME_TYPE: &str = "image/png";

/// Encode a page raster for a multimodal request.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, Ocr2DocError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| Ocr2DocError::ImageEncode {
            detail: e.to_string(),
        })?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded {}x{} page → {} bytes base64", img.width(), img.height(), b64.len());

    Ok(ImageData::new(b64, PAGE_MIME_TYPE).with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn encodes_png_payload() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 8, Rgb([255, 255, 255])));
        let data = encode_page(&img).unwrap();
        assert_eq!(data.mime_type, PAGE_MIME_TYPE);
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert_eq!(&decoded[1..4], b"PNG");
        let back = image::load_from_memory(&decoded).unwrap();
        assert_eq!((back.width(), back.height()), (12, 8));
    }
}
