//! Conversion entry points.
//!
//! ```text
//! input ──▶ rasterise / decode ──▶ recognise (per page, in order)
//!       ──▶ tag parse + extract ──▶ assemble pages ──▶ render ──▶ files
//! ```
//!
//! * [`convert_file`]: one PDF, raster image or recognised-text file
//! * [`convert_batch`]: every supported file in a directory; failures are
//!   collected and the batch continues
//! * [`convert_pages`]: already-recognised page texts plus their rasters
//! * [`convert_text`]: one page of raw text to blocks and Markdown, in
//!   memory
//!
//! A failing page aborts its document: nothing is written for it.

use crate::blocks::{BlockKind, ContentBlock};
use crate::config::{ConversionConfig, OutputFormat};
use crate::error::Ocr2DocError;
use crate::extract::{assemble_pages, parse_page};
use crate::geometry::ImageStore;
use crate::output::{BatchOutput, BlockDump, ConversionOutput, ConversionStats, FileFailure};
use crate::pipeline::engine::{recognize_page, resolve_engine};
use crate::pipeline::input::{self, BaseNames, InputKind};
use crate::pipeline::rasterize::{rasterize_pdf, RasterPage};
use crate::prompts::DEFAULT_INSTRUCTION;
use crate::render::docx::write_docx;
use crate::render::markdown::MarkdownRenderer;
use crate::render::structured::StructuredRenderer;
use image::DynamicImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Separator between pages in `<base>_raw.mmd`.
pub const RAW_PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Convert one input file and write its outputs under `config.output_dir`.
///
/// # Errors
/// Unreadable or unsupported input, a PDF that cannot be opened, a failed
/// recognition call, or an output that cannot be written.
pub async fn convert_file(input_path: impl AsRef<Path>, config: &ConversionConfig) -> Result<ConversionOutput, Ocr2DocError> {
    let total_start = Instant::now();
    let input_path = input_path.as_ref();
    info!("Starting conversion: {}", input_path.display());

    let kind = input::resolve_local(input_path)?;
    let base_name = match &config.output_name {
        Some(name) => name.clone(),
        None => BaseNames::new().claim(input_path),
    };

    if kind == InputKind::Text {
        let raw = input::load_text(input_path)?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_start(1);
            cb.on_page_start(1, 1);
        }
        let mut output = convert_pages(vec![raw], Vec::new(), &base_name, config).await?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_complete(1, 1, output.blocks.len());
            cb.on_conversion_complete(1, 1);
        }
        output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        return Ok(output);
    }

    // ── Sources ──────────────────────────────────────────────────────────
    let render_start = Instant::now();
    let rasters = match kind {
        InputKind::Pdf => {
            rasterize_pdf(
                input_path,
                config.dpi,
                config.password.as_deref(),
                config.use_embedded_images,
            )
            .await?
        }
        _ => {
            let path = input_path.to_path_buf();
            let image = tokio::task::spawn_blocking(move || input::load_image(&path))
                .await
                .map_err(|e| Ocr2DocError::Internal(format!("Decode task panicked: {}", e)))??;
            vec![RasterPage {
                image,
                embedded: Vec::new(),
            }]
        }
    };
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Prepared {} page image(s) in {}ms", rasters.len(), render_duration_ms);

    // ── Recognition ──────────────────────────────────────────────────────
    let recognition_start = Instant::now();
    let raw_pages = recognize_all(&rasters, config).await?;
    let recognition_duration_ms = recognition_start.elapsed().as_millis() as u64;

    let mut output = convert_pages(raw_pages, rasters, &base_name, config).await?;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.recognition_duration_ms = recognition_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion complete: {} pages, {} blocks, {} images, {}ms total",
        output.stats.total_pages, output.stats.total_blocks, output.stats.images_written, output.stats.total_duration_ms
    );
    Ok(output)
}

/// Recognise pages strictly in order; the first failure stops the document.
async fn recognize_all(rasters: &[RasterPage], config: &ConversionConfig) -> Result<Vec<String>, Ocr2DocError> {
    let engine = resolve_engine(config)?;
    let instruction = config.instruction.as_deref().unwrap_or(DEFAULT_INSTRUCTION);
    let total = rasters.len();
    let cb = config.progress_callback.as_ref();

    if let Some(cb) = cb {
        cb.on_conversion_start(total);
    }

    let mut raw_pages = Vec::with_capacity(total);
    for (idx, raster) in rasters.iter().enumerate() {
        let page_num = idx + 1;
        if let Some(cb) = cb {
            cb.on_page_start(page_num, total);
        }
        match recognize_page(engine.as_ref(), page_num, &raster.image, instruction).await {
            Ok(text) => {
                if let Some(cb) = cb {
                    let (_, blocks) = parse_page(&text, &config.extract_options());
                    cb.on_page_complete(page_num, total, blocks.len());
                }
                raw_pages.push(text);
            }
            Err(e) => {
                warn!("Page {}/{} failed: {}", page_num, total, e);
                if let Some(cb) = cb {
                    cb.on_page_error(page_num, total, &e.to_string());
                    cb.on_conversion_complete(total, idx);
                }
                return Err(e);
            }
        }
    }

    if let Some(cb) = cb {
        cb.on_conversion_complete(total, total);
    }
    Ok(raw_pages)
}

/// Parse recognised page texts, render them and write every output file.
///
/// `rasters[i]` is the source image of `raw_pages[i]`; pass an empty vector
/// when no images exist (image blocks then resolve as unavailable).
pub async fn convert_pages(
    raw_pages: Vec<String>,
    rasters: Vec<RasterPage>,
    base_name: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Ocr2DocError> {
    let output_dir = config.output_dir.clone();
    let base = base_name.to_string();
    let config = config.clone();

    tokio::task::spawn_blocking(move || build_outputs(raw_pages, rasters, &base, &output_dir, &config))
        .await
        .map_err(|e| Ocr2DocError::Internal(format!("Render task panicked: {}", e)))?
}

/// Parse and render one page of raw text in memory. Nothing is written;
/// image blocks render as unavailable.
pub fn convert_text(raw: &str, config: &ConversionConfig) -> ConversionOutput {
    let (_, blocks) = parse_page(raw, &config.extract_options());
    let mut renderer = MarkdownRenderer::new(ImageStore::in_memory(config.image_dir.clone(), config.jpeg_quality))
        .with_inline_equation_max(config.inline_equation_max);
    let markdown = renderer.render(&blocks, &[]);

    ConversionOutput {
        base_name: String::new(),
        document_path: None,
        raw_path: None,
        json_path: None,
        image_dir: PathBuf::from(&config.image_dir),
        raw_pages: vec![raw.to_string()],
        stats: ConversionStats {
            total_pages: 1,
            total_blocks: blocks.len(),
            images_unavailable: renderer.store().unavailable_count(),
            ..Default::default()
        },
        blocks,
        markdown: Some(markdown),
    }
}

/// Convert every supported file in `dir`. Each file gets a unique base name
/// and its own `<base>_images` directory. Only discovery errors are fatal.
pub async fn convert_batch(dir: impl AsRef<Path>, config: &ConversionConfig) -> Result<BatchOutput, Ocr2DocError> {
    let inputs = input::discover_inputs(dir.as_ref())?;
    let mut names = BaseNames::new();
    let mut batch = BatchOutput::default();

    for (i, path) in inputs.iter().enumerate() {
        let base = names.claim(path);
        info!("[{}/{}] {} → {}", i + 1, inputs.len(), path.display(), base);

        let mut file_config = config.clone();
        file_config.image_dir = input::batch_image_dir(&base);
        file_config.output_name = Some(base);

        match convert_file(path, &file_config).await {
            Ok(output) => batch.outputs.push(output),
            Err(error) => {
                warn!("Skipping {}: {}", path.display(), error);
                batch.failures.push(FileFailure {
                    input: path.clone(),
                    error,
                });
            }
        }
    }

    info!(
        "Batch complete: {}/{} file(s) converted",
        batch.outputs.len(),
        batch.total()
    );
    Ok(batch)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn build_outputs(
    raw_pages: Vec<String>,
    rasters: Vec<RasterPage>,
    base_name: &str,
    output_dir: &Path,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Ocr2DocError> {
    let options = config.extract_options();
    let per_page: Vec<Vec<ContentBlock>> = raw_pages
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let (_, blocks) = parse_page(raw, &options);
            match rasters.get(idx) {
                Some(raster) if config.use_embedded_images => attach_embedded(blocks, &raster.embedded, idx + 1),
                _ => blocks,
            }
        })
        .collect();
    let blocks = assemble_pages(per_page);
    let images: Vec<DynamicImage> = rasters.into_iter().map(|r| r.image).collect();
    debug!("Assembled {} blocks from {} page(s)", blocks.len(), raw_pages.len());

    std::fs::create_dir_all(output_dir).map_err(|e| Ocr2DocError::OutputWriteFailed {
        path: output_dir.to_path_buf(),
        source: e,
    })?;
    let store = ImageStore::new(output_dir, config.image_dir.clone(), config.jpeg_quality);
    let document_path = output_dir.join(format!("{base_name}.{}", config.format.extension()));

    let (markdown, images_written, images_unavailable) = match config.format {
        OutputFormat::Markdown => {
            let mut renderer = MarkdownRenderer::new(store).with_inline_equation_max(config.inline_equation_max);
            let markdown = renderer.render(&blocks, &images);
            write_atomic(&document_path, markdown.as_bytes())?;
            let store = renderer.store();
            (Some(markdown), store.resolved_count(), store.unavailable_count())
        }
        OutputFormat::Docx => {
            let mut renderer = StructuredRenderer::new(store, config.docx.clone());
            let doc = renderer.render(&blocks, &images);
            persist_with(&document_path, |tmp| write_docx(&doc, &config.docx, tmp))?;
            let store = renderer.store();
            (None, store.resolved_count(), store.unavailable_count())
        }
    };
    info!("Wrote {}", document_path.display());

    let raw_path = output_dir.join(format!("{base_name}_raw.mmd"));
    write_atomic(&raw_path, raw_pages.join(RAW_PAGE_SEPARATOR).as_bytes())?;

    let json_path = if config.write_json {
        let path = output_dir.join(format!("{base_name}.json"));
        let dump = BlockDump {
            source: base_name.to_string(),
            pages: raw_pages.len(),
            blocks: &blocks,
        };
        let json = serde_json::to_vec_pretty(&dump)
            .map_err(|e| Ocr2DocError::Internal(format!("JSON serialisation failed: {e}")))?;
        write_atomic(&path, &json)?;
        Some(path)
    } else {
        None
    };

    Ok(ConversionOutput {
        base_name: base_name.to_string(),
        document_path: Some(document_path),
        raw_path: Some(raw_path),
        json_path,
        image_dir: output_dir.join(&config.image_dir),
        stats: ConversionStats {
            total_pages: raw_pages.len(),
            total_blocks: blocks.len(),
            images_written,
            images_unavailable,
            ..Default::default()
        },
        raw_pages,
        blocks,
        markdown,
    })
}

/// Pair a page's image blocks with its embedded images, in order. Only done
/// when the counts agree; otherwise every block is cropped.
fn attach_embedded(blocks: Vec<ContentBlock>, embedded: &[DynamicImage], page_num: usize) -> Vec<ContentBlock> {
    let image_blocks = blocks.iter().filter(|b| b.kind == BlockKind::Image).count();
    if embedded.is_empty() || image_blocks != embedded.len() {
        if !embedded.is_empty() {
            debug!(
                "Page {}: {} image blocks vs {} embedded images, cropping instead",
                page_num,
                image_blocks,
                embedded.len()
            );
        }
        return blocks;
    }

    let mut next = embedded.iter();
    blocks
        .into_iter()
        .map(|block| {
            if block.kind != BlockKind::Image {
                return block;
            }
            match next.next() {
                Some(img) => block.with_embedded_image(Arc::new(img.clone())),
                None => block,
            }
        })
        .collect()
}

/// Write `bytes` to `path` via a temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Ocr2DocError> {
    persist_with(path, |tmp| {
        std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(tmp)
            .and_then(|mut f| f.write_all(bytes).and_then(|_| f.flush()))
            .map_err(|e| Ocr2DocError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })
    })
}

/// Create a temp file next to `path`, let `write` fill it, then rename it
/// into place.
fn persist_with(path: &Path, write: impl FnOnce(&Path) -> Result<(), Ocr2DocError>) -> Result<(), Ocr2DocError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Ocr2DocError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    write(tmp.path())?;
    tmp.persist(path).map_err(|e| Ocr2DocError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([1, 2, 3])))
    }

    #[test]
    fn convert_text_renders_in_memory() {
        let out = convert_text("## Title\n\nSome body text.", &ConversionConfig::default());
        assert_eq!(out.markdown.as_deref(), Some("## Title\n\nSome body text."));
        assert_eq!(out.stats.total_blocks, 2);
        assert!(out.document_path.is_none());
    }

    #[test]
    fn embedded_images_attach_only_when_counts_match() {
        let blocks = vec![
            ContentBlock::image(None),
            ContentBlock::text("x"),
            ContentBlock::image(None),
        ];
        let two = [solid(2, 2), solid(3, 3)];
        let attached = attach_embedded(blocks.clone(), &two, 1);
        assert_eq!(attached[0].embedded_image.as_ref().unwrap().width(), 2);
        assert!(attached[1].embedded_image.is_none());
        assert_eq!(attached[2].embedded_image.as_ref().unwrap().width(), 3);

        let leading_text = vec![
            ContentBlock::text("x"),
            ContentBlock::image(None),
            ContentBlock::image(None),
        ];
        let attached = attach_embedded(leading_text, &two, 1);
        assert!(attached[0].embedded_image.is_none());
        assert_eq!(attached[1].embedded_image.as_ref().unwrap().width(), 2);
        assert_eq!(attached[2].embedded_image.as_ref().unwrap().width(), 3);

        let one = [solid(2, 2)];
        assert!(attach_embedded(blocks, &one, 1)
            .iter()
            .all(|b| b.embedded_image.is_none()));
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
