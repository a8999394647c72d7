//! # edgequake-ocr2doc
//!
//! Turn the output of a grounding OCR model into Markdown or Word documents.
//!
//! Grounding-capable OCR models (DeepSeek-OCR and friends) read a page image
//! and answer with Markdown interleaved with reference/detection tags that
//! name a block kind and its location on the page:
//!
//! ```text
//! <|ref|>image<|/ref|><|det|>[[112, 80, 890, 455]]<|/det|>
//! ```
//!
//! This crate parses that stream into typed [`ContentBlock`]s, crops every
//! figure out of the source page, and renders the result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / image / .mmd
//!  │
//!  ├─ 1. Input     classify the file, rasterise PDF pages (pdfium)
//!  ├─ 2. Recognise one engine call per page, pages in order
//!  ├─ 3. Tags      image tags → placeholders, other tags removed
//!  ├─ 4. Extract   paragraphs → typed blocks, page seams between pages
//!  ├─ 5. Geometry  normalised boxes → cropped JPEGs, numbered per document
//!  └─ 6. Render    Markdown text, or a structured document packed as .docx
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr2doc::{convert_file, ConversionConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from EDGEQUAKE_LLM_PROVIDER / API key env vars
//!     let config = ConversionConfig::builder()
//!         .format(OutputFormat::Docx)
//!         .output_dir("out")
//!         .build()?;
//!     let output = convert_file("paper.pdf", &config).await?;
//!     eprintln!(
//!         "{} pages, {} blocks, {} images",
//!         output.stats.total_pages, output.stats.total_blocks, output.stats.images_written
//!     );
//!     Ok(())
//! }
//! ```
//!
//! Text that was already recognised needs no engine at all:
//!
//! ```rust
//! use edgequake_ocr2doc::{convert_text, ConversionConfig};
//!
//! let out = convert_text("## Title\n\nBody.", &ConversionConfig::default());
//! assert_eq!(out.markdown.as_deref(), Some("## Title\n\nBody."));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2doc` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bbox;
pub mod blocks;
pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod render;
pub mod tags;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bbox::BoundingBox;
pub use blocks::{BlockKind, ContentBlock};
pub use config::{ConversionConfig, ConversionConfigBuilder, DocxLayout, OutputFormat};
pub use convert::{convert_batch, convert_file, convert_pages, convert_text};
pub use error::{CoordinateError, Ocr2DocError};
pub use output::{BatchOutput, ConversionOutput, ConversionStats, FileFailure};
pub use pipeline::engine::{LlmEngine, RecognitionEngine, TextStream};
pub use pipeline::rasterize::RasterPage;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use render::markdown::MarkdownRenderer;
pub use render::structured::{StructuredDocument, StructuredRenderer};
