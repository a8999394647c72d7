//! Output types returned by the conversion entry points.

use crate::blocks::ContentBlock;
use crate::error::Ocr2DocError;
use serde::Serialize;
use std::path::PathBuf;

/// Numbers describing one finished conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    /// Source pages (1 for raster and text inputs).
    pub total_pages: usize,
    /// Blocks after page assembly, page seams included.
    pub total_blocks: usize,
    pub images_written: usize,
    /// Image blocks whose region could not be resolved.
    pub images_unavailable: usize,
    pub total_duration_ms: u64,
    /// Rasterisation / image decoding.
    pub render_duration_ms: u64,
    /// Time spent waiting on the recognition engine.
    pub recognition_duration_ms: u64,
}

/// Result of converting one input.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// Sanitised base name all output files share.
    pub base_name: String,
    /// `<output>/<base>.md` or `<output>/<base>.docx`; `None` when nothing
    /// was written.
    pub document_path: Option<PathBuf>,
    /// `<output>/<base>_raw.mmd`
    pub raw_path: Option<PathBuf>,
    /// `<output>/<base>.json`, when requested.
    pub json_path: Option<PathBuf>,
    /// Directory receiving `image_<n>.jpg`.
    pub image_dir: PathBuf,
    /// Engine output per page, verbatim.
    pub raw_pages: Vec<String>,
    pub blocks: Vec<ContentBlock>,
    /// Rendered Markdown, for Markdown output.
    pub markdown: Option<String>,
    pub stats: ConversionStats,
}

/// The block list as written by `--json`.
#[derive(Debug, Serialize)]
pub struct BlockDump<'a> {
    pub source: String,
    pub pages: usize,
    pub blocks: &'a [ContentBlock],
}

/// One file of a batch that failed.
#[derive(Debug)]
pub struct FileFailure {
    pub input: PathBuf,
    pub error: Ocr2DocError,
}

/// Result of converting a directory.
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub outputs: Vec<ConversionOutput>,
    pub failures: Vec<FileFailure>,
}

impl BatchOutput {
    pub fn total(&self) -> usize {
        self.outputs.len() + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
