//! Error types for the edgequake-ocr2doc library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Ocr2DocError`]: **Fatal** for one unit of work (a page, or the file
//!   that page belongs to): unreadable input, a recognition call that failed,
//!   an output file that could not be written. Returned as
//!   `Err(Ocr2DocError)` from the `convert*` functions. In batch mode each
//!   file's error is recorded in [`crate::output::BatchOutput`] and the batch
//!   moves on.
//!
//! * [`CoordinateError`]: **Non-fatal**: the model emitted a positional
//!   payload that is not a list of 4-tuples. It never leaves
//!   [`crate::bbox::BoundingBox::from_coordinates`]; the block simply has no
//!   bounding box and a warning is logged.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr2doc library.
#[derive(Debug, Error)]
pub enum Ocr2DocError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory was not found at the given path.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension is not one of the supported input kinds.
    #[error("Unsupported input '{path}' (extension '{extension}')\nSupported: .pdf .jpg .jpeg .png .bmp .tif .tiff .mmd .txt")]
    UnsupportedInput { path: PathBuf, extension: String },

    /// A raster input could not be decoded.
    #[error("Failed to decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A text input is not valid UTF-8.
    #[error("Input text '{path}' is not valid UTF-8")]
    TextDecode { path: PathBuf },

    /// A directory input contained no supported files.
    #[error("No supported input files found in '{path}'")]
    EmptyDirectory { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not load the pdfium shared library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory), or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Recognition errors ────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("Recognition provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The recognition engine failed for a page. `detail` carries the
    /// upstream error text unchanged.
    #[error("Recognition failed on page {page}: {detail}")]
    RecognitionFailed { page: usize, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// A cropped region could not be encoded.
    #[error("Failed to encode image region: {detail}")]
    ImageEncode { detail: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The Word container could not be packaged.
    #[error("Failed to package Word document '{path}': {detail}")]
    DocxWrite { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a coordinate literal such as `[[12, 40, 980, 512]]` was rejected.
///
/// Produced by the strict literal parser in [`crate::bbox`]. Only ever
/// logged; callers see an absent bounding box.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { offset: usize, found: char },

    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("invalid number {text:?}")]
    InvalidNumber { text: String },

    #[error("trailing input at offset {offset}")]
    TrailingInput { offset: usize },

    #[error("coordinate list is empty")]
    Empty,

    #[error("first region has {found} components, need at least 4")]
    TooFewComponents { found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognition_failed_keeps_cause() {
        let e = Ocr2DocError::RecognitionFailed {
            page: 3,
            detail: "connection reset by peer".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("connection reset by peer"));
    }

    #[test]
    fn unsupported_input_lists_extension() {
        let e = Ocr2DocError::UnsupportedInput {
            path: PathBuf::from("notes.docx"),
            extension: "docx".into(),
        };
        assert!(e.to_string().contains("'docx'"));
    }

    #[test]
    fn coordinate_error_display() {
        let e = CoordinateError::TooFewComponents { found: 3 };
        assert_eq!(e.to_string(), "first region has 3 components, need at least 4");
        let e = CoordinateError::UnexpectedChar {
            offset: 2,
            found: '(',
        };
        assert!(e.to_string().contains("'('"));
    }
}
