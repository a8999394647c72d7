//! Stages that run before tag parsing.
//!
//! ```text
//! input ──▶ rasterize ──▶ encode ──▶ engine
//! (classify) (pdfium)     (base64)   (VLM / OCR model)
//! ```
//!
//! 1. [`input`]: classify a path, list a batch directory, load images
//!    and recognised text, derive unique base names
//! 2. [`rasterize`]: render PDF pages and pull embedded images; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]: PNG-encode and base64-wrap a page for a multimodal
//!    request body
//! 4. [`engine`]: the recognition seam; the only stage with network I/O

pub mod encode;
pub mod engine;
pub mod input;
pub mod rasterize;
