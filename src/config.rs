//! Configuration types for OCR-to-document conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every field has a documented default,
//! so callers set only what they care about.

use crate::error::Ocr2DocError;
use crate::pipeline::engine::RecognitionEngine;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for one conversion (a file, or every file of a batch).
///
/// # Example
/// ```rust
/// use edgequake_ocr2doc::{ConversionConfig, OutputFormat};
///
/// let config = ConversionConfig::builder()
///     .format(OutputFormat::Docx)
///     .output_dir("out")
///     .dpi(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.image_dir, "images");
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Output document format. Default: [`OutputFormat::Markdown`].
    pub format: OutputFormat,

    /// Directory receiving the document, raw text and image subdirectory.
    /// Default: `output`.
    pub output_dir: PathBuf,

    /// Explicit output base name (single-file mode). Default: the input's
    /// file stem.
    pub output_name: Option<String>,

    /// Image subdirectory name inside `output_dir`. Default: `images`.
    ///
    /// Batch mode overrides this per file with `<base>_images`.
    pub image_dir: String,

    /// Rendering DPI for PDF pages. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Instruction sent with every page image. If None, uses
    /// [`crate::prompts::DEFAULT_INSTRUCTION`].
    pub instruction: Option<String>,

    /// Model identifier or local model path. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "ollama", "vllm").
    /// If None along with `provider` and `engine`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed recognition engine. Takes precedence over everything
    /// else; tests use it to script the model's output.
    pub engine: Option<Arc<dyn RecognitionEngine>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 8192.
    pub max_tokens: usize,

    /// JPEG quality for saved image regions, 1–100. Default: 95.
    pub jpeg_quality: u8,

    /// Inline equations longer than this are set as display math in
    /// Markdown. Default: 50.
    pub inline_equation_max: usize,

    /// Let reference-tag kinds relabel plain text paragraphs. Default: false.
    pub use_reference_kinds: bool,

    /// Use image objects embedded in PDF pages instead of cropping, when
    /// their count matches the page's image blocks. Default: false.
    pub use_embedded_images: bool,

    /// Also write the block list as `<base>.json`. Default: false.
    pub write_json: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Word page setup and fonts.
    pub docx: DocxLayout,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            output_dir: PathBuf::from("output"),
            output_name: None,
            image_dir: "images".into(),
            dpi: 200,
            instruction: None,
            model: None,
            provider_name: None,
            provider: None,
            engine: None,
            temperature: 0.0,
            max_tokens: 8192,
            jpeg_quality: crate::geometry::DEFAULT_JPEG_QUALITY,
            inline_equation_max: crate::render::markdown::DEFAULT_INLINE_EQUATION_MAX,
            use_reference_kinds: false,
            use_embedded_images: false,
            write_json: false,
            password: None,
            docx: DocxLayout::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("format", &self.format)
            .field("output_dir", &self.output_dir)
            .field("output_name", &self.output_name)
            .field("image_dir", &self.image_dir)
            .field("dpi", &self.dpi)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("engine", &self.engine.as_ref().map(|_| "<dyn RecognitionEngine>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("use_reference_kinds", &self.use_reference_kinds)
            .field("use_embedded_images", &self.use_embedded_images)
            .field("write_json", &self.write_json)
            .field("docx", &self.docx)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn extract_options(&self) -> crate::extract::ExtractOptions {
        crate::extract::ExtractOptions {
            use_reference_kinds: self.use_reference_kinds,
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.config.output_name = Some(name.into());
        self
    }

    pub fn image_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.image_dir = dir.into();
        self
    }

    /// Out-of-range values are rejected by [`Self::build`].
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn instruction(mut self, prompt: impl Into<String>) -> Self {
        self.config.instruction = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn RecognitionEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn inline_equation_max(mut self, n: usize) -> Self {
        self.config.inline_equation_max = n;
        self
    }

    pub fn use_reference_kinds(mut self, v: bool) -> Self {
        self.config.use_reference_kinds = v;
        self
    }

    pub fn use_embedded_images(mut self, v: bool) -> Self {
        self.config.use_embedded_images = v;
        self
    }

    pub fn write_json(mut self, v: bool) -> Self {
        self.config.write_json = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn docx_layout(mut self, layout: DocxLayout) -> Self {
        self.config.docx = layout;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Ocr2DocError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Ocr2DocError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(Ocr2DocError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.image_dir.trim().is_empty() || c.image_dir.contains(['/', '\\']) {
            return Err(Ocr2DocError::InvalidConfig(format!(
                "Image directory must be a single path component, got '{}'",
                c.image_dir
            )));
        }
        if let Some(name) = &c.output_name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(Ocr2DocError::InvalidConfig(format!(
                    "Output name must be a plain file name, got '{name}'"
                )));
            }
        }
        if c.docx.picture_max_width_in <= 0.0 {
            return Err(Ocr2DocError::InvalidConfig(
                "Picture width must be positive".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which renderer produces the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `<base>.md` (default)
    #[default]
    Markdown,
    /// `<base>.docx`
    Docx,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Docx => "docx",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Ocr2DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" | "mmd" => Ok(OutputFormat::Markdown),
            "docx" | "word" => Ok(OutputFormat::Docx),
            other => Err(Ocr2DocError::InvalidConfig(format!(
                "Unknown output format '{other}' (expected md or docx)"
            ))),
        }
    }
}

/// Fixed page setup for Word output, applied once per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocxLayout {
    /// Default: 21.0 (A4)
    pub page_width_cm: f32,
    /// Default: 29.7 (A4)
    pub page_height_cm: f32,
    pub margin_top_cm: f32,
    pub margin_bottom_cm: f32,
    pub margin_left_cm: f32,
    pub margin_right_cm: f32,
    /// Default: "SimSun"
    pub body_font: String,
    /// Default: 10.5
    pub body_size_pt: f32,
    /// Default: "SimHei"
    pub heading_font: String,
    /// Default: 14.0
    pub heading_size_pt: f32,
    /// Multiple of single spacing. Default: 1.5
    pub line_spacing: f32,
    /// Pictures never exceed this width. Default: 6.0
    pub picture_max_width_in: f64,
}

impl Default for DocxLayout {
    fn default() -> Self {
        Self {
            page_width_cm: 21.0,
            page_height_cm: 29.7,
            margin_top_cm: 2.54,
            margin_bottom_cm: 2.54,
            margin_left_cm: 3.17,
            margin_right_cm: 3.17,
            body_font: "SimSun".into(),
            body_size_pt: 10.5,
            heading_font: "SimHei".into(),
            heading_size_pt: 14.0,
            line_spacing: 1.5,
            picture_max_width_in: 6.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.format, OutputFormat::Markdown);
        assert_eq!(c.output_dir, PathBuf::from("output"));
        assert_eq!(c.image_dir, "images");
        assert_eq!(c.dpi, 200);
        assert_eq!(c.jpeg_quality, 95);
        assert_eq!(c.inline_equation_max, 50);
        assert_eq!(c.temperature, 0.0);
        assert!(!c.use_reference_kinds);
    }

    #[test]
    fn builder_rejects_out_of_range_dpi() {
        assert!(ConversionConfig::builder().dpi(50).build().is_err());
        assert!(ConversionConfig::builder().dpi(401).build().is_err());
        assert_eq!(ConversionConfig::builder().dpi(72).build().unwrap().dpi, 72);
    }

    #[test]
    fn builder_rejects_nested_names() {
        assert!(ConversionConfig::builder().image_dir("a/b").build().is_err());
        assert!(ConversionConfig::builder().output_name("../x").build().is_err());
        assert!(ConversionConfig::builder().jpeg_quality(0).build().is_err());
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("DOCX".parse::<OutputFormat>().unwrap(), OutputFormat::Docx);
        assert!("pdf".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Docx.extension(), "docx");
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", ConversionConfig::default());
        assert!(s.contains("engine: None"));
    }
}
