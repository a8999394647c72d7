//! Recognition engine seam.
//!
//! A [`RecognitionEngine`] takes one page image plus an instruction and
//! answers with a stream of *snapshots*: each item is the whole output so
//! far, growing until the stream ends. Only the last snapshot is parsed
//! ([`recognize_page`]); partial text never reaches the tag parser.
//!
//! [`LlmEngine`] adapts any `edgequake-llm` vision provider. Tests plug in a
//! scripted engine through [`crate::config::ConversionConfigBuilder::engine`].

use crate::config::ConversionConfig;
use crate::error::Ocr2DocError;
use crate::pipeline::encode::encode_page;
use crate::prompts::{is_native_instruction, CHAT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::stream::{self, Stream, StreamExt};
use image::DynamicImage;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model requested when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "deepseek-ai/DeepSeek-OCR";

/// Growing text snapshots; the stream ending is the completion signal.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, Ocr2DocError>> + Send>>;

#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Start recognising `page`. Dropping the returned stream cancels the
    /// request.
    async fn recognize(&self, page: &DynamicImage, instruction: &str) -> Result<TextStream, Ocr2DocError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "engine"
    }
}

/// Run the engine on one page and return its final text.
///
/// Any failure, including one in the middle of the stream, becomes
/// [`Ocr2DocError::RecognitionFailed`] for `page_num` with the cause text
/// kept.
pub async fn recognize_page(
    engine: &dyn RecognitionEngine,
    page_num: usize,
    page: &DynamicImage,
    instruction: &str,
) -> Result<String, Ocr2DocError> {
    let start = Instant::now();
    let fail = |e: Ocr2DocError| match e {
        Ocr2DocError::RecognitionFailed { detail, .. } => Ocr2DocError::RecognitionFailed { page: page_num, detail },
        Ocr2DocError::ProviderNotConfigured { .. } => e,
        other => Ocr2DocError::RecognitionFailed {
            page: page_num,
            detail: other.to_string(),
        },
    };

    let mut snapshots = engine.recognize(page, instruction).await.map_err(fail)?;
    let mut latest = String::new();
    let mut count = 0usize;
    while let Some(snapshot) = snapshots.next().await {
        let snapshot = snapshot.map_err(fail)?;
        if snapshot.len() < latest.len() {
            warn!("Page {}: {} output shrank from {} to {} bytes", page_num, engine.name(), latest.len(), snapshot.len());
        }
        latest = snapshot;
        count += 1;
    }

    debug!(
        "Page {}: {} snapshot(s), {} bytes in {:?}",
        page_num,
        count,
        latest.len(),
        start.elapsed()
    );
    Ok(latest)
}

/// Vision-chat provider used as a recognition engine.
///
/// Sends the page as a PNG attachment. Instructions in the model-native form
/// (`<image>\n<|grounding|>…`) are sent bare, minus the `<image>` marker;
/// anything else is preceded by [`CHAT_SYSTEM_PROMPT`] so general chat
/// models answer in the tag grammar. The whole reply arrives as a single
/// snapshot.
pub struct LlmEngine {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmEngine {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Build from the provider settings in `config`.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Ocr2DocError> {
        let provider = resolve_provider(config)?;
        info!(
            "Using recognition provider {}",
            config.provider_name.as_deref().unwrap_or("(auto)")
        );
        Ok(Self::new(provider, config.temperature, config.max_tokens))
    }

    /// System prompt (if any) and user text for `instruction`.
    fn prompt_parts(instruction: &str) -> (Option<&'static str>, &str) {
        if is_native_instruction(instruction) {
            let text = instruction.trim_start().trim_start_matches("<image>").trim_start();
            (None, text)
        } else {
            (Some(CHAT_SYSTEM_PROMPT), instruction)
        }
    }

    fn messages(instruction: &str, image: edgequake_llm::ImageData) -> Vec<ChatMessage> {
        let (system, text) = Self::prompt_parts(instruction);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user_with_images(text, vec![image]));
        messages
    }
}

#[async_trait]
impl RecognitionEngine for LlmEngine {
    async fn recognize(&self, page: &DynamicImage, instruction: &str) -> Result<TextStream, Ocr2DocError> {
        let messages = Self::messages(instruction, encode_page(page)?);
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| Ocr2DocError::RecognitionFailed {
                page: 0,
                detail: e.to_string(),
            })?;
        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        let content = response.content;
        Ok(Box::pin(stream::once(async move { Ok(content) })))
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Ocr2DocError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| Ocr2DocError::ProviderNotConfigured {
        provider: provider_name.to_string(),
        hint: format!("{e}"),
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. pre-built provider (`config.provider`);
/// 2. named provider (`config.provider_name`) with `config.model`;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. `ProviderFactory::from_env` auto-detection.
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Ocr2DocError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            let model = config.model.clone().unwrap_or(model);
            return create_vision_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| Ocr2DocError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No recognition provider could be auto-detected from environment.\n\
            Set EDGEQUAKE_LLM_PROVIDER and EDGEQUAKE_MODEL, or pass --provider.\n\
            Error: {}",
            e
        ),
    })?;

    Ok(llm_provider)
}

/// Engine selection: pre-built engine first, otherwise an [`LlmEngine`].
pub fn resolve_engine(config: &ConversionConfig) -> Result<Arc<dyn RecognitionEngine>, Ocr2DocError> {
    match &config.engine {
        Some(engine) => Ok(Arc::clone(engine)),
        None => Ok(Arc::new(LlmEngine::from_config(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    /// Emits each prefix of `text` at word boundaries, like a streaming model.
    struct Growing {
        text: String,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl RecognitionEngine for Growing {
        async fn recognize(&self, _page: &DynamicImage, _instruction: &str) -> Result<TextStream, Ocr2DocError> {
            let mut snapshots: Vec<Result<String, Ocr2DocError>> = Vec::new();
            let mut acc = String::new();
            for word in self.text.split_inclusive(' ') {
                acc.push_str(word);
                snapshots.push(Ok(acc.clone()));
            }
            if let Some(n) = self.fail_after {
                snapshots.truncate(n);
                snapshots.push(Err(Ocr2DocError::Internal("socket closed".into())));
            }
            Ok(Box::pin(stream::iter(snapshots)))
        }
    }

    fn page() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(4, 4))
    }

    #[tokio::test]
    async fn keeps_only_the_final_snapshot() {
        let engine = Growing {
            text: "## Title body text".into(),
            fail_after: None,
        };
        let text = recognize_page(&engine, 1, &page(), "go").await.unwrap();
        assert_eq!(text, "## Title body text");
    }

    #[tokio::test]
    async fn mid_stream_failure_is_fatal_with_cause() {
        let engine = Growing {
            text: "a b c".into(),
            fail_after: Some(1),
        };
        let err = recognize_page(&engine, 4, &page(), "go").await.unwrap_err();
        match err {
            Ocr2DocError::RecognitionFailed { page, detail } => {
                assert_eq!(page, 4);
                assert!(detail.contains("socket closed"), "got {detail}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn native_instruction_is_sent_without_system_prompt() {
        assert_eq!(
            LlmEngine::prompt_parts(crate::prompts::DEFAULT_INSTRUCTION),
            (None, "<|grounding|>Convert the document to markdown.")
        );
        assert_eq!(
            LlmEngine::prompt_parts("Transcribe."),
            (Some(CHAT_SYSTEM_PROMPT), "Transcribe.")
        );

        let data = edgequake_llm::ImageData::new("AAAA", "image/png");
        assert_eq!(LlmEngine::messages("Transcribe.", data).len(), 2);
    }
}
