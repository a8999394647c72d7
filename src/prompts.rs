//! Instructions sent with each page image.
//!
//! Override per run with [`crate::config::ConversionConfig::instruction`].

/// Default instruction: asks a grounding-capable model for Markdown with
/// `<|ref|>…<|/ref|><|det|>…<|/det|>` annotations.
pub const DEFAULT_INSTRUCTION: &str = "<image>\n<|grounding|>Convert the document to markdown.";

/// Plain OCR without layout annotations. Output parses, but carries no
/// bounding boxes, so image blocks never appear.
pub const FREE_OCR_INSTRUCTION: &str = "<image>\nFree OCR.";

/// System prompt for general-purpose vision chat models, which do not
/// understand the `<image>` placeholder or the grounding switch on their own.
pub const CHAT_SYSTEM_PROMPT: &str = r###"You transcribe document page images into Markdown with layout grounding.

For every layout region, in reading order, emit
<|ref|>KIND<|/ref|><|det|>[[x1, y1, x2, y2]]<|/det|>
followed by the region's content on the next line.

- KIND is one of: title, text, image, table, code, algorithm, equation, list,
  table_caption, image_caption, code_caption, header, footer, page_number,
  page_footnote, aside_text.
- Coordinates are integers in 0..999, relative to the page width and height,
  (x1, y1) top-left and (x2, y2) bottom-right.
- Titles start with "## ". Tables use pipe syntax or HTML <table>. Display
  math uses $$ … $$. Code uses fenced blocks.
- For image regions emit only the tag; write nothing for the image itself.
- Output only the transcription. No commentary, no ```markdown fences."###;

/// Whether `instruction` uses the model-native grounding prompt form.
pub fn is_native_instruction(instruction: &str) -> bool {
    instruction.trim_start().starts_with("<image>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requests_grounding() {
        assert!(DEFAULT_INSTRUCTION.contains("<|grounding|>"));
        assert!(is_native_instruction(DEFAULT_INSTRUCTION));
        assert!(!is_native_instruction("Transcribe this page."));
    }

    #[test]
    fn chat_prompt_describes_tag_grammar() {
        assert!(CHAT_SYSTEM_PROMPT.contains("<|ref|>KIND<|/ref|>"));
        assert!(CHAT_SYSTEM_PROMPT.contains("0..999"));
    }
}
