//! Block extraction: cleaned page text → ordered [`ContentBlock`]s.
//!
//! The cleaned text is split on blank lines. Each non-empty paragraph is
//! classified by a fixed-priority predicate chain, first match wins:
//!
//! 1. image placeholder line → `image` (box from the matching image tag)
//! 2. heading marker         → `title`
//! 3. code fence             → `code`
//! 4. display-math marker    → `equation_block`
//! 5. two or more `|`, or an HTML `<table` → `table`
//! 6. anything else          → `text`
//!
//! Rule 5 also fires on prose that happens to contain two pipes. That is a
//! known limitation of the heuristic and is kept for compatibility with
//! existing output.
//!
//! Extraction is a pure function of its input; running it twice on the same
//! [`TaggedText`] yields identical blocks.

use crate::bbox::BoundingBox;
use crate::blocks::{
    BlockKind, ContentBlock, META_CAPTION, META_LANGUAGE, META_LEVEL, META_REF_KIND,
};
use crate::tags::{parse_tags, ReferenceTag, TaggedText, RE_IMAGE_PLACEHOLDER};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::{debug, warn};

static RE_BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// Knobs for [`extract_blocks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Let a paragraph that fell through to `text` take the kind named by its
    /// attached reference tag (`image_caption`, `header`, …) when that kind is
    /// known.
    pub use_reference_kinds: bool,
}

/// Tag-parse and extract one page of raw model output.
pub fn parse_page(raw: &str, options: &ExtractOptions) -> (TaggedText, Vec<ContentBlock>) {
    let parsed = parse_tags(raw);
    let blocks = extract_blocks(&parsed, options);
    (parsed, blocks)
}

/// Classify every paragraph of `parsed.cleaned` into a block.
///
/// All blocks carry `page == 0`; [`assemble_pages`] assigns page indices.
pub fn extract_blocks(parsed: &TaggedText, options: &ExtractOptions) -> Vec<ContentBlock> {
    let text = parsed.cleaned.as_str();
    let image_tags = parsed.image_tags();
    let other_tags = parsed.other_tags();
    let mut next_tag = 0;
    let mut blocks = Vec::new();

    for range in paragraph_ranges(text) {
        let para = &text[range.clone()];

        // The first non-image tag removed before the end of this paragraph
        // (and after the previous one) describes it.
        let mut attached: Option<&ReferenceTag> = None;
        while next_tag < other_tags.len() && other_tags[next_tag].cleaned_offset < range.end {
            attached.get_or_insert(other_tags[next_tag]);
            next_tag += 1;
        }

        if RE_IMAGE_PLACEHOLDER.is_match(para) {
            blocks.extend(image_blocks(para, &image_tags));
            continue;
        }

        let mut block = classify(para);
        if let Some(tag) = attached {
            let kind = tag.kind.trim();
            if options.use_reference_kinds && block.kind == BlockKind::Text {
                let named = BlockKind::from_label(kind);
                if named.is_known() && named != BlockKind::Image {
                    block.kind = named;
                }
            }
            block = block
                .with_bounding_box(BoundingBox::from_coordinates(&tag.raw_coordinates))
                .with_metadata(META_REF_KIND, kind);
        }
        blocks.push(block);
    }

    debug!("Extracted {} blocks from {} bytes", blocks.len(), text.len());
    blocks
}

/// Concatenate per-page block lists, inserting a page-number seam before
/// every page except the first and stamping each block with its page index.
pub fn assemble_pages(pages: Vec<Vec<ContentBlock>>) -> Vec<ContentBlock> {
    let total = pages.iter().map(Vec::len).sum::<usize>() + pages.len().saturating_sub(1);
    let mut out = Vec::with_capacity(total);
    for (idx, blocks) in pages.into_iter().enumerate() {
        if idx > 0 {
            out.push(ContentBlock::page_seam(idx + 1).with_page(idx));
        }
        out.extend(blocks.into_iter().map(|b| b.with_page(idx)));
    }
    out
}

/// Byte ranges of the trimmed, non-empty paragraphs of `text`.
fn paragraph_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let bounds = RE_BLANK_LINE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .chain(std::iter::once((text.len(), text.len())));

    for (end, next_start) in bounds {
        let raw = &text[start..end];
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let lead = raw.len() - raw.trim_start().len();
            ranges.push(start + lead..start + lead + trimmed.len());
        }
        start = next_start;
    }
    ranges
}

/// One image block per placeholder line. Text lines following a placeholder
/// become the caption of that image; text before the first placeholder is
/// classified on its own.
fn image_blocks(para: &str, image_tags: &[&ReferenceTag]) -> Vec<ContentBlock> {
    let mut blocks: Vec<ContentBlock> = Vec::new();
    let mut lead: Vec<&str> = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for line in para.lines() {
        let placeholder = RE_IMAGE_PLACEHOLDER
            .captures(line.trim())
            .and_then(|caps| caps[1].parse::<usize>().ok());
        let Some(idx) = placeholder else {
            if blocks.is_empty() {
                lead.push(line);
            } else {
                pending.push(line);
            }
            continue;
        };
        match image_tags.get(idx) {
            Some(tag) => {
                attach_caption(blocks.last_mut(), &mut pending);
                blocks.push(ContentBlock::image(BoundingBox::from_coordinates(&tag.raw_coordinates)));
            }
            None => warn!("Image placeholder {} has no matching tag; dropped", idx),
        }
    }
    attach_caption(blocks.last_mut(), &mut pending);

    let lead = lead.join("\n").trim().to_string();
    if !lead.is_empty() {
        blocks.insert(0, classify(&lead));
    }
    blocks
}

fn attach_caption(image: Option<&mut ContentBlock>, lines: &mut Vec<&str>) {
    let caption = lines.join("\n").trim().to_string();
    lines.clear();
    if let (Some(image), false) = (image, caption.is_empty()) {
        image.metadata.insert(META_CAPTION.to_string(), caption);
    }
}

/// Rules 2–6 of the predicate chain.
fn classify(para: &str) -> ContentBlock {
    if let Some((level, title)) = heading(para) {
        return ContentBlock::new(BlockKind::Title, title).with_metadata(META_LEVEL, level.to_string());
    }

    if para.starts_with("```") {
        let body = para.trim_matches('`');
        let (language, code) = split_fence_language(body);
        let block = ContentBlock::new(BlockKind::Code, code.trim());
        return match language {
            Some(lang) => block.with_metadata(META_LANGUAGE, lang),
            None => block,
        };
    }

    if para.starts_with("$$") {
        return ContentBlock::new(BlockKind::EquationBlock, para.trim_matches('$').trim());
    }
    if let Some(inner) = para.strip_prefix("\\[") {
        let inner = inner.strip_suffix("\\]").unwrap_or(inner);
        return ContentBlock::new(BlockKind::EquationBlock, inner.trim());
    }

    if para.matches('|').count() >= 2 || para.to_ascii_lowercase().contains("<table") {
        return ContentBlock::new(BlockKind::Table, para);
    }

    ContentBlock::text(para)
}

/// `#`-run heading marker: any run followed by whitespace, or a run of two or
/// more glued to the text (`##Intro`). A single `# ` counts as level 1;
/// `#hashtag` does not.
fn heading(para: &str) -> Option<(usize, &str)> {
    let level = para.chars().take_while(|&c| c == '#').count();
    if level == 0 {
        return None;
    }
    let rest = &para[level..];
    let spaced = rest.starts_with(char::is_whitespace);
    if !spaced && level < 2 && !rest.is_empty() {
        return None;
    }
    Some((level, rest.trim()))
}

/// Split an optional language word off the first line of a fence body.
fn split_fence_language(body: &str) -> (Option<&str>, &str) {
    if let Some((first, rest)) = body.split_once('\n') {
        let word = first.trim();
        let is_lang = !word.is_empty()
            && word
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '#' | '-' | '.'));
        if is_lang {
            return (Some(word), rest);
        }
    }
    (None, body)
}
