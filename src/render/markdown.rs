//! Markdown renderer.
//!
//! | Kind | Output |
//! |------|--------|
//! | title | `## text` |
//! | text, table, list, phonetic, unknown | text unchanged |
//! | image | `![caption](images/image_n.jpg)` plus `*caption*`, or an `<!-- Image: unavailable -->` comment |
//! | code | fenced, with the recorded language |
//! | algorithm | fence tagged `algorithm` |
//! | equation | `$…$`, or `$$…$$` when long or multi-line |
//! | equation_block | `$$…$$` |
//! | captions | `*Table: …*`, `*Figure: …*`, `*Code: …*` |
//! | ref_text | `> text` |
//! | header, footer, aside_text, page_number | HTML comment |
//! | page_footnote | `[^n]: text`, numbered per renderer |
//! | table/image footnote | `*Note: …*` |
//!
//! Blocks are joined by one blank line.

use crate::blocks::{BlockKind, ContentBlock, META_LANGUAGE};
use crate::geometry::ImageStore;
use crate::render::is_skipped;
use image::DynamicImage;

/// Default length above which an inline equation is set as display math.
pub const DEFAULT_INLINE_EQUATION_MAX: usize = 50;

/// One document's Markdown renderer. Owns the image store and the footnote
/// counter, so it must not be shared between documents.
#[derive(Debug)]
pub struct MarkdownRenderer {
    store: ImageStore,
    inline_equation_max: usize,
    footnotes: usize,
}

impl MarkdownRenderer {
    pub fn new(store: ImageStore) -> Self {
        Self {
            store,
            inline_equation_max: DEFAULT_INLINE_EQUATION_MAX,
            footnotes: 0,
        }
    }

    pub fn with_inline_equation_max(mut self, max: usize) -> Self {
        self.inline_equation_max = max;
        self
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Render `blocks`, cropping image regions out of `pages`.
    pub fn render(&mut self, blocks: &[ContentBlock], pages: &[DynamicImage]) -> String {
        let mut parts = Vec::with_capacity(blocks.len());
        for (key, block) in blocks.iter().enumerate() {
            if is_skipped(block) {
                continue;
            }
            parts.push(self.render_block(key, block, pages));
        }
        parts.join("\n\n")
    }

    fn render_block(&mut self, key: usize, block: &ContentBlock, pages: &[DynamicImage]) -> String {
        let text = block.text.as_str();
        match &block.kind {
            BlockKind::Title => format!("## {text}"),
            BlockKind::Image => self.render_image(key, block, pages),
            BlockKind::Code => {
                let lang = block.meta(META_LANGUAGE).unwrap_or("");
                format!("```{lang}\n{text}\n```")
            }
            BlockKind::Algorithm => format!("```algorithm\n{text}\n```"),
            BlockKind::Equation => {
                if text.contains('\n') || text.chars().count() > self.inline_equation_max {
                    format!("$$\n{text}\n$$")
                } else {
                    format!("${text}$")
                }
            }
            BlockKind::EquationBlock => format!("$$\n{text}\n$$"),
            BlockKind::TableCaption => format!("*Table: {text}*"),
            BlockKind::ImageCaption => format!("*Figure: {text}*"),
            BlockKind::CodeCaption => format!("*Code: {text}*"),
            BlockKind::RefText => text
                .lines()
                .map(|line| format!("> {line}"))
                .collect::<Vec<_>>()
                .join("\n"),
            BlockKind::Header => format!("<!-- Header: {text} -->"),
            BlockKind::Footer => format!("<!-- Footer: {text} -->"),
            BlockKind::AsideText => format!("<!-- Aside: {text} -->"),
            BlockKind::PageNumber => format!("<!-- {text} -->"),
            BlockKind::PageFootnote => {
                self.footnotes += 1;
                format!("[^{}]: {text}", self.footnotes)
            }
            BlockKind::TableFootnote | BlockKind::ImageFootnote => format!("*Note: {text}*"),
            BlockKind::Text
            | BlockKind::Table
            | BlockKind::List
            | BlockKind::Phonetic
            | BlockKind::Other(_) => text.to_string(),
        }
    }

    fn render_image(&mut self, key: usize, block: &ContentBlock, pages: &[DynamicImage]) -> String {
        let caption = block.caption().map(str::trim);
        match (self.store.resolve(key, block, pages), caption) {
            (Ok(image), Some(caption)) => format!("![{caption}]({})\n*{caption}*", image.relative_path),
            (Ok(image), None) => format!("![]({})", image.relative_path),
            (Err(_), Some(caption)) => format!("<!-- Image: unavailable -->\n*{caption}*"),
            (Err(_), None) => "<!-- Image: unavailable -->".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BoundingBox;
    use crate::blocks::META_CAPTION;
    use crate::extract::{parse_page, ExtractOptions};
    use image::{Rgb, RgbImage};

    fn renderer() -> MarkdownRenderer {
        MarkdownRenderer::new(ImageStore::in_memory("images", 90))
    }

    fn render(blocks: &[ContentBlock]) -> String {
        renderer().render(blocks, &[])
    }

    #[test]
    fn end_to_end_title_text_table() {
        let raw = "## Title\n\nSome body text.\n\n| a | b |\n|---|---|\n| 1 | 2 |";
        let (_, blocks) = parse_page(raw, &ExtractOptions::default());
        assert_eq!(render(&blocks), raw);
    }

    #[test]
    fn equation_switches_to_display_when_long() {
        let short = ContentBlock::new(BlockKind::Equation, "x^2");
        let long = ContentBlock::new(BlockKind::Equation, "a".repeat(51));
        let lines = ContentBlock::new(BlockKind::Equation, "a\\\\\nb");
        assert_eq!(render(&[short]), "$x^2$");
        assert_eq!(render(&[long]), format!("$$\n{}\n$$", "a".repeat(51)));
        assert_eq!(render(&[lines]), "$$\na\\\\\nb\n$$");
        assert_eq!(
            render(&[ContentBlock::new(BlockKind::EquationBlock, "y")]),
            "$$\ny\n$$"
        );
    }

    #[test]
    fn code_fences_keep_language() {
        let code = ContentBlock::new(BlockKind::Code, "fn main() {}").with_metadata(META_LANGUAGE, "rust");
        let algo = ContentBlock::new(BlockKind::Algorithm, "1: loop");
        assert_eq!(
            render(&[code, algo]),
            "```rust\nfn main() {}\n```\n\n```algorithm\n1: loop\n```"
        );
    }

    #[test]
    fn annotations_and_captions() {
        let blocks = [
            ContentBlock::new(BlockKind::Header, "Journal"),
            ContentBlock::new(BlockKind::TableCaption, "Results"),
            ContentBlock::new(BlockKind::ImageCaption, "A cat"),
            ContentBlock::new(BlockKind::CodeCaption, "Listing"),
            ContentBlock::new(BlockKind::RefText, "one\ntwo"),
            ContentBlock::new(BlockKind::AsideText, "margin"),
            ContentBlock::page_seam(2),
            ContentBlock::new(BlockKind::Footer, "p. 3"),
            ContentBlock::new(BlockKind::ImageFootnote, "scaled"),
        ];
        assert_eq!(
            render(&blocks),
            "<!-- Header: Journal -->\n\n*Table: Results*\n\n*Figure: A cat*\n\n*Code: Listing*\n\n\
             > one\n> two\n\n<!-- Aside: margin -->\n\n<!-- Page 2 -->\n\n<!-- Footer: p. 3 -->\n\n*Note: scaled*"
        );
    }

    #[test]
    fn footnotes_are_numbered_per_renderer() {
        let notes = [
            ContentBlock::new(BlockKind::PageFootnote, "first"),
            ContentBlock::new(BlockKind::PageFootnote, "second"),
        ];
        let mut r = renderer();
        assert_eq!(r.render(&notes, &[]), "[^1]: first\n\n[^2]: second");
        assert_eq!(render(&notes[..1]), "[^1]: first");
    }

    #[test]
    fn unknown_kind_is_plain_text_and_blank_blocks_are_skipped() {
        let blocks = [
            ContentBlock::new(BlockKind::Other("sidebar".into()), "hello"),
            ContentBlock::text("   "),
            ContentBlock::new(BlockKind::Title, ""),
            ContentBlock::text("world"),
        ];
        assert_eq!(render(&blocks), "hello\n\nworld");
    }

    #[test]
    fn markdown_escapes_are_left_alone() {
        assert_eq!(render(&[ContentBlock::text(r"50\% \(x\)")]), r"50\% \(x\)");
    }

    #[test]
    fn images_reference_sequential_files() {
        let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([0, 0, 0])));
        let bbox = BoundingBox::new(0.0, 0.0, 0.5, 0.5);
        let blocks = [
            ContentBlock::image(bbox),
            ContentBlock::text("between"),
            ContentBlock::image(bbox).with_metadata(META_CAPTION, "Figure 1: plot"),
        ];
        let mut r = renderer();
        assert_eq!(
            r.render(&blocks, &[page]),
            "![](images/image_1.jpg)\n\nbetween\n\n![Figure 1: plot](images/image_2.jpg)\n*Figure 1: plot*"
        );
        assert_eq!(r.store().resolved_count(), 2);
    }

    #[test]
    fn unresolvable_image_becomes_comment() {
        let blocks = [
            ContentBlock::image(None),
            ContentBlock::image(BoundingBox::new(0.2, 0.2, 0.2, 0.8)).with_metadata(META_CAPTION, "lost"),
        ];
        assert_eq!(
            render(&blocks),
            "<!-- Image: unavailable -->\n\n<!-- Image: unavailable -->\n*lost*"
        );
    }
}
