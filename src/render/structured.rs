//! Structured renderer: blocks → [`StructuredDocument`].
//!
//! The node list is a small, container-agnostic description of a paginated
//! document: styled paragraphs, headings, tables and pictures. Styling is
//! decided here; [`crate::render::docx`] only maps nodes onto the Word
//! object model.
//!
//! All text is passed through [`unescape_latex`] first. Page-number blocks
//! are dropped: the document carries a live page field in its footer.

use crate::blocks::{BlockKind, ContentBlock};
use crate::config::DocxLayout;
use crate::geometry::{ImageStore, ResolvedImage};
use crate::render::table::{parse_table, TableGrid};
use crate::render::{is_skipped, unescape_latex};
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

/// English Metric Units per inch, the unit Word measures drawings in.
pub const EMU_PER_INCH: f64 = 914_400.0;

/// Pixels per inch assumed when sizing a picture from its pixel width.
const PICTURE_PIXELS_PER_INCH: f64 = 100.0;

const CODE_FONT: &str = "Consolas";
const CODE_SHADING: &str = "F0F0F0";
const CAPTION_COLOR: &str = "404040";
const ANNOTATION_COLOR: &str = "808080";
const SMALL_PT: f32 = 9.0;
const EQUATION_PT: f32 = 11.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
}

/// Run-level formatting. `None` fields inherit the document defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub size_pt: Option<f32>,
    pub font: Option<String>,
    /// `RRGGBB`
    pub color: Option<String>,
    /// Background fill, `RRGGBB`.
    pub shading: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyledParagraph {
    /// May contain `\n`; each line becomes its own line in the paragraph.
    pub text: String,
    pub alignment: Alignment,
    pub style: TextStyle,
    pub space_before_pt: Option<f32>,
    pub space_after_pt: Option<f32>,
}

impl StyledParagraph {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn centered(mut self) -> Self {
        self.alignment = Alignment::Center;
        self
    }
}

/// An image placed at a fixed size.
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub image: Arc<ResolvedImage>,
    pub width_in: f64,
    pub height_in: f64,
}

impl Picture {
    /// Size from pixel dimensions at 100 px/in, capped at `max_width_in`
    /// with the aspect ratio kept.
    pub fn fit(image: Arc<ResolvedImage>, max_width_in: f64) -> Self {
        let width_px = image.width.max(1) as f64;
        let width_in = (width_px / PICTURE_PIXELS_PER_INCH).min(max_width_in);
        let height_in = width_in * image.height as f64 / width_px;
        Self {
            image,
            width_in,
            height_in,
        }
    }

    pub fn width_emu(&self) -> u32 {
        (self.width_in * EMU_PER_INCH).round() as u32
    }

    pub fn height_emu(&self) -> u32 {
        (self.height_in * EMU_PER_INCH).round() as u32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocNode {
    Heading { level: u8, paragraph: StyledParagraph },
    Paragraph(StyledParagraph),
    /// First row is the header row.
    Table(TableGrid),
    /// Centered on its own line.
    Picture(Picture),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructuredDocument {
    pub nodes: Vec<DocNode>,
}

impl StructuredDocument {
    pub fn pictures(&self) -> impl Iterator<Item = &Picture> {
        self.nodes.iter().filter_map(|n| match n {
            DocNode::Picture(p) => Some(p),
            _ => None,
        })
    }
}

/// One document's structured renderer. Owns its image store.
#[derive(Debug)]
pub struct StructuredRenderer {
    store: ImageStore,
    layout: DocxLayout,
}

impl StructuredRenderer {
    pub fn new(store: ImageStore, layout: DocxLayout) -> Self {
        Self { store, layout }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn layout(&self) -> &DocxLayout {
        &self.layout
    }

    pub fn render(&mut self, blocks: &[ContentBlock], pages: &[DynamicImage]) -> StructuredDocument {
        let mut doc = StructuredDocument::default();
        for (key, block) in blocks.iter().enumerate() {
            if is_skipped(block) {
                continue;
            }
            self.render_block(&mut doc.nodes, key, block, pages);
        }
        debug!("Structured document has {} nodes", doc.nodes.len());
        doc
    }

    fn render_block(&mut self, nodes: &mut Vec<DocNode>, key: usize, block: &ContentBlock, pages: &[DynamicImage]) {
        let text = unescape_latex(block.text.trim());
        match &block.kind {
            BlockKind::Title => nodes.push(DocNode::Heading {
                level: 2,
                paragraph: StyledParagraph {
                    text,
                    style: TextStyle {
                        bold: true,
                        size_pt: Some(self.layout.heading_size_pt),
                        font: Some(self.layout.heading_font.clone()),
                        color: Some("000000".into()),
                        ..Default::default()
                    },
                    space_before_pt: Some(12.0),
                    space_after_pt: Some(6.0),
                    ..Default::default()
                },
            }),
            BlockKind::Table => match parse_table(&text) {
                Some(grid) => nodes.push(DocNode::Table(grid)),
                None => nodes.push(DocNode::Paragraph(StyledParagraph::plain(text))),
            },
            BlockKind::Image => self.render_image(nodes, key, block, pages),
            BlockKind::Code | BlockKind::Algorithm => nodes.push(DocNode::Paragraph(StyledParagraph {
                text,
                style: TextStyle {
                    size_pt: Some(SMALL_PT),
                    font: Some(CODE_FONT.into()),
                    shading: Some(CODE_SHADING.into()),
                    ..Default::default()
                },
                space_before_pt: Some(0.0),
                space_after_pt: Some(0.0),
                ..Default::default()
            })),
            BlockKind::Equation | BlockKind::EquationBlock => nodes.push(DocNode::Paragraph(
                StyledParagraph {
                    text,
                    style: TextStyle {
                        italic: true,
                        size_pt: Some(EQUATION_PT),
                        ..Default::default()
                    },
                    ..Default::default()
                }
                .centered(),
            )),
            BlockKind::TableCaption | BlockKind::ImageCaption | BlockKind::CodeCaption => {
                nodes.push(DocNode::Paragraph(caption(text)))
            }
            BlockKind::PageFootnote | BlockKind::TableFootnote | BlockKind::ImageFootnote => {
                nodes.push(DocNode::Paragraph(StyledParagraph {
                    text,
                    style: TextStyle {
                        italic: true,
                        size_pt: Some(SMALL_PT),
                        ..Default::default()
                    },
                    ..Default::default()
                }))
            }
            BlockKind::Header => nodes.push(DocNode::Paragraph(annotation("HEADER", &text))),
            BlockKind::Footer => nodes.push(DocNode::Paragraph(annotation("FOOTER", &text))),
            BlockKind::AsideText => nodes.push(DocNode::Paragraph(annotation("ASIDE", &text))),
            BlockKind::PageNumber => {}
            BlockKind::Text
            | BlockKind::List
            | BlockKind::Phonetic
            | BlockKind::RefText
            | BlockKind::Other(_) => nodes.push(DocNode::Paragraph(StyledParagraph::plain(text))),
        }
    }

    fn render_image(&mut self, nodes: &mut Vec<DocNode>, key: usize, block: &ContentBlock, pages: &[DynamicImage]) {
        match self.store.resolve(key, block, pages) {
            Ok(image) => nodes.push(DocNode::Picture(Picture::fit(image, self.layout.picture_max_width_in))),
            Err(_) => nodes.push(DocNode::Paragraph(annotation("IMAGE", "unavailable").centered())),
        }
        if let Some(text) = block.caption() {
            nodes.push(DocNode::Paragraph(caption(unescape_latex(text.trim()))));
        }
    }
}

fn caption(text: String) -> StyledParagraph {
    StyledParagraph {
        text,
        style: TextStyle {
            italic: true,
            size_pt: Some(SMALL_PT),
            color: Some(CAPTION_COLOR.into()),
            ..Default::default()
        },
        ..Default::default()
    }
    .centered()
}

fn annotation(label: &str, text: &str) -> StyledParagraph {
    StyledParagraph {
        text: format!("[{label}]: {text}"),
        style: TextStyle {
            italic: true,
            size_pt: Some(SMALL_PT),
            color: Some(ANNOTATION_COLOR.into()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BoundingBox;
    use crate::blocks::META_CAPTION;
    use crate::render::markdown::MarkdownRenderer;
    use image::{Rgb, RgbImage};

    fn renderer() -> StructuredRenderer {
        StructuredRenderer::new(ImageStore::in_memory("images", 90), DocxLayout::default())
    }

    fn paragraph_texts(doc: &StructuredDocument) -> Vec<String> {
        doc.nodes
            .iter()
            .map(|n| match n {
                DocNode::Heading { paragraph, .. } | DocNode::Paragraph(paragraph) => paragraph.text.clone(),
                DocNode::Table(_) => "<table>".into(),
                DocNode::Picture(p) => format!("<picture {}>", p.image.index),
            })
            .collect()
    }

    #[test]
    fn title_is_bold_heading() {
        let doc = renderer().render(&[ContentBlock::new(BlockKind::Title, "Intro")], &[]);
        let DocNode::Heading { level, paragraph } = &doc.nodes[0] else {
            panic!("expected heading, got {:?}", doc.nodes[0]);
        };
        assert_eq!(*level, 2);
        assert!(paragraph.style.bold);
        assert_eq!(paragraph.style.size_pt, Some(14.0));
        assert_eq!(paragraph.style.font.as_deref(), Some("SimHei"));
    }

    #[test]
    fn latex_escapes_are_removed() {
        let doc = renderer().render(&[ContentBlock::text(r"costs 5\% of \$10")], &[]);
        assert_eq!(paragraph_texts(&doc), ["costs 5% of $10"]);
    }

    #[test]
    fn tables_parse_or_fall_back() {
        let doc = renderer().render(
            &[
                ContentBlock::new(BlockKind::Table, "| a | b |\n|---|---|\n| 1 | 2 |"),
                ContentBlock::new(BlockKind::Table, "a | b only"),
            ],
            &[],
        );
        assert!(matches!(&doc.nodes[0], DocNode::Table(g) if g.rows.len() == 2));
        assert_eq!(paragraph_texts(&doc)[1], "a | b only");
    }

    #[test]
    fn page_numbers_are_suppressed_and_annotations_labelled() {
        let doc = renderer().render(
            &[
                ContentBlock::new(BlockKind::Header, "Journal"),
                ContentBlock::page_seam(2),
                ContentBlock::new(BlockKind::AsideText, "note"),
            ],
            &[],
        );
        assert_eq!(paragraph_texts(&doc), ["[HEADER]: Journal", "[ASIDE]: note"]);
        let DocNode::Paragraph(p) = &doc.nodes[0] else { unreachable!() };
        assert_eq!(p.style.color.as_deref(), Some("808080"));
        assert!(p.style.italic);
    }

    #[test]
    fn code_is_monospace_and_shaded() {
        let doc = renderer().render(&[ContentBlock::new(BlockKind::Algorithm, "x <- 1")], &[]);
        let DocNode::Paragraph(p) = &doc.nodes[0] else { unreachable!() };
        assert_eq!(p.style.font.as_deref(), Some("Consolas"));
        assert_eq!(p.style.shading.as_deref(), Some("F0F0F0"));
    }

    #[test]
    fn pictures_are_capped_and_captioned() {
        let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(2000, 1000, Rgb([9, 9, 9])));
        let small = ContentBlock::image(BoundingBox::new(0.0, 0.0, 0.2, 0.2));
        let wide = ContentBlock::image(BoundingBox::new(0.0, 0.0, 1.0, 1.0)).with_metadata(META_CAPTION, "Map");
        let doc = renderer().render(&[small, wide], &[page]);

        assert_eq!(paragraph_texts(&doc), ["<picture 1>", "<picture 2>", "Map"]);
        let pics: Vec<_> = doc.pictures().collect();
        assert!((pics[0].width_in - 4.0).abs() < 1e-9);
        assert!((pics[0].height_in - 2.0).abs() < 1e-9);
        assert!((pics[1].width_in - 6.0).abs() < 1e-9);
        assert!((pics[1].height_in - 3.0).abs() < 1e-9);
        assert_eq!(pics[1].width_emu(), 6 * 914_400);
    }

    #[test]
    fn both_renderers_keep_order_and_skip_the_same_blocks() {
        let blocks = [
            ContentBlock::new(BlockKind::Title, "A"),
            ContentBlock::text(""),
            ContentBlock::text("B"),
            ContentBlock::new(BlockKind::Code, " "),
            ContentBlock::new(BlockKind::Other("future".into()), "C"),
        ];
        let doc = renderer().render(&blocks, &[]);
        let md = MarkdownRenderer::new(ImageStore::in_memory("images", 90)).render(&blocks, &[]);
        assert_eq!(paragraph_texts(&doc), ["A", "B", "C"]);
        assert_eq!(md, "## A\n\nB\n\nC");
    }
}
