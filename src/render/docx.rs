//! [`StructuredDocument`] → Word `.docx` via `docx-rs`.
//!
//! Page size, margins, default font and line spacing come from
//! [`DocxLayout`] and are applied once when the document is created. The
//! footer holds a centered live page-number field.

use crate::config::DocxLayout;
use crate::error::Ocr2DocError;
use crate::render::structured::{Alignment, DocNode, Picture, StructuredDocument, StyledParagraph, TextStyle};
use crate::render::table::TableGrid;
use docx_rs::{
    AlignmentType, BreakType, Docx, Footer, LineSpacing, PageMargin, PageNum, Paragraph, Pic, Run,
    RunFonts, Shading, Style, StyleType, Table, TableCell, TableRow,
};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Twentieths of a point per centimetre.
const TWIPS_PER_CM: f32 = 567.0;
const TWIPS_PER_PT: f32 = 20.0;

fn cm_to_twips(cm: f32) -> i32 {
    (cm * TWIPS_PER_CM).round() as i32
}

fn half_points(pt: f32) -> usize {
    (pt * 2.0).round() as usize
}

/// Build the `docx-rs` object model for `doc`.
pub fn build_docx(doc: &StructuredDocument, layout: &DocxLayout) -> Docx {
    let body_fonts = RunFonts::new()
        .ascii(&layout.body_font)
        .hi_ansi(&layout.body_font)
        .east_asia(&layout.body_font);

    let mut docx = Docx::new()
        .page_size(
            cm_to_twips(layout.page_width_cm) as u32,
            cm_to_twips(layout.page_height_cm) as u32,
        )
        .page_margin(
            PageMargin::new()
                .top(cm_to_twips(layout.margin_top_cm))
                .bottom(cm_to_twips(layout.margin_bottom_cm))
                .left(cm_to_twips(layout.margin_left_cm))
                .right(cm_to_twips(layout.margin_right_cm)),
        )
        .default_fonts(body_fonts)
        .default_size(half_points(layout.body_size_pt))
        .add_style(Style::new("Heading2", StyleType::Paragraph).name("Heading 2"))
        .footer(Footer::new().add_paragraph(Paragraph::new().add_page_num(PageNum::new()).align(AlignmentType::Center)));

    for node in &doc.nodes {
        docx = match node {
            DocNode::Heading { level, paragraph } => {
                docx.add_paragraph(paragraph_for(paragraph, layout).style(&format!("Heading{level}")))
            }
            DocNode::Paragraph(paragraph) => docx.add_paragraph(paragraph_for(paragraph, layout)),
            DocNode::Table(grid) => docx
                .add_table(table_for(grid, layout))
                .add_paragraph(Paragraph::new()),
            DocNode::Picture(picture) => docx.add_paragraph(picture_for(picture)),
        };
    }
    docx
}

/// Build and pack `doc` into `path`.
pub fn write_docx(doc: &StructuredDocument, layout: &DocxLayout, path: &Path) -> Result<(), Ocr2DocError> {
    let file = File::create(path).map_err(|e| Ocr2DocError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    build_docx(doc, layout)
        .build()
        .pack(file)
        .map_err(|e| Ocr2DocError::DocxWrite {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    debug!("Packed {} nodes into {}", doc.nodes.len(), path.display());
    Ok(())
}

fn paragraph_for(p: &StyledParagraph, layout: &DocxLayout) -> Paragraph {
    let mut spacing = LineSpacing::new().line((layout.line_spacing * 240.0).round() as i32);
    if let Some(pt) = p.space_before_pt {
        spacing = spacing.before((pt * TWIPS_PER_PT).round() as u32);
    }
    if let Some(pt) = p.space_after_pt {
        spacing = spacing.after((pt * TWIPS_PER_PT).round() as u32);
    }

    let mut paragraph = Paragraph::new()
        .add_run(run_for(&p.text, &p.style))
        .line_spacing(spacing);
    if p.alignment == Alignment::Center {
        paragraph = paragraph.align(AlignmentType::Center);
    }
    paragraph
}

/// One run; line breaks inside `text` become text-wrapping breaks.
fn run_for(text: &str, style: &TextStyle) -> Run {
    let mut run = Run::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        run = run.add_text(line);
    }
    if style.bold {
        run = run.bold();
    }
    if style.italic {
        run = run.italic();
    }
    if let Some(pt) = style.size_pt {
        run = run.size(half_points(pt));
    }
    if let Some(font) = &style.font {
        run = run.fonts(RunFonts::new().ascii(font).hi_ansi(font).east_asia(font));
    }
    if let Some(color) = &style.color {
        run = run.color(color);
    }
    if let Some(fill) = &style.shading {
        run = run.shading(Shading::new().fill(fill));
    }
    run
}

fn table_for(grid: &TableGrid, layout: &DocxLayout) -> Table {
    let rows = grid
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cells = row
                .iter()
                .map(|text| {
                    let style = TextStyle {
                        bold: i == 0,
                        size_pt: Some(layout.body_size_pt),
                        ..Default::default()
                    };
                    TableCell::new().add_paragraph(Paragraph::new().add_run(run_for(text, &style)))
                })
                .collect();
            TableRow::new(cells)
        })
        .collect();
    Table::new(rows)
}

fn picture_for(picture: &Picture) -> Paragraph {
    let pic = Pic::new(&picture.image.jpeg).size(picture.width_emu(), picture.height_emu());
    Paragraph::new()
        .add_run(Run::new().add_image(pic))
        .align(AlignmentType::Center)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockKind, ContentBlock};
    use crate::geometry::ImageStore;
    use crate::render::structured::StructuredRenderer;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Read;

    #[test]
    fn unit_conversions() {
        assert_eq!(cm_to_twips(21.0), 11907);
        assert_eq!(cm_to_twips(2.54), 1440);
        assert_eq!(half_points(10.5), 21);
    }

    #[test]
    fn writes_a_zip_container() {
        let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([200, 0, 0])));
        let blocks = [
            ContentBlock::new(BlockKind::Title, "Report"),
            ContentBlock::text("Line one\nline two"),
            ContentBlock::new(BlockKind::Table, "| a | b |\n|---|---|\n| 1 | 2 |"),
            ContentBlock::image(crate::bbox::BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            ContentBlock::new(BlockKind::Code, "let x = 1;"),
        ];
        let layout = DocxLayout::default();
        let doc = StructuredRenderer::new(ImageStore::in_memory("images", 90), layout.clone())
            .render(&blocks, &[page]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.docx");
        write_docx(&doc, &layout, &path).unwrap();

        let mut magic = [0u8; 2];
        File::open(&path).unwrap().read_exact(&mut magic).unwrap();
        assert_eq!(&magic, b"PK");
    }

    #[test]
    fn unwritable_path_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.docx");
        let err = write_docx(&StructuredDocument::default(), &DocxLayout::default(), &path).unwrap_err();
        assert!(matches!(err, Ocr2DocError::OutputWriteFailed { .. }));
    }
}
