//! Content blocks: the typed unit of parsed document structure.

use crate::bbox::BoundingBox;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Metadata key: caption text attached to an image block.
pub const META_CAPTION: &str = "caption";
/// Metadata key: language word found on an opening code fence.
pub const META_LANGUAGE: &str = "language";
/// Metadata key: number of `#` characters of a heading marker.
pub const META_LEVEL: &str = "level";
/// Metadata key: KIND of the non-image reference tag attached to a block.
pub const META_REF_KIND: &str = "ref_kind";

/// The closed set of block kinds, plus an `Other` arm for labels this crate
/// does not know yet. Every consumer treats `Other` as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockKind {
    Text,
    Title,
    Image,
    Table,
    Code,
    Algorithm,
    /// Inline equation.
    Equation,
    /// Display equation.
    EquationBlock,
    List,
    TableCaption,
    ImageCaption,
    CodeCaption,
    /// Quoted or reference text.
    RefText,
    Header,
    Footer,
    PageNumber,
    PageFootnote,
    TableFootnote,
    ImageFootnote,
    AsideText,
    Phonetic,
    Other(String),
}

impl BlockKind {
    /// Wire label of the kind, as used by the model and in JSON dumps.
    pub fn as_str(&self) -> &str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Title => "title",
            BlockKind::Image => "image",
            BlockKind::Table => "table",
            BlockKind::Code => "code",
            BlockKind::Algorithm => "algorithm",
            BlockKind::Equation => "equation",
            BlockKind::EquationBlock => "equation_block",
            BlockKind::List => "list",
            BlockKind::TableCaption => "table_caption",
            BlockKind::ImageCaption => "image_caption",
            BlockKind::CodeCaption => "code_caption",
            BlockKind::RefText => "ref_text",
            BlockKind::Header => "header",
            BlockKind::Footer => "footer",
            BlockKind::PageNumber => "page_number",
            BlockKind::PageFootnote => "page_footnote",
            BlockKind::TableFootnote => "table_footnote",
            BlockKind::ImageFootnote => "image_footnote",
            BlockKind::AsideText => "aside_text",
            BlockKind::Phonetic => "phonetic",
            BlockKind::Other(label) => label.as_str(),
        }
    }

    /// Map a label to a kind. Matching ignores ASCII case and accepts `-`
    /// for `_`; unknown labels land in [`BlockKind::Other`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "text" => BlockKind::Text,
            "title" => BlockKind::Title,
            "image" => BlockKind::Image,
            "table" => BlockKind::Table,
            "code" => BlockKind::Code,
            "algorithm" => BlockKind::Algorithm,
            "equation" => BlockKind::Equation,
            "equation_block" => BlockKind::EquationBlock,
            "list" => BlockKind::List,
            "table_caption" => BlockKind::TableCaption,
            "image_caption" => BlockKind::ImageCaption,
            "code_caption" => BlockKind::CodeCaption,
            "ref_text" => BlockKind::RefText,
            "header" => BlockKind::Header,
            "footer" => BlockKind::Footer,
            "page_number" => BlockKind::PageNumber,
            "page_footnote" => BlockKind::PageFootnote,
            "table_footnote" => BlockKind::TableFootnote,
            "image_footnote" => BlockKind::ImageFootnote,
            "aside_text" => BlockKind::AsideText,
            "phonetic" => BlockKind::Phonetic,
            _ => BlockKind::Other(label.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, BlockKind::Other(_))
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for BlockKind {
    fn from(label: String) -> Self {
        BlockKind::from_label(&label)
    }
}

impl From<BlockKind> for String {
    fn from(kind: BlockKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One block of document structure, in reading order.
///
/// Blocks are immutable once the extractor hands them out. Renderers read
/// them and derive artefacts (image files, document nodes) from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub kind: BlockKind,

    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,

    /// Image object lifted straight out of the source page. Takes precedence
    /// over cropping `bounding_box` from the page raster.
    #[serde(skip)]
    pub embedded_image: Option<Arc<DynamicImage>>,

    /// 0-based index of the source page this block was read from.
    #[serde(default)]
    pub page: usize,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ContentBlock {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            bounding_box: None,
            embedded_image: None,
            page: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Text, text)
    }

    pub fn image(bounding_box: Option<BoundingBox>) -> Self {
        Self {
            bounding_box,
            ..Self::new(BlockKind::Image, "")
        }
    }

    /// The synthetic block inserted before every page but the first.
    pub fn page_seam(page_number: usize) -> Self {
        Self::new(BlockKind::PageNumber, format!("Page {page_number}"))
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_bounding_box(mut self, bbox: Option<BoundingBox>) -> Self {
        self.bounding_box = bbox;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_embedded_image(mut self, image: Arc<DynamicImage>) -> Self {
        self.embedded_image = Some(image);
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn caption(&self) -> Option<&str> {
        self.meta(META_CAPTION).filter(|c| !c.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_for_known_kinds() {
        for kind in [
            BlockKind::EquationBlock,
            BlockKind::ImageCaption,
            BlockKind::PageFootnote,
            BlockKind::AsideText,
        ] {
            assert_eq!(BlockKind::from_label(kind.as_str()), kind);
        }
    }

    #[test]
    fn unknown_label_is_other() {
        let kind = BlockKind::from_label("sidebar_quote");
        assert_eq!(kind, BlockKind::Other("sidebar_quote".into()));
        assert!(!kind.is_known());
        assert_eq!(kind.as_str(), "sidebar_quote");
    }

    #[test]
    fn label_matching_is_lenient() {
        assert_eq!(BlockKind::from_label("Table-Caption"), BlockKind::TableCaption);
        assert_eq!(BlockKind::from_label(" TITLE "), BlockKind::Title);
    }

    #[test]
    fn serde_uses_wire_labels() {
        let block = ContentBlock::new(BlockKind::EquationBlock, "x^2");
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""kind":"equation_block""#), "got {json}");
        assert!(!json.contains("bounding_box"));

        let back: ContentBlock =
            serde_json::from_str(r#"{"kind":"marginalia","text":"see p. 4"}"#).unwrap();
        assert_eq!(back.kind, BlockKind::Other("marginalia".into()));
        assert_eq!(back.page, 0);
    }

    #[test]
    fn page_seam_text() {
        let seam = ContentBlock::page_seam(2);
        assert_eq!(seam.kind, BlockKind::PageNumber);
        assert_eq!(seam.text, "Page 2");
    }

    #[test]
    fn blank_caption_is_none() {
        let block = ContentBlock::image(None).with_metadata(META_CAPTION, "  ");
        assert_eq!(block.caption(), None);
    }
}
