//! Tag grammar: reference/detection pairs in the raw model output.
//!
//! A grounding-capable OCR model interleaves its Markdown with annotations
//! of the form
//!
//! ```text
//! <|ref|>KIND<|/ref|><|det|>[[x1, y1, x2, y2]]<|/det|>
//! ```
//!
//! (the bare `<ref>…</ref><det>…</det>` spelling is accepted too). This
//! module finds every pair in one left-to-right pass and produces the
//! cleaned text:
//!
//! * `image` tags become a placeholder line `![image](images/image_<i>.jpg)`
//!   with a sequential index, one substitution per occurrence;
//! * every other tag is deleted, surrounding text untouched;
//! * the stray `<|grounding|>` marker is removed and `\coloneqq` /
//!   `\eqqcolon` are rewritten to `:=` / `=:`.
//!
//! Coordinates are kept as raw text here. Turning them into a
//! [`crate::bbox::BoundingBox`] happens in the extractor, where a malformed
//! payload degrades to "no box".

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

/// KIND label that turns a tag into an image placeholder. Surrounding
/// whitespace is ignored, as in [`crate::blocks::BlockKind::from_label`].
pub const IMAGE_KIND: &str = "image";

/// KIND and COORDS exclude `<`, so a match can never run across an
/// unrelated ref/det pair, and both may span lines.
static RE_REF_DET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\|?ref\|?>([^<]*)<\|?/ref\|?>\s*<\|?det\|?>([^<]*)<\|?/det\|?>").unwrap()
});

/// Matches a placeholder line written by [`image_placeholder`].
pub static RE_IMAGE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!\[image\]\(images/image_(\d+)\.jpg\)").unwrap());

const STRAY_MARKERS: [&str; 2] = ["<|grounding|>", "<grounding>"];

const MACRO_REWRITES: [(&str, &str); 2] = [("\\coloneqq", ":="), ("\\eqqcolon", "=:")];

/// One tag occurrence in the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTag {
    /// Free-form label from the model (`image`, `title`, `table`, …).
    pub kind: String,
    /// Unparsed COORDS payload.
    pub raw_coordinates: String,
    /// Byte range of the whole matched tag in the raw text.
    pub span: Range<usize>,
    /// Byte offset in the cleaned text where the tag was removed (for images,
    /// where its placeholder starts).
    pub cleaned_offset: usize,
    /// Sequential placeholder index; `Some` only for image tags.
    pub image_index: Option<usize>,
}

impl ReferenceTag {
    pub fn is_image(&self) -> bool {
        self.image_index.is_some()
    }
}

/// Result of a tag pass: cleaned text plus every tag, in first-occurrence
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedText {
    pub cleaned: String,
    pub tags: Vec<ReferenceTag>,
}

impl TaggedText {
    /// Image tags, position `i` holding the tag of placeholder `image_i`.
    pub fn image_tags(&self) -> Vec<&ReferenceTag> {
        self.tags.iter().filter(|t| t.is_image()).collect()
    }

    pub fn other_tags(&self) -> Vec<&ReferenceTag> {
        self.tags.iter().filter(|t| !t.is_image()).collect()
    }
}

/// The placeholder line substituted for image tag `index`.
pub fn image_placeholder(index: usize) -> String {
    format!("![image](images/image_{index}.jpg)\n")
}

/// Scan `raw` once, substituting or deleting every tag occurrence.
pub fn parse_tags(raw: &str) -> TaggedText {
    let mut cleaned = String::with_capacity(raw.len());
    let mut tags = Vec::new();
    let mut last = 0;
    let mut next_image = 0;

    for caps in RE_REF_DET.captures_iter(raw) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        cleaned.push_str(&normalise(&raw[last..whole.start()]));

        let kind = caps[1].to_string();
        let cleaned_offset = cleaned.len();
        let image_index = if is_image_kind(&kind) {
            cleaned.push_str(&image_placeholder(next_image));
            next_image += 1;
            Some(next_image - 1)
        } else {
            None
        };

        tags.push(ReferenceTag {
            kind,
            raw_coordinates: caps[2].to_string(),
            span: whole.range(),
            cleaned_offset,
            image_index,
        });
        last = whole.end();
    }
    cleaned.push_str(&normalise(&raw[last..]));

    TaggedText { cleaned, tags }
}

fn is_image_kind(kind: &str) -> bool {
    kind.trim() == IMAGE_KIND
}

/// Strip stray markers and rewrite the two colon-equals macros.
fn normalise(segment: &str) -> String {
    let mut out = segment.to_string();
    for marker in STRAY_MARKERS {
        if out.contains(marker) {
            out = out.replace(marker, "");
        }
    }
    for (from, to) in MACRO_REWRITES {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out
}
