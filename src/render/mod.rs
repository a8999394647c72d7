//! Renderers: block sequence → output document.
//!
//! Two renderers consume the same `&[ContentBlock]`:
//!
//! | Module | Output |
//! |--------|--------|
//! | [`markdown`] | one Markdown string, images written through an [`ImageStore`] |
//! | [`structured`] | a [`structured::StructuredDocument`] node list, turned into a `.docx` by [`docx`] |
//!
//! Both dispatch exhaustively on [`crate::blocks::BlockKind`], treat
//! `Other(_)` as text and skip the same blocks ([`is_skipped`]). Each
//! renderer instance owns its counters; create one per document.
//!
//! [`ImageStore`]: crate::geometry::ImageStore

pub mod docx;
pub mod markdown;
pub mod structured;
pub mod table;

use crate::blocks::{BlockKind, ContentBlock};

/// LaTeX-escaped punctuation unescaped before text reaches the structured
/// renderer. The Markdown renderer leaves these alone.
const LATEX_ESCAPES: [(&str, &str); 11] = [
    ("\\(", "("),
    ("\\)", ")"),
    ("\\[", "["),
    ("\\]", "]"),
    ("\\{", "{"),
    ("\\}", "}"),
    ("\\%", "%"),
    ("\\_", "_"),
    ("\\#", "#"),
    ("\\&", "&"),
    ("\\$", "$"),
];

/// A block with blank text renders to nothing, unless it is an image.
pub fn is_skipped(block: &ContentBlock) -> bool {
    block.kind != BlockKind::Image && block.text.trim().is_empty()
}

/// Replace every escape in [`LATEX_ESCAPES`] by its plain character.
pub fn unescape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        for (escaped, plain) in LATEX_ESCAPES {
            if let Some(after) = tail.strip_prefix(escaped) {
                out.push_str(plain);
                rest = after;
                continue 'scan;
            }
        }
        out.push('\\');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_rule() {
        assert!(is_skipped(&ContentBlock::text("  \n ")));
        assert!(is_skipped(&ContentBlock::new(BlockKind::Other("x".into()), "")));
        assert!(!is_skipped(&ContentBlock::image(None)));
        assert!(!is_skipped(&ContentBlock::text("a")));
    }

    #[test]
    fn unescapes_fixed_table_only() {
        assert_eq!(
            unescape_latex(r"\(a\) \[b\] \{c\} 5\% x\_1 \# \& \$"),
            "(a) [b] {c} 5% x_1 # & $"
        );
        assert_eq!(unescape_latex(r"\alpha \\ end\"), r"\alpha \\ end\");
    }

    #[test]
    fn unescape_handles_consecutive_backslashes() {
        // The first backslash escapes nothing, the second starts `\%`.
        assert_eq!(unescape_latex(r"\\%"), r"\%");
    }
}
