//! Bounding boxes and the coordinate-literal parser.
//!
//! The model reports regions as a bracketed literal in its own integer
//! coordinate space, `[[x1, y1, x2, y2], ...]` with every component in
//! `0..=999`. The literal is parsed by a small recursive-descent parser that
//! accepts nothing but nested lists of numbers; it is never evaluated.

use crate::error::CoordinateError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound of the model's native coordinate range.
pub const NATIVE_COORD_MAX: f64 = 999.0;

/// A normalised rectangle on its source page, each component in `[0, 1]`.
///
/// Invariant: `x1 <= x2 && y1 <= y2`. Constructors refuse anything else.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    /// Build a box from already-normalised components.
    ///
    /// Returns `None` when a component is not finite, lies outside `[0, 1]`,
    /// or the corners are inverted.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Option<Self> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if ![x1, y1, x2, y2].into_iter().all(in_range) || x1 > x2 || y1 > y2 {
            return None;
        }
        Some(Self { x1, y1, x2, y2 })
    }

    /// Normalise one native 4-tuple by dividing each component by 999.
    pub fn from_native(native: [f64; 4]) -> Option<Self> {
        let [x1, y1, x2, y2] = native.map(|c| c / NATIVE_COORD_MAX);
        Self::new(x1, y1, x2, y2)
    }

    /// Materialise the box for a raw COORDS payload.
    ///
    /// Only the first region is kept when the payload lists several. Any
    /// parse failure, a short first region, or an invalid rectangle yields
    /// `None` and a warning; this never fails hard.
    pub fn from_coordinates(raw: &str) -> Option<Self> {
        match first_region(raw) {
            Ok(native) => {
                let bbox = Self::from_native(native);
                if bbox.is_none() {
                    warn!("Ignoring out-of-range or inverted box {:?} from '{}'", native, raw.trim());
                }
                bbox
            }
            Err(e) => {
                warn!("Could not parse bbox from '{}': {}", raw.trim(), e);
                None
            }
        }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Parse a COORDS literal and return the first four components of its first
/// region, in native units.
pub fn first_region(raw: &str) -> Result<[f64; 4], CoordinateError> {
    let regions = parse_coordinate_list(raw)?;
    let first = regions.first().ok_or(CoordinateError::Empty)?;
    if first.len() < 4 {
        return Err(CoordinateError::TooFewComponents { found: first.len() });
    }
    Ok([first[0], first[1], first[2], first[3]])
}

/// Parse `[[n, n, n, n, ...], ...]` into its regions.
///
/// Grammar (whitespace allowed between tokens, one trailing comma tolerated
/// inside a list):
///
/// ```text
/// outer  := '[' ( region ( ',' region )* ','? )? ']'
/// region := '[' ( number ( ',' number )* ','? )? ']'
/// number := '-'? digit+ ( '.' digit+ )?
/// ```
pub fn parse_coordinate_list(raw: &str) -> Result<Vec<Vec<f64>>, CoordinateError> {
    let mut cursor = Cursor::new(raw);
    let regions = cursor.list(|c| c.list(Cursor::number))?;
    cursor.skip_ws();
    if let Some((offset, _)) = cursor.peek() {
        return Err(CoordinateError::TrailingInput { offset });
    }
    Ok(regions)
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<(usize, char)> {
        self.src[self.pos..].chars().next().map(|c| (self.pos, c))
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.src[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some((_, c)) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), CoordinateError> {
        self.skip_ws();
        match self.peek() {
            Some((_, c)) if c == want => {
                self.bump();
                Ok(())
            }
            Some((offset, found)) => Err(CoordinateError::UnexpectedChar { offset, found }),
            None => Err(CoordinateError::UnexpectedEnd),
        }
    }

    /// `'[' item (',' item)* ','? ']'`, possibly empty.
    fn list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, CoordinateError>,
    ) -> Result<Vec<T>, CoordinateError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some((_, ']')) => {
                    self.bump();
                    return Ok(items);
                }
                None => return Err(CoordinateError::UnexpectedEnd),
                _ => {}
            }
            items.push(item(self)?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(items),
                Some(found) => {
                    return Err(CoordinateError::UnexpectedChar {
                        offset: self.pos - found.len_utf8(),
                        found,
                    })
                }
                None => return Err(CoordinateError::UnexpectedEnd),
            }
        }
    }

    fn number(&mut self) -> Result<f64, CoordinateError> {
        self.skip_ws();
        let start = self.pos;
        if let Some((_, '-')) = self.peek() {
            self.bump();
        }
        let digits = |c: &mut Self| {
            let from = c.pos;
            while let Some((_, ch)) = c.peek() {
                if !ch.is_ascii_digit() {
                    break;
                }
                c.bump();
            }
            c.pos > from
        };
        if !digits(self) {
            return match self.peek() {
                Some((offset, found)) => Err(CoordinateError::UnexpectedChar { offset, found }),
                None => Err(CoordinateError::UnexpectedEnd),
            };
        }
        if let Some((_, '.')) = self.peek() {
            self.bump();
            if !digits(self) {
                return Err(CoordinateError::InvalidNumber {
                    text: self.src[start..self.pos].to_string(),
                });
            }
        }
        let text = &self.src[start..self.pos];
        text.parse::<f64>()
            .map_err(|_| CoordinateError::InvalidNumber { text: text.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_by_999() {
        let b = BoundingBox::from_coordinates("[[100, 200, 300, 400]]").unwrap();
        assert_eq!(b.x1, 100.0 / 999.0);
        assert_eq!(b.y1, 200.0 / 999.0);
        assert_eq!(b.x2, 300.0 / 999.0);
        assert_eq!(b.y2, 400.0 / 999.0);
    }

    #[test]
    fn full_page_box_is_unit_square() {
        let b = BoundingBox::from_coordinates("[[0, 0, 999, 999]]").unwrap();
        assert_eq!(b.as_array(), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn keeps_only_first_region() {
        let b = BoundingBox::from_coordinates("[[0, 0, 999, 999], [10, 10, 20, 20]]").unwrap();
        assert_eq!(b.x2, 1.0);
    }

    #[test]
    fn extra_components_are_ignored() {
        let b = BoundingBox::from_coordinates("[[9, 9, 99, 99, 5]]").unwrap();
        assert_eq!(b.x2, 99.0 / 999.0);
    }

    #[test]
    fn multiline_payload_parses() {
        let b = BoundingBox::from_coordinates("[\n  [1, 2,\n 3, 4]\n]");
        assert!(b.is_some());
    }

    #[test]
    fn malformed_payloads_are_absent() {
        for raw in [
            "",
            "[]",
            "[[]]",
            "[[1, 2, 3]]",
            "[1, 2, 3, 4]",
            "[[1, 2, 3, 4]",
            "[[1, 2, 3, 4]] extra",
            "__import__('os')",
            "[[1, 2, 3, x]]",
            "[[1., 2, 3, 4]]",
        ] {
            assert!(BoundingBox::from_coordinates(raw).is_none(), "accepted {raw:?}");
        }
    }

    #[test]
    fn inverted_or_out_of_range_box_is_absent() {
        assert!(BoundingBox::from_coordinates("[[500, 0, 100, 999]]").is_none());
        assert!(BoundingBox::from_coordinates("[[0, 0, 1200, 999]]").is_none());
        assert!(BoundingBox::from_coordinates("[[-1, 0, 10, 10]]").is_none());
    }

    #[test]
    fn parser_reports_reason() {
        assert_eq!(first_region("[]"), Err(CoordinateError::Empty));
        assert_eq!(
            first_region("[[1, 2]]"),
            Err(CoordinateError::TooFewComponents { found: 2 })
        );
        assert_eq!(
            parse_coordinate_list("[[1, 2, 3, 4]] x"),
            Err(CoordinateError::TrailingInput { offset: 15 })
        );
        assert_eq!(first_region("[[1, 2"), Err(CoordinateError::UnexpectedEnd));
    }

    #[test]
    fn trailing_commas_and_decimals() {
        let regions = parse_coordinate_list("[[1.5, 2, 3, 4,],]").unwrap();
        assert_eq!(regions, vec![vec![1.5, 2.0, 3.0, 4.0]]);
    }
}
