//! Pin range arithmetic.
//!
//! A [`PinRange`] is a contiguous set of pins (ports or fibers) on one
//! side of a network object. All operations are total; callers are
//! responsible for keeping `low <= high`.

use serde::{Deserialize, Serialize};

use crate::model::Side;

/// A contiguous set of connection pins on a given side of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinRange {
    /// Side the pins are on.
    pub side: Side,
    /// First pin.
    pub low: u32,
    /// Last pin (inclusive).
    pub high: u32,
}

/// Build a pin range (`high` defaults to `low` when `None`).
pub fn pin_range_of(side: Side, low: u32, high: Option<u32>) -> PinRange {
    PinRange::new(side, low, high.unwrap_or(low))
}

impl PinRange {
    /// Create a range covering `low..=high`.
    pub fn new(side: Side, low: u32, high: u32) -> Self {
        debug_assert!(low <= high, "pin range {}:{} is inverted", low, high);
        Self { side, low, high }
    }

    /// Create a range covering a single pin.
    pub fn single(side: Side, pin: u32) -> Self {
        Self::new(side, pin, pin)
    }

    /// Number of pins in range.
    #[inline]
    pub fn size(&self) -> u32 {
        self.high - self.low + 1
    }

    /// Canonical identity string, `side:low` or `side:low:high`.
    pub fn spec(&self) -> String {
        format!("{}:{}", self.side, self.range_spec())
    }

    /// Range part of [`PinRange::spec`].
    pub fn range_spec(&self) -> String {
        if self.high == self.low {
            self.low.to_string()
        } else {
            format!("{}:{}", self.low, self.high)
        }
    }

    /// The pins of this range, in order.
    pub fn pins(&self) -> std::ops::RangeInclusive<u32> {
        self.low..=self.high
    }

    /// True if `pin` is in range.
    #[inline]
    pub fn includes_pin(&self, pin: u32) -> bool {
        pin >= self.low && pin <= self.high
    }

    /// True if this range and `other` form a continuous range.
    pub fn extends(&self, other: &PinRange) -> bool {
        other.high.checked_add(1) == Some(self.low) || self.high.checked_add(1) == Some(other.low)
    }

    /// True if this range and `other` share at least one pin.
    pub fn overlap(&self, other: &PinRange) -> bool {
        !(self.low > other.high || self.high < other.low)
    }

    /// The pins of this range that are not in `other` (zero to two ranges).
    pub fn subtract(&self, other: &PinRange) -> Vec<PinRange> {
        let mut ranges = Vec::with_capacity(2);

        if self.low < other.low {
            ranges.push(PinRange::new(
                self.side,
                self.low,
                (other.low - 1).min(self.high),
            ));
        }

        if self.high > other.high {
            ranges.push(PinRange::new(
                self.side,
                self.low.max(other.high + 1),
                self.high,
            ));
        }

        ranges
    }

    /// The side opposite to this range's side.
    #[inline]
    pub fn other_side(&self) -> Side {
        self.side.other()
    }
}

impl std::fmt::Display for PinRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PinRange({})", self.spec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(low: u32, high: u32) -> PinRange {
        PinRange::new(Side::In, low, high)
    }

    #[test]
    fn test_size_and_spec() {
        assert_eq!(r(1, 5).size(), 5);
        assert_eq!(r(3, 3).size(), 1);
        assert_eq!(r(1, 5).spec(), "in:1:5");
        assert_eq!(PinRange::single(Side::Out, 7).spec(), "out:7");
        assert_eq!(r(2, 4).to_string(), "PinRange(in:2:4)");
    }

    #[test]
    fn test_pin_range_of_defaults_high() {
        assert_eq!(pin_range_of(Side::Out, 4, None), PinRange::new(Side::Out, 4, 4));
        assert_eq!(pin_range_of(Side::Out, 4, Some(6)).size(), 3);
    }

    #[test]
    fn test_includes_pin() {
        let range = r(2, 4);
        assert!(!range.includes_pin(1));
        assert!(range.includes_pin(2));
        assert!(range.includes_pin(4));
        assert!(!range.includes_pin(5));
    }

    #[test]
    fn test_extends() {
        assert!(r(1, 3).extends(&r(4, 6)));
        assert!(r(4, 6).extends(&r(1, 3)));
        assert!(!r(1, 3).extends(&r(5, 6)));
        assert!(!r(1, 3).extends(&r(2, 6)));
    }

    #[test]
    fn test_extends_at_numeric_limit() {
        let top = r(u32::MAX, u32::MAX);
        assert!(!top.extends(&r(1, 2)));
        assert!(top.extends(&r(u32::MAX - 3, u32::MAX - 1)));
    }

    #[test]
    fn test_overlap() {
        assert!(r(1, 5).overlap(&r(5, 8)));
        assert!(r(3, 4).overlap(&r(1, 8)));
        assert!(!r(1, 2).overlap(&r(3, 4)));
        assert!(!r(6, 9).overlap(&r(3, 5)));
    }

    #[test]
    fn test_self_overlap_and_subtract() {
        for range in [r(1, 1), r(1, 12), r(7, 9)] {
            assert!(range.overlap(&range));
            assert!(range.subtract(&range).is_empty());
        }
    }

    #[test]
    fn test_subtract_middle() {
        assert_eq!(r(1, 5).subtract(&r(2, 3)), vec![r(1, 1), r(4, 5)]);
    }

    #[test]
    fn test_subtract_edges() {
        assert_eq!(r(1, 5).subtract(&r(1, 3)), vec![r(4, 5)]);
        assert_eq!(r(1, 5).subtract(&r(4, 9)), vec![r(1, 3)]);
        assert_eq!(r(2, 4).subtract(&r(1, 8)), Vec::<PinRange>::new());
    }

    #[test]
    fn test_subtract_disjoint_keeps_self() {
        assert_eq!(r(1, 3).subtract(&r(6, 8)), vec![r(1, 3)]);
        assert_eq!(r(6, 8).subtract(&r(1, 3)), vec![r(6, 8)]);
    }

    #[test]
    fn test_other_side() {
        assert_eq!(r(1, 2).other_side(), Side::Out);
        assert_eq!(PinRange::single(Side::Out, 1).other_side(), Side::In);
    }

    #[test]
    fn test_pins_iterates_range() {
        assert_eq!(r(3, 5).pins().collect::<Vec<_>>(), vec![3, 4, 5]);
    }
}
