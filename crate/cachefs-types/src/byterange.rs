//! ByteRange and ByteRanges types, used to track which portions of
//! a cached file are known.
//!
//! # ByteRange
//!
//! - Represents a closed-open range `[start, end)` of bytes.
//! - An empty range does not overlap with anything and is never
//!   stored in a [ByteRanges].
//!
//! # ByteRanges
//!
//! - A sorted set of ranges, kept in maximal form: stored ranges
//!   never overlap and never touch, so that there is always at least
//!   one unknown byte between two stored ranges.
//! - Adding a range merges it with every range it overlaps or touches.
//!
//! # Examples
//!
//! ```rust
//! use cachefs_types::{ByteRange, ByteRanges};
//!
//! let mut known = ByteRanges::new();
//! known.add(&ByteRange::new(10, 20));
//! known.add(&ByteRange::new(5, 15));
//! assert_eq!(known.iter().collect::<Vec<_>>(), vec![ByteRange::new(5, 20)]);
//! assert!(known.contains_range(&ByteRange::new(5, 20)));
//! assert!(!known.contains_range(&ByteRange::new(0, 10)));
//! ```

use std::collections::BTreeMap;
use std::fmt;

/// A closed-open range of bytes: `[start, end)`.
#[derive(
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Debug,
    Default,
    serde::Serialize,
    serde::Deserialize,
    PartialOrd,
    Ord,
)]
pub struct ByteRange {
    /// The start offset (inclusive).
    pub start: u64,
    /// The end offset (exclusive).
    pub end: u64,
}

impl ByteRange {
    /// Create a new range from `start` to `end` (exclusive).
    ///
    /// Callers should ensure `start <= end`; anything else is
    /// treated as empty.
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    /// Create a range of `length` bytes starting at `start`.
    ///
    /// Returns `None` if the range would extend past [u64::MAX].
    pub fn with_len(start: u64, length: u64) -> Option<Self> {
        start
            .checked_add(length)
            .map(|end| ByteRange::new(start, end))
    }

    /// Return the empty range `[0, 0)`.
    pub fn empty() -> Self {
        ByteRange { start: 0, end: 0 }
    }

    /// Returns true if the range contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns the number of bytes in this range.
    pub fn bytecount(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if this range overlaps with `other` or ends
    /// exactly where `other` starts (or the reverse).
    ///
    /// Two ranges that touch can be merged into one without
    /// including any byte that is in neither of them.
    pub fn touches(&self, other: &ByteRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start <= other.end && other.start <= self.end
    }

    /// Check whether `other` is entirely within this range.
    ///
    /// The empty range is within any range.
    pub fn contains_range(&self, other: &ByteRange) -> bool {
        other.is_empty() || (self.start <= other.start && self.end >= other.end)
    }
}

impl fmt::Display for ByteRange {
    /// Formats the range as `[start, end)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A sorted set of ranges in maximal form.
///
/// Two stored ranges never overlap and never touch: for stored ranges
/// `a` and `b` with `a.start < b.start`, `a.end < b.start` always
/// holds. This means the set always has the smallest possible number
/// of ranges for the bytes it covers.
///
/// Ranges are only ever added; nothing is ever removed from the set.
#[derive(Clone, Eq, PartialEq, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ByteRanges {
    /// Start of each range mapped to its (exclusive) end.
    ranges: BTreeMap<u64, u64>,
}

impl ByteRanges {
    /// Creates an empty set.
    pub fn new() -> Self {
        ByteRanges {
            ranges: BTreeMap::new(),
        }
    }

    /// Creates a set containing `[start, end)`.
    pub fn single(start: u64, end: u64) -> Self {
        ByteRanges::for_range(ByteRange::new(start, end))
    }

    /// Creates a set containing a single range, which might be empty.
    pub fn for_range(range: ByteRange) -> Self {
        let mut ranges = ByteRanges::new();
        ranges.add(&range);
        ranges
    }

    /// Creates and fills a set.
    pub fn from_ranges(into_iter: impl IntoIterator<Item = ByteRange>) -> Self {
        let mut ranges = ByteRanges::new();
        for range in into_iter {
            ranges.add(&range);
        }
        ranges
    }

    /// Returns true if there are no ranges.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the number of stored ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns the total number of bytes within the ranges.
    pub fn bytecount(&self) -> u64 {
        self.ranges
            .iter()
            .fold(0, |sum, (&start, &end)| sum + (end - start))
    }

    /// Adds a range, merging it with every stored range it overlaps
    /// or touches.
    ///
    /// Adding an empty range does nothing.
    pub fn add(&mut self, range: &ByteRange) {
        if range.is_empty() {
            return;
        }

        let mut start = range.start;
        let mut end = range.end;

        // Only the last range starting before `range` can reach into
        // it from the left.
        if let Some((&prev_start, &prev_end)) = self.ranges.range(..range.start).next_back()
            && ByteRange::new(prev_start, prev_end).touches(range)
        {
            start = prev_start;
        }

        // Everything else that starts up to `range.end` (inclusive, to
        // catch a range that starts right where the new one ends) is
        // absorbed.
        let absorbed = self
            .ranges
            .range(start..=range.end)
            .map(|(&s, _)| s)
            .collect::<Vec<_>>();
        for s in absorbed {
            if let Some(e) = self.ranges.remove(&s) {
                end = end.max(e);
            }
        }

        self.ranges.insert(start, end);
    }

    /// Returns true if a single stored range covers all of `range`.
    ///
    /// The empty range is always covered.
    pub fn contains_range(&self, range: &ByteRange) -> bool {
        if range.is_empty() {
            return true;
        }
        self.ranges
            .range(..=range.start)
            .next_back()
            .is_some_and(|(&start, &end)| ByteRange::new(start, end).contains_range(range))
    }

    /// Returns the portions of `self` not covered by `other`.
    pub fn subtraction(&self, other: &ByteRanges) -> ByteRanges {
        let mut result = ByteRanges::new();
        for range in self.iter() {
            let mut cursor = range.start;
            let first = other
                .ranges
                .range(..=range.start)
                .next_back()
                .map(|(&s, _)| s)
                .unwrap_or(range.start);
            for (&s, &e) in other.ranges.range(first..range.end) {
                if e <= cursor {
                    continue;
                }
                if s > cursor {
                    result.add(&ByteRange::new(cursor, s));
                }
                cursor = e;
                if cursor >= range.end {
                    break;
                }
            }
            if cursor < range.end {
                result.add(&ByteRange::new(cursor, range.end));
            }
        }
        result
    }

    /// Returns the portions of `range` that are not in the set.
    pub fn missing(&self, range: &ByteRange) -> ByteRanges {
        ByteRanges::for_range(*range).subtraction(self)
    }

    /// Returns the stored range containing the given offset, if any.
    pub fn range_containing(&self, offset: u64) -> Option<ByteRange> {
        let (&start, &end) = self.ranges.range(..=offset).next_back()?;
        if offset < end {
            Some(ByteRange::new(start, end))
        } else {
            None
        }
    }

    /// Returns an iterator over the stored ranges, in order.
    pub fn iter(&self) -> ByteRangesIter<'_> {
        ByteRangesIter {
            inner: self.ranges.iter(),
        }
    }

    /// Returns an iterator over `(offset, length)` pairs, in order.
    pub fn lengths(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.ranges
            .iter()
            .map(|(&start, &end)| (start, end - start))
    }
}

impl IntoIterator for ByteRanges {
    type Item = ByteRange;
    type IntoIter = std::iter::Map<
        std::collections::btree_map::IntoIter<u64, u64>,
        fn((u64, u64)) -> ByteRange,
    >;

    fn into_iter(self) -> Self::IntoIter {
        let to_range: fn((u64, u64)) -> ByteRange = |(start, end)| ByteRange::new(start, end);
        self.ranges.into_iter().map(to_range)
    }
}

impl<'a> IntoIterator for &'a ByteRanges {
    type Item = ByteRange;
    type IntoIter = ByteRangesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<ByteRange> for ByteRanges {
    fn from_iter<T: IntoIterator<Item = ByteRange>>(iter: T) -> Self {
        ByteRanges::from_ranges(iter)
    }
}

/// Iterator over the ranges of a [ByteRanges].
#[derive(Clone)]
pub struct ByteRangesIter<'a> {
    inner: std::collections::btree_map::Iter<'a, u64, u64>,
}

impl<'a> Iterator for ByteRangesIter<'a> {
    type Item = ByteRange;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(&start, &end)| ByteRange::new(start, end))
    }
}

impl fmt::Display for ByteRanges {
    /// Formats as a comma-separated list of ranges.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        f.write_str("{")?;
        for (&start, &end) in &self.ranges {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "[{start}, {end})")?;
            first = false;
        }
        f.write_str("}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(b: &ByteRanges) -> Vec<ByteRange> {
        b.iter().collect()
    }

    #[test]
    fn new_and_empty() {
        assert_eq!(ByteRange::new(1, 2), ByteRange { start: 1, end: 2 });
        assert!(ByteRange::empty().is_empty());
        assert!(ByteRange::new(2, 2).is_empty());
        assert!(ByteRange::new(3, 2).is_empty());
        assert!(!ByteRange::new(1, 2).is_empty());
    }

    #[test]
    fn with_len() {
        assert_eq!(Some(ByteRange::new(5, 15)), ByteRange::with_len(5, 10));
        assert_eq!(
            Some(ByteRange::new(u64::MAX - 1, u64::MAX)),
            ByteRange::with_len(u64::MAX - 1, 1)
        );
        assert_eq!(None, ByteRange::with_len(u64::MAX, 1));
    }

    #[test]
    fn bytecount() {
        assert_eq!(ByteRange::empty().bytecount(), 0);
        assert_eq!(ByteRange::new(3, 2).bytecount(), 0);
        assert_eq!(ByteRange::new(10, 20).bytecount(), 10);
    }

    #[test]
    fn touches() {
        let a = ByteRange::new(0, 10);
        assert!(a.touches(&ByteRange::new(5, 15)));
        assert!(a.touches(&ByteRange::new(10, 20)));
        assert!(ByteRange::new(10, 20).touches(&a));
        assert!(!a.touches(&ByteRange::new(11, 20)));
        assert!(!a.touches(&ByteRange::new(10, 10)));
    }

    #[test]
    fn range_contains_range() {
        let a = ByteRange::new(5, 15);
        assert!(a.contains_range(&ByteRange::new(5, 15)));
        assert!(a.contains_range(&ByteRange::new(6, 7)));
        assert!(a.contains_range(&ByteRange::empty()));
        assert!(!a.contains_range(&ByteRange::new(4, 7)));
        assert!(!a.contains_range(&ByteRange::new(14, 16)));
    }

    #[test]
    fn display() {
        assert_eq!(ByteRange::new(1, 2).to_string(), "[1, 2)");
        assert_eq!(
            ByteRanges::from_ranges([ByteRange::new(0, 5), ByteRange::new(10, 15)]).to_string(),
            "{[0, 5), [10, 15)}"
        );
        assert_eq!(ByteRanges::new().to_string(), "{}");
    }

    #[test]
    fn add_to_empty() {
        let mut b = ByteRanges::new();
        assert!(b.is_empty());
        b.add(&ByteRange::new(3, 8));
        assert_eq!(ranges(&b), vec![ByteRange::new(3, 8)]);
        assert_eq!(1, b.len());
    }

    #[test]
    fn add_empty_range_is_ignored() {
        let mut b = ByteRanges::single(10, 20);
        b.add(&ByteRange::new(20, 20));
        b.add(&ByteRange::new(5, 5));
        b.add(&ByteRange::empty());
        assert_eq!(ranges(&b), vec![ByteRange::new(10, 20)]);
    }

    #[test]
    fn add_merges_touching_on_the_right() {
        let mut b = ByteRanges::single(0, 10);
        b.add(&ByteRange::new(10, 15));
        assert_eq!(ranges(&b), vec![ByteRange::new(0, 15)]);
    }

    #[test]
    fn add_merges_touching_on_the_left() {
        let mut b = ByteRanges::single(10, 20);
        b.add(&ByteRange::new(5, 10));
        assert_eq!(ranges(&b), vec![ByteRange::new(5, 20)]);
    }

    #[test]
    fn add_keeps_one_byte_gap() {
        let mut b = ByteRanges::single(11, 21);
        b.add(&ByteRange::new(5, 10));
        assert_eq!(ranges(&b), vec![ByteRange::new(5, 10), ByteRange::new(11, 21)]);
    }

    #[test]
    fn add_inside_existing_range() {
        let mut b = ByteRanges::single(0, 10);
        b.add(&ByteRange::new(3, 8));
        b.add(&ByteRange::new(0, 10));
        b.add(&ByteRange::new(0, 5));
        b.add(&ByteRange::new(5, 10));
        assert_eq!(ranges(&b), vec![ByteRange::new(0, 10)]);
    }

    #[test]
    fn add_swallows_existing_range() {
        let mut b = ByteRanges::single(10, 20);
        b.add(&ByteRange::new(5, 25));
        assert_eq!(ranges(&b), vec![ByteRange::new(5, 25)]);
    }

    #[test]
    fn add_bridges_many_ranges() {
        let mut b = ByteRanges::from_ranges([
            ByteRange::new(0, 5),
            ByteRange::new(7, 9),
            ByteRange::new(11, 13),
            ByteRange::new(15, 20),
            ByteRange::new(30, 40),
        ]);
        assert_eq!(5, b.len());
        b.add(&ByteRange::new(4, 16));
        assert_eq!(
            ranges(&b),
            vec![ByteRange::new(0, 20), ByteRange::new(30, 40)]
        );
    }

    #[test]
    fn add_fills_exact_gap() {
        let mut b = ByteRanges::from_ranges([ByteRange::new(0, 5), ByteRange::new(15, 20)]);
        b.add(&ByteRange::new(5, 15));
        assert_eq!(ranges(&b), vec![ByteRange::new(0, 20)]);
    }

    #[test]
    fn add_near_u64_max() {
        let mut b = ByteRanges::single(u64::MAX - 10, u64::MAX);
        b.add(&ByteRange::new(u64::MAX - 20, u64::MAX - 10));
        assert_eq!(ranges(&b), vec![ByteRange::new(u64::MAX - 20, u64::MAX)]);
    }

    #[test]
    fn contains_range_requires_single_range() {
        let b = ByteRanges::from_ranges([ByteRange::new(0, 10), ByteRange::new(11, 20)]);
        assert!(b.contains_range(&ByteRange::new(0, 10)));
        assert!(b.contains_range(&ByteRange::new(2, 5)));
        assert!(b.contains_range(&ByteRange::new(11, 20)));
        assert!(!b.contains_range(&ByteRange::new(0, 20)));
        assert!(!b.contains_range(&ByteRange::new(5, 12)));
        assert!(!b.contains_range(&ByteRange::new(0, 11)));
        assert!(!b.contains_range(&ByteRange::new(19, 21)));
        assert!(!b.contains_range(&ByteRange::new(20, 21)));
        assert!(b.contains_range(&ByteRange::new(100, 100)));
        assert!(!ByteRanges::new().contains_range(&ByteRange::new(0, 1)));
    }

    #[test]
    fn subtraction() {
        let a = ByteRanges::from_ranges([ByteRange::new(0, 10), ByteRange::new(20, 30)]);
        let b = ByteRanges::from_ranges([ByteRange::new(3, 5), ByteRange::new(7, 22)]);
        assert_eq!(
            ranges(&a.subtraction(&b)),
            vec![
                ByteRange::new(0, 3),
                ByteRange::new(5, 7),
                ByteRange::new(22, 30)
            ]
        );
        assert_eq!(a.subtraction(&ByteRanges::new()), a);
        assert!(a.subtraction(&ByteRanges::single(0, 100)).is_empty());
    }

    #[test]
    fn missing() {
        let known = ByteRanges::from_ranges([ByteRange::new(0, 10), ByteRange::new(15, 20)]);
        assert_eq!(
            ranges(&known.missing(&ByteRange::new(5, 30))),
            vec![ByteRange::new(10, 15), ByteRange::new(20, 30)]
        );
        assert!(known.missing(&ByteRange::new(2, 8)).is_empty());
        assert_eq!(
            ranges(&ByteRanges::new().missing(&ByteRange::new(2, 8))),
            vec![ByteRange::new(2, 8)]
        );
    }

    #[test]
    fn bytecount_and_lengths() {
        let b = ByteRanges::from_ranges([
            ByteRange::new(5, 12),
            ByteRange::new(10, 15),
            ByteRange::new(30, 40),
        ]);
        assert_eq!(20, b.bytecount());
        assert_eq!(vec![(5, 10), (30, 10)], b.lengths().collect::<Vec<_>>());
        assert_eq!(0, ByteRanges::new().bytecount());
    }

    #[test]
    fn range_containing() {
        let b = ByteRanges::from_ranges([ByteRange::new(0, 10), ByteRange::new(20, 30)]);
        assert_eq!(b.range_containing(0), Some(ByteRange::new(0, 10)));
        assert_eq!(b.range_containing(9), Some(ByteRange::new(0, 10)));
        assert_eq!(b.range_containing(10), None);
        assert_eq!(b.range_containing(19), None);
        assert_eq!(b.range_containing(25), Some(ByteRange::new(20, 30)));
        assert_eq!(b.range_containing(30), None);
        assert_eq!(ByteRanges::new().range_containing(0), None);
    }

    #[test]
    fn into_iter_and_collect() {
        let b: ByteRanges = vec![ByteRange::new(10, 15), ByteRange::new(0, 5)]
            .into_iter()
            .collect();
        assert_eq!(
            b.clone().into_iter().collect::<Vec<_>>(),
            vec![ByteRange::new(0, 5), ByteRange::new(10, 15)]
        );
        let mut count = 0;
        for _ in &b {
            count += 1;
        }
        assert_eq!(2, count);
    }

    /// Replays pseudo-random insertions and compares the set with a
    /// byte-per-byte model.
    #[test]
    fn add_matches_bitmap_model() {
        const SIZE: usize = 64;
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..200 {
            let mut set = ByteRanges::new();
            let mut model = [false; SIZE];
            for _ in 0..12 {
                let start = next() % SIZE as u64;
                let len = 1 + next() % 8;
                let end = (start + len).min(SIZE as u64);
                let before = set.clone();
                set.add(&ByteRange::new(start, end));
                for b in start..end {
                    model[b as usize] = true;
                }

                // Nothing previously known is forgotten.
                assert!(before.subtraction(&set).is_empty());

                // Maximal form.
                let stored = ranges(&set);
                for pair in stored.windows(2) {
                    assert!(pair[0].end < pair[1].start, "{set}");
                }

                // Same bytes as the model.
                for (offset, &known) in model.iter().enumerate() {
                    assert_eq!(known, set.range_containing(offset as u64).is_some(), "{set}");
                }
            }

            // Coverage answers agree with the model.
            for start in 0..SIZE as u64 {
                for end in (start + 1)..=SIZE as u64 {
                    let expected = (start..end).all(|b| model[b as usize]);
                    assert_eq!(
                        expected,
                        set.contains_range(&ByteRange::new(start, end)),
                        "[{start}, {end}) in {set}"
                    );
                }
            }
        }
    }
}
