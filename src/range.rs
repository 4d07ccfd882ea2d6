//! Inclusive line ranges and the consolidation rules every producer in the
//! crate uses to turn line numbers into them.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// An inclusive span of 1-based line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "(u32, u32)")]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start >= 1, "line numbers are 1-based");
        debug_assert!(start <= end, "range start {start} is past its end {end}");
        Self { start, end }
    }

    #[must_use]
    pub fn single(line: u32) -> Self {
        Self::new(line, line)
    }

    /// Number of lines in the range.
    #[must_use]
    pub fn line_count(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    #[must_use]
    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn lines(&self) -> std::ops::RangeInclusive<u32> {
        self.start..=self.end
    }
}

impl From<Range> for (u32, u32) {
    fn from(r: Range) -> Self {
        (r.start, r.end)
    }
}

/// Compact notation: `7` for a single line, `3-5` otherwise.
impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Group line numbers into runs of consecutive integers.
///
/// The input is sorted first and may contain duplicates. A duplicate is not
/// `previous + 1`, so it opens a new chunk: `[3, 3, 4]` becomes
/// `[[3], [3, 4]]`. A single line can be passed as `std::iter::once(n)`.
#[must_use]
pub fn chunks<I>(lines: I) -> Vec<Vec<u32>>
where
    I: IntoIterator<Item = u32>,
{
    let mut sorted: Vec<u32> = lines.into_iter().collect();
    sorted.sort_unstable();

    let mut out: Vec<Vec<u32>> = Vec::new();
    for line in sorted {
        match out.last_mut() {
            Some(chunk) if chunk.last().and_then(|prev| prev.checked_add(1)) == Some(line) => {
                chunk.push(line)
            }
            _ => out.push(vec![line]),
        }
    }
    out
}

/// Consolidate an unordered set of line numbers into sorted, disjoint,
/// non-adjacent ranges. Duplicates collapse.
#[must_use]
pub fn consolidate<I>(lines: I) -> Vec<Range>
where
    I: IntoIterator<Item = u32>,
{
    let unique: BTreeSet<u32> = lines.into_iter().filter(|&l| l > 0).collect();
    from_ascending(unique)
}

/// Pairwise merge for lines that are already strictly increasing.
///
/// Consecutive integers extend the current range; any gap closes it.
#[must_use]
pub fn from_ascending<I>(lines: I) -> Vec<Range>
where
    I: IntoIterator<Item = u32>,
{
    let mut ranges: Vec<Range> = Vec::new();
    for line in lines {
        match ranges.last_mut() {
            Some(last) if last.end.checked_add(1) == Some(line) => last.end = line,
            Some(last) => {
                debug_assert!(line > last.end, "from_ascending requires increasing input");
                ranges.push(Range::single(line));
            }
            None => ranges.push(Range::single(line)),
        }
    }
    ranges
}

/// Total number of lines covered by a set of ranges.
#[must_use]
pub fn total_lines(ranges: &[Range]) -> u64 {
    ranges.iter().map(Range::line_count).sum()
}

/// Flatten ranges back into their line numbers.
pub fn flatten(ranges: &[Range]) -> impl Iterator<Item = u32> + '_ {
    ranges.iter().flat_map(Range::lines)
}

/// True when ranges are sorted ascending and no two of them overlap.
#[must_use]
pub fn is_sorted_disjoint(ranges: &[Range]) -> bool {
    ranges
        .iter()
        .all(|r| r.start <= r.end)
        && ranges.windows(2).all(|w| w[0].end < w[1].start)
}

/// Render ranges as `"1, 3-5, 8"`.
#[must_use]
pub fn format_ranges(ranges: &[Range]) -> String {
    ranges
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn r(start: u32, end: u32) -> Range {
        Range::new(start, end)
    }

    #[test]
    fn test_chunks_groups_consecutive_lines() {
        assert_eq!(
            chunks([10, 11, 15, 20, 21, 23]),
            vec![vec![10, 11], vec![15], vec![20, 21], vec![23]]
        );
    }

    #[test]
    fn test_chunks_sorts_first() {
        assert_eq!(chunks([5, 1, 2, 4]), vec![vec![1, 2], vec![4, 5]]);
    }

    #[test]
    fn test_chunks_duplicate_starts_new_chunk() {
        assert_eq!(chunks([3, 3, 4]), vec![vec![3], vec![3, 4]]);
    }

    #[test]
    fn test_chunks_empty_and_scalar() {
        assert!(chunks(Vec::<u32>::new()).is_empty());
        assert_eq!(chunks(std::iter::once(7)), vec![vec![7]]);
    }

    #[test]
    fn test_consolidate_collapses_duplicates() {
        assert_eq!(consolidate([4, 3, 3, 9]), vec![r(3, 4), r(9, 9)]);
    }

    #[test]
    fn test_from_ascending() {
        assert_eq!(from_ascending([1, 2, 3, 5, 7, 8]), vec![r(1, 3), r(5, 5), r(7, 8)]);
        assert!(from_ascending(Vec::new()).is_empty());
    }

    #[test]
    fn test_ranges_at_end_of_line_space() {
        assert_eq!(from_ascending([u32::MAX - 1, u32::MAX]), vec![r(u32::MAX - 1, u32::MAX)]);
        assert_eq!(consolidate([u32::MAX, 1, u32::MAX]), vec![r(1, 1), r(u32::MAX, u32::MAX)]);
        assert_eq!(chunks([u32::MAX, u32::MAX]), vec![vec![u32::MAX], vec![u32::MAX]]);
        assert_eq!(total_lines(&[r(1, u32::MAX)]), u64::from(u32::MAX));
    }

    #[test]
    fn test_total_lines() {
        assert_eq!(total_lines(&[r(10, 12), r(20, 20)]), 4);
        assert_eq!(total_lines(&[]), 0);
    }

    #[test]
    fn test_display_and_format() {
        assert_eq!(r(5, 5).to_string(), "5");
        assert_eq!(r(3, 5).to_string(), "3-5");
        assert_eq!(format_ranges(&[r(1, 1), r(3, 5), r(10, 10)]), "1, 3-5, 10");
        assert_eq!(format_ranges(&[]), "");
    }

    #[test]
    fn test_serializes_as_pair() {
        let json = serde_json::to_string(&vec![r(10, 10), r(12, 13)]).unwrap();
        assert_eq!(json, "[[10,10],[12,13]]");
    }

    #[test]
    fn test_is_sorted_disjoint() {
        assert!(is_sorted_disjoint(&[r(1, 2), r(4, 4)]));
        assert!(!is_sorted_disjoint(&[r(1, 4), r(4, 6)]));
        assert!(!is_sorted_disjoint(&[r(5, 6), r(1, 2)]));
    }

    proptest! {
        #[test]
        fn consolidate_is_idempotent(lines in prop::collection::vec(1u32..500, 0..200)) {
            let once = consolidate(lines);
            let twice = consolidate(flatten(&once).collect::<Vec<_>>());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn consolidate_preserves_line_set(lines in prop::collection::vec(1u32..500, 0..200)) {
            let ranges = consolidate(lines.clone());
            let expected: BTreeSet<u32> = lines.into_iter().collect();
            let flat: Vec<u32> = flatten(&ranges).collect();
            prop_assert_eq!(flat.len(), expected.len());
            prop_assert_eq!(flat.into_iter().collect::<BTreeSet<_>>(), expected);
            prop_assert!(is_sorted_disjoint(&ranges));
            prop_assert!(ranges.windows(2).all(|w| w[0].end + 1 < w[1].start));
        }

        #[test]
        fn chunks_keep_every_input(lines in prop::collection::vec(1u32..100, 0..100)) {
            let total: usize = chunks(lines.clone()).iter().map(Vec::len).sum();
            prop_assert_eq!(total, lines.len());
        }
    }
}
