//! Diff coverage: intersect the lines a diff adds with the lines coverage
//! reports as never executed.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, Span};

use crate::model::{CoverageStats, FileCoverageRanges};
use crate::range::{self, Range};

/// Result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub stats: CoverageStats,
    /// Added-and-uncovered ranges per file. Files with no such lines are
    /// absent.
    pub intersections: BTreeMap<String, Vec<Range>>,
}

impl Analysis {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            stats: CoverageStats::from_totals(0, 0),
            intersections: BTreeMap::new(),
        }
    }
}

pub struct CoverageAnalyzer {
    span: Span,
}

impl CoverageAnalyzer {
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    /// Files missing from `uncovered` are skipped entirely: without coverage
    /// data there is nothing to judge them by.
    pub fn analyze(
        &self,
        uncovered: &BTreeMap<String, FileCoverageRanges>,
        modified: &BTreeMap<String, Vec<Range>>,
    ) -> Analysis {
        let mut total: u64 = 0;
        let mut missed: u64 = 0;
        let mut intersections = BTreeMap::new();

        for (path, modified_ranges) in modified {
            if modified_ranges.is_empty() {
                continue;
            }
            let Some(coverage) = uncovered.get(path) else {
                debug!(parent: &self.span, file = %path, "no coverage data; skipping");
                continue;
            };

            let file_total = range::total_lines(modified_ranges);
            let overlap = intersect(modified_ranges, &coverage.actual);
            let file_missed = range::total_lines(&overlap);
            debug!(
                parent: &self.span,
                file = %path,
                modified = file_total,
                uncovered = file_missed,
                "analyzed file"
            );

            total += file_total;
            missed += file_missed;
            if !overlap.is_empty() {
                intersections.insert(path.clone(), overlap);
            }
        }

        let stats = CoverageStats::from_totals(total, missed);
        debug!(
            parent: &self.span,
            total = stats.total_modified_lines,
            uncovered = stats.uncovered_modified_lines,
            percentage = stats.coverage_percentage,
            "diff coverage computed"
        );
        Analysis {
            stats,
            intersections,
        }
    }
}

/// Two-pointer intersection of two sorted, disjoint range lists.
///
/// Each step emits the overlap of the current pair (if any) and advances
/// whichever range ends first, so the loop runs at most
/// `a.len() + b.len()` times.
#[must_use]
pub fn intersect(a: &[Range], b: &[Range]) -> Vec<Range> {
    debug_assert!(range::is_sorted_disjoint(a), "intersect: unsorted or overlapping left input");
    debug_assert!(range::is_sorted_disjoint(b), "intersect: unsorted or overlapping right input");

    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let start = a[i].start.max(b[j].start);
        let end = a[i].end.min(b[j].end);
        if start <= end {
            out.push(Range::new(start, end));
        }
        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn r(start: u32, end: u32) -> Range {
        Range::new(start, end)
    }

    fn uncovered(actual: Vec<Range>) -> FileCoverageRanges {
        FileCoverageRanges {
            display: actual.clone(),
            actual,
            relevant: Vec::new(),
        }
    }

    fn analyzer() -> CoverageAnalyzer {
        CoverageAnalyzer::new(Span::none())
    }

    #[test]
    fn test_partial_overlap() {
        let cov = BTreeMap::from([("a.rb".to_string(), uncovered(vec![r(10, 10), r(12, 13)]))]);
        let modified = BTreeMap::from([("a.rb".to_string(), vec![r(10, 12)])]);

        let result = analyzer().analyze(&cov, &modified);

        assert_eq!(result.intersections["a.rb"], vec![r(10, 10), r(12, 12)]);
        assert_eq!(result.stats.total_modified_lines, 3);
        assert_eq!(result.stats.uncovered_modified_lines, 2);
        assert_eq!(result.stats.covered_modified_lines, 1);
        assert_eq!(result.stats.coverage_percentage, 33.33);
    }

    #[test]
    fn test_empty_inputs() {
        let result = analyzer().analyze(&BTreeMap::new(), &BTreeMap::new());
        assert!(result.intersections.is_empty());
        assert_eq!(result.stats.coverage_percentage, 100.0);
        assert_eq!(result, Analysis::empty());
    }

    #[test]
    fn test_file_without_coverage_is_excluded() {
        let cov = BTreeMap::from([("a.rb".to_string(), uncovered(vec![r(1, 1)]))]);
        let modified = BTreeMap::from([
            ("a.rb".to_string(), vec![r(5, 6)]),
            ("b.rb".to_string(), vec![r(1, 100)]),
        ]);

        let result = analyzer().analyze(&cov, &modified);

        assert_eq!(result.stats.total_modified_lines, 2);
        assert_eq!(result.stats.uncovered_modified_lines, 0);
        assert_eq!(result.stats.coverage_percentage, 100.0);
        assert!(result.intersections.is_empty());
    }

    #[test]
    fn test_empty_modified_ranges_skipped() {
        let cov = BTreeMap::from([("a.rb".to_string(), uncovered(vec![r(1, 1)]))]);
        let modified = BTreeMap::from([("a.rb".to_string(), vec![])]);
        let result = analyzer().analyze(&cov, &modified);
        assert_eq!(result.stats.total_modified_lines, 0);
        assert_eq!(result.stats.coverage_percentage, 100.0);
    }

    #[test]
    fn test_modified_inside_uncovered() {
        assert_eq!(intersect(&[r(5, 7)], &[r(1, 20)]), vec![r(5, 7)]);
    }

    #[test]
    fn test_modified_spans_several_uncovered() {
        let modified = [r(1, 10), r(20, 30)];
        let missed = [r(2, 3), r(8, 22), r(25, 25), r(29, 40)];
        assert_eq!(
            intersect(&modified, &missed),
            vec![r(2, 3), r(8, 10), r(20, 22), r(25, 25), r(29, 30)]
        );
    }

    #[test]
    fn test_disjoint_inputs() {
        assert!(intersect(&[r(1, 2)], &[r(3, 4)]).is_empty());
        assert!(intersect(&[], &[r(3, 4)]).is_empty());
    }

    #[test]
    fn test_fully_uncovered_file() {
        let cov = BTreeMap::from([("a.rb".to_string(), uncovered(vec![r(1, 50)]))]);
        let modified = BTreeMap::from([("a.rb".to_string(), vec![r(3, 4), r(9, 9)])]);
        let result = analyzer().analyze(&cov, &modified);
        assert_eq!(result.stats.coverage_percentage, 0.0);
        assert_eq!(result.intersections["a.rb"], vec![r(3, 4), r(9, 9)]);
    }

    fn arb_ranges() -> impl Strategy<Value = Vec<Range>> {
        prop::collection::vec(1u32..300, 0..80).prop_map(range::consolidate)
    }

    proptest! {
        #[test]
        fn intersection_is_commutative(a in arb_ranges(), b in arb_ranges()) {
            let ab: BTreeSet<u32> = range::flatten(&intersect(&a, &b)).collect();
            let ba: BTreeSet<u32> = range::flatten(&intersect(&b, &a)).collect();
            prop_assert_eq!(ab, ba);
        }

        #[test]
        fn intersection_matches_set_semantics(a in arb_ranges(), b in arb_ranges()) {
            let left: BTreeSet<u32> = range::flatten(&a).collect();
            let right: BTreeSet<u32> = range::flatten(&b).collect();
            let expected: BTreeSet<u32> = left.intersection(&right).copied().collect();
            let got = intersect(&a, &b);
            prop_assert!(range::is_sorted_disjoint(&got));
            prop_assert_eq!(range::flatten(&got).collect::<BTreeSet<_>>(), expected);
        }

        #[test]
        fn stats_are_consistent(a in arb_ranges(), b in arb_ranges()) {
            let cov = BTreeMap::from([("f".to_string(), uncovered(b))]);
            let modified = BTreeMap::from([("f".to_string(), a)]);
            let stats = analyzer().analyze(&cov, &modified).stats;
            prop_assert_eq!(
                stats.covered_modified_lines + stats.uncovered_modified_lines,
                stats.total_modified_lines
            );
            prop_assert!((0.0..=100.0).contains(&stats.coverage_percentage));
            if stats.total_modified_lines == 0 {
                prop_assert_eq!(stats.coverage_percentage, 100.0);
            }
        }
    }
}
