//! Turn per-line coverage vectors into uncovered, display and relevant
//! line ranges.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, Span};

use crate::detect::Language;
use crate::methods::{locator_for, MethodLocator};
use crate::model::{CoverageReport, CoverageVector, FileCoverageRanges, MethodBoundary};
use crate::range::{self, Range};

/// Extracts [`FileCoverageRanges`] for every file in a report, optionally
/// widening display ranges to whole untested methods when the source files
/// can be read.
pub struct CoverageRangeExtractor {
    span: Span,
    source_root: Option<PathBuf>,
    locator: Option<Box<dyn MethodLocator>>,
}

impl CoverageRangeExtractor {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            source_root: None,
            locator: None,
        }
    }

    /// Read sources relative to `root` for method grouping.
    #[must_use]
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Use one locator for every file instead of choosing by extension.
    #[must_use]
    pub fn with_locator(mut self, locator: Box<dyn MethodLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn extract(&self, report: &CoverageReport) -> BTreeMap<String, FileCoverageRanges> {
        report
            .files
            .iter()
            .map(|(path, vector)| (path.clone(), self.extract_file(path, vector)))
            .collect()
    }

    pub fn extract_file(&self, path: &str, vector: &CoverageVector) -> FileCoverageRanges {
        let ranges = extract_ranges(vector);
        if ranges.actual.is_empty() {
            return ranges;
        }

        let boundaries = self.boundaries_for(path);
        if boundaries.is_empty() {
            return ranges;
        }
        debug!(
            parent: &self.span,
            file = path,
            methods = boundaries.len(),
            "grouping display ranges by method"
        );
        group_by_methods(vector, ranges, &boundaries)
    }

    fn boundaries_for(&self, path: &str) -> Vec<MethodBoundary> {
        let Some(root) = &self.source_root else {
            return Vec::new();
        };
        let full = root.join(path);
        if !full.is_file() {
            return Vec::new();
        }
        let source = match std::fs::read_to_string(&full) {
            Ok(s) => s,
            Err(e) => {
                debug!(parent: &self.span, file = %full.display(), error = %e, "skipping method grouping");
                return Vec::new();
            }
        };

        match &self.locator {
            Some(locator) => locator.locate(&source),
            None => locator_for(Language::from_path(Path::new(path))).locate(&source),
        }
    }
}

/// Single pass over a coverage vector.
///
/// A zero starts a run that absorbs further zeros plus any lone
/// non-executable line sitting directly before another zero; those bridge
/// lines go to `display` only. Positive counts are `relevant`.
#[must_use]
pub fn extract_ranges(vector: &CoverageVector) -> FileCoverageRanges {
    let hits = vector.as_slice();
    let mut actual: Vec<u32> = Vec::new();
    let mut display: Vec<u32> = Vec::new();
    let mut relevant: Vec<u32> = Vec::new();

    let line_at = |idx: usize| (idx + 1) as u32;
    let mut i = 0;
    while i < hits.len() {
        match hits[i] {
            Some(0) => {
                let mut j = i;
                while j < hits.len() {
                    match hits[j] {
                        Some(0) => {
                            actual.push(line_at(j));
                            display.push(line_at(j));
                            relevant.push(line_at(j));
                        }
                        None if hits.get(j + 1) == Some(&Some(0)) => display.push(line_at(j)),
                        _ => break,
                    }
                    j += 1;
                }
                i = j;
            }
            Some(_) => {
                relevant.push(line_at(i));
                i += 1;
            }
            None => i += 1,
        }
    }

    FileCoverageRanges {
        actual: range::from_ascending(actual),
        display: range::from_ascending(display),
        relevant: range::from_ascending(relevant),
    }
}

/// Widen `display` to cover whole methods whose executable lines are all
/// uncovered. Methods with any executed line keep their per-line display
/// ranges; lines outside every method are untouched.
#[must_use]
pub fn group_by_methods(
    vector: &CoverageVector,
    ranges: FileCoverageRanges,
    boundaries: &[MethodBoundary],
) -> FileCoverageRanges {
    let mut display: BTreeSet<u32> = range::flatten(&ranges.display).collect();

    for boundary in boundaries {
        let has_miss = ranges
            .actual
            .iter()
            .any(|r| r.start <= boundary.end_line && boundary.start_line <= r.end);
        if !has_miss {
            continue;
        }

        let all_dead = (boundary.start_line..=boundary.end_line)
            .filter_map(|line| vector.hits(line))
            .all(|count| count == 0);
        if all_dead {
            display.extend(boundary.as_range().lines());
        }
    }

    FileCoverageRanges {
        display: range::from_ascending(display),
        ..ranges
    }
}

/// Per-file uncovered ranges for every file in a report, without method
/// grouping.
#[must_use]
pub fn uncovered_ranges(report: &CoverageReport) -> BTreeMap<String, Vec<Range>> {
    report
        .files
        .iter()
        .map(|(path, vector)| (path.clone(), extract_ranges(vector).actual))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u32, end: u32) -> Range {
        Range::new(start, end)
    }

    fn v(hits: &[Option<u64>]) -> CoverageVector {
        CoverageVector::new(hits.to_vec())
    }

    #[test]
    fn test_actual_and_relevant() {
        let ranges = extract_ranges(&v(&[None, Some(1), Some(0), Some(2)]));
        assert_eq!(ranges.actual, vec![r(3, 3)]);
        assert_eq!(ranges.display, vec![r(3, 3)]);
        assert_eq!(ranges.relevant, vec![r(2, 4)]);
    }

    #[test]
    fn test_display_bridges_single_gap() {
        let ranges = extract_ranges(&v(&[Some(0), None, Some(0), Some(1)]));
        assert_eq!(ranges.actual, vec![r(1, 1), r(3, 3)]);
        assert_eq!(ranges.display, vec![r(1, 3)]);
        assert_eq!(ranges.relevant, vec![r(1, 1), r(3, 4)]);
    }

    #[test]
    fn test_display_does_not_bridge_double_gap() {
        let ranges = extract_ranges(&v(&[Some(0), None, None, Some(0)]));
        assert_eq!(ranges.display, vec![r(1, 1), r(4, 4)]);
    }

    #[test]
    fn test_trailing_null_not_bridged() {
        let ranges = extract_ranges(&v(&[Some(0), Some(0), None]));
        assert_eq!(ranges.actual, vec![r(1, 2)]);
        assert_eq!(ranges.display, vec![r(1, 2)]);
    }

    #[test]
    fn test_run_stops_at_covered_line_which_is_still_relevant() {
        let ranges = extract_ranges(&v(&[Some(0), Some(3), Some(0)]));
        assert_eq!(ranges.actual, vec![r(1, 1), r(3, 3)]);
        assert_eq!(ranges.relevant, vec![r(1, 3)]);
    }

    #[test]
    fn test_empty_vector() {
        assert_eq!(extract_ranges(&v(&[])), FileCoverageRanges::default());
        assert_eq!(extract_ranges(&v(&[None, None])), FileCoverageRanges::default());
    }

    #[test]
    fn test_group_whole_dead_method() {
        // def on 2, body 3-4, end on 5; only 3 and 4 are executable.
        let vector = v(&[Some(1), None, Some(0), Some(0), None, Some(1)]);
        let ranges = extract_ranges(&vector);
        assert_eq!(ranges.display, vec![r(3, 4)]);

        let grouped = group_by_methods(&vector, ranges, &[MethodBoundary::new(2, 5)]);
        assert_eq!(grouped.display, vec![r(2, 5)]);
        assert_eq!(grouped.actual, vec![r(3, 4)]);
    }

    #[test]
    fn test_group_keeps_partially_covered_method() {
        let vector = v(&[None, Some(1), Some(0), None, Some(0)]);
        let ranges = extract_ranges(&vector);
        let before = ranges.display.clone();
        let grouped = group_by_methods(&vector, ranges, &[MethodBoundary::new(1, 6)]);
        assert_eq!(grouped.display, before);
    }

    #[test]
    fn test_group_ignores_methods_without_misses() {
        let vector = v(&[Some(0), None, None, Some(2), Some(2)]);
        let ranges = extract_ranges(&vector);
        let grouped = group_by_methods(&vector, ranges, &[MethodBoundary::new(3, 6)]);
        assert_eq!(grouped.display, vec![r(1, 1)]);
    }

    struct Fixed(Vec<MethodBoundary>);

    impl MethodLocator for Fixed {
        fn locate(&self, _source: &str) -> Vec<MethodBoundary> {
            self.0.clone()
        }
    }

    #[test]
    fn test_extractor_reads_source_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/a.rb"), "def a\n  x\nend\n").unwrap();

        let mut report = CoverageReport::new();
        report.insert("lib/a.rb", v(&[None, Some(0), None]));
        report.insert("lib/missing.rb", v(&[None, Some(0), None]));

        let extractor = CoverageRangeExtractor::new(Span::none())
            .with_source_root(dir.path())
            .with_locator(Box::new(Fixed(vec![MethodBoundary::new(1, 3)])));
        let out = extractor.extract(&report);

        assert_eq!(out["lib/a.rb"].display, vec![r(1, 3)]);
        assert_eq!(out["lib/a.rb"].actual, vec![r(2, 2)]);
        assert_eq!(out["lib/missing.rb"].display, vec![r(2, 2)]);
    }

    #[test]
    fn test_extractor_without_root_skips_grouping() {
        let mut report = CoverageReport::new();
        report.insert("lib/a.rb", v(&[None, Some(0), None]));
        let out = CoverageRangeExtractor::new(Span::none()).extract(&report);
        assert_eq!(out["lib/a.rb"].display, vec![r(2, 2)]);
    }

    #[test]
    fn test_uncovered_ranges() {
        let mut report = CoverageReport::new();
        report.insert("a.rb", v(&[Some(0), Some(0), Some(1)]));
        report.insert("b.rb", v(&[Some(1)]));
        let map = uncovered_ranges(&report);
        assert_eq!(map["a.rb"], vec![r(1, 2)]);
        assert!(map["b.rb"].is_empty());
    }
}
