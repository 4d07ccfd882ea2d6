//! Uniform in-memory representation of coverage data, independent of the
//! report format it was loaded from. Parsers produce a `CoverageReport`
//! whose per-file `CoverageVector`s are the only shape the core reads.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::range::Range;

/// Compute a coverage percentage rounded to two decimals, returning 100.0
/// when there is nothing to measure.
#[must_use]
pub fn percentage(covered: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        let pct = covered as f64 / total as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }
}

/// Highest line number a sparse coverage entry may name. Entries past it
/// are dropped so a stray huge line number cannot size the vector.
pub const MAX_LINE: u32 = 1_000_000;

/// Per-line hit counts for one source file, indexed by `line - 1`.
///
/// `Some(0)` is an executable line that never ran, `Some(n)` ran `n` times,
/// `None` is a line with no instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageVector {
    hits: Vec<Option<u64>>,
}

impl CoverageVector {
    pub fn new(hits: Vec<Option<u64>>) -> Self {
        Self { hits }
    }

    /// Build from sparse `(line, count)` pairs. Unlisted lines are `None`.
    /// Line 0 and lines above [`MAX_LINE`] are ignored.
    pub fn from_sparse<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, Option<u64>)>,
    {
        let mut hits: Vec<Option<u64>> = Vec::new();
        for (line, count) in entries {
            if line == 0 || line > MAX_LINE {
                continue;
            }
            let idx = (line - 1) as usize;
            if hits.len() <= idx {
                hits.resize(idx + 1, None);
            }
            hits[idx] = match (hits[idx], count) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                (a, b) => a.or(b),
            };
        }
        Self { hits }
    }

    pub fn as_slice(&self) -> &[Option<u64>] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Hit count recorded for a 1-based line, `None` when the line is not
    /// executable or lies past the end of the vector.
    pub fn hits(&self, line: u32) -> Option<u64> {
        line.checked_sub(1)
            .and_then(|idx| self.hits.get(idx as usize).copied().flatten())
    }

    /// Sum another run's counts into this one. A line stays `None` only when
    /// both sides are `None`.
    pub fn merge(&mut self, other: &CoverageVector) {
        if self.hits.len() < other.hits.len() {
            self.hits.resize(other.hits.len(), None);
        }
        for (mine, theirs) in self.hits.iter_mut().zip(&other.hits) {
            *mine = match (*mine, *theirs) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                (a, b) => a.or(b),
            };
        }
    }
}

/// Coverage for every file in one report, keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    pub files: BTreeMap<String, CoverageVector>,
}

impl CoverageReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, merging counts if the path was already seen.
    pub fn insert(&mut self, path: &str, vector: CoverageVector) {
        let path = normalize_path(path);
        match self.files.get_mut(&path) {
            Some(existing) => existing.merge(&vector),
            None => {
                self.files.insert(path, vector);
            }
        }
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: CoverageReport) {
        for (path, vector) in other.files {
            self.insert(&path, vector);
        }
    }

    /// Strip a leading root directory (e.g. the CI checkout path) from every
    /// key so they line up with the repo-relative paths in a diff.
    #[must_use]
    pub fn strip_root(self, root: &str) -> Self {
        let root = normalize_path(root);
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            return self;
        }
        let mut out = CoverageReport::new();
        for (path, vector) in self.files {
            let relative = path
                .strip_prefix(root)
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(&path)
                .to_string();
            out.insert(&relative, vector);
        }
        out
    }
}

/// Normalize a path: forward slashes and no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

/// The three range sets derived from one file's `CoverageVector`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileCoverageRanges {
    /// Lines with a hit count of exactly zero.
    pub actual: Vec<Range>,
    /// `actual` widened for readability. Never used for percentages.
    pub display: Vec<Range>,
    /// Every line with coverage data, hit or not.
    pub relevant: Vec<Range>,
}

/// The line span of one function or method definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodBoundary {
    pub start_line: u32,
    pub end_line: u32,
}

impl MethodBoundary {
    pub fn new(start_line: u32, end_line: u32) -> Self {
        Self {
            start_line,
            end_line: end_line.max(start_line),
        }
    }

    pub fn as_range(&self) -> Range {
        Range::new(self.start_line, self.end_line)
    }
}

/// Diff coverage totals across all analyzed files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverageStats {
    pub total_modified_lines: u64,
    pub uncovered_modified_lines: u64,
    pub covered_modified_lines: u64,
    pub coverage_percentage: f64,
}

impl CoverageStats {
    #[must_use]
    pub fn from_totals(total: u64, uncovered: u64) -> Self {
        debug_assert!(uncovered <= total);
        let covered = total - uncovered;
        Self {
            total_modified_lines: total,
            uncovered_modified_lines: uncovered,
            covered_modified_lines: covered,
            coverage_percentage: percentage(covered, total),
        }
    }
}

/// A single inline annotation for the review system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationRequest {
    /// Source file path relative to the repo root.
    pub path: String,
    /// Start line of the annotation range.
    pub start_line: u32,
    /// End line of the annotation range.
    pub end_line: u32,
    /// Annotation body, marker included.
    pub message: String,
}
