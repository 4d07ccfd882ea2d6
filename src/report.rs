//! Output formatting for diff coverage results, and the annotation plan
//! handed to a review system.

use std::fmt::Write;

use serde::Serialize;

use crate::analyze::Analysis;
use crate::model::AnnotationRequest;
use crate::range::{format_ranges, Range};

/// Hidden token embedded in every posted body so later runs can find and
/// update their own comments.
pub const COMMENT_MARKER: &str = "<!-- patchcov-comment -->";

/// Analysis plus the context needed to present it.
#[derive(Debug, Clone, Serialize)]
pub struct DiffCoverageReport {
    #[serde(flatten)]
    pub analysis: Analysis,
    /// Number of files with added lines in the diff.
    pub diff_files: usize,
    /// Base URL of a browsable coverage report, for deep links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    /// Commit SHA to display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl DiffCoverageReport {
    #[must_use]
    pub fn new(analysis: Analysis, diff_files: usize) -> Self {
        Self {
            analysis,
            diff_files,
            report_url: None,
            sha: None,
        }
    }

    /// Format using a specific formatter.
    #[must_use]
    pub fn format(&self, formatter: &dyn ReportFormatter) -> String {
        formatter.format(self)
    }

    /// Link to `line` of `path` in the coverage report, if one is known.
    #[must_use]
    pub fn link(&self, path: &str, line: u32) -> Option<String> {
        let base = self.report_url.as_deref()?.trim_end_matches('/');
        Some(format!("{base}/{path}#L{line}"))
    }
}

/// Trait for formatting diff coverage reports.
pub trait ReportFormatter {
    /// Format the report to a string.
    fn format(&self, report: &DiffCoverageReport) -> String;
}

/// Plain text formatter.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &DiffCoverageReport) -> String {
        let mut out = String::new();
        let stats = &report.analysis.stats;

        if report.diff_files == 0 {
            out.push_str("No added lines found in diff.\n");
            return out;
        }

        if stats.total_modified_lines == 0 {
            let files = report.diff_files;
            writeln!(
                out,
                "{files} changed files, none with coverage data. Nothing to measure."
            )
            .unwrap();
            return out;
        }

        let pct = stats.coverage_percentage;
        let covered = stats.covered_modified_lines;
        let total = stats.total_modified_lines;
        writeln!(out, "Diff coverage: {pct}% ({covered}/{total} added lines covered)").unwrap();

        if !report.analysis.intersections.is_empty() {
            out.push('\n');
            for (path, ranges) in &report.analysis.intersections {
                let missed = format_ranges(ranges);
                writeln!(out, "  {path}  missed: {missed}").unwrap();
            }
        }

        out
    }
}

/// Markdown formatter, used for the summary comment.
pub struct MarkdownFormatter;

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, report: &DiffCoverageReport) -> String {
        let mut md = String::new();
        let stats = &report.analysis.stats;

        let pct = stats.coverage_percentage;
        let glyph = if stats.coverage_percentage < 100.0 { "❌" } else { "✅" };
        writeln!(md, "### {glyph} Diff coverage: {pct}%\n").unwrap();

        let covered = stats.covered_modified_lines;
        let total = stats.total_modified_lines;
        write!(md, "**{covered}** of **{total}** added lines covered").unwrap();
        if let Some(ref sha) = report.sha {
            let short_sha = if sha.len() > 7 { &sha[..7] } else { sha };
            write!(md, " ({short_sha})").unwrap();
        }
        md.push('\n');

        if report.analysis.intersections.is_empty() {
            if total > 0 {
                md.push_str("\nAll added lines are covered! 🎉\n");
            }
        } else {
            md.push_str("\n| File | Uncovered lines |\n");
            md.push_str("|:-----|:----------------|\n");
            for (path, ranges) in &report.analysis.intersections {
                let ranges = format_ranges(ranges);
                writeln!(md, "| `{path}` | {ranges} |").unwrap();
            }
        }

        md
    }
}

/// JSON formatter for programmatic consumers.
pub struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format(&self, report: &DiffCoverageReport) -> String {
        let mut json = serde_json::to_string_pretty(report).expect("report serializes to JSON");
        json.push('\n');
        json
    }
}

/// Everything to post for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationPlan {
    pub annotations: Vec<AnnotationRequest>,
    pub summary: String,
}

/// Builds inline annotations and the summary body from a report.
pub struct AnnotationPlanner {
    marker: String,
}

impl Default for AnnotationPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationPlanner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            marker: COMMENT_MARKER.to_string(),
        }
    }

    #[must_use]
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    #[must_use]
    pub fn plan(&self, report: &DiffCoverageReport) -> AnnotationPlan {
        let annotations = report
            .analysis
            .intersections
            .iter()
            .flat_map(|(path, ranges)| ranges.iter().map(move |range| (path, range)))
            .map(|(path, range)| AnnotationRequest {
                path: path.clone(),
                start_line: range.start,
                end_line: range.end,
                message: self.ensure_marker(&annotation_message(report, path, range)),
            })
            .collect();

        AnnotationPlan {
            annotations,
            summary: self.ensure_marker(&report.format(&MarkdownFormatter)),
        }
    }

    /// Return `body` with the marker present exactly once, at the top.
    #[must_use]
    pub fn ensure_marker(&self, body: &str) -> String {
        let stripped = body.replace(self.marker.as_str(), "");
        format!("{}\n{}", self.marker, stripped.trim_start())
    }
}

fn annotation_message(report: &DiffCoverageReport, path: &str, range: &Range) -> String {
    let mut msg = if range.is_single() {
        format!("Line {} is not covered by tests.", range.start)
    } else {
        format!("Lines {}–{} are not covered by tests.", range.start, range.end)
    };
    if let Some(link) = report.link(path, range.start) {
        write!(msg, " [View in coverage report]({link})").unwrap();
    }
    msg
}
