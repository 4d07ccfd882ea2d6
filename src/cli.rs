//! Command handler functions for the patchcov CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use tracing::Span;

use crate::analyze::CoverageAnalyzer;
use crate::coverage::CoverageRangeExtractor;
use crate::diff::ModifiedRanges;
use crate::github::Publisher;
use crate::model::{normalize_path, CoverageReport};
use crate::range::{self, format_ranges};
use crate::report::{
    AnnotationPlanner, DiffCoverageReport, JsonFormatter, MarkdownFormatter, ReportFormatter,
    TextFormatter,
};

/// Output style for the `check` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Style {
    Text,
    Markdown,
    Json,
}

impl Style {
    fn formatter(self) -> &'static dyn ReportFormatter {
        match self {
            Style::Text => &TextFormatter,
            Style::Markdown => &MarkdownFormatter,
            Style::Json => &JsonFormatter,
        }
    }
}

/// Settings shared by every run of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Where to read sources for method grouping.
    pub source_root: Option<PathBuf>,
    /// Base URL of a browsable coverage report.
    pub report_url: Option<String>,
    pub sha: Option<String>,
}

impl CheckOptions {
    fn extractor(&self, span: &Span) -> CoverageRangeExtractor {
        let extractor = CoverageRangeExtractor::new(span.clone());
        match &self.source_root {
            Some(root) => extractor.with_source_root(root),
            None => extractor,
        }
    }
}

/// Run the full pipeline: coverage ranges, intersection with the diff,
/// stats.
pub fn build_report(
    coverage: &CoverageReport,
    modified: &ModifiedRanges,
    options: &CheckOptions,
    span: &Span,
) -> DiffCoverageReport {
    let uncovered = options.extractor(span).extract(coverage);
    let analysis = CoverageAnalyzer::new(span.clone()).analyze(&uncovered, modified);

    let mut report = DiffCoverageReport::new(analysis, modified.len());
    report.report_url = options.report_url.clone();
    report.sha = options.sha.clone();
    report
}

pub fn cmd_check(
    coverage: &CoverageReport,
    modified: &ModifiedRanges,
    style: Style,
    options: &CheckOptions,
    span: &Span,
) -> (DiffCoverageReport, String) {
    let report = build_report(coverage, modified, options, span);
    let output = report.format(style.formatter());
    (report, output)
}

/// Plan annotations for a finished report and hand them to `publisher`.
pub fn cmd_publish(report: &DiffCoverageReport, publisher: &dyn Publisher) -> Result<()> {
    let plan = AnnotationPlanner::new().plan(report);
    publisher.publish(&plan)
}

/// Uncovered, display and relevant ranges of one file.
pub fn cmd_uncovered(
    coverage: &CoverageReport,
    source_file: &str,
    options: &CheckOptions,
    span: &Span,
) -> Result<String> {
    let path = normalize_path(source_file);
    let vector = coverage
        .files
        .get(&path)
        .ok_or_else(|| anyhow!("No coverage data for '{source_file}'"))?;
    let ranges = options.extractor(span).extract_file(&path, vector);

    if ranges.actual.is_empty() {
        return Ok(format!("All instrumentable lines are covered in '{path}'\n"));
    }

    let mut out = String::new();
    writeln!(out, "Uncovered lines in '{path}':").unwrap();
    writeln!(out, "  {}", format_ranges(&ranges.actual)).unwrap();
    writeln!(out, "  ({} lines)", range::total_lines(&ranges.actual)).unwrap();
    if ranges.display != ranges.actual {
        writeln!(out, "Display:  {}", format_ranges(&ranges.display)).unwrap();
    }
    writeln!(out, "Relevant: {}", format_ranges(&ranges.relevant)).unwrap();
    Ok(out)
}

/// Per-file added ranges of a diff.
pub fn cmd_modified(modified: &ModifiedRanges) -> String {
    if modified.is_empty() {
        return "No added lines found in diff.\n".to_string();
    }
    let mut out = String::new();
    for (path, ranges) in modified {
        writeln!(out, "{path}  {}", format_ranges(ranges)).unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::diff::parse_diff;
    use crate::model::CoverageVector;
    use crate::report::{AnnotationPlan, COMMENT_MARKER};

    fn seed_coverage() -> CoverageReport {
        let mut report = CoverageReport::new();
        report.insert(
            "src/main.rs",
            CoverageVector::new(vec![Some(5), Some(3), Some(0), Some(0)]),
        );
        report.insert("src/lib.rs", CoverageVector::new(vec![Some(10), Some(10)]));
        report
    }

    const MAIN_DIFF: &str = "\
diff --git a/src/main.rs b/src/main.rs
--- a/src/main.rs
+++ b/src/main.rs
@@ -0,0 +1,4 @@
+fn main() {
+    let x = 1;
+    let y = 2;
+    let z = 3;
";

    #[test]
    fn test_cmd_check_text() {
        let (report, out) = cmd_check(
            &seed_coverage(),
            &parse_diff(MAIN_DIFF),
            Style::Text,
            &CheckOptions::default(),
            &Span::none(),
        );
        assert_eq!(report.analysis.stats.coverage_percentage, 50.0);
        assert!(out.contains("Diff coverage: 50% (2/4 added lines covered)"));
        assert!(out.contains("src/main.rs  missed: 3-4"));
    }

    #[test]
    fn test_cmd_check_markdown_with_sha() {
        let options = CheckOptions {
            sha: Some("abc1234ffff".to_string()),
            ..CheckOptions::default()
        };
        let (_, out) = cmd_check(
            &seed_coverage(),
            &parse_diff(MAIN_DIFF),
            Style::Markdown,
            &options,
            &Span::none(),
        );
        assert!(out.contains("### ❌ Diff coverage: 50%"));
        assert!(out.contains("(abc1234)"));
    }

    #[test]
    fn test_cmd_check_json() {
        let (_, out) = cmd_check(
            &seed_coverage(),
            &parse_diff(MAIN_DIFF),
            Style::Json,
            &CheckOptions::default(),
            &Span::none(),
        );
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["stats"]["total_modified_lines"], 4);
        assert_eq!(value["intersections"]["src/main.rs"], serde_json::json!([[3, 4]]));
    }

    #[test]
    fn test_cmd_check_empty_diff() {
        let (report, out) = cmd_check(
            &seed_coverage(),
            &parse_diff(""),
            Style::Text,
            &CheckOptions::default(),
            &Span::none(),
        );
        assert_eq!(report.analysis.stats.coverage_percentage, 100.0);
        assert!(out.contains("No added lines found in diff."));
    }

    #[test]
    fn test_cmd_uncovered() {
        let out = cmd_uncovered(&seed_coverage(), "./src/main.rs", &CheckOptions::default(), &Span::none())
            .unwrap();
        assert!(out.contains("Uncovered lines in 'src/main.rs':"));
        assert!(out.contains("  3-4\n"));
        assert!(out.contains("(2 lines)"));
        assert!(out.contains("Relevant: 1-4"));
    }

    #[test]
    fn test_cmd_uncovered_all_covered_and_missing() {
        let coverage = seed_coverage();
        let out = cmd_uncovered(&coverage, "src/lib.rs", &CheckOptions::default(), &Span::none()).unwrap();
        assert!(out.contains("All instrumentable lines are covered"));
        assert!(cmd_uncovered(&coverage, "nope.rs", &CheckOptions::default(), &Span::none()).is_err());
    }

    #[test]
    fn test_cmd_modified() {
        let out = cmd_modified(&parse_diff(MAIN_DIFF));
        assert_eq!(out, "src/main.rs  1-4\n");
        assert_eq!(cmd_modified(&ModifiedRanges::new()), "No added lines found in diff.\n");
    }

    #[derive(Default)]
    struct Recording(RefCell<Vec<AnnotationPlan>>);

    impl Publisher for Recording {
        fn publish(&self, plan: &AnnotationPlan) -> Result<()> {
            self.0.borrow_mut().push(plan.clone());
            Ok(())
        }
    }

    #[test]
    fn test_cmd_publish_sends_plan() {
        let (report, _) = cmd_check(
            &seed_coverage(),
            &parse_diff(MAIN_DIFF),
            Style::Text,
            &CheckOptions::default(),
            &Span::none(),
        );
        let publisher = Recording::default();
        cmd_publish(&report, &publisher).unwrap();

        let plans = publisher.0.borrow();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].annotations.len(), 1);
        assert_eq!(plans[0].annotations[0].start_line, 3);
        assert_eq!(plans[0].annotations[0].end_line, 4);
        assert!(plans[0].summary.starts_with(COMMENT_MARKER));
    }
}
