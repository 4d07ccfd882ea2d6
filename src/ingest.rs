use std::path::Path;

use tracing::{info, warn, Span};

use crate::detect::{detect_format, Format};
use crate::error::{PatchcovError, Result};
use crate::model::CoverageReport;
use crate::parsers::lcov::LcovParser;
use crate::parsers::simplecov::SimpleCovParser;
use crate::parsers::Parser;

/// Read a coverage file, auto-detect its format (or use the override) and
/// parse it. Returns the report and the format that was used.
pub fn ingest(file_path: &Path, format_override: Option<&str>) -> Result<(CoverageReport, Format)> {
    let content = std::fs::read(file_path)?;

    let format = if let Some(fmt_str) = format_override {
        fmt_str.parse::<Format>()?
    } else {
        detect_format(file_path, &content).ok_or(PatchcovError::UnknownFormat)?
    };

    let report = parse_with_format(format, &content)?;
    Ok((report, format))
}

pub fn parse_with_format(format: Format, content: &[u8]) -> Result<CoverageReport> {
    match format {
        Format::SimpleCov => SimpleCovParser.parse(content),
        Format::Lcov => LcovParser.parse(content),
    }
}

/// Load every coverage file and merge them. A file that is missing or
/// fails to parse is logged and contributes nothing; analysis then treats
/// its files as absent.
pub fn load_lenient(paths: &[impl AsRef<Path>], format_override: Option<&str>, span: &Span) -> CoverageReport {
    let mut merged = CoverageReport::new();
    for path in paths {
        let path = path.as_ref();
        match ingest(path, format_override) {
            Ok((report, format)) => {
                info!(
                    parent: span,
                    file = %path.display(),
                    %format,
                    files = report.files.len(),
                    "loaded coverage"
                );
                merged.merge(report);
            }
            Err(e) => {
                warn!(parent: span, file = %path.display(), error = %e, "could not load coverage; ignoring it");
            }
        }
    }
    merged
}
