//! Parser for SimpleCov JSON output.
//!
//! Reference: https://github.com/simplecov-ruby/simplecov
//!
//! Two document shapes are accepted:
//!   - `.resultset.json`: `{ "<suite>": { "coverage": { "<path>": entry }, "timestamp": N } }`
//!   - flat:              `{ "<path>": entry }`
//!
//! An entry is `{ "lines": lines }` or a bare `lines` value, and `lines` is
//! either an array with one slot per source line or a sparse object keyed by
//! 1-based line number. Slots hold a hit count, `null`, or `"ignored"`
//! (`:nocov:` blocks); anything but a count is a non-executable line.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::Parser;
use crate::error::Result;
use crate::model::{CoverageReport, CoverageVector};

/// SimpleCov JSON parser.
pub struct SimpleCovParser;

impl Parser for SimpleCovParser {
    fn parse(&self, input: &[u8]) -> Result<CoverageReport> {
        parse(input)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    ResultSet(BTreeMap<String, Suite>),
    Flat(BTreeMap<String, FileEntry>),
}

#[derive(Deserialize)]
struct Suite {
    coverage: BTreeMap<String, FileEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FileEntry {
    Object { lines: LinesForm },
    Bare(LinesForm),
}

/// The two ways a report can list per-line hits.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum LinesForm {
    Array(Vec<Hit>),
    SparseMap(BTreeMap<String, Hit>),
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum Hit {
    Count(u64),
    NotExecutable(serde_json::Value),
}

impl Hit {
    fn count(&self) -> Option<u64> {
        match self {
            Hit::Count(n) => Some(*n),
            Hit::NotExecutable(_) => None,
        }
    }
}

impl LinesForm {
    /// Resolve either form into the canonical vector.
    pub fn into_vector(self) -> CoverageVector {
        match self {
            LinesForm::Array(hits) => CoverageVector::new(hits.iter().map(Hit::count).collect()),
            LinesForm::SparseMap(map) => CoverageVector::from_sparse(
                map.iter()
                    .filter_map(|(line, hit)| Some((line.trim().parse::<u32>().ok()?, hit.count()))),
            ),
        }
    }
}

impl FileEntry {
    fn into_vector(self) -> CoverageVector {
        match self {
            FileEntry::Object { lines } | FileEntry::Bare(lines) => lines.into_vector(),
        }
    }
}

/// Parse SimpleCov JSON from raw bytes. Suites in a resultset are merged by
/// summing hit counts.
pub fn parse(input: &[u8]) -> Result<CoverageReport> {
    let mut report = CoverageReport::new();
    if input.iter().all(u8::is_ascii_whitespace) {
        return Ok(report);
    }

    match serde_json::from_slice::<Document>(input)? {
        Document::ResultSet(suites) => {
            for (_name, suite) in suites {
                for (path, entry) in suite.coverage {
                    report.insert(&path, entry.into_vector());
                }
            }
        }
        Document::Flat(files) => {
            for (path, entry) in files {
                report.insert(&path, entry.into_vector());
            }
        }
    }
    Ok(report)
}
