//! Parser for the LCOV `.info` format.
//!
//! Reference: https://ltp.sourceforge.net/coverage/lcov/geninfo.1.php
//!
//! Only line records matter here:
//!   SF:<path to source file>
//!   DA:<line number>,<execution count>[,<checksum>]
//!   end_of_record
//!
//! Lines without a `DA` record are non-executable. Function, branch and
//! summary records are skipped.

use std::collections::BTreeMap;
use std::io::BufRead;

use super::Parser;
use crate::error::Result;
use crate::model::{CoverageReport, CoverageVector};

/// LCOV format parser.
pub struct LcovParser;

impl Parser for LcovParser {
    fn parse(&self, input: &[u8]) -> Result<CoverageReport> {
        parse(input)
    }
}

/// Parse LCOV format coverage data from raw bytes.
pub fn parse(input: &[u8]) -> Result<CoverageReport> {
    let mut report = CoverageReport::new();
    parse_reader(&mut &*input, &mut |path, vector| report.insert(&path, vector))?;
    Ok(report)
}

/// Line-by-line LCOV reader; calls `emit` once per record.
fn parse_reader(
    reader: &mut dyn BufRead,
    emit: &mut dyn FnMut(String, CoverageVector),
) -> Result<()> {
    let mut current: Option<(String, BTreeMap<u32, u64>)> = None;

    let mut raw_line = String::new();
    loop {
        raw_line.clear();
        let n = reader.read_line(&mut raw_line)?;
        if n == 0 {
            break; // EOF
        }

        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "end_of_record" {
            if let Some((path, hits)) = current.take() {
                emit(path, to_vector(hits));
            }
            continue;
        }

        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };

        match tag {
            "SF" => {
                if let Some((path, hits)) = current.take() {
                    emit(path, to_vector(hits));
                }
                current = Some((value.to_string(), BTreeMap::new()));
            }
            "DA" => {
                // Some instrumenters use negative counts (e.g., -1) for
                // non-instrumentable lines; those stay non-executable.
                if let Some((_, hits)) = current.as_mut() {
                    let mut parts = value.splitn(3, ',');
                    let line_number = parts.next().and_then(|s| s.parse::<u32>().ok());
                    let count = parts.next().and_then(|s| s.parse::<i64>().ok());
                    if let (Some(line_number), Some(count)) = (line_number, count) {
                        if line_number > 0 && count >= 0 {
                            let hit = hits.entry(line_number).or_insert(0);
                            *hit = hit.saturating_add(count as u64);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // Handle a file that ends without end_of_record
    if let Some((path, hits)) = current.take() {
        emit(path, to_vector(hits));
    }

    Ok(())
}

fn to_vector(hits: BTreeMap<u32, u64>) -> CoverageVector {
    CoverageVector::from_sparse(hits.into_iter().map(|(line, count)| (line, Some(count))))
}
