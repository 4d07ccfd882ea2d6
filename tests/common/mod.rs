#![allow(dead_code)]

use std::path::PathBuf;

use patchcov::model::CoverageReport;
use patchcov::parsers::simplecov::SimpleCovParser;
use patchcov::parsers::Parser;

/// CI checkout prefix used by the coverage fixtures.
pub const CHECKOUT_ROOT: &str = "/home/runner/work/app/app";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// The two-suite resultset fixture, merged and made repo-relative.
pub fn resultset() -> CoverageReport {
    let raw = include_bytes!("../fixtures/resultset.json");
    SimpleCovParser
        .parse(raw)
        .unwrap()
        .strip_root(CHECKOUT_ROOT)
}
