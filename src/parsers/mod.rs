pub mod lcov;
pub mod simplecov;

use crate::error::Result;
use crate::model::CoverageReport;

/// Every format parser implements this trait.
pub trait Parser {
    /// Parse the input bytes into per-file coverage vectors.
    fn parse(&self, input: &[u8]) -> Result<CoverageReport>;
}
