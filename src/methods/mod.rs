//! Best-effort detection of function/method line spans.
//!
//! Each supported language gets a [`MethodLocator`]: a syntax walk finds the
//! line each definition starts on, then a depth counter over that language's
//! block delimiters scans forward to the closing line. The counter does not
//! understand every string or comment form, so boundaries are advisory and
//! only ever widen display ranges.

pub mod ruby;
pub mod rust;

use crate::detect::Language;
use crate::model::MethodBoundary;

pub use ruby::RubyLocator;
pub use rust::RustLocator;

/// Finds method boundaries in source text.
pub trait MethodLocator {
    /// Boundaries sorted by start line. Empty when the source cannot be
    /// parsed.
    fn locate(&self, source: &str) -> Vec<MethodBoundary>;
}

/// Locator for languages without structural support.
pub struct NoopLocator;

impl MethodLocator for NoopLocator {
    fn locate(&self, _source: &str) -> Vec<MethodBoundary> {
        Vec::new()
    }
}

/// Pick the locator for a language.
pub fn locator_for(language: Option<Language>) -> Box<dyn MethodLocator> {
    match language {
        Some(Language::Ruby) => Box::new(RubyLocator),
        Some(Language::Rust) => Box::new(RustLocator),
        None => Box::new(NoopLocator),
    }
}

/// Scan forward from `start` (0-based) until the block opened there is
/// closed again. `count` returns `(opened, closed)` delimiters for a line.
///
/// Returns the 0-based index of the closing line, or the last line when the
/// block never closes.
pub(crate) fn balance_close<F>(lines: &[&str], start: usize, count: F) -> usize
where
    F: Fn(&str) -> (u32, u32),
{
    let last = lines.len().saturating_sub(1);
    let mut depth: i64 = 0;
    let mut opened = false;

    for (idx, line) in lines.iter().enumerate().skip(start) {
        let (open, close) = count(line);
        if open > 0 {
            opened = true;
        }
        depth += i64::from(open) - i64::from(close);
        if opened && depth <= 0 {
            return idx;
        }
    }
    last
}

/// Turn 1-based definition lines into sorted boundaries.
pub(crate) fn boundaries_from_starts<F>(source: &str, mut starts: Vec<usize>, count: F) -> Vec<MethodBoundary>
where
    F: Fn(&str) -> (u32, u32),
{
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }
    starts.sort_unstable();
    starts.dedup();

    starts
        .into_iter()
        .filter(|&line| line >= 1 && line <= lines.len())
        .map(|line| {
            let close = balance_close(&lines, line - 1, &count);
            MethodBoundary::new(line as u32, close as u32 + 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn braces(line: &str) -> (u32, u32) {
        let open = line.matches('{').count() as u32;
        let close = line.matches('}').count() as u32;
        (open, close)
    }

    #[test]
    fn test_balance_close_nested() {
        let lines = ["fn a() {", "  if x {", "  }", "}", "tail"];
        assert_eq!(balance_close(&lines, 0, braces), 3);
    }

    #[test]
    fn test_balance_close_opens_on_later_line() {
        let lines = ["fn a()", "where T: X", "{", "}"];
        assert_eq!(balance_close(&lines, 0, braces), 3);
    }

    #[test]
    fn test_balance_close_unterminated_runs_to_eof() {
        let lines = ["fn a() {", "  x", "  y"];
        assert_eq!(balance_close(&lines, 0, braces), 2);
    }

    #[test]
    fn test_balance_close_same_line() {
        let lines = ["fn a() {}", "next"];
        assert_eq!(balance_close(&lines, 0, braces), 0);
    }

    #[test]
    fn test_noop_locator() {
        assert!(NoopLocator.locate("def a\nend\n").is_empty());
        assert!(locator_for(None).locate("def a\nend\n").is_empty());
    }
}
