//! Auto-detection of coverage file formats and source languages.
//!
//! Strategy for coverage formats:
//!   1. Check file extension / name for strong hints
//!   2. Peek at the first bytes of the file content
//!   3. Fall back to CLI --format override (handled by caller)

use std::path::Path;

use crate::error::PatchcovError;

/// Supported coverage formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    SimpleCov,
    Lcov,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::SimpleCov => "simplecov",
            Format::Lcov => "lcov",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = PatchcovError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simplecov" | "json" => Ok(Format::SimpleCov),
            "lcov" => Ok(Format::Lcov),
            _ => Err(PatchcovError::Parse(format!(
                "Unknown format: '{}'. Supported: simplecov, lcov",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the coverage format from filename and file content.
pub fn detect_format(path: &Path, content: &[u8]) -> Option<Format> {
    if let Some(fmt) = detect_by_extension(path) {
        return Some(fmt);
    }
    detect_by_content(content)
}

fn detect_by_extension(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "info" | "lcov" => Some(Format::Lcov),
        "json" => Some(Format::SimpleCov),
        _ => None,
    }
}

fn detect_by_content(content: &[u8]) -> Option<Format> {
    let head_len = content.len().min(4096);
    let head = String::from_utf8_lossy(&content[..head_len]);

    // LCOV: lines start with SF: and DA:/FN:
    let has_sf = head.lines().any(|l| l.starts_with("SF:"));
    let has_da_or_fn = head.lines().any(|l| l.starts_with("DA:") || l.starts_with("FN:"));
    if has_sf && has_da_or_fn {
        return Some(Format::Lcov);
    }

    if head.trim_start().starts_with('{') {
        return Some(Format::SimpleCov);
    }

    None
}

/// Source languages with method boundary support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Ruby,
    Rust,
}

impl Language {
    /// Guess a source file's language from its extension or well-known name.
    pub fn from_path(path: &Path) -> Option<Language> {
        let name = path.file_name()?.to_str()?;
        if matches!(name, "Rakefile" | "Gemfile" | "Guardfile") {
            return Some(Language::Ruby);
        }
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "rb" | "rake" | "gemspec" | "ru" => Some(Language::Ruby),
            "rs" => Some(Language::Rust),
            _ => None,
        }
    }
}
