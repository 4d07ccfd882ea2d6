//! Parse a unified diff to extract which lines were added in each file,
//! consolidated into ranges. These are the "modified ranges" that diff
//! coverage is computed over.
//!
//! Also provides a [`DiffSource`] trait that abstracts over different
//! ways to obtain a diff (stdin, file, git, GitHub API).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn, Span};

use crate::github;
use crate::range::{self, Range};

/// Per-file ranges of lines added by a diff.
pub type ModifiedRanges = BTreeMap<String, Vec<Range>>;

// ---------------------------------------------------------------------------
// Diff sources
// ---------------------------------------------------------------------------

/// A source for obtaining a unified diff.
pub trait DiffSource {
    /// Fetch the diff text.
    fn fetch_diff(&self) -> Result<String>;

    /// Get the commit SHA, if available.
    fn sha(&self) -> Option<&str> {
        None
    }
}

/// Diff from stdin.
pub struct StdinDiff;

impl DiffSource for StdinDiff {
    fn fetch_diff(&self) -> Result<String> {
        std::io::read_to_string(std::io::stdin()).context("Failed to read diff from stdin")
    }
}

/// Diff from a patch file on disk.
pub struct FileDiff {
    pub path: PathBuf,
}

impl DiffSource for FileDiff {
    fn fetch_diff(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read diff from {}", self.path.display()))
    }
}

/// Diff from a git command, e.g. `git diff --unified=0 origin/main...HEAD`.
pub struct GitDiff {
    /// Arguments to pass to `git diff`.
    pub args: String,
}

impl DiffSource for GitDiff {
    fn fetch_diff(&self) -> Result<String> {
        let diff_args: Vec<&str> = self.args.split_whitespace().collect();
        let output = Command::new("git")
            .arg("diff")
            .arg("--unified=0")
            .arg("--no-color")
            .args(&diff_args)
            .output()
            .context("Failed to run git diff")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git diff failed: {stderr}");
        }

        String::from_utf8(output.stdout).context("git diff output not valid UTF-8")
    }
}

/// Diff from a GitHub pull request.
pub struct GitHubDiff {
    /// The resolved GitHub context.
    pub context: github::Context,
}

impl GitHubDiff {
    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        let context = github::Context::from_env()?;
        Ok(Self { context })
    }
}

impl DiffSource for GitHubDiff {
    fn fetch_diff(&self) -> Result<String> {
        self.context.fetch_diff()
    }

    fn sha(&self) -> Option<&str> {
        self.context.sha.as_deref()
    }
}

/// Fetch and parse a diff. Any failure degrades to an empty map.
pub fn modified_ranges(source: &dyn DiffSource, span: &Span) -> ModifiedRanges {
    match source.fetch_diff() {
        Ok(text) => {
            let ranges = parse_diff(&text);
            debug!(parent: span, files = ranges.len(), "parsed diff");
            ranges
        }
        Err(e) => {
            let error = format!("{e:#}");
            warn!(parent: span, %error, "could not read diff; treating it as empty");
            ModifiedRanges::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Diff parsing
// ---------------------------------------------------------------------------

/// Prepend a path prefix to all file paths in a diff result.
pub fn apply_path_prefix(diff: ModifiedRanges, prefix: &str) -> ModifiedRanges {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return diff;
    }
    diff.into_iter()
        .map(|(path, ranges)| (format!("{prefix}/{path}"), ranges))
        .collect()
}

/// Parse a unified diff and return file path -> ranges of added lines (in
/// the new file). Deleted files get no entry. Never fails: text that is
/// not part of a recognizable file/hunk is ignored.
pub fn parse_diff(diff_text: &str) -> ModifiedRanges {
    added_lines(diff_text)
        .into_iter()
        .map(|(path, lines)| (path, range::from_ascending(lines)))
        .filter(|(_, ranges)| !ranges.is_empty())
        .collect()
}

/// Position inside the hunk currently being read.
struct Hunk {
    cursor: u32,
    new_remaining: u32,
}

fn added_lines(diff_text: &str) -> BTreeMap<String, BTreeSet<u32>> {
    let mut result: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
    let mut current_file: Option<String> = None;
    let mut hunk: Option<Hunk> = None;
    let mut git_prefixed: Option<bool> = None;
    let mut old_header: Option<&str> = None;
    let mut prev_line = "";

    for line in diff_text.lines() {
        // An added line may itself start with "+++ "; it is only a header
        // once the hunk's new-side count is used up or right after "--- ".
        let is_header = hunk.as_ref().map_or(true, |h| h.new_remaining == 0)
            || prev_line.starts_with("--- ");
        prev_line = line;
        let mut overflowed = false;

        if let Some(rest) = line.strip_prefix("diff ") {
            current_file = None;
            hunk = None;
            old_header = None;
            git_prefixed = rest.strip_prefix("--git ").map(has_prefix_pair);
        } else if let Some(rest) = line.strip_prefix("--- ").filter(|_| is_header) {
            old_header = Some(rest);
        } else if let Some(rest) = line.strip_prefix("+++ ").filter(|_| is_header) {
            current_file = parse_target_path(old_header.take(), git_prefixed, rest);
            hunk = None;
        } else if line.starts_with("@@") {
            hunk = parse_hunk_header(line).map(|(new_start, new_count)| Hunk {
                cursor: new_start,
                new_remaining: new_count,
            });
        } else if let (Some(file), Some(h)) = (current_file.as_ref(), hunk.as_mut()) {
            let added = line.starts_with('+');
            if added || line.starts_with(' ') {
                if added && h.cursor > 0 {
                    result.entry(file.clone()).or_default().insert(h.cursor);
                }
                h.new_remaining = h.new_remaining.saturating_sub(1);
                match h.cursor.checked_add(1) {
                    Some(next) => h.cursor = next,
                    None => overflowed = true,
                }
            }
            // Removed lines leave the new-file cursor where it is.
            // "\ No newline at end of file" and anything else: metadata.
        }

        // No line exists past u32::MAX; drop the rest of the hunk.
        if overflowed {
            hunk = None;
        }
    }

    result
}

/// Letters git puts before paths: `a/`/`b/` by default, or the
/// `diff.mnemonicPrefix` set (`i/`, `w/`, `c/`, `o/`).
const PREFIX_LETTERS: &[char] = &['a', 'b', 'c', 'i', 'o', 'w'];

fn vcs_prefix(path: &str) -> Option<char> {
    let mut chars = path.chars();
    let letter = chars.next()?;
    (PREFIX_LETTERS.contains(&letter) && chars.next() == Some('/')).then_some(letter)
}

/// Whether a `diff --git X Y` header uses prefixes. Both sides carry one,
/// and they differ; `--no-prefix` repeats the same path twice.
fn has_prefix_pair(rest: &str) -> bool {
    let Some(old) = vcs_prefix(rest) else {
        return false;
    };
    PREFIX_LETTERS
        .iter()
        .filter(|&&new| new != old)
        .any(|new| rest.contains(&format!(" {new}/")))
}

/// Strip tab-separated timestamps and quotes. `None` for `/dev/null`.
fn header_path(rest: &str) -> Option<&str> {
    // Some tools append a tab and a timestamp.
    let rest = rest.split('\t').next().unwrap_or(rest).trim_end();
    let rest = rest
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(rest);
    if rest == "/dev/null" || rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Path from a `+++` header, or `None` for a deleted file.
///
/// A VCS prefix is only stripped when the headers show one is in use: the
/// `---` side carries a different prefix letter, or (for new files) the
/// `diff --git` line does. Without either, only git's default `b/` and
/// the worktree `w/` are taken as prefixes.
fn parse_target_path(
    old_header: Option<&str>,
    git_prefixed: Option<bool>,
    rest: &str,
) -> Option<String> {
    let path = header_path(rest)?;
    let prefixed = match old_header.and_then(header_path) {
        Some(old) => matches!((vcs_prefix(old), vcs_prefix(path)), (Some(a), Some(b)) if a != b),
        None => git_prefixed.unwrap_or_else(|| matches!(vcs_prefix(path), Some('b' | 'w'))),
    };
    let path = if prefixed { &path[2..] } else { path };
    Some(path.to_string())
}

fn hunk_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@+ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")
            .expect("hunk header pattern is valid")
    })
}

/// Parse a hunk header like "@@ -10,5 +20,8 @@" into
/// `(new_start, new_count)`. An omitted count means 1.
fn parse_hunk_header(line: &str) -> Option<(u32, u32)> {
    let caps = hunk_header().captures(line)?;
    let new_start = caps.get(3)?.as_str().parse().ok()?;
    let new_count = match caps.get(4) {
        Some(m) => m.as_str().parse().ok()?,
        None => 1,
    };
    Some((new_start, new_count))
}
