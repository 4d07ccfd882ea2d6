//! Ruby method boundaries via tree-sitter plus `def`/`end` keyword balance.

use std::sync::OnceLock;

use regex::Regex;
use tree_sitter::{Node, Parser};

use super::{boundaries_from_starts, MethodLocator};
use crate::model::MethodBoundary;

/// Keywords that always open a block closed by `end`.
const BLOCK_OPENERS: &[&str] = &["def", "class", "module", "begin", "case", "do"];

/// Keywords that open a block only when they start an expression; as
/// trailing modifiers (`return if x`) they do not.
const STATEMENT_OPENERS: &[&str] = &["if", "unless", "while", "until", "for"];

const LOOP_KEYWORDS: &[&str] = &["while", "until", "for"];

pub struct RubyLocator;

impl MethodLocator for RubyLocator {
    fn locate(&self, source: &str) -> Vec<MethodBoundary> {
        let Some(starts) = definition_lines(source) else {
            return Vec::new();
        };
        let lines: Vec<&str> = source.lines().collect();
        let (endless, block): (Vec<usize>, Vec<usize>) = starts.into_iter().partition(|&line| {
            lines
                .get(line.saturating_sub(1))
                .is_some_and(|text| endless_def().is_match(text))
        });

        let mut boundaries = boundaries_from_starts(source, block, count_keywords);
        boundaries.extend(
            endless
                .into_iter()
                .map(|line| MethodBoundary::new(line as u32, line as u32)),
        );
        boundaries.sort();
        boundaries.dedup();
        boundaries
    }
}

/// 1-based lines of every `def`. `None` when the source does not parse
/// cleanly.
fn definition_lines(source: &str) -> Option<Vec<usize>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_ruby::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }

    let mut lines = Vec::new();
    let mut stack: Vec<Node> = vec![root];
    while let Some(node) = stack.pop() {
        if matches!(node.kind(), "method" | "singleton_method") {
            lines.push(node.start_position().row + 1);
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
    Some(lines)
}

fn endless_def() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*def\s+(?:self\.)?[\w?!]+(?:\([^)]*\)\s*|\s+)=(?:\s|$)")
            .expect("endless def pattern is valid")
    })
}

/// Count `(openers, ends)` on one line of Ruby.
fn count_keywords(line: &str) -> (u32, u32) {
    if endless_def().is_match(line) {
        return (0, 0);
    }

    let code = strip_strings_and_comment(line);
    let mut open = 0;
    let mut close = 0;
    let mut first_word: Option<&str> = None;

    for (word, prev, next) in words(&code) {
        // Method calls (`x.end`), symbols (`:class`) and hash keys (`do:`).
        if matches!(prev, Some('.') | Some(':')) || next == Some(':') {
            continue;
        }
        let is_first = first_word.is_none();
        if is_first {
            first_word = Some(word);
        }

        if word == "end" {
            close += 1;
        } else if word == "do" {
            // `while x do` shares one `end` with its loop keyword.
            if !first_word.is_some_and(|w| LOOP_KEYWORDS.contains(&w)) || is_first {
                open += 1;
            }
        } else if BLOCK_OPENERS.contains(&word) {
            open += 1;
        } else if STATEMENT_OPENERS.contains(&word)
            && (is_first || matches!(prev, Some('=' | '(' | '[' | ',' | '|' | '&')))
        {
            open += 1;
        }
    }
    (open, close)
}

/// Replace string literal contents with spaces and drop a trailing comment.
fn strip_strings_and_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in line.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                    out.push(c);
                    continue;
                }
                out.push(' ');
            }
            None => match c {
                '#' => break,
                '"' | '\'' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                _ => out.push(c),
            },
        }
    }
    out
}

/// Identifier-like words with the nearest non-space characters around them.
fn words(code: &str) -> Vec<(&str, Option<char>, Option<char>)> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '?' || c == '!';
    let mut out = Vec::new();
    let mut prev_non_space: Option<char> = None;
    let mut start: Option<usize> = None;

    let mut chars = code.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if is_word(c) {
            if start.is_none() {
                start = Some(idx);
            }
            let at_end = chars.peek().map_or(true, |&(_, n)| !is_word(n));
            if at_end {
                let begin = start.take().unwrap_or(idx);
                let word = &code[begin..idx + c.len_utf8()];
                let next = code[idx + c.len_utf8()..].chars().find(|ch| !ch.is_whitespace());
                // `end:` as a hash key, but `Foo::Bar` is not a key.
                let next = match next {
                    Some(':') if code[idx + c.len_utf8()..].trim_start().starts_with("::") => None,
                    other => other,
                };
                out.push((word, prev_non_space, next));
                prev_non_space = word.chars().last();
            }
        } else if !c.is_whitespace() {
            prev_non_space = Some(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(start: u32, end: u32) -> MethodBoundary {
        MethodBoundary::new(start, end)
    }

    #[test]
    fn test_locates_methods_in_class() {
        let src = "\
class Greeter
  def hello(name)
    if name
      puts name
    end
  end

  def self.build
    new
  end
end
";
        assert_eq!(RubyLocator.locate(src), vec![b(2, 6), b(8, 10)]);
    }

    #[test]
    fn test_modifier_if_does_not_open_block() {
        let src = "\
def check(x)
  return 1 if x
  x.each do |y|
    puts y unless y
  end
end
";
        assert_eq!(RubyLocator.locate(src), vec![b(1, 6)]);
    }

    #[test]
    fn test_single_line_and_endless_methods() {
        let src = "\
def one; 1; end
def two = 2
def three(a) = a * 3
";
        assert_eq!(RubyLocator.locate(src), vec![b(1, 1), b(2, 2), b(3, 3)]);
    }

    #[test]
    fn test_while_do_shares_end() {
        let src = "\
def loop_it
  while running do
    step
  end
end
";
        assert_eq!(RubyLocator.locate(src), vec![b(1, 5)]);
    }

    #[test]
    fn test_syntax_error_yields_nothing() {
        assert!(RubyLocator.locate("def broken(\n  1 +\n").is_empty());
    }

    #[test]
    fn test_keywords_in_strings_and_comments_ignored() {
        assert_eq!(count_keywords("  puts \"end\" # end"), (0, 0));
        assert_eq!(count_keywords("  x.end"), (0, 0));
        assert_eq!(count_keywords("  foo(do: 1)"), (0, 0));
        assert_eq!(count_keywords("  y = if z"), (1, 0));
        assert_eq!(count_keywords("  Foo::Bar.new do |x|"), (1, 0));
    }

    #[test]
    fn test_setter_is_not_endless() {
        assert_eq!(count_keywords("def name=(v)"), (1, 0));
    }
}
