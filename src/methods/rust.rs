//! Rust function boundaries via `syn` plus brace balance.

use syn::visit::{self, Visit};

use super::{boundaries_from_starts, MethodLocator};
use crate::model::MethodBoundary;

pub struct RustLocator;

impl MethodLocator for RustLocator {
    fn locate(&self, source: &str) -> Vec<MethodBoundary> {
        let Ok(file) = syn::parse_file(source) else {
            return Vec::new();
        };
        let mut collector = FnLines::default();
        collector.visit_file(&file);
        boundaries_from_starts(source, collector.lines, count_braces)
    }
}

/// Lines on which each function with a body declares its name.
#[derive(Default)]
struct FnLines {
    lines: Vec<usize>,
}

impl<'ast> Visit<'ast> for FnLines {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        self.lines.push(node.sig.ident.span().start().line);
        visit::visit_item_fn(self, node);
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        self.lines.push(node.sig.ident.span().start().line);
        visit::visit_impl_item_fn(self, node);
    }

    fn visit_trait_item_fn(&mut self, node: &'ast syn::TraitItemFn) {
        if node.default.is_some() {
            self.lines.push(node.sig.ident.span().start().line);
        }
        visit::visit_trait_item_fn(self, node);
    }
}

/// Count `{` and `}` outside line comments, string and char literals.
fn count_braces(line: &str) -> (u32, u32) {
    let mut open = 0;
    let mut close = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '/' if chars.peek() == Some(&'/') => break,
            '\'' => {
                // '{' and '}' char literals; lifetimes fall through.
                let mut ahead = chars.clone();
                if let (Some(_), Some('\'')) = (ahead.next(), ahead.next()) {
                    chars.next();
                    chars.next();
                }
            }
            '{' => open += 1,
            '}' => close += 1,
            _ => {}
        }
    }
    (open, close)
}
