use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tree_sitter::{InputEdit, Node, Parser};

/// Build a parser for PHP sources (`<?php` files, HTML passthrough included).
pub fn php_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_php::LANGUAGE_PHP.into())
        .context("failed to load the PHP grammar")?;
    Ok(parser)
}

/// Half-open byte interval `[start, end)` in current-content coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Overlapping or adjacent ranges coalesce into one.
    pub fn touches(&self, other: &ByteRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn union(&self, other: &ByteRange) -> ByteRange {
        ByteRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Zero-based row and byte column, as the syntax provider counts them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl From<tree_sitter::Point> for Point {
    fn from(p: tree_sitter::Point) -> Self {
        Self {
            row: p.row,
            column: p.column,
        }
    }
}

impl From<Point> for tree_sitter::Point {
    fn from(p: Point) -> Self {
        tree_sitter::Point::new(p.row, p.column)
    }
}

/// Location of a syntax node stored by value, so it outlives the tree it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    pub bytes: ByteRange,
    pub start: Point,
    pub end: Point,
}

impl SourceRange {
    pub fn of(node: Node<'_>) -> Self {
        Self {
            bytes: ByteRange::new(node.start_byte(), node.end_byte()),
            start: node.start_position().into(),
            end: node.end_position().into(),
        }
    }
}

/// Edit descriptor handed over by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
    pub start_position: Point,
    pub old_end_position: Point,
    pub new_end_position: Point,
}

impl TextEdit {
    /// Replace `range` of `old` with `new_text`, returning the new content and the matching edit.
    pub fn replace(old: &str, range: ByteRange, new_text: &str) -> (String, TextEdit) {
        let start = floor_char_boundary(old, range.start.min(old.len()));
        let old_end = floor_char_boundary(old, range.end.min(old.len())).max(start);

        let mut content = String::with_capacity(old.len() - (old_end - start) + new_text.len());
        content.push_str(&old[..start]);
        content.push_str(new_text);
        content.push_str(&old[old_end..]);

        let new_end = start + new_text.len();
        let edit = TextEdit {
            start_byte: start,
            old_end_byte: old_end,
            new_end_byte: new_end,
            start_position: point_at(old, start),
            old_end_position: point_at(old, old_end),
            new_end_position: point_at(&content, new_end),
        };
        (content, edit)
    }

    /// Dirty region in post-edit coordinates.
    pub fn dirty_range(&self) -> ByteRange {
        ByteRange::new(self.start_byte, self.new_end_byte)
    }

    pub fn byte_delta(&self) -> isize {
        self.new_end_byte as isize - self.old_end_byte as isize
    }

    /// True when the edit inserts or removes line breaks.
    pub fn changes_line_count(&self) -> bool {
        self.old_end_position.row - self.start_position.row != self.new_end_position.row - self.start_position.row
    }

    pub fn to_input_edit(&self) -> InputEdit {
        InputEdit {
            start_byte: self.start_byte,
            old_end_byte: self.old_end_byte,
            new_end_byte: self.new_end_byte,
            start_position: self.start_position.into(),
            old_end_position: self.old_end_position.into(),
            new_end_position: self.new_end_position.into(),
        }
    }
}

/// Row/byte-column of `offset` inside `content`.
pub fn point_at(content: &str, offset: usize) -> Point {
    let offset = offset.min(content.len());
    let head = &content.as_bytes()[..offset];
    let row = head.iter().filter(|b| **b == b'\n').count();
    let line_start = head.iter().rposition(|b| *b == b'\n').map(|i| i + 1).unwrap_or(0);
    Point::new(row, offset - line_start)
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

pub(crate) fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

pub(crate) fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub(crate) fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// 1-based line of the node's first byte.
pub(crate) fn start_line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// 1-based line of the node's last byte.
pub(crate) fn end_line(node: Node<'_>) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row
    } else {
        end.row + 1
    }
}

/// Pre-order walk collecting every node whose kind satisfies `pred`, `root` included.
pub(crate) fn collect_nodes<'t>(root: Node<'t>, pred: impl Fn(&str) -> bool) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if pred(node.kind()) {
            out.push(node);
        }
        let mut kids = named_children(node);
        kids.reverse();
        stack.extend(kids);
    }
    out
}

/// Closest ancestor (excluding `node`) whose kind satisfies `pred`.
pub(crate) fn enclosing<'t>(node: Node<'t>, pred: impl Fn(&str) -> bool) -> Option<Node<'t>> {
    let mut current = node.parent();
    while let Some(n) = current {
        if pred(n.kind()) {
            return Some(n);
        }
        current = n.parent();
    }
    None
}

pub(crate) fn is_class_like(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration" | "interface_declaration" | "trait_declaration" | "enum_declaration"
    )
}

pub(crate) fn is_function_like(kind: &str) -> bool {
    matches!(
        kind,
        "function_definition"
            | "method_declaration"
            | "anonymous_function"
            | "anonymous_function_creation_expression"
            | "arrow_function"
    )
}
