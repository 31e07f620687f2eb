use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use super::AnalysisContext;
use crate::syntax::{enclosing, is_class_like, named_children, node_text};

const PRIMITIVES: &[&str] = &[
    "int", "float", "string", "bool", "array", "callable", "iterable", "object", "mixed", "void", "null", "false",
    "true", "never", "resource",
];

const TYPE_KINDS: &[&str] = &[
    "union_type",
    "intersection_type",
    "disjunctive_normal_form_type",
    "optional_type",
    "named_type",
    "primitive_type",
];

static CLASS_NAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\\?[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*(\\[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*)*$").ok());

/// Canonical primitive spelling, with doc-comment aliases folded in.
pub(crate) fn normalize_primitive(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "integer" => "int",
        "boolean" => "bool",
        "double" | "real" => "float",
        other => other,
    };
    PRIMITIVES.iter().copied().find(|p| *p == canonical)
}

/// Result type of a `(type)` cast.
pub(crate) fn cast_target(cast: &str) -> Option<&'static str> {
    match cast.trim().to_ascii_lowercase().as_str() {
        "int" | "integer" => Some("int"),
        "bool" | "boolean" => Some("bool"),
        "float" | "double" | "real" => Some("float"),
        "string" | "binary" => Some("string"),
        "array" => Some("array"),
        "object" => Some("object"),
        "unset" => Some("null"),
        _ => None,
    }
}

/// The type annotation of a declaration or parameter, if any.
pub(crate) fn type_child(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("type")
        .or_else(|| named_children(node).into_iter().find(|k| TYPE_KINDS.contains(&k.kind())))
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

/// Split on `sep` outside of `<>`, `()` and `{}`.
fn split_top_level(raw: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, ch) in raw.char_indices() {
        match ch {
            '<' | '(' | '{' => depth += 1,
            '>' | ')' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

impl<'a> AnalysisContext<'a> {
    /// One entry per component of a declared type; `?T` yields `T` and `null`.
    pub(crate) fn type_components(&self, node: Node<'_>) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_type_components(node, &mut out);
        out
    }

    fn collect_type_components(&self, node: Node<'_>, out: &mut Vec<String>) {
        match node.kind() {
            "union_type" | "intersection_type" | "disjunctive_normal_form_type" | "parenthesized_type" => {
                for child in named_children(node) {
                    self.collect_type_components(child, out);
                }
            }
            "optional_type" => {
                for child in named_children(node) {
                    self.collect_type_components(child, out);
                }
                push_unique(out, "null".to_string());
            }
            "primitive_type" => {
                let text = node_text(node, self.source);
                match normalize_primitive(text) {
                    Some(p) => push_unique(out, p.to_string()),
                    None => push_unique(out, text.to_ascii_lowercase()),
                }
            }
            "named_type" | "name" | "qualified_name" | "relative_name" => {
                if let Some(resolved) = self.resolve_type_name(node_text(node, self.source), node) {
                    push_unique(out, resolved);
                }
            }
            _ => {}
        }
    }

    /// Resolve a type name written at `at`; `None` for malformed input.
    pub(crate) fn resolve_type_name(&self, raw: &str, at: Node<'_>) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(p) = normalize_primitive(raw) {
            return Some(p.to_string());
        }
        let lower = raw.to_ascii_lowercase();
        if lower == "self" || lower == "static" {
            return Some(self.enclosing_class_fqn(at).unwrap_or(lower));
        }
        if lower == "parent" {
            return Some(self.enclosing_parent_fqn(at).unwrap_or(lower));
        }
        let valid = CLASS_NAME.as_ref().map(|re| re.is_match(raw)).unwrap_or(false);
        if !valid {
            return None;
        }
        Some(self.names.resolve_class(raw, at.start_byte()))
    }

    /// Components of a doc-comment type such as `?Foo|Bar[]|array<int, Baz>`.
    pub(crate) fn doc_type_components(&self, raw: &str, at: Node<'_>) -> Vec<String> {
        let mut out = Vec::new();
        for part in split_top_level(raw, '|') {
            let mut part = part.trim();
            if let Some(inner) = part.strip_prefix('(').and_then(|p| p.strip_suffix(')')) {
                for piece in split_top_level(inner, '&') {
                    for t in self.doc_type_components(piece, at) {
                        push_unique(&mut out, t);
                    }
                }
                continue;
            }
            let nullable = part.starts_with('?');
            if nullable {
                part = &part[1..];
            }
            let mut suffix = String::new();
            while let Some(stripped) = part.strip_suffix("[]") {
                part = stripped;
                suffix.push_str("[]");
            }
            if let Some(open) = part.find('<') {
                if !part.ends_with('>') {
                    continue;
                }
                part = &part[..open];
            }
            let Some(resolved) = self.resolve_type_name(part, at) else {
                continue;
            };
            push_unique(&mut out, format!("{}{}", resolved, suffix));
            if nullable {
                push_unique(&mut out, "null".to_string());
            }
        }
        out
    }

    fn class_name_of(&self, class: Node<'_>) -> Option<String> {
        let name = class.child_by_field_name("name")?;
        let short = node_text(name, self.source);
        let namespace = self.names.namespace_at(class.start_byte());
        Some(if namespace.is_empty() {
            short.to_string()
        } else {
            format!("{}\\{}", namespace, short)
        })
    }

    pub(crate) fn enclosing_class_fqn(&self, at: Node<'_>) -> Option<String> {
        let class = enclosing(at, is_class_like)?;
        self.class_name_of(class)
    }

    fn enclosing_parent_fqn(&self, at: Node<'_>) -> Option<String> {
        let class = enclosing(at, is_class_like)?;
        let base = named_children(class).into_iter().find(|k| k.kind() == "base_clause")?;
        let first = named_children(base)
            .into_iter()
            .find(|k| matches!(k.kind(), "name" | "qualified_name"))?;
        Some(self.names.resolve_class(node_text(first, self.source), first.start_byte()))
    }
}
