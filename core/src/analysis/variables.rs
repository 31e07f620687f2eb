use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use super::properties::declared_variable;
use super::types::{cast_target, type_child};
use super::AnalysisContext;
use crate::index::{FunctionScope, PropertyMap, VariableMap};
use crate::syntax::{
    children, collect_nodes, enclosing, end_line, is_class_like, is_function_like, named_children, node_text,
    start_line,
};

static DOC_VAR: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"@var\s+([^\s$]+)\s+\$([A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*)").ok());

/// A `@var Type $name` annotation waiting for its assignment.
struct PendingDocVar {
    name: String,
    types: Vec<String>,
}

/// Per-function facts the classifier needs.
struct InferState<'p> {
    scope: FunctionScope,
    properties: &'p PropertyMap,
    /// Line span of the enclosing class, for `$this->prop` lookups.
    class_lines: Option<(usize, usize)>,
}

impl<'a> AnalysisContext<'a> {
    /// Infer a scope for every function-like node under `scope`, `scope` included.
    pub(crate) fn infer_functions_in(&self, scope: Node<'_>, properties: &PropertyMap, out: &mut VariableMap) {
        for func in collect_nodes(scope, is_function_like) {
            let (key, fs) = self.infer_function(func, properties);
            out.insert(key, fs);
        }
    }

    /// Stable identifier of a function-like node: `Class::method`, `name` or `anonymous@LINE`.
    pub(crate) fn scope_key(&self, func: Node<'_>) -> String {
        let name = func
            .child_by_field_name("name")
            .map(|n| node_text(n, self.source).to_string())
            .unwrap_or_default();
        match func.kind() {
            "method_declaration" if !name.is_empty() => {
                let mut current = func.parent();
                while let Some(n) = current {
                    if is_class_like(n.kind()) {
                        let class = n
                            .child_by_field_name("name")
                            .map(|c| node_text(c, self.source))
                            .unwrap_or("");
                        return format!("{}::{}", class, name);
                    }
                    if n.kind() == "anonymous_class" || n.kind() == "object_creation_expression" {
                        return format!("class@{}::{}", start_line(n), name);
                    }
                    current = n.parent();
                }
                name
            }
            "function_definition" if !name.is_empty() => name,
            _ => format!("anonymous@{}", start_line(func)),
        }
    }

    pub(crate) fn infer_function(&self, func: Node<'_>, properties: &PropertyMap) -> (String, FunctionScope) {
        let class_lines = enclosing(func, is_class_like).map(|c| (start_line(c), end_line(c)));
        let mut state = InferState {
            scope: FunctionScope::new(start_line(func), end_line(func)),
            properties,
            class_lines,
        };

        if let Some(params) = func.child_by_field_name("parameters") {
            for param in named_children(params) {
                self.seed_parameter(param, &mut state.scope);
            }
        }
        for clause in named_children(func) {
            if clause.kind() == "anonymous_function_use_clause" {
                for var in collect_nodes(clause, |k| k == "variable_name") {
                    let name = node_text(var, self.source).trim_start_matches('$');
                    state.scope.record(name, &[], start_line(var));
                }
            }
        }

        if let Some(body) = func.child_by_field_name("body") {
            if body.kind() == "compound_statement" {
                self.scan_statements(body, &mut state);
            }
        }
        (self.scope_key(func), state.scope)
    }

    fn seed_parameter(&self, param: Node<'_>, scope: &mut FunctionScope) {
        let Some(name) = declared_variable(param, self.source) else {
            return;
        };
        let line = start_line(param);
        match param.kind() {
            "simple_parameter" | "property_promotion_parameter" => {
                let types = type_child(param).map(|t| self.type_components(t)).unwrap_or_default();
                scope.record(name, &types, line);
            }
            "variadic_parameter" => scope.record(name, &["array".to_string()], line),
            _ => {}
        }
    }

    fn scan_statements(&self, body: Node<'_>, state: &mut InferState<'_>) {
        let mut pending: Option<PendingDocVar> = None;
        for stmt in named_children(body) {
            match stmt.kind() {
                "comment" => {
                    if let Some(doc) = self.parse_doc_var(stmt) {
                        pending = Some(doc);
                    }
                }
                "expression_statement" => {
                    let assignment = named_children(stmt)
                        .into_iter()
                        .find(|k| k.kind() == "assignment_expression");
                    let Some(assignment) = assignment else {
                        pending = None;
                        continue;
                    };
                    let doc = pending.take();
                    self.record_assignment(assignment, start_line(stmt), doc, state);
                }
                _ => pending = None,
            }
        }
    }

    fn record_assignment(
        &self,
        assignment: Node<'_>,
        line: usize,
        doc: Option<PendingDocVar>,
        state: &mut InferState<'_>,
    ) {
        let Some(left) = assignment.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "variable_name" {
            return;
        }
        let name = node_text(left, self.source).trim_start_matches('$');
        if name.is_empty() || name == "this" {
            return;
        }
        let types = match doc {
            Some(doc) if doc.name == name => doc.types,
            _ => assignment
                .child_by_field_name("right")
                .map(|right| self.classify(right, line, state))
                .unwrap_or_default(),
        };
        state.scope.record(name, &types, line);
    }

    fn parse_doc_var(&self, comment: Node<'_>) -> Option<PendingDocVar> {
        let re = DOC_VAR.as_ref()?;
        let caps = re.captures(node_text(comment, self.source))?;
        let raw_type = caps.get(1)?.as_str();
        let name = caps.get(2)?.as_str().to_string();
        Some(PendingDocVar {
            name,
            types: self.doc_type_components(raw_type, comment),
        })
    }

    /// Type(s) of an expression; empty when unknown.
    fn classify(&self, expr: Node<'_>, line: usize, state: &InferState<'_>) -> Vec<String> {
        let single = |t: &str| vec![t.to_string()];
        match expr.kind() {
            "integer" => single("int"),
            "float" => single("float"),
            "string" | "encapsed_string" | "heredoc" | "nowdoc" => single("string"),
            "boolean" => single("bool"),
            "null" => single("null"),
            "array_creation_expression" => single("array"),
            "anonymous_function" | "anonymous_function_creation_expression" | "arrow_function" => single("Closure"),
            "object_creation_expression" => self.classify_new(expr),
            "cast_expression" => expr
                .child_by_field_name("type")
                .and_then(|t| cast_target(node_text(t, self.source)))
                .map(single)
                .unwrap_or_default(),
            "member_access_expression" | "nullsafe_member_access_expression" => self.classify_member(expr, state),
            "variable_name" => state
                .scope
                .type_names_at_or_before(node_text(expr, self.source), line),
            "assignment_expression" => expr
                .child_by_field_name("right")
                .map(|right| self.classify(right, line, state))
                .unwrap_or_default(),
            "parenthesized_expression" | "clone_expression" => named_children(expr)
                .into_iter()
                .find(|k| k.kind() != "comment")
                .map(|inner| self.classify(inner, line, state))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn classify_new(&self, expr: Node<'_>) -> Vec<String> {
        let kids = children(expr);
        if kids
            .iter()
            .any(|k| matches!(k.kind(), "anonymous_class" | "declaration_list" | "class"))
        {
            return Vec::new();
        }
        kids.into_iter()
            .find(|k| matches!(k.kind(), "name" | "qualified_name" | "relative_name"))
            .and_then(|name| self.resolve_type_name(node_text(name, self.source), name))
            .into_iter()
            .collect()
    }

    fn classify_member(&self, expr: Node<'_>, state: &InferState<'_>) -> Vec<String> {
        let Some(object) = expr.child_by_field_name("object") else {
            return Vec::new();
        };
        if object.kind() != "variable_name" || node_text(object, self.source) != "$this" {
            return Vec::new();
        }
        let Some(name) = expr.child_by_field_name("name").filter(|n| n.kind() == "name") else {
            return Vec::new();
        };
        let occs = state
            .properties
            .get(node_text(name, self.source))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let in_class: Vec<_> = match state.class_lines {
            Some((start, end)) => occs
                .iter()
                .filter(|o| start <= o.line && o.line <= end)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let pool = if in_class.is_empty() { occs.to_vec() } else { in_class };

        let mut out: Vec<String> = Vec::new();
        for occ in pool.iter().filter(|o| !o.is_untyped()) {
            if !out.contains(&occ.type_name) {
                out.push(occ.type_name.clone());
            }
        }
        out
    }
}
