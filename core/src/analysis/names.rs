use rustc_hash::FxHashMap;
use tree_sitter::Node;

use crate::syntax::{children, named_children, node_text};

/// Byte span governed by one `namespace` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NamespaceSpan {
    start: usize,
    end: usize,
    name: String,
}

/// Import aliases and namespace spans of one file.
#[derive(Debug, Clone, Default)]
pub(crate) struct NameTable {
    /// Lower-cased short name (or imported FQN) -> FQN.
    aliases: FxHashMap<String, String>,
    namespaces: Vec<NamespaceSpan>,
}

impl NameTable {
    pub(crate) fn build(root: Node<'_>, source: &str) -> Self {
        let mut table = NameTable::default();
        let mut open_ended: Option<usize> = None;

        for node in named_children(root) {
            match node.kind() {
                "namespace_definition" => {
                    let name = node
                        .child_by_field_name("name")
                        .map(|n| node_text(n, source).trim_matches('\\').to_string())
                        .unwrap_or_default();
                    if let Some(idx) = open_ended.take() {
                        table.namespaces[idx].end = node.start_byte();
                    }
                    match node.child_by_field_name("body") {
                        Some(body) => {
                            table.namespaces.push(NamespaceSpan {
                                start: node.start_byte(),
                                end: node.end_byte(),
                                name,
                            });
                            for inner in named_children(body) {
                                if inner.kind() == "namespace_use_declaration" {
                                    table.collect_use(inner, source);
                                }
                            }
                        }
                        None => {
                            table.namespaces.push(NamespaceSpan {
                                start: node.start_byte(),
                                end: root.end_byte(),
                                name,
                            });
                            open_ended = Some(table.namespaces.len() - 1);
                        }
                    }
                }
                "namespace_use_declaration" => table.collect_use(node, source),
                _ => {}
            }
        }
        table
    }

    fn collect_use(&mut self, decl: Node<'_>, source: &str) {
        if declares_function_or_const(decl, source) {
            return;
        }
        let kids = named_children(decl);
        if let Some(group) = kids.iter().find(|k| k.kind() == "namespace_use_group") {
            let prefix = kids
                .iter()
                .find(|k| matches!(k.kind(), "namespace_name" | "qualified_name" | "name"))
                .map(|k| node_text(*k, source).trim_matches('\\').to_string())
                .unwrap_or_default();
            for clause in named_children(*group) {
                if !matches!(clause.kind(), "namespace_use_clause" | "namespace_use_group_clause") {
                    continue;
                }
                if declares_function_or_const(clause, source) {
                    continue;
                }
                self.add_clause(clause, &prefix, source);
            }
        } else {
            for clause in kids.into_iter().filter(|k| k.kind() == "namespace_use_clause") {
                self.add_clause(clause, "", source);
            }
        }
    }

    fn add_clause(&mut self, clause: Node<'_>, prefix: &str, source: &str) {
        let alias_node = clause.child_by_field_name("alias").or_else(|| {
            named_children(clause)
                .into_iter()
                .find(|k| k.kind() == "namespace_aliasing_clause")
                .and_then(|c| named_children(c).into_iter().find(|k| k.kind() == "name"))
        });
        let alias_id = alias_node.map(|n| n.id());
        let Some(name_node) = named_children(clause).into_iter().find(|k| {
            Some(k.id()) != alias_id && matches!(k.kind(), "qualified_name" | "namespace_name" | "name")
        }) else {
            return;
        };

        let name = node_text(name_node, source).trim_matches('\\');
        if name.is_empty() {
            return;
        }
        let fqn = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}\\{}", prefix, name)
        };
        let short = match alias_node {
            Some(alias) => node_text(alias, source).to_string(),
            None => fqn.rsplit('\\').next().unwrap_or(&fqn).to_string(),
        };
        self.aliases.insert(short.to_ascii_lowercase(), fqn.clone());
        self.aliases.insert(fqn.to_ascii_lowercase(), fqn);
    }

    /// Namespace governing `byte`, empty for the global namespace.
    pub(crate) fn namespace_at(&self, byte: usize) -> &str {
        self.namespaces
            .iter()
            .filter(|ns| ns.start <= byte && byte < ns.end.max(ns.start + 1))
            .next_back()
            .map(|ns| ns.name.as_str())
            .unwrap_or("")
    }

    /// Resolve a class reference written at `byte` to its fully-qualified name.
    pub(crate) fn resolve_class(&self, raw: &str, byte: usize) -> String {
        let raw = raw.trim();
        if let Some(absolute) = raw.strip_prefix('\\') {
            return absolute.to_string();
        }
        let namespace = self.namespace_at(byte);
        if let Some(rest) = raw.strip_prefix("namespace\\") {
            return qualify(namespace, rest);
        }
        if let Some(fqn) = self.aliases.get(&raw.to_ascii_lowercase()) {
            return fqn.clone();
        }
        if let Some((first, rest)) = raw.split_once('\\') {
            if let Some(fqn) = self.aliases.get(&first.to_ascii_lowercase()) {
                return format!("{}\\{}", fqn, rest);
            }
        }
        qualify(namespace, raw)
    }

    #[cfg(test)]
    pub(crate) fn alias(&self, short: &str) -> Option<&str> {
        self.aliases.get(&short.to_ascii_lowercase()).map(String::as_str)
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", namespace, name)
    }
}

fn declares_function_or_const(node: Node<'_>, source: &str) -> bool {
    if let Some(kind) = node.child_by_field_name("type") {
        let text = node_text(kind, source);
        if text.eq_ignore_ascii_case("function") || text.eq_ignore_ascii_case("const") {
            return true;
        }
    }
    children(node)
        .iter()
        .any(|c| !c.is_named() && matches!(c.kind(), "function" | "const"))
}
