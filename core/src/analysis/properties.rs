use tree_sitter::Node;

use super::types::type_child;
use super::AnalysisContext;
use crate::index::{PropertyMap, TypeOccurrence};
use crate::syntax::{collect_nodes, named_children, node_text, start_line};

fn record(out: &mut PropertyMap, name: &str, types: &[String], line: usize) {
    let entry = out.entry(name.to_string()).or_default();
    if types.is_empty() {
        entry.push(TypeOccurrence::untyped(line));
    } else {
        entry.extend(types.iter().map(|t| TypeOccurrence::new(t.clone(), line)));
    }
}

/// The `$name` of a property element or parameter, without the sigil.
pub(crate) fn declared_variable<'s>(node: Node<'_>, source: &'s str) -> Option<&'s str> {
    let var = node
        .child_by_field_name("name")
        .filter(|n| n.kind() == "variable_name")
        .or_else(|| collect_nodes(node, |k| k == "variable_name").into_iter().next())?;
    let name = node_text(var, source).trim_start_matches('$');
    (!name.is_empty()).then_some(name)
}

impl<'a> AnalysisContext<'a> {
    /// Every declared or constructor-promoted property under `scope`.
    pub(crate) fn extract_properties_in(&self, scope: Node<'_>, out: &mut PropertyMap) {
        let decls = collect_nodes(scope, |k| {
            k == "property_declaration" || k == "property_promotion_parameter"
        });
        for decl in decls {
            match decl.kind() {
                "property_declaration" => self.extract_property_declaration(decl, out),
                _ => self.extract_promoted_property(decl, out),
            }
        }
    }

    pub(crate) fn extract_property_declaration(&self, decl: Node<'_>, out: &mut PropertyMap) {
        let line = start_line(decl);
        let types = type_child(decl).map(|t| self.type_components(t)).unwrap_or_default();
        for element in named_children(decl) {
            if element.kind() != "property_element" {
                continue;
            }
            if let Some(name) = declared_variable(element, self.source) {
                record(out, name, &types, line);
            }
        }
    }

    pub(crate) fn extract_promoted_property(&self, param: Node<'_>, out: &mut PropertyMap) {
        let types = type_child(param).map(|t| self.type_components(t)).unwrap_or_default();
        if let Some(name) = declared_variable(param, self.source) {
            record(out, name, &types, start_line(param));
        }
    }
}
