use rustc_hash::{FxHashMap, FxHashSet};
use tree_sitter::Node;

use super::AnalysisContext;
use crate::index::{FunctionInfo, IndexedTree};
use crate::syntax::{collect_nodes, named_children, node_text, SourceRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    Public,
    Protected,
    Private,
}

fn visibility_of(method: Node<'_>, source: &str) -> Visibility {
    named_children(method)
        .into_iter()
        .find(|k| k.kind() == "visibility_modifier")
        .map(|k| match node_text(k, source).to_ascii_lowercase().as_str() {
            "private" => Visibility::Private,
            "protected" => Visibility::Protected,
            _ => Visibility::Public,
        })
        .unwrap_or(Visibility::Public)
}

fn function_info(uri: &str, name: String, node: Node<'_>) -> Option<FunctionInfo> {
    let params = node.child_by_field_name("parameters")?;
    Some(FunctionInfo {
        source_uri: uri.to_string(),
        name,
        declaration_range: SourceRange::of(node),
        parameter_list_range: SourceRange::of(params),
        body_range: node.child_by_field_name("body").map(SourceRange::of),
    })
}

#[derive(Default)]
struct Buckets {
    public: Vec<FunctionInfo>,
    protected: Vec<FunctionInfo>,
    private: Vec<FunctionInfo>,
}

impl Buckets {
    fn push(&mut self, visibility: Visibility, info: FunctionInfo) {
        match visibility {
            Visibility::Public => self.public.push(info),
            Visibility::Protected => self.protected.push(info),
            Visibility::Private => self.private.push(info),
        }
    }
}

impl<'a> AnalysisContext<'a> {
    fn declared_methods(&self, class: Node<'_>, class_name: &str) -> Vec<(Visibility, FunctionInfo)> {
        let Some(body) = class.child_by_field_name("body") else {
            return Vec::new();
        };
        named_children(body)
            .into_iter()
            .filter(|m| m.kind() == "method_declaration")
            .filter_map(|m| {
                let name = node_text(m.child_by_field_name("name")?, self.source);
                let info = function_info(self.uri, format!("{}::{}", class_name, name), m)?;
                Some((visibility_of(m, self.source), info))
            })
            .collect()
    }

    /// Public and protected methods of an ancestor declared in another file.
    fn external_methods(&self, fqn: &str) -> Vec<(Visibility, FunctionInfo)> {
        let Some(index) = self.declaring_index(fqn) else {
            return Vec::new();
        };
        let Some(owner) = index.class_by_name(fqn).map(|c| c.name.clone()) else {
            return Vec::new();
        };
        let owned = |f: &&FunctionInfo| f.owner().is_some_and(|o| o.eq_ignore_ascii_case(&owner));
        index
            .public_functions
            .iter()
            .filter(owned)
            .map(|f| (Visibility::Public, f.clone()))
            .chain(
                index
                    .protected_functions
                    .iter()
                    .filter(owned)
                    .map(|f| (Visibility::Protected, f.clone())),
            )
            .collect()
    }

    /// Fill the three visibility buckets: top-level functions, own methods, then
    /// inherited public/protected methods re-prefixed with the inheriting class.
    pub(crate) fn apply_methods(&self, index: &mut IndexedTree) {
        let mut buckets = Buckets::default();

        for func in collect_nodes(self.root(), |k| k == "function_definition") {
            let Some(name) = func.child_by_field_name("name") else {
                continue;
            };
            if let Some(info) = function_info(self.uri, node_text(name, self.source).to_string(), func) {
                buckets.public.push(info);
            }
        }

        let mut own: FxHashMap<String, Vec<(Visibility, FunctionInfo)>> = FxHashMap::default();
        let mut ordered: Vec<(String, String)> = Vec::new();
        for node in self.class_nodes() {
            let Some(info) = self.class_info(node) else {
                continue;
            };
            let key = info.fully_qualified_name.to_ascii_lowercase();
            own.insert(key.clone(), self.declared_methods(node, &info.name));
            ordered.push((key, info.name));
        }

        let chains: FxHashMap<String, &[String]> = index
            .classes
            .values()
            .map(|c| (c.fully_qualified_name.to_ascii_lowercase(), c.extends.as_slice()))
            .collect();

        for (key, class_name) in &ordered {
            let declared = own.get(key).cloned().unwrap_or_default();
            let mut seen: FxHashSet<String> = declared
                .iter()
                .map(|(_, f)| f.short_name().to_ascii_lowercase())
                .collect();
            for (visibility, info) in declared {
                buckets.push(visibility, info);
            }

            let ancestors = chains.get(key).copied().unwrap_or(&[]);
            for ancestor in ancestors {
                let inherited = match own.get(&ancestor.to_ascii_lowercase()) {
                    Some(local) => local.clone(),
                    None => self.external_methods(ancestor),
                };
                for (visibility, mut info) in inherited {
                    if visibility == Visibility::Private {
                        continue;
                    }
                    let short = info.short_name().to_string();
                    if !seen.insert(short.to_ascii_lowercase()) {
                        continue;
                    }
                    info.name = format!("{}::{}", class_name, short);
                    buckets.push(visibility, info);
                }
            }
        }

        index.public_functions = buckets.public;
        index.protected_functions = buckets.protected;
        index.private_functions = buckets.private;
    }
}
