use std::collections::{BTreeMap, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;
use tree_sitter::Node;

use super::AnalysisContext;
use crate::index::ClassInfo;
use crate::syntax::{collect_nodes, end_line, is_class_like, named_children, node_text, start_line};

/// Lower-cased FQN -> direct parents as declared.
type DirectParents = FxHashMap<String, Vec<String>>;

impl<'a> AnalysisContext<'a> {
    pub(crate) fn class_nodes(&self) -> Vec<Node<'a>> {
        collect_nodes(self.root(), is_class_like)
    }

    /// Declared classes keyed by start byte, `extends` holding only direct parents.
    pub(crate) fn extract_classes(&self) -> BTreeMap<usize, ClassInfo> {
        self.class_nodes()
            .into_iter()
            .filter_map(|node| self.class_info(node))
            .map(|info| (info.start_byte_offset, info))
            .collect()
    }

    pub(crate) fn class_info(&self, node: Node<'_>) -> Option<ClassInfo> {
        let name = node_text(node.child_by_field_name("name")?, self.source).to_string();
        if name.is_empty() {
            return None;
        }
        let namespace = self.names.namespace_at(node.start_byte()).to_string();
        let fully_qualified_name = if namespace.is_empty() {
            name.clone()
        } else {
            format!("{}\\{}", namespace, name)
        };

        let mut extends: Vec<String> = Vec::new();
        for clause in named_children(node) {
            if clause.kind() != "base_clause" {
                continue;
            }
            for parent in named_children(clause) {
                if !matches!(parent.kind(), "name" | "qualified_name" | "relative_name") {
                    continue;
                }
                let fqn = self
                    .names
                    .resolve_class(node_text(parent, self.source), parent.start_byte());
                if !extends.iter().any(|e| e.eq_ignore_ascii_case(&fqn)) {
                    extends.push(fqn);
                }
            }
        }

        Some(ClassInfo {
            name,
            namespace,
            fully_qualified_name,
            parents: extends.clone(),
            extends,
            start_line: start_line(node),
            end_line: end_line(node),
            start_byte_offset: node.start_byte(),
        })
    }

    /// Replace each class's direct parents with its full ancestor chain, nearest first.
    pub(crate) fn expand_ancestors(&self, classes: &mut BTreeMap<usize, ClassInfo>) {
        let local = direct_parents(classes);
        for class in classes.values_mut() {
            class.extends = self.ancestor_chain(&class.fully_qualified_name, &class.parents, &local);
        }
    }

    /// Breadth-first walk from `direct`, one level at a time: same-file parents
    /// first, the declared parents of classes in other files otherwise.
    fn ancestor_chain(&self, fqn: &str, direct: &[String], local: &DirectParents) -> Vec<String> {
        let mut visited: FxHashSet<String> = FxHashSet::default();
        visited.insert(fqn.to_ascii_lowercase());
        let mut chain: Vec<String> = Vec::new();
        let mut queue: VecDeque<String> = direct.iter().cloned().collect();

        while let Some(current) = queue.pop_front() {
            let key = current.to_ascii_lowercase();
            if !visited.insert(key.clone()) {
                continue;
            }
            chain.push(current.clone());

            if let Some(parents) = local.get(&key) {
                queue.extend(parents.iter().cloned());
                continue;
            }
            let external = self
                .declaring_index(&current)
                .and_then(|index| index.class_by_name(&current).map(|c| c.parents.clone()));
            match external {
                Some(parents) => queue.extend(parents),
                None => trace!(class = %current, "ancestor not resolvable, chain stops here"),
            }
        }
        chain
    }

    /// Re-derive class entries after an edit without re-expanding ancestors: a class
    /// whose direct parents are unchanged keeps its previous chain, any other class
    /// holds just its direct parents until the next full build.
    pub(crate) fn refresh_classes(&self, previous: &BTreeMap<usize, ClassInfo>) -> BTreeMap<usize, ClassInfo> {
        let old: FxHashMap<String, &ClassInfo> = previous
            .values()
            .map(|c| (c.fully_qualified_name.to_ascii_lowercase(), c))
            .collect();

        let mut classes = self.extract_classes();
        for class in classes.values_mut() {
            let key = class.fully_qualified_name.to_ascii_lowercase();
            if let Some(before) = old.get(&key).filter(|b| same_names(&b.parents, &class.parents)) {
                class.extends = before.extends.clone();
            }
        }
        classes
    }
}

/// Lower-cased FQN -> declared parents, for same-file lookups.
fn direct_parents(classes: &BTreeMap<usize, ClassInfo>) -> DirectParents {
    classes
        .values()
        .map(|c| (c.fully_qualified_name.to_ascii_lowercase(), c.parents.clone()))
        .collect()
}

fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}
