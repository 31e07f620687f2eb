//! Tree-walking extractors shared by the full and incremental index builds.

mod classes;
mod methods;
mod names;
mod properties;
mod types;
mod variables;


use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;
use tree_sitter::{Node, Tree};

use crate::autoload::{self, ProjectSettings};
use crate::index::{IndexedTree, PropertyMap};

use names::NameTable;

/// Supplies indexes of other files, used to follow inheritance across files.
pub trait ClassSource: Send + Sync {
    /// Index of the file at `path`, loading and analyzing it on demand.
    fn index_for_path(&self, path: &Path) -> Option<Arc<IndexedTree>>;
}

/// A parsed file: where it lives, its text and its syntax tree.
#[derive(Clone, Copy)]
pub struct SourceFile<'a> {
    pub uri: &'a str,
    pub content: &'a str,
    pub tree: &'a Tree,
}

/// Everything extraction needs for one file, built once per analysis run.
pub struct AnalysisContext<'a> {
    uri: &'a str,
    source: &'a str,
    tree: &'a Tree,
    settings: &'a ProjectSettings,
    classes: Option<&'a dyn ClassSource>,
    names: NameTable,
    /// Lower-cased FQN -> index of the file declaring it (or `None` when unresolvable).
    external: RefCell<FxHashMap<String, Option<Arc<IndexedTree>>>>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(file: SourceFile<'a>, settings: &'a ProjectSettings, classes: Option<&'a dyn ClassSource>) -> Self {
        let names = NameTable::build(file.tree.root_node(), file.content);
        Self {
            uri: file.uri,
            source: file.content,
            tree: file.tree,
            settings,
            classes,
            names,
            external: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn root(&self) -> Node<'a> {
        self.tree.root_node()
    }

    pub fn uri(&self) -> &str {
        self.uri
    }

    /// Derive a complete index from the tree.
    pub fn build_index(&self) -> IndexedTree {
        let root = self.root();
        let mut index = IndexedTree::default();

        self.extract_properties_in(root, &mut index.properties);
        sort_occurrences(&mut index.properties);
        self.infer_functions_in(root, &index.properties, &mut index.variables);

        let mut classes = self.extract_classes();
        self.expand_ancestors(&mut classes);
        index.classes = classes;

        self.apply_methods(&mut index);
        index.rebuild_types();
        index
    }

    /// Index of the file declaring `fqn`, memoized for the lifetime of this context.
    fn external_index(&self, fqn: &str) -> Option<Arc<IndexedTree>> {
        let key = fqn.trim_start_matches('\\').to_ascii_lowercase();
        if let Some(hit) = self.external.borrow().get(&key) {
            return hit.clone();
        }
        let loaded = self.load_external(fqn);
        self.external.borrow_mut().insert(key, loaded.clone());
        loaded
    }

    /// Index of the file declaring `fqn`. A class that sits in an already loaded
    /// file is found there, so siblings outside the autoload layout still resolve.
    pub(crate) fn declaring_index(&self, fqn: &str) -> Option<Arc<IndexedTree>> {
        let known = self
            .external
            .borrow()
            .values()
            .flatten()
            .find(|index| index.class_by_name(fqn).is_some())
            .cloned();
        known.or_else(|| self.external_index(fqn))
    }

    fn load_external(&self, fqn: &str) -> Option<Arc<IndexedTree>> {
        let source = self.classes?;
        let path = autoload::resolve(
            fqn,
            &self.settings.autoload,
            self.settings.workspace_root.as_deref(),
        )?;
        trace!(class = fqn, path = %path.display(), "loading external class");
        source.index_for_path(&path)
    }
}

/// Keep each occurrence vector ordered by line; same-line entries keep their insertion order.
pub(crate) fn sort_occurrences(map: &mut PropertyMap) {
    for occs in map.values_mut() {
        occs.sort_by_key(|o| o.line);
    }
}
