use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashSet;
use tracing::debug;
use tree_sitter::Node;

use crate::analysis::{sort_occurrences, AnalysisContext};
use crate::index::{IndexedTree, PropertyMap, TypeOccurrence};
use crate::syntax::{collect_nodes, end_line, is_class_like, is_function_like, start_line, ByteRange};

/// How the last index was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Full,
    Incremental,
}

/// Smallest re-indexable unit containing an edit.
enum Container<'t> {
    Property(Node<'t>),
    Function(Node<'t>),
    Class(Node<'t>),
    Rebuild(&'static str),
}

fn container_of(node: Node<'_>) -> Container<'_> {
    let mut current = Some(node);
    while let Some(n) = current {
        match n.kind() {
            "property_declaration" => return Container::Property(n),
            k if is_function_like(k) => return Container::Function(n),
            k if is_class_like(k) => return Container::Class(n),
            "namespace_definition" | "namespace_use_declaration" => {
                return Container::Rebuild("namespace or import changed");
            }
            "program" => return Container::Rebuild("edit outside any declaration"),
            _ => {}
        }
        current = n.parent();
    }
    Container::Rebuild("edit outside the tree")
}

/// Turns a tree plus dirty ranges into an [`IndexedTree`], reusing the previous
/// result when the edits are confined to declarations it can re-derive in place.
#[derive(Debug, Default)]
pub struct StaticAnalyzer {
    index: Arc<IndexedTree>,
    built: bool,
    last_mode: Option<UpdateMode>,
}

impl StaticAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> Arc<IndexedTree> {
        Arc::clone(&self.index)
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn last_mode(&self) -> Option<UpdateMode> {
        self.last_mode
    }

    /// Forget the previous result so the next update is a full build.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Re-index after an edit. Empty `dirty` (or no previous result) means a full build.
    pub fn update(&mut self, ctx: &AnalysisContext<'_>, dirty: &[ByteRange]) -> Arc<IndexedTree> {
        let started = Instant::now();
        let incremental = if self.built && !dirty.is_empty() {
            self.incremental(ctx, dirty)
        } else {
            None
        };
        let (index, mode) = match incremental {
            Some(index) => (index, UpdateMode::Incremental),
            None => (self.full(ctx), UpdateMode::Full),
        };

        debug!(
            uri = ctx.uri(),
            mode = ?mode,
            ranges = dirty.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "index updated"
        );
        self.index = Arc::new(index);
        self.built = true;
        self.last_mode = Some(mode);
        Arc::clone(&self.index)
    }

    fn full(&mut self, ctx: &AnalysisContext<'_>) -> IndexedTree {
        ctx.build_index()
    }

    fn incremental(&mut self, ctx: &AnalysisContext<'_>, dirty: &[ByteRange]) -> Option<IndexedTree> {
        let root = ctx.root();
        let mut next = (*self.index).clone();
        let mut visited: FxHashSet<(&'static str, usize)> = FxHashSet::default();
        let mut properties_changed = false;

        for range in dirty {
            let end = range.end.min(root.end_byte());
            let start = range.start.min(end);
            let Some(node) = root.descendant_for_byte_range(start, end) else {
                debug!(%range, "no node for dirty range, rebuilding");
                return None;
            };
            let container = container_of(node);
            match container {
                Container::Rebuild(reason) => {
                    debug!(%range, reason, "incremental update not possible");
                    return None;
                }
                Container::Property(decl) => {
                    if visited.insert((decl.kind(), decl.start_byte())) {
                        properties_changed |= refresh_properties(ctx, decl, &mut next.properties);
                    }
                }
                Container::Function(func) => {
                    if visited.insert((func.kind(), func.start_byte())) {
                        // Constructor-promoted properties live in the parameter list.
                        if let Some(params) = func.child_by_field_name("parameters") {
                            properties_changed |= refresh_properties(ctx, params, &mut next.properties);
                        }
                        refresh_scopes(ctx, func, &mut next);
                    }
                }
                Container::Class(class) => {
                    if visited.insert((class.kind(), class.start_byte())) {
                        properties_changed |= refresh_properties(ctx, class, &mut next.properties);
                        refresh_scopes(ctx, class, &mut next);
                    }
                }
            }
        }

        if properties_changed {
            next.variables.clear();
            ctx.infer_functions_in(root, &next.properties, &mut next.variables);
        }

        next.classes = ctx.refresh_classes(&self.index.classes);
        ctx.apply_methods(&mut next);
        next.rebuild_types();
        Some(next)
    }
}

/// Drop every occurrence recorded on lines `start..=end`, returning what was removed.
fn prune_lines(map: &mut PropertyMap, start: usize, end: usize) -> Vec<(String, TypeOccurrence)> {
    let mut removed = Vec::new();
    for (name, occs) in map.iter_mut() {
        occs.retain(|o| {
            let inside = start <= o.line && o.line <= end;
            if inside {
                removed.push((name.clone(), o.clone()));
            }
            !inside
        });
    }
    map.retain(|_, occs| !occs.is_empty());
    removed
}

fn finish_refresh(
    map: &mut PropertyMap,
    removed: Vec<(String, TypeOccurrence)>,
    fresh: PropertyMap,
) -> bool {
    let mut added: Vec<(String, TypeOccurrence)> = fresh
        .iter()
        .flat_map(|(name, occs)| occs.iter().map(move |o| (name.clone(), o.clone())))
        .collect();
    for (name, occs) in fresh {
        map.entry(name).or_default().extend(occs);
    }
    sort_occurrences(map);

    let mut before = removed;
    let key = |e: &(String, TypeOccurrence)| (e.0.clone(), e.1.line, e.1.type_name.clone());
    before.sort_by_key(key);
    added.sort_by_key(key);
    before != added
}

/// Re-derive every property occurrence recorded on `node`'s lines. Other
/// declarations sharing those lines are re-extracted too, so the result matches a
/// full build no matter how declarations are laid out.
fn refresh_properties(ctx: &AnalysisContext<'_>, node: Node<'_>, map: &mut PropertyMap) -> bool {
    let (start, end) = (start_line(node), end_line(node));
    let removed = prune_lines(map, start, end);
    let mut fresh = PropertyMap::default();
    let producers = collect_nodes(ctx.root(), |k| {
        k == "property_declaration" || k == "property_promotion_parameter"
    });
    for decl in producers {
        let line = start_line(decl);
        if line < start || line > end {
            continue;
        }
        match decl.kind() {
            "property_declaration" => ctx.extract_property_declaration(decl, &mut fresh),
            _ => ctx.extract_promoted_property(decl, &mut fresh),
        }
    }
    finish_refresh(map, removed, fresh)
}

/// Re-infer every function scope lying within `node`'s lines.
fn refresh_scopes(ctx: &AnalysisContext<'_>, node: Node<'_>, index: &mut IndexedTree) {
    let (start, end) = (start_line(node), end_line(node));
    index
        .variables
        .retain(|_, scope| !(start <= scope.start_line && scope.end_line <= end));

    // Any function sharing those lines was pruned too, wherever it is declared.
    let IndexedTree {
        properties, variables, ..
    } = index;
    for func in collect_nodes(ctx.root(), is_function_like) {
        if start <= start_line(func) && end_line(func) <= end {
            let (key, scope) = ctx.infer_function(func, properties);
            variables.insert(key, scope);
        }
    }
}
