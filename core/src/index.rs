use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::syntax::SourceRange;

/// Property name (without `$`) -> observed types.
pub type PropertyMap = FxHashMap<String, Vec<TypeOccurrence>>;
/// Function scope key -> scope.
pub type VariableMap = FxHashMap<String, FunctionScope>;

/// One observed type for a symbol at a 1-based source line.
/// An empty `type_name` marks an untyped declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeOccurrence {
    #[serde(rename = "type")]
    pub type_name: String,
    pub line: usize,
}

impl TypeOccurrence {
    pub fn new(type_name: impl Into<String>, line: usize) -> Self {
        Self {
            type_name: type_name.into(),
            line,
        }
    }

    pub fn untyped(line: usize) -> Self {
        Self::new(String::new(), line)
    }

    pub fn is_untyped(&self) -> bool {
        self.type_name.is_empty()
    }
}

/// Types of the most recent occurrence line at or before `line`.
///
/// All occurrences sharing that line are returned (union types); untyped ones are skipped,
/// so a later untyped assignment hides earlier types.
pub fn type_names_at_or_before(occurrences: &[TypeOccurrence], line: usize) -> Vec<String> {
    let Some(latest) = occurrences.iter().filter(|o| o.line <= line).map(|o| o.line).max() else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for occ in occurrences.iter().filter(|o| o.line == latest && !o.is_untyped()) {
        if !out.contains(&occ.type_name) {
            out.push(occ.type_name.clone());
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionScope {
    pub variables: FxHashMap<String, Vec<TypeOccurrence>>,
    pub start_line: usize,
    pub end_line: usize,
}

impl FunctionScope {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            variables: FxHashMap::default(),
            start_line,
            end_line,
        }
    }

    pub fn type_names_at_or_before(&self, name: &str, line: usize) -> Vec<String> {
        self.variables
            .get(name.trim_start_matches('$'))
            .map(|occs| type_names_at_or_before(occs, line))
            .unwrap_or_default()
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub(crate) fn record(&mut self, name: &str, types: &[String], line: usize) {
        let entry = self.variables.entry(name.to_string()).or_default();
        if types.is_empty() {
            entry.push(TypeOccurrence::untyped(line));
        } else {
            entry.extend(types.iter().map(|t| TypeOccurrence::new(t.clone(), line)));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub namespace: String,
    pub fully_qualified_name: String,
    /// Direct parents right after extraction; the complete ancestor chain
    /// (breadth-first, nearest first) once expanded.
    pub extends: Vec<String>,
    /// Direct parents from the `extends` clause, resolved to FQNs.
    #[serde(default)]
    pub parents: Vec<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte_offset: usize,
}

impl ClassInfo {
    pub fn extends_class(&self, fqn: &str) -> bool {
        self.extends.iter().any(|e| e.eq_ignore_ascii_case(fqn))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub source_uri: String,
    /// `ClassName::method` for methods, the bare name for functions.
    pub name: String,
    pub declaration_range: SourceRange,
    pub parameter_list_range: SourceRange,
    pub body_range: Option<SourceRange>,
}

impl FunctionInfo {
    /// The part after `::`, or the whole name for plain functions.
    pub fn short_name(&self) -> &str {
        self.name.rsplit("::").next().unwrap_or(&self.name)
    }

    /// The `ClassName` prefix, if any.
    pub fn owner(&self) -> Option<&str> {
        self.name.rsplit_once("::").map(|(owner, _)| owner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Property,
    Variable,
}

/// Inverse index entry: where a type name was observed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeReference {
    pub kind: SymbolKind,
    /// Function scope key for variables, `None` for properties.
    pub scope: Option<String>,
    pub symbol: String,
    pub line: usize,
}

/// Semantic summary of one file. Immutable once published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedTree {
    pub properties: PropertyMap,
    pub variables: VariableMap,
    /// Derived from `properties` and `variables`; rebuilt by [`IndexedTree::rebuild_types`].
    pub types: FxHashMap<String, Vec<TypeReference>>,
    pub classes: BTreeMap<usize, ClassInfo>,
    pub public_functions: Vec<FunctionInfo>,
    pub protected_functions: Vec<FunctionInfo>,
    pub private_functions: Vec<FunctionInfo>,
}

impl IndexedTree {
    pub fn property_types(&self, name: &str) -> &[TypeOccurrence] {
        self.properties
            .get(name.trim_start_matches('$'))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Scope by key; a bare method name also matches `Class::name` when unambiguous.
    pub fn function_scope(&self, key: &str) -> Option<&FunctionScope> {
        if let Some(scope) = self.variables.get(key) {
            return Some(scope);
        }
        if key.contains("::") {
            return None;
        }
        let suffix = format!("::{}", key);
        let mut matches = self.variables.iter().filter(|(k, _)| k.ends_with(&suffix));
        match (matches.next(), matches.next()) {
            (Some((_, scope)), None) => Some(scope),
            _ => None,
        }
    }

    /// Innermost scope covering `line`.
    pub fn scope_at_line(&self, line: usize) -> Option<(&str, &FunctionScope)> {
        self.variables
            .iter()
            .filter(|(_, s)| s.contains_line(line))
            .min_by_key(|(k, s)| (s.end_line - s.start_line, k.as_str()))
            .map(|(k, s)| (k.as_str(), s))
    }

    pub fn class_by_name(&self, fqn: &str) -> Option<&ClassInfo> {
        let fqn = fqn.trim_start_matches('\\');
        self.classes
            .values()
            .find(|c| c.fully_qualified_name.eq_ignore_ascii_case(fqn))
    }

    pub fn class_at_line(&self, line: usize) -> Option<&ClassInfo> {
        self.classes
            .values()
            .filter(|c| c.start_line <= line && line <= c.end_line)
            .min_by_key(|c| c.end_line - c.start_line)
    }

    /// All visibility buckets, public first.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.public_functions
            .iter()
            .chain(self.protected_functions.iter())
            .chain(self.private_functions.iter())
    }

    /// Recompute the inverse type index from properties and variables.
    pub fn rebuild_types(&mut self) {
        let mut types: FxHashMap<String, Vec<TypeReference>> = FxHashMap::default();
        for (name, occs) in &self.properties {
            for occ in occs.iter().filter(|o| !o.is_untyped()) {
                types.entry(occ.type_name.clone()).or_default().push(TypeReference {
                    kind: SymbolKind::Property,
                    scope: None,
                    symbol: name.clone(),
                    line: occ.line,
                });
            }
        }
        for (scope_key, scope) in &self.variables {
            for (name, occs) in &scope.variables {
                for occ in occs.iter().filter(|o| !o.is_untyped()) {
                    types.entry(occ.type_name.clone()).or_default().push(TypeReference {
                        kind: SymbolKind::Variable,
                        scope: Some(scope_key.clone()),
                        symbol: name.clone(),
                        line: occ.line,
                    });
                }
            }
        }
        for refs in types.values_mut() {
            refs.sort();
            refs.dedup();
        }
        self.types = types;
    }
}
