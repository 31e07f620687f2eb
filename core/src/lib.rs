//! Incremental semantic indexing of PHP sources: per-file type and class
//! extraction, debounced re-analysis and a bounded cache of analyzed files.

pub mod analysis;
pub mod analyzer;
pub mod autoload;
pub mod config;
pub mod document;
pub mod index;
pub mod store;
pub mod syntax;
pub mod text;

pub use analysis::{AnalysisContext, ClassSource, SourceFile};
pub use analyzer::{StaticAnalyzer, UpdateMode};
pub use autoload::{resolve, AutoloadConfig, ProjectSettings, Psr4Mapping};
pub use config::IndexerConfig;
pub use document::{Document, DocumentOptions, DocumentView, NodeAt};
pub use index::{ClassInfo, FunctionInfo, FunctionScope, IndexedTree, SymbolKind, TypeOccurrence, TypeReference};
pub use store::DocumentStore;
pub use syntax::{ByteRange, Point, SourceRange, TextEdit};
pub use text::Position;

#[cfg(test)]
mod analyzer_test;
#[cfg(test)]
mod document_test;
#[cfg(test)]
mod store_test;
