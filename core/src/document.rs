use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use ropey::Rope;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};
use tree_sitter::{Node, Parser, Tree};
use twox_hash::XxHash64;

use crate::analysis::{AnalysisContext, ClassSource, SourceFile};
use crate::analyzer::{StaticAnalyzer, UpdateMode};
use crate::autoload::ProjectSettings;
use crate::config::DEFAULT_DEBOUNCE_MS;
use crate::index::IndexedTree;
use crate::syntax::{php_parser, ByteRange, TextEdit};
use crate::text::{position_to_byte, Position};

pub(crate) fn content_hash(content: &str) -> u64 {
    let mut hasher = XxHash64::default();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Pending edit regions since the last analysis, in current-content coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DirtyRanges {
    ranges: Vec<ByteRange>,
    /// An edit added or removed lines; line-keyed data can no longer be patched.
    reflow: bool,
}

impl DirtyRanges {
    pub(crate) fn record(&mut self, edit: &TextEdit) {
        let delta = edit.byte_delta();
        let shift = |offset: usize| (offset as isize + delta).max(0) as usize;

        for range in &mut self.ranges {
            if range.end < edit.start_byte {
                continue;
            }
            if range.start >= edit.old_end_byte {
                *range = ByteRange::new(shift(range.start), shift(range.end));
                continue;
            }
            let end = if range.end > edit.old_end_byte {
                shift(range.end)
            } else {
                edit.new_end_byte
            };
            *range = ByteRange::new(range.start.min(edit.start_byte), end.max(edit.new_end_byte));
        }
        self.ranges.push(edit.dirty_range());
        self.reflow |= edit.changes_line_count();
        self.coalesce();
    }

    fn coalesce(&mut self) {
        self.ranges.sort();
        let mut merged: Vec<ByteRange> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if last.touches(&range) => *last = last.union(&range),
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    pub(crate) fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ranges.is_empty() && !self.reflow
    }

    pub(crate) fn needs_full_rebuild(&self) -> bool {
        self.reflow
    }

    /// Ranges for the analyzer; an empty list requests a full rebuild.
    fn take(&mut self) -> Vec<ByteRange> {
        let taken = std::mem::take(self);
        if taken.needs_full_rebuild() {
            Vec::new()
        } else {
            taken.ranges
        }
    }
}

struct DocumentState {
    tree: Option<Tree>,
    content: String,
    rope: Rope,
    content_hash: u64,
    index: Arc<IndexedTree>,
    version: u64,
    dirty: DirtyRanges,
}

/// How a [`Document`] is wired: its identity, debounce interval and class lookups.
#[derive(Clone)]
pub struct DocumentOptions {
    pub uri: String,
    pub debounce: Duration,
    pub settings: Arc<ProjectSettings>,
    pub class_source: Option<Arc<dyn ClassSource>>,
}

impl DocumentOptions {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            settings: Arc::new(ProjectSettings::default()),
            class_source: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_settings(mut self, settings: Arc<ProjectSettings>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_class_source(mut self, source: Arc<dyn ClassSource>) -> Self {
        self.class_source = Some(source);
        self
    }
}

/// Borrowed view handed to [`Document::read`] callbacks.
pub struct DocumentView<'d> {
    pub tree: Option<&'d Tree>,
    pub content: &'d str,
    pub index: &'d IndexedTree,
    pub version: u64,
}

/// Owned snapshot returned by [`Document::get_node_at`].
#[derive(Clone)]
pub struct NodeAt {
    pub tree: Tree,
    pub offset: usize,
    pub content: String,
    pub index: Arc<IndexedTree>,
}

impl NodeAt {
    /// Smallest named node covering `offset`, resolved against the snapshot tree.
    pub fn node(&self) -> Option<Node<'_>> {
        self.tree
            .root_node()
            .named_descendant_for_byte_range(self.offset, self.offset)
    }

    pub fn node_text(&self) -> Option<&str> {
        let node = self.node()?;
        self.content.get(node.start_byte()..node.end_byte())
    }
}

struct AnalysisSnapshot {
    tree: Tree,
    content: String,
    version: u64,
    dirty: Vec<ByteRange>,
}

/// One source file: its tree, content and analyzer, with debounced re-analysis.
pub struct Document {
    uri: String,
    debounce: Duration,
    class_source: Option<Arc<dyn ClassSource>>,
    settings: RwLock<Arc<ProjectSettings>>,
    state: RwLock<DocumentState>,
    parser: Mutex<Option<Parser>>,
    analyzer: Mutex<StaticAnalyzer>,
    pending: Mutex<Option<JoinHandle<()>>>,
    analysis_runs: AtomicU64,
}

impl Document {
    pub fn new(options: DocumentOptions) -> Arc<Self> {
        Arc::new(Self {
            uri: options.uri,
            debounce: options.debounce,
            class_source: options.class_source,
            settings: RwLock::new(options.settings),
            state: RwLock::new(DocumentState {
                tree: None,
                content: String::new(),
                rope: Rope::new(),
                content_hash: content_hash(""),
                index: Arc::new(IndexedTree::default()),
                version: 0,
                dirty: DirtyRanges::default(),
            }),
            parser: Mutex::new(None),
            analyzer: Mutex::new(StaticAnalyzer::new()),
            pending: Mutex::new(None),
            analysis_runs: AtomicU64::new(0),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Apply new content. `edit == None` replaces the whole document and analyzes
    /// before returning; a partial edit marks its range dirty and (re)arms the debounce.
    pub fn update(self: &Arc<Self>, content: String, edit: Option<TextEdit>) {
        let mut parser_slot = self.parser.lock();
        let hash = content_hash(&content);

        let old_tree = {
            let state = self.state.read();
            if edit.is_none() && state.tree.is_some() && state.dirty.is_empty() && state.content_hash == hash {
                trace!(uri = %self.uri, "content unchanged, skipping update");
                return;
            }
            state.tree.clone()
        };

        if parser_slot.is_none() {
            match php_parser() {
                Ok(p) => *parser_slot = Some(p),
                Err(err) => {
                    warn!(uri = %self.uri, "cannot create parser: {:#}", err);
                    return;
                }
            }
        }
        let Some(parser) = parser_slot.as_mut() else {
            return;
        };

        let base = match (&edit, old_tree) {
            (Some(edit), Some(mut tree)) => {
                tree.edit(&edit.to_input_edit());
                Some(tree)
            }
            _ => None,
        };
        let Some(tree) = parser.parse(&content, base.as_ref()) else {
            warn!(uri = %self.uri, "parse failed, keeping previous tree");
            return;
        };

        let version = {
            let mut state = self.state.write();
            state.rope = Rope::from_str(&content);
            state.content = content;
            state.content_hash = hash;
            state.tree = Some(tree);
            state.version += 1;
            match &edit {
                Some(edit) => state.dirty.record(edit),
                None => state.dirty = DirtyRanges::default(),
            }
            state.version
        };
        drop(parser_slot);

        match edit {
            None => {
                self.cancel_pending();
                self.analyze_now(None);
            }
            Some(_) => self.schedule(version),
        }
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }

    fn schedule(self: &Arc<Self>, version: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            trace!(uri = %self.uri, "no async runtime, analyzing edit inline");
            self.analyze_now(Some(version));
            return;
        };
        let doc = Arc::clone(self);
        let delay = self.debounce;
        let handle = runtime.spawn(async move {
            sleep(delay).await;
            let worker = Arc::clone(&doc);
            if let Err(err) = tokio::task::spawn_blocking(move || worker.analyze_now(Some(version))).await {
                debug!(uri = %doc.uri, "debounced analysis did not complete: {}", err);
            }
        });
        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Analyze the current tree. With `expected` set, a document that moved past
    /// that version is left alone, and results are only published if it still matches.
    fn analyze_now(&self, expected: Option<u64>) {
        let mut analyzer = self.analyzer.lock();
        let Some(snapshot) = self.snapshot(expected) else {
            trace!(uri = %self.uri, "analysis superseded before it started");
            return;
        };

        let settings = Arc::clone(&*self.settings.read());
        let file = SourceFile {
            uri: &self.uri,
            content: &snapshot.content,
            tree: &snapshot.tree,
        };
        let ctx = AnalysisContext::new(file, &settings, self.class_source.as_deref());
        let index = analyzer.update(&ctx, &snapshot.dirty);
        drop(ctx);

        let mut state = self.state.write();
        if state.version != snapshot.version {
            debug!(
                uri = %self.uri,
                analyzed = snapshot.version,
                current = state.version,
                "discarding stale analysis"
            );
            return;
        }
        state.index = index;
        self.analysis_runs.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self, expected: Option<u64>) -> Option<AnalysisSnapshot> {
        let mut state = self.state.write();
        if expected.is_some_and(|v| v != state.version) {
            return None;
        }
        let tree = state.tree.clone()?;
        let dirty = state.dirty.take();
        Some(AnalysisSnapshot {
            tree,
            content: state.content.clone(),
            version: state.version,
            dirty,
        })
    }

    /// Run `f` against the current tree, content and index under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(DocumentView<'_>) -> R) -> R {
        let state = self.state.read();
        f(DocumentView {
            tree: state.tree.as_ref(),
            content: &state.content,
            index: &state.index,
            version: state.version,
        })
    }

    /// Node under an editor position, with a copy of the content and the index snapshot.
    pub fn get_node_at(&self, position: Position) -> Option<NodeAt> {
        let state = self.state.read();
        let tree = state.tree.clone()?;
        let offset = position_to_byte(&state.rope, position);
        Some(NodeAt {
            tree,
            offset,
            content: state.content.clone(),
            index: Arc::clone(&state.index),
        })
    }

    pub fn index(&self) -> Arc<IndexedTree> {
        Arc::clone(&self.state.read().index)
    }

    pub fn content(&self) -> String {
        self.state.read().content.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    pub fn has_tree(&self) -> bool {
        self.state.read().tree.is_some()
    }

    /// True while partial edits wait for the debounce to fire.
    pub fn is_dirty(&self) -> bool {
        !self.state.read().dirty.is_empty()
    }

    /// Number of analysis results published so far.
    pub fn analysis_runs(&self) -> u64 {
        self.analysis_runs.load(Ordering::SeqCst)
    }

    pub fn last_update_mode(&self) -> Option<UpdateMode> {
        self.analyzer.lock().last_mode()
    }

    pub fn settings(&self) -> Arc<ProjectSettings> {
        Arc::clone(&*self.settings.read())
    }

    /// Swap the class-loading configuration used by later analyses.
    pub fn configure(&self, settings: Arc<ProjectSettings>) {
        *self.settings.write() = settings;
    }

    /// Cancel the pending debounce and release the tree.
    pub fn close(&self) {
        self.cancel_pending();
        let mut state = self.state.write();
        state.tree = None;
        state.dirty = DirtyRanges::default();
        state.version += 1;
        drop(state);
        self.analyzer.lock().reset();
        debug!(uri = %self.uri, "document closed");
    }
}
