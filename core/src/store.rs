use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace};
use url::Url;

use crate::analysis::ClassSource;
use crate::autoload::{AutoloadConfig, ProjectSettings};
use crate::config::IndexerConfig;
use crate::document::{Document, DocumentOptions};
use crate::index::IndexedTree;

thread_local! {
    /// Paths being loaded on this thread; guards against inheritance cycles across files.
    static LOADING: RefCell<Vec<PathBuf>> = const { RefCell::new(Vec::new()) };
}

struct LoadGuard;

impl LoadGuard {
    fn enter(path: &Path) -> Option<LoadGuard> {
        LOADING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|p| p == path) {
                return None;
            }
            stack.push(path.to_path_buf());
            Some(LoadGuard)
        })
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        LOADING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

struct Entry {
    doc: Arc<Document>,
    open: bool,
    last_access: u64,
}

#[derive(Default)]
struct StoreInner {
    entries: FxHashMap<PathBuf, Entry>,
    tick: u64,
}

impl StoreInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Drop least-recently-used unpinned entries until within `capacity`.
    fn evict(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            let victim = self
                .entries
                .iter()
                .filter(|(_, e)| !e.open)
                .min_by_key(|(_, e)| e.last_access)
                .map(|(path, _)| path.clone());
            let Some(victim) = victim else {
                trace!(len = self.entries.len(), capacity, "store over capacity, all entries pinned");
                return;
            };
            self.entries.remove(&victim);
            debug!(path = %victim.display(), "evicted document");
        }
    }
}

/// Bounded cache of documents keyed by path. Open documents are pinned; the
/// rest are loaded from disk on demand and evicted least-recently-used first.
pub struct DocumentStore {
    inner: Mutex<StoreInner>,
    settings: RwLock<Arc<ProjectSettings>>,
    config: IndexerConfig,
    this: Weak<DocumentStore>,
}

impl DocumentStore {
    pub fn new(config: IndexerConfig, settings: ProjectSettings) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            inner: Mutex::new(StoreInner::default()),
            settings: RwLock::new(Arc::new(settings)),
            config,
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn settings(&self) -> Arc<ProjectSettings> {
        Arc::clone(&*self.settings.read())
    }

    /// A fresh document wired to this store's settings and class lookups; not cached yet.
    pub fn create_document(&self, path: &Path) -> Arc<Document> {
        let path = normalize_path(path);
        let source: Arc<dyn ClassSource> = Arc::new(StoreClassSource {
            store: self.this.clone(),
        });
        let options = DocumentOptions::new(file_uri(&path))
            .with_debounce(self.config.debounce())
            .with_settings(self.settings())
            .with_class_source(source);
        Document::new(options)
    }

    /// Pin `document` under `path`, replacing any cached entry.
    pub fn register_open(&self, path: &Path, document: Arc<Document>) {
        let path = normalize_path(path);
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        inner.entries.insert(
            path.clone(),
            Entry {
                doc: document,
                open: true,
                last_access: tick,
            },
        );
        inner.evict(self.config.max_documents);
        trace!(path = %path.display(), "document registered open");
    }

    /// Open `path` with editor-supplied content: reuse or create, analyze, pin.
    pub fn open(&self, path: &Path, content: String) -> Arc<Document> {
        let key = normalize_path(path);
        let existing = self.inner.lock().entries.get(&key).map(|e| Arc::clone(&e.doc));
        let doc = existing.unwrap_or_else(|| self.create_document(&key));
        self.register_open(&key, Arc::clone(&doc));
        doc.update(content, None);
        doc
    }

    /// Unpin; the document stays cached until evicted.
    pub fn close(&self, path: &Path) {
        let path = normalize_path(path);
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(&path) {
            entry.open = false;
        }
        inner.evict(self.config.max_documents);
    }

    /// Cached document for `path`, loading and analyzing it from disk when absent.
    pub fn get(&self, path: &Path) -> Option<Arc<Document>> {
        let path = normalize_path(path);
        {
            let mut inner = self.inner.lock();
            let tick = inner.next_tick();
            if let Some(entry) = inner.entries.get_mut(&path) {
                entry.last_access = tick;
                return Some(Arc::clone(&entry.doc));
            }
        }

        let Some(_guard) = LoadGuard::enter(&path) else {
            debug!(path = %path.display(), "cyclic load, skipping");
            return None;
        };
        let loaded = match self.load(&path) {
            Ok(doc) => doc,
            Err(err) => {
                debug!("{:#}", err);
                return None;
            }
        };

        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        if let Some(entry) = inner.entries.get_mut(&path) {
            // Lost the race; keep the entry that made it in first.
            entry.last_access = tick;
            return Some(Arc::clone(&entry.doc));
        }
        inner.entries.insert(
            path.clone(),
            Entry {
                doc: Arc::clone(&loaded),
                open: false,
                last_access: tick,
            },
        );
        inner.evict(self.config.max_documents);
        Some(loaded)
    }

    fn load(&self, path: &Path) -> Result<Arc<Document>> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to load '{}'", path.display()))?;
        let doc = self.create_document(path);
        doc.update(content, None);
        info!(path = %path.display(), "loaded document from disk");
        Ok(doc)
    }

    /// Replace the class-loading configuration and hand it to every cached document.
    pub fn configure(&self, autoload: AutoloadConfig, workspace_root: Option<PathBuf>) {
        let settings = Arc::new(ProjectSettings::new(autoload, workspace_root));
        *self.settings.write() = Arc::clone(&settings);
        let docs: Vec<Arc<Document>> = self
            .inner
            .lock()
            .entries
            .values()
            .map(|e| Arc::clone(&e.doc))
            .collect();
        for doc in docs {
            doc.configure(Arc::clone(&settings));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.inner.lock().entries.contains_key(&normalize_path(path))
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .entries
            .get(&normalize_path(path))
            .is_some_and(|e| e.open)
    }
}

/// Resolves external classes through the store that owns the document.
struct StoreClassSource {
    store: Weak<DocumentStore>,
}

impl ClassSource for StoreClassSource {
    fn index_for_path(&self, path: &Path) -> Option<Arc<IndexedTree>> {
        let store = self.store.upgrade()?;
        store.get(path).map(|doc| doc.index())
    }
}

/// Lexically resolve `.` and `..` so equivalent spellings share one entry.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn file_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| path.display().to_string())
}
