use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_MAX_DOCUMENTS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    pub debounce_ms: u64,
    pub max_documents: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_documents: DEFAULT_MAX_DOCUMENTS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct IndexerConfigSection {
    #[serde(default)]
    debounce_ms: Option<u64>,
    #[serde(default)]
    max_documents: Option<usize>,
}

impl IndexerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Merge a camelCase settings section (e.g. initialization options); unknown or invalid input is ignored.
    pub fn apply_json(&mut self, value: serde_json::Value) {
        let cfg = match serde_json::from_value::<IndexerConfigSection>(value) {
            Ok(cfg) => cfg,
            Err(err) => {
                debug!("ignoring indexer settings: {}", err);
                return;
            }
        };
        if let Some(v) = cfg.debounce_ms.filter(|v| *v > 0) {
            self.debounce_ms = v;
        }
        if let Some(v) = cfg.max_documents.filter(|v| *v > 0) {
            self.max_documents = v;
        }
    }
}
