use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::debug;

/// Namespace prefix -> source directories (relative to the workspace root, or absolute).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Psr4Mapping {
    pub prefix: String,
    pub dirs: Vec<PathBuf>,
}

/// Project class-loading configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoloadConfig {
    pub psr4: Vec<Psr4Mapping>,
    /// Lower-cased FQN -> file; consulted before the PSR-4 prefixes.
    pub class_map: FxHashMap<String, PathBuf>,
}

/// Class-loading configuration plus the root its relative paths hang off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSettings {
    pub autoload: AutoloadConfig,
    pub workspace_root: Option<PathBuf>,
}

impl ProjectSettings {
    pub fn new(autoload: AutoloadConfig, workspace_root: Option<PathBuf>) -> Self {
        Self {
            autoload,
            workspace_root,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ComposerManifest {
    #[serde(default)]
    autoload: ComposerAutoload,
    #[serde(default, rename = "autoload-dev")]
    autoload_dev: ComposerAutoload,
}

#[derive(Debug, Deserialize, Default)]
struct ComposerAutoload {
    #[serde(default, rename = "psr-4")]
    psr4: FxHashMap<String, ComposerDirs>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ComposerDirs {
    One(String),
    Many(Vec<String>),
}

impl ComposerDirs {
    fn into_paths(self) -> Vec<PathBuf> {
        match self {
            ComposerDirs::One(d) => vec![PathBuf::from(d)],
            ComposerDirs::Many(ds) => ds.into_iter().map(PathBuf::from).collect(),
        }
    }
}

impl AutoloadConfig {
    pub fn with_psr4(mut self, prefix: &str, dir: impl Into<PathBuf>) -> Self {
        let prefix = normalize_prefix(prefix);
        match self.psr4.iter_mut().find(|m| m.prefix == prefix) {
            Some(m) => m.dirs.push(dir.into()),
            None => self.psr4.push(Psr4Mapping {
                prefix,
                dirs: vec![dir.into()],
            }),
        }
        self
    }

    pub fn with_class(mut self, fqn: &str, file: impl Into<PathBuf>) -> Self {
        self.class_map
            .insert(fqn.trim_start_matches('\\').to_ascii_lowercase(), file.into());
        self
    }

    /// Read `autoload.psr-4` and `autoload-dev.psr-4` from `<root>/composer.json`.
    pub fn from_composer(root: &Path) -> Result<Self> {
        let path = root.join("composer.json");
        let raw = std::fs::read_to_string(&path).with_context(|| format!("Failed to read '{}'", path.display()))?;
        Self::from_composer_str(&raw).with_context(|| format!("Malformed composer manifest '{}'", path.display()))
    }

    pub fn from_composer_str(raw: &str) -> Result<Self> {
        let manifest: ComposerManifest = serde_json::from_str(raw)?;
        let mut entries: Vec<(String, ComposerDirs)> = manifest
            .autoload
            .psr4
            .into_iter()
            .chain(manifest.autoload_dev.psr4)
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut config = AutoloadConfig::default();
        for (prefix, dirs) in entries {
            for dir in dirs.into_paths() {
                config = config.with_psr4(&prefix, dir);
            }
        }
        Ok(config)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('\\');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\\", trimmed)
    }
}

fn anchor(path: &Path, root: Option<&Path>) -> PathBuf {
    match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}

/// Locate the file declaring `fqn`: class map first, then PSR-4 prefixes, longest first.
pub fn resolve(fqn: &str, config: &AutoloadConfig, workspace_root: Option<&Path>) -> Option<PathBuf> {
    let fqn = fqn.trim_start_matches('\\');
    if fqn.is_empty() {
        return None;
    }

    if let Some(file) = config.class_map.get(&fqn.to_ascii_lowercase()) {
        let file = anchor(file, workspace_root);
        if file.is_file() {
            return Some(file);
        }
    }

    let mut mappings: Vec<&Psr4Mapping> = config.psr4.iter().collect();
    mappings.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

    for mapping in mappings {
        let Some(head) = fqn.get(..mapping.prefix.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(&mapping.prefix) {
            continue;
        }
        let relative = format!("{}.php", fqn[mapping.prefix.len()..].replace('\\', "/"));
        for dir in &mapping.dirs {
            let candidate = anchor(dir, workspace_root).join(&relative);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    debug!(class = fqn, "no autoload candidate on disk");
    None
}
