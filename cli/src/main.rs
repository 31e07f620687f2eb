use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use phidx_core::{AutoloadConfig, Document, DocumentStore, IndexedTree, IndexerConfig, ProjectSettings};
use serde::Serialize;
use tracing::{debug, warn};


static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "phidx_core=info,phidx_cli=info";

#[derive(Debug, Parser)]
#[command(name = "phidx", author, version, about = "Index PHP sources and query the result", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,

    /// Indexer settings as a JSON object, e.g. `{"maxDocuments": 200}`
    #[arg(long, global = true, value_name = "JSON")]
    config: Option<String>,
}

#[derive(Debug, Args)]
struct Target {
    /// PHP source file to index
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Workspace root; its composer.json drives class loading
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the semantic index of a file as JSON.
    Index {
        #[command(flatten)]
        target: Target,
        /// Single-line output
        #[arg(long)]
        compact: bool,
    },
    /// Print every class with its expanded ancestor chain.
    Ancestors {
        #[command(flatten)]
        target: Target,
    },
    /// Print the types a variable holds at a line of a function.
    Var {
        #[command(flatten)]
        target: Target,
        /// Scope key: `Class::method`, a bare method or function name, or `anonymous@LINE`
        #[arg(long)]
        function: String,
        /// Variable name, with or without `$`
        #[arg(long)]
        name: String,
        /// 1-based line to look up at
        #[arg(long)]
        line: usize,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct VarTypes {
    function: String,
    name: String,
    line: usize,
    types: Vec<String>,
}

fn filter_expr_from(raw: Option<String>) -> Option<String> {
    raw.map(|r| r.trim().to_string()).filter(|r| !r.is_empty())
}

fn init_tracing() {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(std::env::var("PHIDX_LOG").ok())
            .or_else(|| filter_expr_from(std::env::var("RUST_LOG").ok()));

        let builder = fmt().with_writer(std::io::stderr);
        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };
        let _ = builder.try_init();
    });
}

fn indexer_config(raw: Option<&str>) -> anyhow::Result<IndexerConfig> {
    let mut config = IndexerConfig::default();
    if let Some(raw) = raw {
        let value: serde_json::Value = serde_json::from_str(raw).context("Invalid --config JSON")?;
        config.apply_json(value);
    }
    Ok(config)
}

/// Class-loading settings for `root`. A missing composer.json means no autoload
/// rules; a broken one is reported and ignored.
fn project_settings(root: Option<&Path>) -> anyhow::Result<ProjectSettings> {
    let Some(root) = root else {
        return Ok(ProjectSettings::default());
    };
    let root = std::path::absolute(root).with_context(|| format!("Invalid root '{}'", root.display()))?;
    let autoload = if root.join("composer.json").is_file() {
        AutoloadConfig::from_composer(&root).unwrap_or_else(|err| {
            warn!("{:#}", err);
            AutoloadConfig::default()
        })
    } else {
        debug!(root = %root.display(), "no composer.json, autoload disabled");
        AutoloadConfig::default()
    };
    Ok(ProjectSettings::new(autoload, Some(root)))
}

fn open_target(target: &Target, config: IndexerConfig) -> anyhow::Result<(Arc<DocumentStore>, Arc<Document>)> {
    let settings = project_settings(target.root.as_deref())?;
    let path = std::path::absolute(&target.file)
        .with_context(|| format!("Invalid file path '{}'", target.file.display()))?;
    let content =
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read file '{}'", path.display()))?;
    let store = DocumentStore::new(config, settings);
    let doc = store.open(&path, content);
    Ok((store, doc))
}

fn format_ancestors(index: &IndexedTree) -> String {
    let mut out = String::new();
    for class in index.classes.values() {
        out.push_str(&class.fully_qualified_name);
        out.push(':');
        if !class.extends.is_empty() {
            out.push(' ');
            out.push_str(&class.extends.join(", "));
        }
        out.push('\n');
    }
    out
}

fn var_types(index: &IndexedTree, function: &str, name: &str, line: usize) -> anyhow::Result<VarTypes> {
    let scope = index
        .function_scope(function)
        .ok_or_else(|| anyhow!("No function scope '{}'", function))?;
    Ok(VarTypes {
        function: function.to_string(),
        name: name.trim_start_matches('$').to_string(),
        line,
        types: scope.type_names_at_or_before(name, line),
    })
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let CliArgs { command, config } = CliArgs::parse();
    let config = indexer_config(config.as_deref())?;

    match command {
        Commands::Index { target, compact } => {
            let (_store, doc) = open_target(&target, config)?;
            let index = doc.index();
            let json = if compact {
                serde_json::to_string(&*index)?
            } else {
                serde_json::to_string_pretty(&*index)?
            };
            println!("{}", json);
        }
        Commands::Ancestors { target } => {
            let (_store, doc) = open_target(&target, config)?;
            print!("{}", format_ancestors(&doc.index()));
        }
        Commands::Var {
            target,
            function,
            name,
            line,
            json,
        } => {
            let (_store, doc) = open_target(&target, config)?;
            let result = var_types(&doc.index(), &function, &name, line)?;
            if json {
                println!("{}", serde_json::to_string(&result)?);
            } else {
                println!("{}", result.types.join("|"));
            }
        }
    }
    Ok(())
}
