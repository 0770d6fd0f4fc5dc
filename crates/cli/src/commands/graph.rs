use anyhow::{bail, Context, Result};
use commap_core::graph::{GraphCounts, SqliteGraphStore};
use commap_core::project::GraphBackendConfig;
use serde::Serialize;

use crate::commands::{load_context, print_file_status};

#[derive(Serialize)]
pub struct GraphInfoSnapshot {
    pub backend: String,
    pub path: String,
    pub counts: GraphCounts,
}

/// Create tables / uniqueness constraints in the configured store.
pub fn init_graph_command(root: &str) -> Result<()> {
    let ctx = load_context(root)?;
    let mut store = ctx.open_store()?;
    store.ensure_schema().with_context(|| format!("Failed to prepare {}", store.describe()))?;
    println!("Graph schema ready: {}", store.describe());
    Ok(())
}

/// Node and edge counts for the SQLite backend.
pub fn graph_info_command(root: &str, json: bool) -> Result<()> {
    let ctx = load_context(root)?;
    let path = match &ctx.config.graph {
        GraphBackendConfig::Sqlite { path } => ctx.layout.resolve(path),
        other => bail!("graph-info only reads the sqlite backend (configured: {})", other.kind()),
    };

    let store = SqliteGraphStore::open(&path)
        .with_context(|| format!("Failed to open graph database at {}", path.display()))?;
    let counts = store.counts().context("Failed to count graph entities")?;

    if json {
        let snapshot = GraphInfoSnapshot {
            backend: "sqlite".to_string(),
            path: path.display().to_string(),
            counts,
        };
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("COM Graph Info");
    println!("==============");
    print_file_status("Database", &path);
    println!("ComClass nodes: {}", counts.classes);
    println!("ComInterface nodes: {}", counts.interfaces);
    println!("implements edges: {}", counts.edges);
    Ok(())
}
