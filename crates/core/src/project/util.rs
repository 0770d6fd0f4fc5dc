use anyhow::{Context, Result};

use crate::graph::{GraphStore, MemoryGraphStore, SqliteGraphStore};
use crate::project::{GraphBackendConfig, MapperConfig, MapperLayout};

/// Load the config JSON from disk for a given layout.
pub fn load_mapper_config(layout: &MapperLayout) -> Result<MapperConfig> {
    let config_json = std::fs::read_to_string(&layout.config_path).with_context(|| {
        format!("Failed to read mapper config at {}", layout.config_path.display())
    })?;
    let config: MapperConfig =
        serde_json::from_str(&config_json).context("Failed to parse mapper config JSON")?;
    Ok(config)
}

/// Write the config JSON, creating the metadata directory if needed.
pub fn save_mapper_config(layout: &MapperLayout, config: &MapperConfig) -> Result<()> {
    std::fs::create_dir_all(&layout.meta_dir).with_context(|| {
        format!("Failed to create metadata dir {}", layout.meta_dir.display())
    })?;
    let json = serde_json::to_string_pretty(config).context("Failed to serialize mapper config")?;
    std::fs::write(&layout.config_path, json).with_context(|| {
        format!("Failed to write mapper config to {}", layout.config_path.display())
    })?;
    Ok(())
}

/// Open the configured graph store.
///
/// Relative SQLite paths resolve against the layout root.
pub fn open_graph_store(
    layout: &MapperLayout,
    backend: &GraphBackendConfig,
) -> Result<Box<dyn GraphStore>> {
    match backend {
        GraphBackendConfig::Sqlite { path } => {
            let db_path = layout.resolve(path);
            let store = SqliteGraphStore::open(&db_path).with_context(|| {
                format!("Failed to open graph database at {}", db_path.display())
            })?;
            Ok(Box::new(store))
        }
        #[cfg(feature = "neo4j")]
        GraphBackendConfig::Neo4j(neo) => {
            Ok(Box::new(crate::graph::Neo4jHttpStore::new(neo.clone().with_env_password())))
        }
        #[cfg(not(feature = "neo4j"))]
        GraphBackendConfig::Neo4j(_) => {
            anyhow::bail!("Neo4j backend requested but commap-core was built without the `neo4j` feature")
        }
        GraphBackendConfig::Memory => Ok(Box::new(MemoryGraphStore::new())),
    }
}
