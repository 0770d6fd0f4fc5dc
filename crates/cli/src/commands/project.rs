use std::fs;

use anyhow::{bail, Context, Result};
use commap_core::project::{save_mapper_config, MapperConfig, MapperLayout, Neo4jConfig};

use crate::canonicalize_or_current;

/// Options accepted by `init`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Write into Neo4j at this URL instead of the embedded SQLite graph.
    pub neo4j_url: Option<String>,
    pub neo4j_user: Option<String>,
    pub neo4j_database: Option<String>,
    pub isolate: bool,
    pub force: bool,
}

/// Initialize a mapper workspace at `root`.
pub fn init_command(root: &str, options: InitOptions) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = MapperLayout::new(&root_path);

    if layout.config_path.exists() && !options.force {
        bail!(
            "Config already exists at {} (use --force to overwrite)",
            layout.config_path.display()
        );
    }
    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;

    let mut config = match &options.neo4j_url {
        Some(url) => {
            let mut neo = Neo4jConfig::new(url);
            if let Some(user) = &options.neo4j_user {
                neo.user = user.clone();
            }
            if let Some(database) = &options.neo4j_database {
                neo.database = database.clone();
            }
            MapperConfig::neo4j(neo)
        }
        None => MapperConfig::sqlite(layout.graph_db_relative_string()),
    };
    config.probe.isolate = options.isolate;
    save_mapper_config(&layout, &config)?;

    println!("Initialized COM mapper workspace:");
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.config_path.display());
    println!("  Graph backend: {}", config.graph.kind());
    println!("  Isolated probing: {}", config.probe.isolate);
    Ok(())
}
