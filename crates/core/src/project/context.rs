use std::path::Path;

use anyhow::Result;

use crate::graph::GraphStore;
use crate::project::{load_mapper_config, open_graph_store, MapperConfig, MapperLayout};

/// Layout plus loaded config for a root.
#[derive(Debug, Clone)]
pub struct MapperContext {
    pub layout: MapperLayout,
    pub config: MapperConfig,
}

impl MapperContext {
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = MapperLayout::new(root);
        let config = load_mapper_config(&layout)?;
        Ok(Self { layout, config })
    }

    pub fn open_store(&self) -> Result<Box<dyn GraphStore>> {
        open_graph_store(&self.layout, &self.config.graph)
    }
}
