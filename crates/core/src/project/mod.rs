//! Mapper workspace: on-disk layout, config file, and store wiring.
//!
//! - `MapperLayout`: computed paths under `.commap/`.
//! - `MapperConfig`: serializable graph backend and probe settings.
//! - `MapperContext`: layout + config loaded for a root.

pub mod config;
pub mod context;
pub mod layout;
pub mod util;

pub use config::{GraphBackendConfig, MapperConfig, Neo4jConfig, ProbeSettings, NEO4J_PASSWORD_ENV};
pub use context::MapperContext;
pub use layout::MapperLayout;
pub use util::{load_mapper_config, open_graph_store, save_mapper_config};
