//! commap-core
//!
//! Core library for empirical COM class/interface discovery.
//!
//! This crate defines the identifier model, identifier sources (registry and
//! inventory files), capability probing (in-process and supervised
//! subprocess), graph projection with SQLite and Neo4j stores, and the
//! resumable driver loop that ties them together.
//!
//! All substantive logic lives here so it is testable without a Windows host;
//! the CLI only wires configuration and platform-specific pieces together.

pub mod checkpoint;
pub mod graph;
pub mod model;
pub mod pipeline;
pub mod probe;
pub mod project;
pub mod source;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
