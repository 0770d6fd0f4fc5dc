//! Graph persistence for verified class/interface relationships.
//!
//! The graph has three shapes:
//! - `ComClass` nodes keyed by `clsid`
//! - `ComInterface` nodes keyed by `iid`
//! - `implements` edges, at most one per (clsid, iid)
//!
//! Stores only ever create-if-absent. `WriteOutcome::AlreadyExists` is a
//! success, which is what makes reruns and resumes converge on the same graph.

use thiserror::Error;

use crate::model::{ClassRecord, ComId, InterfaceRecord};

pub mod memory;
#[cfg(feature = "neo4j")]
pub mod neo4j;
pub mod projector;
pub mod sqlite;

pub use memory::MemoryGraphStore;
#[cfg(feature = "neo4j")]
pub use neo4j::Neo4jHttpStore;
pub use projector::{GraphProjector, ProjectionError, ProjectionReport};
pub use sqlite::{GraphCounts, SqliteGraphStore};

/// Node property names, shared by every backend.
pub mod props {
    pub const CLSID: &str = "clsid";
    pub const IID: &str = "iid";
    pub const NAME: &str = "name";
    pub const INPROC_SERVER32: &str = "InProcServer32";
    pub const PROG_ID: &str = "ProgId";
    pub const INPROC_HANDLER32: &str = "InProcHandler32";
    pub const LOCAL_SERVER32: &str = "LocalServer32";
    pub const VERSION: &str = "version";
}

/// Result of a create-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    AlreadyExists,
}

impl WriteOutcome {
    pub fn created(self) -> bool {
        self == WriteOutcome::Created
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    /// The store could not be reached or answered with something unreadable.
    #[error("Graph store transport error: {0}")]
    Transport(String),

    /// The store understood the request and refused it.
    #[error("Graph store rejected statement ({code}): {message}")]
    Rejected { code: String, message: String },

    /// An edge was requested between nodes the store does not have.
    #[error("Cannot link {clsid} -> {iid}: endpoint node missing")]
    MissingEndpoint { clsid: ComId, iid: ComId },
}

pub type GraphResult<T> = Result<T, GraphError>;

/// `ComClass` node with its set-if-present properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNode {
    pub clsid: ComId,
    pub properties: Vec<(&'static str, String)>,
}

impl ClassNode {
    /// Build the node for a class. Absent metadata is omitted, never blanked.
    pub fn from_record(class: &ClassRecord) -> Self {
        let candidates = [
            (props::NAME, &class.name),
            (props::INPROC_SERVER32, &class.server.inproc_server32),
            (props::PROG_ID, &class.server.prog_id),
            (props::INPROC_HANDLER32, &class.server.inproc_handler32),
            (props::LOCAL_SERVER32, &class.server.local_server32),
            (props::VERSION, &class.server.version),
        ];
        let properties = candidates
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key, v.clone())))
            .collect();
        Self { clsid: class.id.clone(), properties }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }
}

/// `ComInterface` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceNode {
    pub iid: ComId,
    pub name: Option<String>,
}

impl InterfaceNode {
    pub fn from_record(iface: &InterfaceRecord) -> Self {
        Self { iid: iface.id.clone(), name: iface.name.clone() }
    }
}

/// A graph backend. Every mutation is create-if-absent.
pub trait GraphStore {
    fn create_class(&mut self, node: &ClassNode) -> GraphResult<WriteOutcome>;

    fn create_interface(&mut self, node: &InterfaceNode) -> GraphResult<WriteOutcome>;

    /// Create the `implements` edge unless it already exists. Both endpoint
    /// nodes must have been created first.
    fn merge_implements(&mut self, clsid: &ComId, iid: &ComId) -> GraphResult<WriteOutcome>;

    /// Create uniqueness constraints / tables. Only invoked on explicit request.
    fn ensure_schema(&mut self) -> GraphResult<()> {
        Ok(())
    }

    fn describe(&self) -> String;
}
