use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{ClassNode, GraphError, GraphResult, GraphStore, InterfaceNode, WriteOutcome};
use crate::model::ComId;

/// In-memory graph store.
///
/// Backs `--dry-run` runs (nothing is persisted, the summary still reports
/// what would have been written) and the pipeline tests.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    classes: BTreeMap<ComId, ClassNode>,
    interfaces: BTreeMap<ComId, InterfaceNode>,
    edges: BTreeSet<(ComId, ComId)>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(&self, clsid: &ComId) -> Option<&ClassNode> {
        self.classes.get(clsid)
    }

    pub fn interface(&self, iid: &ComId) -> Option<&InterfaceNode> {
        self.interfaces.get(iid)
    }

    pub fn has_edge(&self, clsid: &ComId, iid: &ComId) -> bool {
        self.edges.contains(&(clsid.clone(), iid.clone()))
    }

    pub fn edges(&self) -> impl Iterator<Item = &(ComId, ComId)> {
        self.edges.iter()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl GraphStore for MemoryGraphStore {
    fn create_class(&mut self, node: &ClassNode) -> GraphResult<WriteOutcome> {
        if self.classes.contains_key(&node.clsid) {
            return Ok(WriteOutcome::AlreadyExists);
        }
        self.classes.insert(node.clsid.clone(), node.clone());
        Ok(WriteOutcome::Created)
    }

    fn create_interface(&mut self, node: &InterfaceNode) -> GraphResult<WriteOutcome> {
        if self.interfaces.contains_key(&node.iid) {
            return Ok(WriteOutcome::AlreadyExists);
        }
        self.interfaces.insert(node.iid.clone(), node.clone());
        Ok(WriteOutcome::Created)
    }

    fn merge_implements(&mut self, clsid: &ComId, iid: &ComId) -> GraphResult<WriteOutcome> {
        if !self.classes.contains_key(clsid) || !self.interfaces.contains_key(iid) {
            return Err(GraphError::MissingEndpoint { clsid: clsid.clone(), iid: iid.clone() });
        }
        if self.edges.insert((clsid.clone(), iid.clone())) {
            Ok(WriteOutcome::Created)
        } else {
            Ok(WriteOutcome::AlreadyExists)
        }
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
