use serde::Serialize;
use thiserror::Error;

use crate::graph::{ClassNode, GraphError, GraphStore, InterfaceNode, WriteOutcome};
use crate::model::{ClassRecord, ComId, SupportSet};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Failed to create ComClass {clsid}: {source}")]
    ClassNode {
        clsid: ComId,
        #[source]
        source: GraphError,
    },

    #[error("Failed to create ComInterface {iid} for {clsid}: {source}")]
    InterfaceNode {
        clsid: ComId,
        iid: ComId,
        #[source]
        source: GraphError,
    },

    #[error("Failed to merge implements edge {clsid} -> {iid}: {source}")]
    Edge {
        clsid: ComId,
        iid: ComId,
        #[source]
        source: GraphError,
    },
}

/// What a single class projection wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionReport {
    pub class_created: bool,
    pub interfaces_created: usize,
    pub interfaces_existing: usize,
    pub edges_created: usize,
    pub edges_existing: usize,
}

/// Maps a class and its verified interfaces onto graph writes.
///
/// Each write is independently idempotent; there is no enclosing transaction.
/// The first write error other than "already exists" abandons the remaining
/// writes for the class.
pub struct GraphProjector<'a> {
    pub store: &'a mut dyn GraphStore,
}

impl<'a> GraphProjector<'a> {
    pub fn new(store: &'a mut dyn GraphStore) -> Self {
        Self { store }
    }

    pub fn project(
        &mut self,
        class: &ClassRecord,
        supported: &SupportSet,
    ) -> Result<ProjectionReport, ProjectionError> {
        let mut report = ProjectionReport::default();
        let clsid = &class.id;

        let outcome = self
            .store
            .create_class(&ClassNode::from_record(class))
            .map_err(|source| ProjectionError::ClassNode { clsid: clsid.clone(), source })?;
        report.class_created = outcome.created();
        tracing::info!(clsid = %clsid, outcome = ?outcome, "ComClass node written");

        for iface in supported.iter() {
            let iid = &iface.id;
            match self.store.create_interface(&InterfaceNode::from_record(iface)).map_err(
                |source| ProjectionError::InterfaceNode {
                    clsid: clsid.clone(),
                    iid: iid.clone(),
                    source,
                },
            )? {
                WriteOutcome::Created => {
                    report.interfaces_created += 1;
                    tracing::info!(iid = %iid, "created ComInterface node");
                }
                WriteOutcome::AlreadyExists => report.interfaces_existing += 1,
            }

            match self.store.merge_implements(clsid, iid).map_err(|source| {
                ProjectionError::Edge { clsid: clsid.clone(), iid: iid.clone(), source }
            })? {
                WriteOutcome::Created => {
                    report.edges_created += 1;
                    tracing::info!(clsid = %clsid, iid = %iid, "created implements edge");
                }
                WriteOutcome::AlreadyExists => report.edges_existing += 1,
            }
        }

        Ok(report)
    }
}
