//! Identifier sources: where class and interface identifiers come from.
//!
//! The pipeline only needs two collections, so sources are a small trait.
//! Implementations:
//! - `InventorySource`: a JSON/YAML inventory file.
//! - `RegistrySource` (Windows only): the live registry.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::model::{ClassRecord, ComId, InterfaceRecord};

pub mod inventory;
#[cfg(windows)]
pub mod registry;

pub use inventory::{Inventory, InventorySource};
#[cfg(windows)]
pub use registry::RegistrySource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse inventory {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Registry error at {key}: {message}")]
    Registry { key: String, message: String },
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Supplies the classes and interfaces a run operates on.
pub trait IdentifierSource {
    /// All registered classes, without duplicate identifiers.
    fn classes(&self) -> SourceResult<Vec<ClassRecord>>;

    /// All registered interfaces. Duplicates across scopes are allowed.
    fn interfaces(&self) -> SourceResult<Vec<InterfaceRecord>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Accumulates classes from several registration scopes.
///
/// The first occurrence of a canonical id wins; later duplicates are
/// ignored, not merged.
#[derive(Debug, Default)]
pub struct ClassCatalog {
    seen: BTreeSet<ComId>,
    classes: Vec<ClassRecord>,
}

impl ClassCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the class was added.
    pub fn add(&mut self, class: ClassRecord) -> bool {
        if !self.seen.insert(class.id.clone()) {
            tracing::trace!(clsid = %class.id, "duplicate class registration ignored");
            return false;
        }
        tracing::debug!(clsid = %class.id, "class registered");
        self.classes.push(class);
        true
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn into_classes(self) -> Vec<ClassRecord> {
        self.classes
    }
}

impl Extend<ClassRecord> for ClassCatalog {
    fn extend<T: IntoIterator<Item = ClassRecord>>(&mut self, iter: T) {
        for class in iter {
            self.add(class);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_wins() {
        let mut catalog = ClassCatalog::new();
        catalog.add(
            ClassRecord::new("{11111111-0000-0000-0000-000000000000}")
                .with_name(Some("Native".into())),
        );
        let added = catalog.add(
            ClassRecord::new("{11111111-0000-0000-0000-000000000000}")
                .with_name(Some("Wow64".into())),
        );
        assert!(!added);

        let classes = catalog.into_classes();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name.as_deref(), Some("Native"));
    }

    #[test]
    fn dedup_uses_canonical_form() {
        let mut catalog = ClassCatalog::new();
        catalog.add(ClassRecord::new("{abcdef00-0000-0000-0000-000000000000}"));
        catalog.add(ClassRecord::new("{ABCDEF00-0000-0000-0000-000000000000}"));
        assert_eq!(catalog.len(), 1);
    }
}
