use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{ClassRecord, InterfaceRecord};
use crate::source::{ClassCatalog, IdentifierSource, SourceError, SourceResult};

/// Snapshot of a host's registered classes and interfaces.
///
/// Written by `export-inventory` so long runs (and their resumes) can work
/// from a fixed input instead of re-reading a registry that may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceRecord>,
}

impl Inventory {
    /// Capture everything a source currently reports.
    pub fn capture(source: &dyn IdentifierSource) -> SourceResult<Self> {
        Ok(Self { classes: source.classes()?, interfaces: source.interfaces()? })
    }

    /// Load an inventory (YAML or JSON based on extension).
    pub fn load(path: &Path) -> SourceResult<Self> {
        let bytes = fs::read(path)
            .map_err(|source| SourceError::Io { path: path.display().to_string(), source })?;
        let parse_err =
            |message: String| SourceError::Parse { path: path.display().to_string(), message };
        if is_json(path) {
            serde_json::from_slice(&bytes).map_err(|e| parse_err(e.to_string()))
        } else {
            serde_yaml::from_slice(&bytes).map_err(|e| parse_err(e.to_string()))
        }
    }

    /// Write the inventory (YAML or JSON based on extension).
    pub fn save(&self, path: &Path) -> SourceResult<()> {
        let parse_err =
            |message: String| SourceError::Parse { path: path.display().to_string(), message };
        let body = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| parse_err(e.to_string()))?
        } else {
            serde_yaml::to_string(self).map_err(|e| parse_err(e.to_string()))?
        };
        fs::write(path, body)
            .map_err(|source| SourceError::Io { path: path.display().to_string(), source })
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("json"))
        == Some(true)
}

/// Identifier source backed by an inventory file.
#[derive(Debug)]
pub struct InventorySource {
    path: PathBuf,
    inventory: Inventory,
}

impl InventorySource {
    pub fn open(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let inventory = Inventory::load(&path)?;
        Ok(Self { path, inventory })
    }

    pub fn from_inventory(inventory: Inventory) -> Self {
        Self { path: PathBuf::from("<memory>"), inventory }
    }
}

impl IdentifierSource for InventorySource {
    fn classes(&self) -> SourceResult<Vec<ClassRecord>> {
        let mut catalog = ClassCatalog::new();
        catalog.extend(self.inventory.classes.iter().cloned());
        Ok(catalog.into_classes())
    }

    fn interfaces(&self) -> SourceResult<Vec<InterfaceRecord>> {
        Ok(self.inventory.interfaces.clone())
    }

    fn describe(&self) -> String {
        format!("inventory {}", self.path.display())
    }
}
