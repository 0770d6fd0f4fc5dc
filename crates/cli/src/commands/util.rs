use std::path::Path;

use anyhow::{anyhow, Context, Result};
use commap_core::project::MapperContext;
use commap_core::source::{IdentifierSource, InventorySource};

use crate::canonicalize_or_current;

/// Load the mapper context for `root`.
pub fn load_context(root: &str) -> Result<MapperContext> {
    let root_path = canonicalize_or_current(root)?;
    MapperContext::from_root(&root_path)
}

/// Helper to print whether a file exists.
pub fn print_file_status(label: &str, path: &Path) {
    let exists = path.is_file();
    println!("- {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}

/// Error for features that only exist where COM does.
pub fn unsupported_platform(what: &str) -> anyhow::Error {
    anyhow!("{what} requires Windows (COM and the registry are not available on this platform)")
}

/// Identifier source: the given inventory file, else the live registry.
pub fn open_source(inventory: Option<&Path>) -> Result<Box<dyn IdentifierSource>> {
    match inventory {
        Some(path) => {
            let source = InventorySource::open(path)
                .with_context(|| format!("Failed to load inventory {}", path.display()))?;
            Ok(Box::new(source))
        }
        None => registry_source(),
    }
}

#[cfg(windows)]
pub fn registry_source() -> Result<Box<dyn IdentifierSource>> {
    Ok(Box::new(commap_core::source::RegistrySource::new()))
}

#[cfg(not(windows))]
pub fn registry_source() -> Result<Box<dyn IdentifierSource>> {
    Err(unsupported_platform("Reading the COM registry (pass --inventory FILE instead)"))
}
