use std::path::Path;

use anyhow::{Context, Result};
use commap_core::source::Inventory;

use crate::commands::registry_source;

/// Snapshot the registry into an inventory file (JSON or YAML by extension).
pub fn export_inventory_command(out: &Path) -> Result<()> {
    let source = registry_source()?;
    let inventory = Inventory::capture(source.as_ref()).context("Failed to read the registry")?;
    inventory.save(out).with_context(|| format!("Failed to write {}", out.display()))?;

    println!(
        "Exported {} classes and {} interfaces to {}",
        inventory.classes.len(),
        inventory.interfaces.len(),
        out.display()
    );
    Ok(())
}
