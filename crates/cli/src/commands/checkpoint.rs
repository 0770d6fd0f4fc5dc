use std::fs;

use anyhow::{Context, Result};
use commap_core::checkpoint::CheckpointFile;

use crate::commands::load_context;

/// Show (or clear) the run checkpoint.
pub fn checkpoint_command(root: &str, json: bool, clear: bool) -> Result<()> {
    let ctx = load_context(root)?;
    let path = &ctx.layout.checkpoint_path;

    if clear {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove checkpoint {}", path.display()))?;
        }
        println!("Checkpoint cleared.");
        return Ok(());
    }

    let state = CheckpointFile::load(path)
        .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let Some(state) = state else {
        println!("No checkpoint at {}", path.display());
        return Ok(());
    };
    println!("Checkpoint: {}", path.display());
    match &state.last_completed {
        Some(id) => println!("Last completed: {id}"),
        None => println!("Last completed: (none)"),
    }
    if let Some(id) = &state.in_flight {
        println!("In flight: {id} (the previous run died while probing this class)");
    }
    if let Some(at) = &state.updated_at {
        println!("Updated: {at}");
    }
    match state.resume_point() {
        Some(id) => println!("`run --resume` continues after {id}"),
        None => println!("`run --resume` starts from the first class"),
    }
    Ok(())
}
