use std::path::Path;

use anyhow::Result;
use commap_core::model::ComId;
use commap_core::probe::ProbeReply;

/// Probe a single class and print the reply as one JSON line.
///
/// This is the worker half of isolated runs; the supervisor parses stdout.
/// Failures are reported inside the reply, so the exit code stays zero
/// whenever a reply was printed.
pub fn probe_class_command(clsid: &str, interfaces: &Path) -> Result<()> {
    let reply = probe_class(clsid, interfaces);
    println!("{}", serde_json::to_string(&reply)?);
    Ok(())
}

#[cfg(windows)]
fn probe_class(clsid: &str, interfaces: &Path) -> ProbeReply {
    use commap_core::probe::{probe_worker, ComActivator};

    match ComActivator::new() {
        Ok(activator) => probe_worker(activator, clsid, interfaces),
        Err(e) => ProbeReply::WorkerError {
            clsid: ComId::new(clsid),
            message: format!("failed to initialize COM: {e}"),
        },
    }
}

#[cfg(not(windows))]
fn probe_class(clsid: &str, _interfaces: &Path) -> ProbeReply {
    ProbeReply::WorkerError {
        clsid: ComId::new(clsid),
        message: crate::commands::unsupported_platform("Class activation").to_string(),
    }
}
