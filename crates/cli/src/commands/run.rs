use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use commap_core::checkpoint::CheckpointFile;
use commap_core::graph::{GraphStore, MemoryGraphStore};
use commap_core::pipeline::{Driver, RunOptions, RunSummary};
use commap_core::probe::{CapabilityProber, SubprocessProber};
use commap_core::project::MapperContext;
use commap_core::source::IdentifierSource;

use crate::commands::{load_context, open_source};

/// Arguments for `run`, after clap parsing.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub root: String,
    /// Skip every class whose id sorts at or before this one.
    pub start: Option<String>,
    /// Take the start point from the checkpoint file.
    pub resume: bool,
    pub inventory: Option<PathBuf>,
    /// Force subprocess probing regardless of config.
    pub isolate: bool,
    pub timeout_secs: Option<u64>,
    /// Probe without persisting anything.
    pub dry_run: bool,
    pub json: bool,
}

pub fn run_command(args: RunArgs) -> Result<()> {
    if args.start.is_some() && args.resume {
        bail!("--start and --resume are mutually exclusive");
    }
    let ctx = load_context(&args.root)?;
    let options = resolve_run_options(&ctx, args.start.as_deref(), args.resume)?;
    let source = open_source(args.inventory.as_deref())?;

    let mut store: Box<dyn GraphStore> =
        if args.dry_run { Box::new(MemoryGraphStore::new()) } else { ctx.open_store()? };
    let mut checkpoint = if args.dry_run {
        None
    } else {
        Some(CheckpointFile::open(&ctx.layout.checkpoint_path).with_context(|| {
            format!("Failed to open checkpoint {}", ctx.layout.checkpoint_path.display())
        })?)
    };

    let isolate = args.isolate || ctx.config.probe.isolate;
    let timeout = Duration::from_secs(args.timeout_secs.unwrap_or(ctx.config.probe.timeout_secs));
    let run = RunParts {
        source: source.as_ref(),
        store: store.as_mut(),
        checkpoint: checkpoint.as_mut(),
        options: &options,
    };

    let summary = if isolate {
        let exe = std::env::current_exe().context("Failed to locate the commap executable")?;
        let mut prober = SubprocessProber::new(
            exe,
            vec!["probe-class".to_string()],
            ctx.layout.interfaces_path.clone(),
            timeout,
        );
        run.drive(&mut prober)?
    } else {
        run_in_process(run)?
    };

    print_summary(&summary, args.json)
}

/// Work out where the run starts.
pub fn resolve_run_options(
    ctx: &MapperContext,
    start: Option<&str>,
    resume: bool,
) -> Result<RunOptions> {
    if let Some(start) = start {
        return Ok(RunOptions::resume_after(start));
    }
    if !resume {
        return Ok(RunOptions::default());
    }

    let state = CheckpointFile::load(&ctx.layout.checkpoint_path).with_context(|| {
        format!("Failed to read checkpoint {}", ctx.layout.checkpoint_path.display())
    })?;
    match state {
        Some(state) => {
            if let Some(culprit) = &state.in_flight {
                tracing::warn!(clsid = %culprit, "previous run died while probing this class; skipping it");
            }
            Ok(RunOptions { start_after: state.resume_point().cloned() })
        }
        None => {
            tracing::warn!("no checkpoint found; starting from the first class");
            Ok(RunOptions::default())
        }
    }
}

/// Everything a run needs besides the prober.
struct RunParts<'a> {
    source: &'a dyn IdentifierSource,
    store: &'a mut dyn GraphStore,
    checkpoint: Option<&'a mut CheckpointFile>,
    options: &'a RunOptions,
}

impl<'a> RunParts<'a> {
    fn drive(self, prober: &mut dyn CapabilityProber) -> Result<RunSummary> {
        let mut driver = Driver::new(prober, self.store);
        if let Some(checkpoint) = self.checkpoint {
            driver = driver.with_checkpoint(checkpoint);
        }
        let summary = driver.run(self.source, self.options).context("Run aborted")?;
        Ok(summary)
    }
}

#[cfg(windows)]
fn run_in_process(run: RunParts<'_>) -> Result<RunSummary> {
    use commap_core::probe::{ComActivator, InProcessProber};

    // The activator holds the COM apartment for the whole run.
    let mut prober = InProcessProber::new(ComActivator::new().context("Failed to set up COM activation")?);
    run.drive(&mut prober)
}

#[cfg(not(windows))]
fn run_in_process(_run: RunParts<'_>) -> Result<RunSummary> {
    Err(crate::commands::unsupported_platform("In-process probing (use --isolate to exercise the worker path)"))
}

pub fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("COM mapper run");
    println!("==============");
    println!("Source: {}", summary.source);
    println!("Prober: {}", summary.prober);
    println!("Store: {}", summary.store);
    if let Some(start) = &summary.resumed_after {
        println!("Resumed after: {start}");
    }
    println!(
        "Classes: {} total, {} skipped before resume, {} visited",
        summary.total_classes, summary.skipped_before_resume, summary.visited
    );
    println!("Interfaces: {} candidates", summary.total_interfaces);
    println!("Projected: {} ({} with no supported interfaces)", summary.projected, summary.empty);
    if summary.failures() > 0 {
        println!("Failures:");
        for (label, count) in [
            ("malformed identifier", summary.malformed),
            ("not activatable", summary.not_activatable),
            ("instantiation failed", summary.instantiation_failed),
            ("worker crashed", summary.crashed),
            ("worker timed out", summary.timed_out),
            ("worker error", summary.worker_errors),
            ("projection failed", summary.projection_failed),
        ] {
            if count > 0 {
                println!("- {label}: {count}");
            }
        }
    }
    println!(
        "Writes: {} classes, {} interfaces, {} edges created ({} edges already present)",
        summary.classes_created,
        summary.interfaces_created,
        summary.edges_created,
        summary.edges_existing
    );
    Ok(())
}
