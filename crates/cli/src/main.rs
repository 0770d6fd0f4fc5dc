use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commap::commands::{
    checkpoint_command, export_inventory_command, graph_info_command, init_command,
    init_graph_command, probe_class_command, run_command, InitOptions, RunArgs,
};
use commap::init_tracing;

/// Empirical COM class/interface mapper.
///
/// This CLI is a thin wrapper around `commap-core` (exposed in code as
/// `commap_core`). All substantive logic lives in the library.
#[derive(Parser, Debug)]
#[command(
    name = "commap",
    version,
    about = "Map which COM interfaces each registered class really implements",
    long_about = None
)]
struct Cli {
    /// More log output (repeatable). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a mapper workspace (`.commap/config.json`) at the given root.
    Init {
        /// Workspace root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Persist into Neo4j at this HTTP URL instead of the embedded SQLite graph.
        #[arg(long)]
        neo4j_url: Option<String>,

        #[arg(long, requires = "neo4j_url")]
        neo4j_user: Option<String>,

        #[arg(long, requires = "neo4j_url")]
        neo4j_database: Option<String>,

        /// Probe each class in a supervised child process by default.
        #[arg(long, default_value_t = false)]
        isolate: bool,

        /// Overwrite an existing config.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Enumerate classes, probe them, and persist verified `implements` edges.
    Run {
        /// Workspace root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Skip every class whose identifier sorts at or before this one.
        #[arg(long, conflicts_with = "resume")]
        start: Option<String>,

        /// Continue after the class recorded in the checkpoint file.
        #[arg(long, default_value_t = false)]
        resume: bool,

        /// Read identifiers from an inventory file instead of the registry.
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Probe each class in a supervised child process.
        #[arg(long, default_value_t = false)]
        isolate: bool,

        /// Kill an isolated probe after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Probe and report without writing to the graph or checkpoint.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Emit the run summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Probe a single class and print a JSON reply (used by isolated runs).
    ProbeClass {
        #[arg(long)]
        clsid: String,

        /// JSON interface list written by the supervising run.
        #[arg(long)]
        interfaces: PathBuf,
    },

    /// Write the registry's classes and interfaces to an inventory file.
    ExportInventory {
        /// Output path; `.json` writes JSON, anything else YAML.
        #[arg(long)]
        out: PathBuf,
    },

    /// Create tables or uniqueness constraints in the configured graph store.
    InitGraph {
        #[arg(long, default_value = ".")]
        root: String,
    },

    /// Show node and edge counts of the SQLite graph.
    GraphInfo {
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the run checkpoint.
    Checkpoint {
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Delete the checkpoint so the next `--resume` starts over.
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Init { root, neo4j_url, neo4j_user, neo4j_database, isolate, force } => {
            init_command(
                &root,
                InitOptions { neo4j_url, neo4j_user, neo4j_database, isolate, force },
            )?
        }
        Command::Run { root, start, resume, inventory, isolate, timeout_secs, dry_run, json } => {
            run_command(RunArgs {
                root,
                start,
                resume,
                inventory,
                isolate,
                timeout_secs,
                dry_run,
                json,
            })?
        }
        Command::ProbeClass { clsid, interfaces } => probe_class_command(&clsid, &interfaces)?,
        Command::ExportInventory { out } => export_inventory_command(&out)?,
        Command::InitGraph { root } => init_graph_command(&root)?,
        Command::GraphInfo { root, json } => graph_info_command(&root, json)?,
        Command::Checkpoint { root, json, clear } => checkpoint_command(&root, json, clear)?,
    }

    Ok(())
}
