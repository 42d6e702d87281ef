//! `apb`: command line front end for the archival photo batch pipeline.
//!
//! A thin shim over `apb_core`. Batches are tracked in a registry file,
//! per-batch settings live in `<batch>/config/batch.toml`, and `run`
//! drives the pipeline on a worker thread while the main thread renders
//! progress.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use apb_core::config::{ConfigSection, ConfigStore};
use apb_core::logging::{init_tracing, LogConfig, LogLevel};
use apb_core::models::{Batch, BatchLayout, StatusFilter, STEP_COUNT};
use apb_core::orchestrator::{PipelineOrchestrator, PipelineRunResult, ProgressCallback, RunRequest};
use apb_core::registry::BatchRegistry;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(name = "apb", version, about = "Archival photo batch pipeline")]
struct Cli {
    /// Registry file (defaults to the per-user data directory)
    #[arg(long, global = true, env = "APB_REGISTRY")]
    registry: Option<PathBuf>,

    /// Console log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "APB_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage registered batches
    Batch {
        #[command(subcommand)]
        command: BatchCommand,
    },
    /// Inspect or edit a batch's settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Run pipeline steps for a batch
    Run(RunArgs),
    /// Show the next pending step of a batch
    Next {
        batch_id: String,
    },
}

#[derive(Subcommand)]
enum BatchCommand {
    /// Register a new batch rooted at DIRECTORY
    Create {
        name: String,
        directory: PathBuf,
        /// Catalog spreadsheet to stage in step 1
        #[arg(long)]
        spreadsheet: Option<PathBuf>,
        /// Directory of scanned TIFFs to stage in step 1
        #[arg(long)]
        tiff_dir: Option<PathBuf>,
    },
    /// List batches
    List {
        #[arg(long, value_enum, default_value_t = ListFilter::Active)]
        status: ListFilter,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one batch and its step states
    Show {
        batch_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Mark a batch complete
    Complete { batch_id: String },
    /// Archive a batch
    Archive { batch_id: String },
    /// Return an archived batch to active
    Reactivate { batch_id: String },
    /// Remove a batch from the registry (files are left in place)
    Remove { batch_id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the batch's settings file
    Show { batch_id: String },
    /// Set the spreadsheet and TIFF sources staged by step 1
    SetInputs {
        batch_id: String,
        #[arg(long)]
        spreadsheet: Option<PathBuf>,
        #[arg(long)]
        tiff_dir: Option<PathBuf>,
    },
    /// Set one value by dotted key, e.g. `resize.max_dimension 1600`
    Set {
        batch_id: String,
        key: String,
        value: String,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    batch_id: String,
    /// First step to run (1-8)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    from: Option<u8>,
    /// Last step to run (1-8)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    to: Option<u8>,
    /// Validate inputs of the planned steps without executing them
    #[arg(long)]
    dry_run: bool,
    /// Re-run steps already marked complete
    #[arg(long)]
    force: bool,
    /// Write every tool line to the batch log
    #[arg(short, long)]
    verbose: bool,
    /// Print the run result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListFilter {
    Active,
    Archived,
    All,
}

impl From<ListFilter> for StatusFilter {
    fn from(value: ListFilter) -> Self {
        match value {
            ListFilter::Active => StatusFilter::Active,
            ListFilter::Archived => StatusFilter::Archived,
            ListFilter::All => StatusFilter::All,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = LogLevel::parse(&cli.log)
        .with_context(|| format!("unknown log level '{}'", cli.log))?;
    init_tracing(level);

    let registry_path = match cli.registry {
        Some(path) => path,
        None => default_registry_path()?,
    };
    let registry = Arc::new(BatchRegistry::open(registry_path));

    match cli.command {
        Commands::Batch { command } => batch_command(&registry, command),
        Commands::Config { command } => config_command(&registry, command),
        Commands::Run(args) => run_command(registry, args),
        Commands::Next { batch_id } => {
            let batch = registry.get(&batch_id)?;
            let orchestrator = PipelineOrchestrator::new(Arc::clone(&registry));
            match orchestrator.get_next_pending_step(&batch.id)? {
                Some(step) => {
                    let name = step_name(&orchestrator, step);
                    println!("{}: next step is {} ({})", batch.name, step, name);
                }
                None => println!("{}: every step is complete", batch.name),
            }
            Ok(())
        }
    }
}

fn default_registry_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "apb", "apb")
        .context("could not determine a data directory; pass --registry")?;
    Ok(dirs.data_dir().join("registry.json"))
}

fn batch_command(registry: &Arc<BatchRegistry>, command: BatchCommand) -> Result<()> {
    match command {
        BatchCommand::Create {
            name,
            directory,
            spreadsheet,
            tiff_dir,
        } => {
            let layout = BatchLayout::new(&directory);
            layout
                .ensure_dirs()
                .with_context(|| format!("creating batch directories under {}", directory.display()))?;

            let id = registry.register(&name, &directory)?;
            let mut store = ConfigStore::for_layout(&layout);
            store
                .load_or_create()
                .with_context(|| format!("writing {}", store.path().display()))?;
            if spreadsheet.is_some() || tiff_dir.is_some() {
                set_inputs(&mut store, spreadsheet.as_deref(), tiff_dir.as_deref())?;
            }

            println!("Created batch '{}' ({})", name, id);
            println!("  root:   {}", directory.display());
            println!("  config: {}", store.path().display());
            Ok(())
        }
        BatchCommand::List { status, json } => {
            let batches = registry.list(status.into())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&batches)?);
                return Ok(());
            }
            if batches.is_empty() {
                println!("No batches.");
                return Ok(());
            }
            for batch in &batches {
                println!(
                    "{}  {:<9}  {}/{}  {}  {}",
                    batch.id,
                    batch.status.as_str(),
                    batch.completed_count(),
                    STEP_COUNT,
                    batch.last_accessed.format("%Y-%m-%d %H:%M"),
                    batch.name
                );
            }
            Ok(())
        }
        BatchCommand::Show { batch_id, json } => {
            let batch = registry.get(&batch_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&batch)?);
            } else {
                print_batch(registry, &batch);
            }
            Ok(())
        }
        BatchCommand::Complete { batch_id } => {
            let batch = registry.mark_complete(&batch_id)?;
            println!("Batch '{}' marked {}", batch.name, batch.status);
            Ok(())
        }
        BatchCommand::Archive { batch_id } => {
            let batch = registry.archive(&batch_id)?;
            println!("Batch '{}' archived", batch.name);
            Ok(())
        }
        BatchCommand::Reactivate { batch_id } => {
            let batch = registry.reactivate(&batch_id)?;
            println!("Batch '{}' is {} again", batch.name, batch.status);
            Ok(())
        }
        BatchCommand::Remove { batch_id } => {
            let batch = registry.remove(&batch_id)?;
            println!(
                "Removed batch '{}' from the registry; files under {} were not touched",
                batch.name,
                batch.root.display()
            );
            Ok(())
        }
    }
}

fn print_batch(registry: &Arc<BatchRegistry>, batch: &Batch) {
    println!("{} ({})", batch.name, batch.id);
    println!("  root:          {}", batch.root.display());
    println!("  status:        {}", batch.status);
    println!("  created:       {}", batch.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  last accessed: {}", batch.last_accessed.format("%Y-%m-%d %H:%M:%S"));

    let orchestrator = PipelineOrchestrator::new(Arc::clone(registry));
    for (step, name) in orchestrator.step_names() {
        let status = batch.steps.get(&step);
        let mark = match status {
            Some(s) if s.completed => match s.completed_at {
                Some(at) => format!("done {}", at.format("%Y-%m-%d %H:%M")),
                None => "done".to_string(),
            },
            _ => "pending".to_string(),
        };
        println!("  {}. {:<18} {}", step, name, mark);
    }
}

fn config_command(registry: &BatchRegistry, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show { batch_id } => {
            let mut store = batch_config(registry, &batch_id)?;
            store.load_or_create()?;
            let content = std::fs::read_to_string(store.path())
                .with_context(|| format!("reading {}", store.path().display()))?;
            println!("# {}", store.path().display());
            print!("{}", content);
            Ok(())
        }
        ConfigCommand::SetInputs {
            batch_id,
            spreadsheet,
            tiff_dir,
        } => {
            if spreadsheet.is_none() && tiff_dir.is_none() {
                bail!("nothing to set; pass --spreadsheet and/or --tiff-dir");
            }
            let mut store = batch_config(registry, &batch_id)?;
            set_inputs(&mut store, spreadsheet.as_deref(), tiff_dir.as_deref())?;
            println!("Updated inputs in {}", store.path().display());
            Ok(())
        }
        ConfigCommand::Set {
            batch_id,
            key,
            value,
        } => {
            let mut store = batch_config(registry, &batch_id)?;
            store
                .set_value(&key, &value)
                .with_context(|| format!("setting {}", key))?;
            println!("{} = {}", key, value);
            Ok(())
        }
    }
}

fn batch_config(registry: &BatchRegistry, batch_id: &str) -> Result<ConfigStore> {
    let batch = registry.get(batch_id)?;
    Ok(ConfigStore::for_layout(&BatchLayout::new(batch.root)))
}

fn set_inputs(store: &mut ConfigStore, spreadsheet: Option<&Path>, tiff_dir: Option<&Path>) -> Result<()> {
    let spreadsheet = spreadsheet.map(absolute).transpose()?;
    let tiff_dir = tiff_dir.map(absolute).transpose()?;
    store.update(ConfigSection::Inputs, |settings| {
        if let Some(path) = spreadsheet {
            settings.inputs.spreadsheet_path = path.display().to_string();
        }
        if let Some(path) = tiff_dir {
            settings.inputs.tiff_dir = path.display().to_string();
        }
    })?;
    Ok(())
}

/// Source paths are stored absolute so runs do not depend on the caller's
/// working directory.
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolving {}", path.display()))
}

fn step_name(orchestrator: &PipelineOrchestrator, step: u8) -> String {
    orchestrator
        .step_names()
        .into_iter()
        .find(|(n, _)| *n == step)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("step {}", step))
}

struct ProgressUpdate {
    step: String,
    percent: u32,
    message: String,
}

fn run_command(registry: Arc<BatchRegistry>, args: RunArgs) -> Result<()> {
    let batch = registry.get(&args.batch_id)?;

    let mut request = match (args.from, args.to) {
        (None, None) => RunRequest::pending(),
        (from, to) => {
            let from = from.unwrap_or(1);
            let to = to.unwrap_or(STEP_COUNT);
            if from > to {
                bail!("--from {} is after --to {}", from, to);
            }
            RunRequest::range(from, to)
        }
    };
    if args.dry_run {
        request = request.dry_run();
    }
    if args.force {
        request = request.force();
    }

    let log_config = if args.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let mut orchestrator = PipelineOrchestrator::new(registry).with_log_config(log_config);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} [{bar:40.green/238}] {pos:>3}%  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    bar.set_prefix(batch.name.clone());
    bar.enable_steady_tick(Duration::from_millis(100));

    let (tx, rx) = mpsc::channel::<ProgressUpdate>();
    let batch_id = batch.id.clone();
    let worker = thread::spawn(move || {
        let callback: ProgressCallback = Box::new(move |step: &str, percent: u32, message: &str| {
            let _ = tx.send(ProgressUpdate {
                step: step.to_string(),
                percent,
                message: message.to_string(),
            });
        });
        orchestrator.run(&batch_id, request, Some(callback))
    });

    // The channel closes when the worker drops the callback.
    for update in rx {
        bar.set_position(u64::from(update.percent.min(100)));
        bar.set_message(format!("{}: {}", update.step, update.message));
    }

    let outcome = worker
        .join()
        .map_err(|_| anyhow::anyhow!("pipeline worker panicked"))?;
    bar.finish_and_clear();
    let result = outcome.context("pipeline run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_run(&result);
    }

    if !result.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_run(result: &PipelineRunResult) {
    for step in &result.results {
        let mark = if step.success { "ok" } else { "FAILED" };
        println!("  [{}] {}. {}: {}", mark, step.step, step.name, step.message);
        if let Some(stats) = &step.stats {
            for item in &stats.failed_items {
                println!("        {}: {}", item.item, item.reason);
            }
        }
    }
    if !result.skipped.is_empty() {
        let skipped: Vec<String> = result.skipped.iter().map(u8::to_string).collect();
        println!("  already complete: {}", skipped.join(", "));
    }

    println!("{}", result.message);
    if result.batch_completed {
        println!("Batch complete.");
    }
    if let Some(path) = &result.log_path {
        println!("Log:     {}", path.display());
    }
    if let Some(path) = &result.summary_path {
        println!("Summary: {}", path.display());
    }
}
