// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use rulesync::{
    consolidate::{consolidate, ConsolidateOptions},
    git::{self, GitCli, PublishOutcome, VersionControl},
    path::{default_config_path, LOCAL_CONFIG_FILE},
    rule::{convert::Converter, description_index},
    sync::{watch::watch, BatchReport, SyncController},
    SyncConfig,
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::exit,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::channel,
        Arc,
    },
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "rulesync [options] <rulesync-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        match self.command {
            Command::Convert(opts) => run_convert(&config, opts),
            Command::Sync(opts) => run_sync(&config, opts),
            Command::Watch => run_watch(config).await,
            Command::Index(opts) => run_index(&config, opts),
            Command::Consolidate(opts) => run_consolidate(&config, opts),
            Command::Status(opts) => run_status(&config, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Convert rule documents into both target trees without committing.
    #[command(override_usage = "rulesync convert [options] <source>...")]
    Convert(ConvertOptions),

    /// Regenerate both target trees from scratch and publish them.
    #[command(override_usage = "rulesync sync [options]")]
    Sync(SyncOptions),

    /// Watch source tree, converting and publishing batches of changes.
    #[command(override_usage = "rulesync watch [options]")]
    Watch,

    /// List every rule document with its description.
    #[command(override_usage = "rulesync index [options]")]
    Index(IndexOptions),

    /// Consolidate converted rule files into one markdown document.
    #[command(override_usage = "rulesync consolidate [options] --output <file>")]
    Consolidate(ConsolidateArgs),

    /// Show status of the workspace repository.
    #[command(override_usage = "rulesync status [options]")]
    Status(StatusOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConvertOptions {
    /// Source rule documents to convert.
    #[arg(required = true, value_name = "source")]
    pub sources: Vec<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Convert only, do not commit or push.
    #[arg(long)]
    pub no_commit: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct IndexOptions {
    /// Print index as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConsolidateArgs {
    /// Path to write consolidated document to.
    #[arg(short, long, required = true, value_name = "file")]
    pub output: PathBuf,

    /// Directory of converted rule files, primary target by default.
    #[arg(short, long, value_name = "dir")]
    pub rules_dir: Option<PathBuf>,

    /// Glob patterns of files to leave out.
    #[arg(short = 'x', long, value_delimiter = ',', value_name = "glob")]
    pub exclude: Vec<String>,

    /// Do not emit a heading above each file.
    #[arg(long)]
    pub no_header: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StatusOptions {
    /// Print status as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Version control stand-in for runs that never publish.
#[derive(Debug, Default)]
struct Offline;

impl VersionControl for Offline {
    fn publish(&self, _: &[PathBuf], _: &str) -> git::Result<PublishOutcome> {
        Ok(PublishOutcome::NothingToCommit)
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

/// Load configuration from explicit path, local file, user file, or defaults.
fn load_config(explicit: Option<&Path>) -> Result<SyncConfig> {
    let mut config = match explicit {
        Some(path) => SyncConfig::load(path)?,
        None if Path::new(LOCAL_CONFIG_FILE).exists() => SyncConfig::load(LOCAL_CONFIG_FILE)?,
        None => match default_config_path() {
            Ok(path) if path.exists() => SyncConfig::load(path)?,
            _ => SyncConfig::default(),
        },
    };

    // INVARIANT: Workspace must be absolute so Git pathspecs resolve.
    if let Ok(workspace) = config.workspace().canonicalize() {
        config.paths.workspace = workspace;
    }

    Ok(config)
}

fn open_git(config: &SyncConfig) -> Result<GitCli> {
    Ok(GitCli::open(config.workspace())?.with_pull_before_push(config.git.pull_before_push))
}

fn run_convert(config: &SyncConfig, opts: ConvertOptions) -> Result<()> {
    let converter = Converter::new(config);
    let mut failed = 0;
    for source in opts.sources {
        let source = source.canonicalize().unwrap_or(source);
        let record = converter.convert(&source);
        if !record.is_success() {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} rule documents failed to convert");
    }

    Ok(())
}

fn run_sync(config: &SyncConfig, opts: SyncOptions) -> Result<()> {
    if !opts.yes {
        let proceed = Confirm::new("Regenerate every converted rule file?")
            .with_default(false)
            .with_help_message("stale converted files in both target trees get deleted")
            .prompt()?;
        if !proceed {
            info!("sync cancelled");
            return Ok(());
        }
    }

    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<40}  [{wide_bar:.yellow/blue}] {pos}/{len}",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);

    let report = if opts.no_commit {
        SyncController::new(config, Offline)
            .with_publishing(false)
            .full_sync(&bar)?
    } else {
        SyncController::new(config, open_git(config)?).full_sync(&bar)?
    };
    summarize(&report);

    if report.stats.failed > 0 {
        bail!("{} rule documents failed to convert", report.stats.failed);
    }

    Ok(())
}

async fn run_watch(config: SyncConfig) -> Result<()> {
    let controller = Arc::new(SyncController::new(&config, open_git(&config)?));
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = channel();
    let watcher = watch(controller.converter().source_root(), tx)?;

    let handle = {
        let controller = Arc::clone(&controller);
        let stop = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || controller.run(&rx, &stop))
    };

    tokio::signal::ctrl_c().await?;
    info!("stopping, waiting for batch in flight");
    stop.store(true, Ordering::Relaxed);
    drop(watcher);
    handle.await?;

    println!("{}", controller.session_stats());

    Ok(())
}

fn run_index(config: &SyncConfig, opts: IndexOptions) -> Result<()> {
    let index = description_index(config.source_dir(), &config.convert.source_extension)?;
    if opts.json {
        let index = index
            .into_iter()
            .map(|(path, description)| (path.display().to_string(), description))
            .collect::<BTreeMap<_, _>>();
        println!("{}", serde_json::to_string_pretty(&index)?);
        return Ok(());
    }

    for (path, description) in index {
        println!("{}: {description}", path.display());
    }

    Ok(())
}

fn run_consolidate(config: &SyncConfig, opts: ConsolidateArgs) -> Result<()> {
    let [primary, _] = config.target_dirs();
    let options = ConsolidateOptions {
        rules_dir: opts.rules_dir.unwrap_or(primary),
        output: opts.output,
        extension: config.convert.target_extension.clone(),
        exclude: opts.exclude,
        include_header: !opts.no_header,
    };

    let summary = consolidate(&options)?;
    info!(
        "consolidated {} rule files into {:?}",
        summary.included.len(),
        options.output.display()
    );

    Ok(())
}

fn run_status(config: &SyncConfig, opts: StatusOptions) -> Result<()> {
    let status = open_git(config)?.status()?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{status}");
    }

    if !status.is_clean() {
        exit(1);
    }

    Ok(())
}

fn summarize(report: &BatchReport) {
    info!("{}", report.stats);
    match (&report.outcome, &report.publish_error) {
        (Some(PublishOutcome::Committed { pushed: true }), _) => info!("committed and pushed"),
        (Some(PublishOutcome::Committed { pushed: false }), _) => warn!("committed, not pushed"),
        (Some(PublishOutcome::NothingToCommit), _) => info!("nothing to commit"),
        (None, Some(error)) => warn!("publish failed: {error}"),
        (None, None) => {}
    }
}
