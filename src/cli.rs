use crate::mirror::MirrorEngine;
use crate::model::{
    FileOutcome, MirrorConfig, MirrorEvent, Order, ReprojectConfig, ReprojectEvent,
};
use crate::reproject::{default_jobs, ReprojectEngine};
use crate::summary;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use is_terminal::IsTerminal;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "ceda-sync",
    version,
    about = "Mirror CEDA climate archives over FTP and reproject rasters"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Mirror a remote archive directory to local disk
    Mirror(MirrorArgs),
    /// Reproject every raster under a directory onto a different CRS
    Reproject(ReprojectArgs),
}

#[derive(Debug, Args, Clone)]
pub struct MirrorArgs {
    /// Remote directory to mirror (top-level hierarchy root in batch mode)
    #[arg(long)]
    pub input: String,

    /// Directory the files land in (created if absent)
    #[arg(long)]
    pub output: PathBuf,

    /// CEDA account name
    #[arg(long)]
    pub username: String,

    /// CEDA FTP password; prompted for when omitted on a terminal
    #[arg(long)]
    pub password: Option<String>,

    /// Archive host
    #[arg(long, default_value = "ftp.ceda.ac.uk")]
    pub host: String,

    #[arg(long, default_value_t = 21)]
    pub port: u16,

    /// Walk the listing back to front (lets parallel invocations start on
    /// different files)
    #[arg(long)]
    pub reverse: bool,

    /// Walk the listing in random order; --reverse wins when both are given
    #[arg(long)]
    pub shuffle: bool,

    /// Mirror the whole run/variable hierarchy under --input, remapped onto
    /// the destination fileshare layout
    #[arg(long)]
    pub batch: bool,

    /// Connection timeout
    #[arg(long, default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Print the run result as JSON instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Export the run result as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ReprojectArgs {
    /// Directory scanned recursively for input rasters
    pub src: PathBuf,

    /// Directory the GeoTIFFs are written to (must already exist)
    pub dest: PathBuf,

    /// Data variable rasterized from each input file
    #[arg(long, default_value = "tasmax")]
    pub variable: String,

    /// CRS assigned to the inputs
    #[arg(long, default_value = "EPSG:4326")]
    pub src_crs: String,

    /// CRS of the outputs
    #[arg(long, default_value = "EPSG:27700")]
    pub dst_crs: String,

    /// Input file extension
    #[arg(long, default_value = "nc")]
    pub extension: String,

    /// Worker count (default: available processors minus one)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Print the run result as JSON instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Export the run result as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,
}

pub async fn run(args: Cli) -> Result<()> {
    match args.command {
        Command::Mirror(args) => run_mirror(args).await,
        Command::Reproject(args) => run_reproject(args).await,
    }
}

/// Build a `MirrorConfig` from CLI arguments, prompting for the password
/// when it was not passed and stdin is interactive.
pub fn build_mirror_config(args: &MirrorArgs) -> Result<MirrorConfig> {
    let password = match &args.password {
        Some(p) => p.clone(),
        None if std::io::stdin().is_terminal() => {
            rpassword::prompt_password(format!("{} password for {}: ", args.host, args.username))
                .context("reading password")?
        }
        None => anyhow::bail!("--password is required when stdin is not a terminal"),
    };

    Ok(MirrorConfig {
        host: args.host.clone(),
        port: args.port,
        remote_dir: args.input.clone(),
        output_dir: args.output.clone(),
        username: args.username.clone(),
        password,
        order: Order::resolve(args.reverse, args.shuffle),
        timeout: args.timeout.into(),
        batch: args.batch,
    })
}

/// Build a `ReprojectConfig` from CLI arguments.
pub fn build_reproject_config(args: &ReprojectArgs) -> ReprojectConfig {
    ReprojectConfig {
        src_dir: args.src.clone(),
        dest_dir: args.dest.clone(),
        variable: args.variable.clone(),
        src_crs: args.src_crs.clone(),
        dst_crs: args.dst_crs.clone(),
        extension: args.extension.clone(),
        jobs: args.jobs.unwrap_or_else(default_jobs).max(1),
    }
}

async fn run_mirror(args: MirrorArgs) -> Result<()> {
    let cfg = build_mirror_config(&args)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<MirrorEvent>();

    // The FTP session is blocking end to end; run the engine off the runtime
    // and watch its events here.
    let engine = MirrorEngine::new(cfg);
    let handle = tokio::task::spawn_blocking(move || engine.run(&evt_tx));

    while let Some(ev) = evt_rx.recv().await {
        match ev {
            MirrorEvent::DirectoryStarted {
                remote_dir,
                local_dir,
            } => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "== {remote_dir} -> {} ==",
                    local_dir.display()
                )));
            }
            MirrorEvent::Connected { host, .. } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Connected to {host}")));
            }
            MirrorEvent::ListingLoaded { files, .. } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("{files} files listed")));
            }
            MirrorEvent::FileStarted { name, index, total } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("[{index}/{total}] {name}")));
            }
            MirrorEvent::FileFinished { outcome, .. } => match outcome {
                FileOutcome::Downloaded { bytes } => {
                    let _ = out_tx.send(OutputLine::Stderr(format!("  downloaded ({bytes} bytes)")));
                }
                FileOutcome::Skipped { .. } => {
                    let _ = out_tx.send(OutputLine::Stderr("  up to date, skipping".to_string()));
                }
            },
            MirrorEvent::DirectoryFinished { report } => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "Finished {}: {} downloaded, {} up to date",
                    report.remote_dir, report.downloaded, report.skipped
                )));
            }
        }
    }

    let result = handle.await.context("mirror task failed")??;

    if let Some(p) = args.export_json.as_deref() {
        export_json(p, &result)?;
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
    }
    if args.json {
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&result)?));
    } else {
        for line in summary::build_mirror_summary(&result).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn run_reproject(args: ReprojectArgs) -> Result<()> {
    let cfg = build_reproject_config(&args);
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<ReprojectEvent>();

    let engine = ReprojectEngine::new(cfg);
    let handle = tokio::task::spawn_blocking(move || engine.run(&evt_tx));

    while let Some(ev) = evt_rx.recv().await {
        match ev {
            ReprojectEvent::Discovered { files, src_dir } => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "{files} raster(s) under {}",
                    src_dir.display()
                )));
            }
            ReprojectEvent::FileFinished {
                input,
                output,
                done,
                total,
            } => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "[{done}/{total}] {} -> {}",
                    input.display(),
                    output.display()
                )));
            }
        }
    }

    let result = handle.await.context("reproject task failed")??;

    if let Some(p) = args.export_json.as_deref() {
        export_json(p, &result)?;
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
    }
    if args.json {
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&result)?));
    } else {
        for line in summary::build_reproject_summary(&result).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

fn export_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
