pub mod batch;
mod remote;

pub use remote::{FtpSource, RemoteSource};

use crate::model::{DirReport, FileOutcome, MirrorConfig, MirrorEvent, MirrorResult, Order};
use anyhow::{Context, Result};
use batch::MirrorJob;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// Sequential mirror of one remote directory, or of the whole batch
/// hierarchy. Blocking; the CLI layer runs it under `spawn_blocking` and
/// watches the event channel.
pub struct MirrorEngine {
    cfg: MirrorConfig,
}

impl MirrorEngine {
    pub fn new(cfg: MirrorConfig) -> Self {
        Self { cfg }
    }

    pub fn run(self, event_tx: &UnboundedSender<MirrorEvent>) -> Result<MirrorResult> {
        let start = Instant::now();
        let jobs = if self.cfg.batch {
            batch::batch_jobs(&self.cfg.remote_dir, &self.cfg.output_dir)
        } else {
            vec![MirrorJob {
                remote_dir: self.cfg.remote_dir.clone(),
                local_dir: self.cfg.output_dir.clone(),
            }]
        };

        let mut reports = Vec::with_capacity(jobs.len());
        for job in jobs {
            let _ = event_tx.send(MirrorEvent::DirectoryStarted {
                remote_dir: job.remote_dir.clone(),
                local_dir: job.local_dir.clone(),
            });

            let mut source = FtpSource::connect(&self.cfg, &job.remote_dir)
                .with_context(|| format!("opening session for {}", job.remote_dir))?;
            let _ = event_tx.send(MirrorEvent::Connected {
                host: self.cfg.host.clone(),
                remote_dir: job.remote_dir.clone(),
            });

            let report = mirror_directory(&mut source, &job, self.cfg.order, event_tx)?;
            source.quit();

            let _ = event_tx.send(MirrorEvent::DirectoryFinished {
                report: report.clone(),
            });
            reports.push(report);
        }

        Ok(MirrorResult::aggregate(
            &self.cfg.host,
            self.cfg.order,
            reports,
            start.elapsed(),
        ))
    }
}

/// Mirror a single remote directory into `job.local_dir`.
///
/// A file whose local byte size already equals the remote size is skipped;
/// everything else is fetched, overwriting any stale or truncated copy. Size
/// equality is a deliberately cheap proxy for "already downloaded" — content
/// is never compared.
pub fn mirror_directory<R: RemoteSource>(
    source: &mut R,
    job: &MirrorJob,
    order: Order,
    event_tx: &UnboundedSender<MirrorEvent>,
) -> Result<DirReport> {
    fs::create_dir_all(&job.local_dir)
        .with_context(|| format!("creating output directory {}", job.local_dir.display()))?;

    let mut names = source
        .list()
        .with_context(|| format!("listing {}", job.remote_dir))?;
    order.apply(&mut names);

    let total = names.len();
    let _ = event_tx.send(MirrorEvent::ListingLoaded {
        remote_dir: job.remote_dir.clone(),
        files: total,
    });

    let mut downloaded = 0usize;
    let mut skipped = 0usize;
    let mut bytes_transferred = 0u64;

    for (i, name) in names.iter().enumerate() {
        let index = i + 1;
        let _ = event_tx.send(MirrorEvent::FileStarted {
            name: name.clone(),
            index,
            total,
        });

        let dest = job.local_dir.join(local_name(name));
        let outcome = match up_to_date(source, name, &dest)? {
            Some(bytes) => {
                skipped += 1;
                FileOutcome::Skipped { bytes }
            }
            None => {
                let bytes = source
                    .fetch(name, &dest)
                    .with_context(|| format!("downloading {name}"))?;
                downloaded += 1;
                bytes_transferred += bytes;
                FileOutcome::Downloaded { bytes }
            }
        };

        let _ = event_tx.send(MirrorEvent::FileFinished {
            name: name.clone(),
            outcome,
            index,
            total,
        });
    }

    Ok(DirReport {
        remote_dir: job.remote_dir.clone(),
        local_dir: job.local_dir.clone(),
        files_total: total,
        downloaded,
        skipped,
        bytes_transferred,
    })
}

/// Returns the local size when `dest` exists and matches the remote size.
fn up_to_date<R: RemoteSource>(source: &mut R, name: &str, dest: &Path) -> Result<Option<u64>> {
    let meta = match fs::metadata(dest) {
        Ok(m) if m.is_file() => m,
        _ => return Ok(None),
    };
    if source.size(name)? == meta.len() {
        Ok(Some(meta.len()))
    } else {
        Ok(None)
    }
}

/// Listing entries are usually bare names, but some servers answer NLST with
/// full paths; keep only the final component for the local file name.
fn local_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
