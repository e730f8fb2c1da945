mod warp;

use crate::model::{utc_timestamp, ReprojectConfig, ReprojectEvent, ReprojectResult};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// Maps the per-file conversion over every discovered raster on a worker
/// pool. Files are independent: workers share nothing and completion order
/// is not guaranteed.
pub struct ReprojectEngine {
    cfg: ReprojectConfig,
}

impl ReprojectEngine {
    pub fn new(cfg: ReprojectConfig) -> Self {
        Self { cfg }
    }

    pub fn run(self, event_tx: &UnboundedSender<ReprojectEvent>) -> Result<ReprojectResult> {
        let start = Instant::now();
        anyhow::ensure!(
            self.cfg.dest_dir.is_dir(),
            "destination directory {} must exist",
            self.cfg.dest_dir.display()
        );

        let files = discover_rasters(&self.cfg.src_dir, &self.cfg.extension)?;
        let total = files.len();
        let _ = event_tx.send(ReprojectEvent::Discovered {
            files: total,
            src_dir: self.cfg.src_dir.clone(),
        });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.cfg.jobs)
            .build()
            .context("building worker pool")?;

        let done = AtomicUsize::new(0);
        pool.install(|| {
            files.par_iter().try_for_each(|input| {
                let output = warp::reproject_file(input, &self.cfg)?;
                let _ = event_tx.send(ReprojectEvent::FileFinished {
                    input: input.clone(),
                    output,
                    done: done.fetch_add(1, Ordering::Relaxed) + 1,
                    total,
                });
                Ok::<(), anyhow::Error>(())
            })
        })?;

        Ok(ReprojectResult {
            timestamp_utc: utc_timestamp(),
            files_total: total,
            converted: done.into_inner(),
            dst_crs: self.cfg.dst_crs.clone(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Worker count when `--jobs` is not given: one fewer than the processors
/// available, never below one.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .saturating_sub(1)
        .max(1)
}

/// Recursively collect files under `root` whose extension matches `ext`
/// (case-insensitive). Sorted so enumeration is deterministic.
fn discover_rasters(root: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let ext = ext.trim_start_matches('.');
    let mut files = Vec::new();
    for entry in jwalk::WalkDir::new(root).sort(true) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tokio::sync::mpsc::unbounded_channel;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn discovery_is_recursive_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.nc"));
        touch(&dir.path().join("sub/deep/b.nc"));
        touch(&dir.path().join("sub/readme.txt"));
        touch(&dir.path().join("c.NC"));

        let files = discover_rasters(dir.path(), "nc").unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.nc", "c.NC", "sub/deep/b.nc"]);
    }

    #[test]
    fn discovery_accepts_dotted_extension() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.nc"));
        assert_eq!(discover_rasters(dir.path(), ".nc").unwrap().len(), 1);
    }

    #[test]
    fn missing_destination_is_an_error() {
        let src = tempfile::tempdir().unwrap();
        let cfg = ReprojectConfig {
            src_dir: src.path().to_path_buf(),
            dest_dir: src.path().join("does-not-exist"),
            variable: "tasmax".into(),
            src_crs: "EPSG:4326".into(),
            dst_crs: "EPSG:27700".into(),
            extension: "nc".into(),
            jobs: 1,
        };
        let (tx, _rx) = unbounded_channel();
        let err = ReprojectEngine::new(cfg).run(&tx).unwrap_err();
        assert!(err.to_string().contains("must exist"));
    }

    #[test]
    fn empty_source_completes_with_zero_conversions() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let cfg = ReprojectConfig {
            src_dir: src.path().to_path_buf(),
            dest_dir: dest.path().to_path_buf(),
            variable: "tasmax".into(),
            src_crs: "EPSG:4326".into(),
            dst_crs: "EPSG:27700".into(),
            extension: "nc".into(),
            jobs: 1,
        };
        let (tx, mut rx) = unbounded_channel();
        let result = ReprojectEngine::new(cfg).run(&tx).unwrap();
        assert_eq!(result.files_total, 0);
        assert_eq!(result.converted, 0);
        assert!(matches!(
            rx.try_recv().unwrap(),
            ReprojectEvent::Discovered { files: 0, .. }
        ));
    }

    #[test]
    fn default_jobs_is_at_least_one() {
        assert!(default_jobs() >= 1);
    }
}
