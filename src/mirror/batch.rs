//! Batch-mode enumeration of the UKCP convection-permitting archive.
//!
//! The archive lays data out as `<root>/<run>/<variable>/day/latest`; the
//! destination fileshare wants `<root>/<variable>/<run>/latest` (run and
//! variable swapped, the daily-frequency level dropped). Both vocabularies
//! are fixed, so batch mode is a static enumeration of every pair.

use std::path::{Path, PathBuf};

/// Ensemble member identifiers mirrored in batch mode.
pub const RUN_IDS: [&str; 17] = [
    "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12", "13", "14", "15",
    "16", "17",
];

/// Daily variables published per ensemble member.
pub const VARIABLES: [&str; 17] = [
    "clt", "flashrate", "hurs", "huss", "pr", "prsn", "psl", "rls", "rss", "sfcWind", "snw",
    "tas", "tasmax", "tasmin", "uas", "vas", "wsgmax10m",
];

/// Frequency level present on the archive but flattened away locally.
const FREQUENCY: &str = "day";
/// Version leaf kept on both sides.
const VERSION: &str = "latest";

/// One directory to mirror: a remote path and the local directory it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorJob {
    pub remote_dir: String,
    pub local_dir: PathBuf,
}

/// Enumerate every (run, variable) pair under `input`, remapped onto the
/// destination hierarchy under `output`. Deterministic: runs outer, variables
/// inner, both in declaration order.
pub fn batch_jobs(input: &str, output: &Path) -> Vec<MirrorJob> {
    let root = input.trim_end_matches('/');
    let mut jobs = Vec::with_capacity(RUN_IDS.len() * VARIABLES.len());
    for run in RUN_IDS {
        for variable in VARIABLES {
            jobs.push(MirrorJob {
                remote_dir: format!("{root}/{run}/{variable}/{FREQUENCY}/{VERSION}"),
                local_dir: output.join(variable).join(run).join(VERSION),
            });
        }
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn enumerates_all_pairs() {
        let jobs = batch_jobs("/badc/ukcp18/data/land-cpm/uk/2.2km/rcp85", Path::new("/mnt/share"));
        assert_eq!(jobs.len(), 17 * 17);
        let unique: HashSet<_> = jobs.iter().map(|j| j.remote_dir.clone()).collect();
        assert_eq!(unique.len(), jobs.len());
    }

    #[test]
    fn remaps_hierarchy_and_drops_frequency() {
        let jobs = batch_jobs("/badc/ukcp18/data/land-cpm/uk/2.2km/rcp85", Path::new("/mnt/share"));
        let first = &jobs[0];
        assert_eq!(
            first.remote_dir,
            "/badc/ukcp18/data/land-cpm/uk/2.2km/rcp85/01/clt/day/latest"
        );
        assert_eq!(first.local_dir, Path::new("/mnt/share/clt/01/latest"));
        // run and variable are swapped locally; the "day" level only exists remotely
        assert!(jobs.iter().all(|j| !j.local_dir.to_string_lossy().contains("day")));
    }

    #[test]
    fn tolerates_trailing_slash_on_input() {
        let jobs = batch_jobs("/badc/ukcp18/rcp85/", Path::new("/out"));
        assert_eq!(jobs[0].remote_dir, "/badc/ukcp18/rcp85/01/clt/day/latest");
    }

    #[test]
    fn variables_run_inner_runs_outer() {
        let jobs = batch_jobs("/r", Path::new("/o"));
        assert_eq!(jobs[1].remote_dir, "/r/01/flashrate/day/latest");
        assert_eq!(jobs[VARIABLES.len()].remote_dir, "/r/02/clt/day/latest");
    }
}
