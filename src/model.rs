use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Traversal order for the remote file listing.
///
/// Running several mirrors of the same directory with different orders makes
/// them start on different files, which is the only coordination between
/// concurrent instances (two runs can still race on the same file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Server listing order.
    Listed,
    Reverse,
    Shuffle,
}

impl Order {
    /// Resolve the two CLI flags; `--reverse` wins over `--shuffle`.
    pub fn resolve(reverse: bool, shuffle: bool) -> Self {
        if reverse {
            Order::Reverse
        } else if shuffle {
            Order::Shuffle
        } else {
            Order::Listed
        }
    }

    pub fn apply(self, names: &mut [String]) {
        match self {
            Order::Listed => {}
            Order::Reverse => names.reverse(),
            Order::Shuffle => names.shuffle(&mut rand::thread_rng()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub host: String,
    pub port: u16,
    pub remote_dir: String,
    pub output_dir: PathBuf,
    pub username: String,
    pub password: String,
    pub order: Order,
    pub timeout: Duration,
    pub batch: bool,
}

/// What happened to a single remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOutcome {
    Downloaded { bytes: u64 },
    /// Local copy already matches the remote byte size.
    Skipped { bytes: u64 },
}

/// Progress events emitted by the mirror engine and consumed by the CLI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MirrorEvent {
    Connected {
        host: String,
        remote_dir: String,
    },
    ListingLoaded {
        remote_dir: String,
        files: usize,
    },
    FileStarted {
        name: String,
        index: usize,
        total: usize,
    },
    FileFinished {
        name: String,
        outcome: FileOutcome,
        index: usize,
        total: usize,
    },
    DirectoryStarted {
        remote_dir: String,
        local_dir: PathBuf,
    },
    DirectoryFinished {
        report: DirReport,
    },
}

/// Per-directory tally; batch mode produces one per (run, variable) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirReport {
    pub remote_dir: String,
    pub local_dir: PathBuf,
    pub files_total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub bytes_transferred: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorResult {
    pub timestamp_utc: String,
    pub host: String,
    pub order: Order,
    pub directories: Vec<DirReport>,
    pub files_total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub bytes_transferred: u64,
    pub elapsed_ms: u64,
}

impl MirrorResult {
    /// Roll per-directory reports up into a run result.
    pub fn aggregate(
        host: &str,
        order: Order,
        directories: Vec<DirReport>,
        elapsed: Duration,
    ) -> Self {
        let files_total = directories.iter().map(|d| d.files_total).sum();
        let downloaded = directories.iter().map(|d| d.downloaded).sum();
        let skipped = directories.iter().map(|d| d.skipped).sum();
        let bytes_transferred = directories.iter().map(|d| d.bytes_transferred).sum();
        Self {
            timestamp_utc: utc_timestamp(),
            host: host.to_string(),
            order,
            directories,
            files_total,
            downloaded,
            skipped,
            bytes_transferred,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReprojectConfig {
    pub src_dir: PathBuf,
    pub dest_dir: PathBuf,
    /// Data variable rasterized from each input file.
    pub variable: String,
    pub src_crs: String,
    pub dst_crs: String,
    pub extension: String,
    pub jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReprojectEvent {
    Discovered {
        files: usize,
        src_dir: PathBuf,
    },
    FileFinished {
        input: PathBuf,
        output: PathBuf,
        done: usize,
        total: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReprojectResult {
    pub timestamp_utc: String,
    pub files_total: usize,
    pub converted: usize,
    pub dst_crs: String,
    pub elapsed_ms: u64,
}

/// RFC 3339 UTC timestamp for run results.
pub fn utc_timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_takes_precedence_over_shuffle() {
        assert_eq!(Order::resolve(true, true), Order::Reverse);
        assert_eq!(Order::resolve(true, false), Order::Reverse);
        assert_eq!(Order::resolve(false, true), Order::Shuffle);
        assert_eq!(Order::resolve(false, false), Order::Listed);
    }

    #[test]
    fn listed_order_keeps_server_order() {
        let mut names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        Order::Listed.apply(&mut names);
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn reverse_order_reverses() {
        let mut names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        Order::Reverse.apply(&mut names);
        assert_eq!(names, ["c", "b", "a"]);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let original: Vec<String> = (0..32).map(|i| format!("f{i}.nc")).collect();
        let mut names = original.clone();
        Order::Shuffle.apply(&mut names);
        let mut sorted = names.clone();
        sorted.sort();
        let mut expected = original;
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn aggregate_sums_directory_reports() {
        let dirs = vec![
            DirReport {
                remote_dir: "/a".into(),
                local_dir: "/out/a".into(),
                files_total: 3,
                downloaded: 2,
                skipped: 1,
                bytes_transferred: 100,
            },
            DirReport {
                remote_dir: "/b".into(),
                local_dir: "/out/b".into(),
                files_total: 5,
                downloaded: 0,
                skipped: 5,
                bytes_transferred: 0,
            },
        ];
        let result = MirrorResult::aggregate(
            "ftp.ceda.ac.uk",
            Order::Listed,
            dirs,
            Duration::from_millis(1234),
        );
        assert_eq!(result.files_total, 8);
        assert_eq!(result.downloaded, 2);
        assert_eq!(result.skipped, 6);
        assert_eq!(result.bytes_transferred, 100);
        assert_eq!(result.elapsed_ms, 1234);
    }
}
