//! Text summary builder for CLI output.

use crate::model::{MirrorResult, ReprojectResult};
use std::time::Duration;

/// Pre-formatted lines for text mode.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_mirror_summary(result: &MirrorResult) -> TextSummary {
    let mut lines = Vec::new();
    lines.push(format!(
        "Mirrored {} directorie(s) from {} ({:?} order)",
        result.directories.len(),
        result.host,
        result.order
    ));
    lines.push(format!(
        "Files: {} total, {} downloaded, {} already up to date",
        result.files_total, result.downloaded, result.skipped
    ));
    lines.push(format!(
        "Transferred: {} in {}",
        format_bytes(result.bytes_transferred),
        humantime::format_duration(round_to_secs(result.elapsed_ms))
    ));
    TextSummary { lines }
}

pub(crate) fn build_reproject_summary(result: &ReprojectResult) -> TextSummary {
    let lines = vec![format!(
        "Reprojected {} of {} raster(s) to {} in {}",
        result.converted,
        result.files_total,
        result.dst_crs,
        humantime::format_duration(round_to_secs(result.elapsed_ms))
    )];
    TextSummary { lines }
}

/// humantime prints every unit down to nanoseconds; clamp to whole seconds
/// (and keep sub-second runs readable as milliseconds).
fn round_to_secs(elapsed_ms: u64) -> Duration {
    if elapsed_ms < 1000 {
        Duration::from_millis(elapsed_ms)
    } else {
        Duration::from_secs(elapsed_ms / 1000)
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MirrorResult, Order};

    #[test]
    fn bytes_format_scales_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
    }

    #[test]
    fn mirror_summary_reports_counts() {
        let result = MirrorResult::aggregate(
            "ftp.ceda.ac.uk",
            Order::Shuffle,
            vec![],
            Duration::from_secs(3),
        );
        let summary = build_mirror_summary(&result);
        assert!(summary.lines[0].contains("ftp.ceda.ac.uk"));
        assert!(summary.lines[0].contains("Shuffle"));
        assert!(summary.lines[1].contains("0 total"));
    }
}
