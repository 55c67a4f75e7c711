use std::path::Path;
use std::process::Command;

use tracing::{info, warn};

use crate::error::{Error, Result};

/// Longest stderr excerpt carried in [`Error::ClusteringFailed`].
const STDERR_EXCERPT: usize = 2000;

/// Run the external face-clustering step for one match.
///
/// `command` is split on whitespace; the catalog path and match id are
/// appended as the last two arguments. The step writes faces and clusters
/// straight into the catalog and signals failure through its exit status.
pub fn run_clustering(command: &str, catalog_path: &Path, match_id: &str) -> Result<()> {
    let mut parts = command.split_whitespace();
    let program = parts.next().ok_or(Error::ClusteringNotConfigured)?;

    info!(match_id, program, "running clustering step");
    let output = Command::new(program)
        .args(parts)
        .arg(catalog_path)
        .arg(match_id)
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        info!(target: "matchpack::clustering", "{line}");
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        warn!(target: "matchpack::clustering", "{line}");
    }

    if !output.status.success() {
        let trimmed = stderr.trim();
        let start = trimmed
            .char_indices()
            .rev()
            .nth(STDERR_EXCERPT - 1)
            .map_or(0, |(i, _)| i);
        return Err(Error::ClusteringFailed {
            status: output.status.to_string(),
            stderr: trimmed[start..].to_string(),
        });
    }
    Ok(())
}
