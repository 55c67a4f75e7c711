use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use indicatif::ProgressBar;
use matchpack_core::import::jobs::{ImportJob, JobStatus};
use matchpack_core::Curator;

use super::output::{bar_style, format_percent, format_timestamp, print_json};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(curator: &Curator, match_id: &str, archive: &Path, json: bool) -> Result<()> {
    let handle = curator.start_import(match_id, archive)?;

    let pb = ProgressBar::new(handle.total() as u64);
    pb.set_style(bar_style()?);
    pb.set_message("Importing photos...");
    if json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    while !handle.is_finished() {
        if let Some(job) = curator.import_status(match_id) {
            pb.set_position(job.processed as u64);
        }
        thread::sleep(POLL_INTERVAL);
    }
    handle.join().map_err(|_| anyhow!("import worker panicked"))?;

    let job = curator
        .import_status(match_id)
        .ok_or_else(|| anyhow!("import job for {match_id} disappeared"))?;
    pb.set_position(job.processed as u64);
    pb.finish_with_message(format!("{} imported, {} failed", job.processed.saturating_sub(job.failed), job.failed));

    if json {
        print_json(&job)?;
    }
    if job.status == JobStatus::Error {
        bail!(
            "import failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub fn status(curator: &Curator, match_id: &str, json: bool) -> Result<()> {
    let job = curator.import_status(match_id);
    if json {
        return print_json(&serde_json::json!({
            "status": ImportJob::status_label(job.as_ref()),
            "job": job,
        }));
    }

    let Some(job) = job else {
        println!("No import job for match {match_id} (not_found).");
        return Ok(());
    };
    println!("Import of {}", job.match_id);
    println!("   Status:    {}", job.status.as_str());
    println!(
        "   Progress:  {}/{} ({})",
        job.processed,
        job.total,
        format_percent(job.processed, job.total)
    );
    println!("   Failed:    {}", job.failed);
    println!("   Started:   {}", format_timestamp(job.started_at));
    if let Some(finished) = job.finished_at {
        println!("   Finished:  {}", format_timestamp(finished));
    }
    if let Some(error) = &job.error {
        println!("   Error:     {error}");
    }
    Ok(())
}
