use anyhow::Result;
use indicatif::ProgressBar;
use matchpack_core::publish::PublishProgress;
use matchpack_core::Curator;

use super::output::{bar_style, print_json, short_id};

pub fn run(curator: &Curator, match_id: &str, json: bool) -> Result<()> {
    let pb = ProgressBar::new(0);
    pb.set_style(bar_style()?);
    if json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let report = curator.publish(
        match_id,
        Some(&mut |progress| match progress {
            PublishProgress::Start { clusters } => {
                pb.set_position(0);
                pb.set_message(format!("Publishing {clusters} cluster(s)..."));
            }
            PublishProgress::ClusterStart { cluster_id, faces } => {
                pb.inc_length(faces as u64);
                pb.set_message(format!("cluster {}", short_id(&cluster_id)));
            }
            PublishProgress::Rendered { path, .. } => {
                pb.inc(1);
                pb.set_message(format!("-> {}", path.display()));
            }
            PublishProgress::Skipped { face_id, reason, .. } => {
                pb.inc(1);
                pb.println(format!("  skipped {face_id}: {reason}"));
            }
            PublishProgress::Failed { face_id, error, .. } => {
                pb.inc(1);
                pb.println(format!("  failed {face_id}: {error}"));
            }
            PublishProgress::Complete(report) => {
                pb.finish_with_message(format!(
                    "{} generated, {} failed, {} skipped",
                    report.images_generated, report.images_failed, report.images_skipped
                ));
            }
        }),
    )?;

    if json {
        return print_json(&report);
    }
    println!(
        "Published {} cluster(s); removed {} stale file(s).",
        report.clusters_processed, report.artifacts_removed
    );
    Ok(())
}
