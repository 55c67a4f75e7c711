use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::domain::{Cluster, CoverSelection, MatchStatus, MAX_COVER_FACES};
use crate::error::Result;
use crate::imaging::{self, watermark::Watermark};
use crate::layout::Layout;

/// Progress callback events for publication.
pub enum PublishProgress {
    /// Starting with the number of approved clusters.
    Start { clusters: usize },
    ClusterStart { cluster_id: String, faces: usize },
    /// A watermarked derivative was written.
    Rendered {
        cluster_id: String,
        face_id: String,
        path: PathBuf,
    },
    /// The face's original image is gone.
    Skipped {
        cluster_id: String,
        face_id: String,
        reason: String,
    },
    Failed {
        cluster_id: String,
        face_id: String,
        error: String,
    },
    Complete(PublishReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PublishReport {
    pub clusters_processed: usize,
    pub images_generated: usize,
    pub images_failed: usize,
    pub images_skipped: usize,
    /// Stale artifacts deleted from earlier publications.
    pub artifacts_removed: usize,
}

/// Faces to publish for a cluster.
///
/// A persisted cover wins, minus any face that has since left the cluster.
/// Otherwise the sharpest members are chosen and persisted as the cover so
/// later views and publications agree.
pub fn resolve_covers(catalog: &Catalog, cluster: &Cluster, limit: usize) -> Result<Vec<String>> {
    let limit = limit.min(MAX_COVER_FACES);
    if let Some(cover) = &cluster.cover {
        let current: Vec<String> = cover
            .face_ids()
            .iter()
            .filter(|id| cluster.has_member(id))
            .take(limit)
            .cloned()
            .collect();
        if !current.is_empty() {
            return Ok(current);
        }
    }

    let fallback = catalog.sharpest_faces(&cluster.id, limit)?;
    if !fallback.is_empty() {
        let cover = CoverSelection::new(fallback.clone())?;
        catalog.set_cover(&cluster.id, Some(&cover))?;
        info!(cluster_id = %cluster.id, faces = fallback.len(), "cover chosen by sharpness");
    }
    Ok(fallback)
}

/// A face whose original exists and will be rendered.
struct RenderJob {
    face_id: String,
    source: PathBuf,
    target: PathBuf,
}

/// Build the watermark described by the settings.
pub fn watermark_from(settings: &Settings) -> Result<Watermark> {
    let watermark = Watermark::new(&settings.watermark_text, settings.watermark_opacity);
    match &settings.watermark_font {
        Some(path) => watermark.with_font_file(path),
        None => Ok(watermark),
    }
}

/// Render watermarked previews for every approved cluster of a match.
///
/// The match is marked `published` first, so the status moves even when
/// individual images fail. Per-image failures are logged and counted.
/// An unusable watermark font falls back to the built-in glyphs.
pub fn publish(
    catalog: &Catalog,
    layout: &Layout,
    settings: &Settings,
    match_id: &str,
    mut progress_cb: Option<&mut dyn FnMut(PublishProgress)>,
) -> Result<PublishReport> {
    catalog.get_match(match_id)?;
    catalog.set_match_status(match_id, MatchStatus::Published)?;
    let watermark = watermark_from(settings).unwrap_or_else(|e| {
        warn!(error = %e, "watermark font unusable, falling back to built-in glyphs");
        Watermark::new(&settings.watermark_text, settings.watermark_opacity)
    });

    let approved: Vec<Cluster> = catalog
        .list_clusters(match_id)?
        .into_iter()
        .filter(|c| c.decision.is_publishable())
        .collect();

    if let Some(ref mut cb) = progress_cb {
        cb(PublishProgress::Start {
            clusters: approved.len(),
        });
    }

    let mut report = PublishReport::default();
    for cluster in &approved {
        let face_ids = resolve_covers(catalog, cluster, settings.max_covers)?;
        if let Some(ref mut cb) = progress_cb {
            cb(PublishProgress::ClusterStart {
                cluster_id: cluster.id.clone(),
                faces: face_ids.len(),
            });
        }

        // Locate originals sequentially (store access), render in parallel
        let mut jobs = Vec::with_capacity(face_ids.len());
        for face_id in &face_ids {
            match locate_original(catalog, face_id)? {
                Some(source) => jobs.push(RenderJob {
                    face_id: face_id.clone(),
                    source,
                    target: layout.published_path(match_id, &cluster.id, face_id)?,
                }),
                None => {
                    warn!(cluster_id = %cluster.id, face_id = %face_id, "original image missing, skipping");
                    report.images_skipped += 1;
                    if let Some(ref mut cb) = progress_cb {
                        cb(PublishProgress::Skipped {
                            cluster_id: cluster.id.clone(),
                            face_id: face_id.clone(),
                            reason: "original image missing".to_string(),
                        });
                    }
                }
            }
        }

        let results: Vec<(&RenderJob, Result<()>)> = jobs
            .par_iter()
            .map(|job| {
                let rendered = imaging::watermark::render_watermarked(
                    &job.source,
                    &watermark,
                    settings.publish_width,
                    settings.publish_quality,
                )
                .and_then(|bytes| imaging::write_file(&job.target, &bytes));
                (job, rendered)
            })
            .collect();

        // Report progress sequentially (callback is not Send)
        for (job, rendered) in results {
            match rendered {
                Ok(()) => {
                    report.images_generated += 1;
                    if let Some(ref mut cb) = progress_cb {
                        cb(PublishProgress::Rendered {
                            cluster_id: cluster.id.clone(),
                            face_id: job.face_id.clone(),
                            path: job.target.clone(),
                        });
                    }
                }
                Err(e) => {
                    warn!(cluster_id = %cluster.id, face_id = %job.face_id, error = %e, "watermark failed");
                    report.images_failed += 1;
                    if let Some(ref mut cb) = progress_cb {
                        cb(PublishProgress::Failed {
                            cluster_id: cluster.id.clone(),
                            face_id: job.face_id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let keep: HashSet<&str> = face_ids.iter().map(String::as_str).collect();
        report.artifacts_removed +=
            prune_cluster_dir(&layout.published_cluster_dir(match_id, &cluster.id)?, &keep);
        report.clusters_processed += 1;
    }

    let approved_ids: HashSet<&str> = approved.iter().map(|c| c.id.as_str()).collect();
    report.artifacts_removed +=
        prune_match_dir(&layout.published_match_dir(match_id)?, &approved_ids);

    info!(
        match_id,
        clusters = report.clusters_processed,
        generated = report.images_generated,
        failed = report.images_failed,
        skipped = report.images_skipped,
        removed = report.artifacts_removed,
        "publication finished"
    );
    if let Some(ref mut cb) = progress_cb {
        cb(PublishProgress::Complete(report));
    }
    Ok(report)
}

/// Path of the original photo a face was cropped from, if it is still on disk.
fn locate_original(catalog: &Catalog, face_id: &str) -> Result<Option<PathBuf>> {
    let face = catalog.get_face(face_id)?;
    let original = catalog
        .get_photo(&face.photo_id)?
        .map(|photo| photo.original_path)
        .filter(|path| path.is_file());
    Ok(original)
}

/// Delete artifacts in a cluster directory that are no longer part of its cover.
fn prune_cluster_dir(dir: &Path, keep: &HashSet<&str>) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if path.is_file() && !keep.contains(stem) && remove_logged(&path) {
            removed += 1;
        }
    }
    removed
}

/// Delete directories of clusters that are no longer approved (or no longer exist).
fn prune_match_dir(dir: &Path, approved: &HashSet<&str>) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        if !path.is_dir() || approved.contains(name.to_string_lossy().as_ref()) {
            continue;
        }
        let files: Vec<PathBuf> = fs::read_dir(&path)
            .map(|rd| rd.flatten().map(|e| e.path()).collect())
            .unwrap_or_default();
        removed += files.iter().filter(|f| f.is_file() && remove_logged(f)).count();
        if let Err(e) = fs::remove_dir(&path) {
            warn!(path = %path.display(), error = %e, "could not remove stale cluster directory");
        }
    }
    removed
}

fn remove_logged(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not remove stale artifact");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::*;
    use crate::domain::{Decision, Photo};
    use crate::error::Error;
    use image::RgbImage;

    struct Fixture {
        _tmp: tempfile::TempDir,
        layout: Layout,
        catalog: Catalog,
        match_id: String,
        settings: Settings,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let layout = Layout::new(tmp.path());
            let catalog = Catalog::open(&layout.catalog_path()).unwrap();
            let match_id = make_match(&catalog).id;
            let settings = Settings {
                publish_width: 120,
                ..Settings::default()
            };
            Self {
                _tmp: tmp,
                layout,
                catalog,
                match_id,
                settings,
            }
        }

        /// Photo with a real original on disk.
        fn photo(&self, id: &str) -> Photo {
            let original = self.layout.raw_path(&self.match_id, id, "png").unwrap();
            fs::create_dir_all(original.parent().unwrap()).unwrap();
            RgbImage::from_fn(240, 160, |x, y| image::Rgb([x as u8, y as u8, 128]))
                .save(&original)
                .unwrap();
            let photo = Photo {
                id: id.to_string(),
                match_id: self.match_id.clone(),
                original_name: format!("{id}.png"),
                original_path: original,
                preview_path: self.layout.preview_path(&self.match_id, id).unwrap(),
            };
            self.catalog.insert_photo(&photo).unwrap();
            photo
        }

        fn cluster(&self, decision: Decision, faces: &[(&str, f64)]) -> String {
            let id = self.catalog.insert_cluster(&self.match_id, decision).unwrap();
            for (face_id, blur) in faces {
                let photo = self.photo(&format!("p-{face_id}"));
                let mut f = face(&self.match_id, &photo.id, face_id, Some(&id));
                f.blur_score = *blur;
                self.catalog.insert_face(&f).unwrap();
            }
            id
        }

        fn publish(&self) -> PublishReport {
            publish(&self.catalog, &self.layout, &self.settings, &self.match_id, None).unwrap()
        }

        fn artifact(&self, cluster: &str, face: &str) -> PathBuf {
            self.layout.published_path(&self.match_id, cluster, face).unwrap()
        }
    }

    // ── Cover resolution ────────────────────────────────────────

    #[test]
    fn test_fallback_top_three_by_blur_is_persisted() {
        let fx = Fixture::new();
        let c = fx.cluster(
            Decision::Approved,
            &[("f1", 0.1), ("f2", 0.9), ("f3", 0.5), ("f4", 0.7)],
        );
        let cluster = fx.catalog.get_cluster(&c).unwrap();

        let resolved = resolve_covers(&fx.catalog, &cluster, MAX_COVER_FACES).unwrap();
        assert_eq!(resolved, vec!["f2", "f4", "f3"]);
        let persisted = fx.catalog.get_cluster(&c).unwrap().cover.unwrap();
        assert_eq!(persisted.face_ids(), resolved.as_slice());
    }

    #[test]
    fn test_persisted_cover_wins() {
        let fx = Fixture::new();
        let c = fx.cluster(Decision::Approved, &[("f1", 0.1), ("f2", 0.9)]);
        fx.catalog
            .set_cover(&c, Some(&CoverSelection::new(vec!["f1".into()]).unwrap()))
            .unwrap();
        let cluster = fx.catalog.get_cluster(&c).unwrap();
        assert_eq!(resolve_covers(&fx.catalog, &cluster, MAX_COVER_FACES).unwrap(), vec!["f1"]);
    }

    #[test]
    fn test_stale_cover_ids_are_dropped() {
        let fx = Fixture::new();
        let c = fx.cluster(Decision::Approved, &[("f1", 0.1), ("f2", 0.9)]);
        let mut cluster = fx.catalog.get_cluster(&c).unwrap();
        cluster.cover = Some(CoverSelection::new(vec!["gone".into(), "f1".into()]).unwrap());
        assert_eq!(resolve_covers(&fx.catalog, &cluster, MAX_COVER_FACES).unwrap(), vec!["f1"]);

        cluster.cover = Some(CoverSelection::new(vec!["gone".into()]).unwrap());
        assert_eq!(resolve_covers(&fx.catalog, &cluster, MAX_COVER_FACES).unwrap(), vec!["f2", "f1"]);
    }

    #[test]
    fn test_empty_cluster_resolves_to_nothing() {
        let fx = Fixture::new();
        let c = fx.cluster(Decision::Approved, &[]);
        let cluster = fx.catalog.get_cluster(&c).unwrap();
        assert!(resolve_covers(&fx.catalog, &cluster, MAX_COVER_FACES).unwrap().is_empty());
        assert_eq!(fx.catalog.get_cluster(&c).unwrap().cover, None);
    }

    // ── publish ─────────────────────────────────────────────────

    #[test]
    fn test_publish_renders_approved_only_and_marks_published() {
        let fx = Fixture::new();
        let approved = fx.cluster(Decision::Approved, &[("f1", 0.5), ("f2", 0.6)]);
        let rejected = fx.cluster(Decision::Rejected, &[("f3", 0.9)]);

        let report = fx.publish();
        assert_eq!(report.clusters_processed, 1);
        assert_eq!(report.images_generated, 2);
        assert_eq!(report.images_failed, 0);

        let img = image::open(fx.artifact(&approved, "f1")).unwrap();
        assert_eq!((img.width(), img.height()), (120, 80));
        assert!(!fx.artifact(&rejected, "f3").exists());
        assert_eq!(
            fx.catalog.get_match(&fx.match_id).unwrap().status,
            MatchStatus::Published
        );
    }

    #[test]
    fn test_unusable_font_still_publishes_with_builtin_glyphs() {
        let mut fx = Fixture::new();
        let c = fx.cluster(Decision::Approved, &[("f1", 0.5)]);
        fx.settings.watermark_font = Some(PathBuf::from("/nonexistent/font.ttf"));

        let report = fx.publish();
        assert_eq!(report.images_generated, 1);
        assert!(fx.artifact(&c, "f1").exists());
        assert_eq!(
            fx.catalog.get_match(&fx.match_id).unwrap().status,
            MatchStatus::Published
        );
    }

    #[test]
    fn test_republish_is_byte_identical() {
        let fx = Fixture::new();
        let c = fx.cluster(Decision::Approved, &[("f1", 0.5), ("f2", 0.6)]);
        fx.publish();
        let first = fs::read(fx.artifact(&c, "f2")).unwrap();
        let cover = fx.catalog.get_cluster(&c).unwrap().cover;

        let report = fx.publish();
        assert_eq!(report.images_generated, 2);
        assert_eq!(report.artifacts_removed, 0);
        assert_eq!(fs::read(fx.artifact(&c, "f2")).unwrap(), first);
        assert_eq!(fx.catalog.get_cluster(&c).unwrap().cover, cover);
    }

    #[test]
    fn test_missing_original_is_skipped() {
        let fx = Fixture::new();
        let c = fx.cluster(Decision::Approved, &[("f1", 0.5), ("f2", 0.6)]);
        let photo_id = fx.catalog.get_face("f1").unwrap().photo_id;
        fs::remove_file(fx.catalog.get_photo(&photo_id).unwrap().unwrap().original_path).unwrap();

        let report = fx.publish();
        assert_eq!(report.images_generated, 1);
        assert_eq!(report.images_skipped, 1);
        assert!(fx.artifact(&c, "f2").exists());
    }

    #[test]
    fn test_corrupt_original_fails_without_aborting() {
        let fx = Fixture::new();
        let c = fx.cluster(Decision::Approved, &[("f1", 0.5), ("f2", 0.6)]);
        let photo_id = fx.catalog.get_face("f1").unwrap().photo_id;
        let original = fx.catalog.get_photo(&photo_id).unwrap().unwrap().original_path;
        fs::write(original, b"garbage").unwrap();

        let mut events = Vec::new();
        let report = publish(
            &fx.catalog,
            &fx.layout,
            &fx.settings,
            &fx.match_id,
            Some(&mut |p| {
                events.push(match p {
                    PublishProgress::Start { .. } => "start",
                    PublishProgress::ClusterStart { .. } => "cluster",
                    PublishProgress::Rendered { .. } => "rendered",
                    PublishProgress::Skipped { .. } => "skipped",
                    PublishProgress::Failed { .. } => "failed",
                    PublishProgress::Complete(_) => "complete",
                })
            }),
        )
        .unwrap();
        assert_eq!(report.images_failed, 1);
        assert_eq!(report.images_generated, 1);
        assert!(fx.artifact(&c, "f2").exists());
        assert_eq!(events.first(), Some(&"start"));
        assert_eq!(events.last(), Some(&"complete"));
        assert!(events.contains(&"failed"));
    }

    #[test]
    fn test_changed_cover_prunes_old_artifacts() {
        let fx = Fixture::new();
        let c = fx.cluster(Decision::Approved, &[("f1", 0.5), ("f2", 0.6), ("f3", 0.7)]);
        fx.publish();
        assert!(fx.artifact(&c, "f1").exists());

        fx.catalog
            .set_cover(&c, Some(&CoverSelection::new(vec!["f3".into()]).unwrap()))
            .unwrap();
        let report = fx.publish();
        assert_eq!(report.artifacts_removed, 2);
        assert!(fx.artifact(&c, "f3").exists());
        assert!(!fx.artifact(&c, "f1").exists());
        assert!(!fx.artifact(&c, "f2").exists());
    }

    #[test]
    fn test_unapproved_cluster_artifacts_removed() {
        let fx = Fixture::new();
        let c = fx.cluster(Decision::Approved, &[("f1", 0.5)]);
        fx.publish();
        fx.catalog.set_decision(&c, Decision::NeedsReview).unwrap();

        let report = fx.publish();
        assert_eq!(report.clusters_processed, 0);
        assert_eq!(report.artifacts_removed, 1);
        assert!(!fx
            .layout
            .published_cluster_dir(&fx.match_id, &c)
            .unwrap()
            .exists());
    }

    #[test]
    fn test_publish_unknown_match() {
        let fx = Fixture::new();
        let err = publish(&fx.catalog, &fx.layout, &fx.settings, "ghost", None).unwrap_err();
        assert!(matches!(err, Error::MatchNotFound(_)));
    }
}
