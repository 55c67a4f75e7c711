use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use image::ImageFormat;
use zip::write::SimpleFileOptions;

use matchpack_core::curation::{ClusterUpdate, MergeRequest};
use matchpack_core::domain::{Decision, Face, MatchStatus};
use matchpack_core::error::{Error, ErrorKind};
use matchpack_core::import::jobs::{InMemoryJobStore, JobStatus, JobStore};
use matchpack_core::publish::PublishProgress;
use matchpack_core::Curator;

/// Encode a gradient image seeded by `seed` so every fixture is distinct.
fn image_bytes(w: u32, h: u32, seed: u8, format: ImageFormat) -> Vec<u8> {
    let img = image::RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([
            seed.wrapping_add((x * 3) as u8),
            seed.wrapping_add((y * 3) as u8),
            seed.wrapping_add(((x + y) * 2) as u8),
        ])
    });
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn write_zip(path: &Path, files: &[(&str, Vec<u8>)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, bytes) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

fn open(root: &Path) -> (Curator, String) {
    let curator = Curator::open(root).unwrap();
    let m = curator
        .create_match("Harbour FC vs Rovers", NaiveDate::from_ymd_opt(2024, 9, 14).unwrap())
        .unwrap();
    (curator, m.id)
}

/// Import a three-photo archive and wait for the worker.
fn import_fixture(curator: &Curator, match_id: &str, dir: &Path) {
    let archive = dir.join("upload.zip");
    write_zip(
        &archive,
        &[
            ("IMG_001.JPG", image_bytes(900, 600, 10, ImageFormat::Jpeg)),
            ("set/IMG_002.png", image_bytes(300, 200, 80, ImageFormat::Png)),
            ("IMG_003.jpeg", image_bytes(640, 480, 160, ImageFormat::Jpeg)),
            ("__MACOSX/._IMG_001.JPG", b"resource fork".to_vec()),
            ("notes.txt", b"not a photo".to_vec()),
        ],
    );
    let handle = curator.start_import(match_id, &archive).unwrap();
    assert_eq!(handle.total(), 3);
    handle.join().unwrap();
}

/// Stand in for the external clustering step: one face per photo, with
/// embeddings, all written into a single cluster.
fn cluster_all(curator: &Curator, match_id: &str, crops: &Path) -> (String, Vec<String>) {
    let catalog = curator.catalog();
    let cluster_id = catalog.insert_cluster(match_id, Decision::Pending).unwrap();
    let mut face_ids = Vec::new();
    for (i, photo) in catalog.list_photos(match_id).unwrap().iter().enumerate() {
        let face_id = format!("face-{i}");
        let crop_path: PathBuf = crops.join(format!("{face_id}.jpg"));
        fs::write(&crop_path, image_bytes(32, 32, i as u8, ImageFormat::Jpeg)).unwrap();
        catalog
            .insert_face(&Face {
                id: face_id.clone(),
                match_id: match_id.to_string(),
                photo_id: photo.id.clone(),
                cluster_id: Some(cluster_id.clone()),
                crop_path,
                bbox: None,
                score: 0.99,
                embedding: Some(vec![i as f32, 0.0]),
                blur_score: 0.2 * (i + 1) as f64,
                face_count: 1,
                secondary_score: None,
            })
            .unwrap();
        face_ids.push(face_id);
    }
    (cluster_id, face_ids)
}

// ── Import ───────────────────────────────────────────────────────

#[test]
fn test_import_registers_photos_and_previews() {
    let tmp = tempfile::tempdir().unwrap();
    let (curator, m) = open(&tmp.path().join("root"));
    import_fixture(&curator, &m, tmp.path());

    let job = curator.import_status(&m).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.total, job.processed, job.failed), (3, 3, 0));

    let photos = curator.catalog().list_photos(&m).unwrap();
    assert_eq!(photos.len(), 3);
    for photo in &photos {
        assert!(photo.original_path.is_file());
        let preview = image::open(&photo.preview_path).unwrap();
        assert!(preview.width() <= 400);
    }
    // Small originals are never enlarged
    let small = photos.iter().find(|p| p.original_name == "IMG_002.png").unwrap();
    assert_eq!(image::open(&small.preview_path).unwrap().width(), 300);

    // Temp copy is gone
    let temp = curator.layout().temp_dir();
    assert_eq!(fs::read_dir(&temp).map(|rd| rd.count()).unwrap_or(0), 0);
}

#[test]
fn test_import_counts_corrupt_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let (curator, m) = open(&tmp.path().join("root"));
    let archive = tmp.path().join("upload.zip");
    write_zip(
        &archive,
        &[
            ("good.png", image_bytes(64, 64, 1, ImageFormat::Png)),
            ("broken.jpg", b"definitely not a jpeg".to_vec()),
        ],
    );
    curator.start_import(&m, &archive).unwrap().join().unwrap();

    let job = curator.import_status(&m).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.processed, job.failed), (2, 1));
    assert_eq!(curator.catalog().count_photos(&m).unwrap(), 1);
}

#[test]
fn test_unreadable_archive_fails_synchronously() {
    let tmp = tempfile::tempdir().unwrap();
    let (curator, m) = open(&tmp.path().join("root"));
    let archive = tmp.path().join("upload.zip");
    fs::write(&archive, b"PK but not really").unwrap();

    let err = curator.start_import(&m, &archive).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(curator.import_status(&m).is_none());
    let temp = curator.layout().temp_dir();
    assert_eq!(fs::read_dir(&temp).map(|rd| rd.count()).unwrap_or(0), 0);
}

#[test]
fn test_second_import_rejected_while_processing() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = Arc::new(InMemoryJobStore::new());
    let curator = Curator::with_job_store(&tmp.path().join("root"), jobs.clone()).unwrap();
    let m = curator
        .create_match("Cup", NaiveDate::from_ymd_opt(2024, 9, 1).unwrap())
        .unwrap()
        .id;
    jobs.create_job(&m, 10).unwrap();

    let archive = tmp.path().join("upload.zip");
    write_zip(&archive, &[("a.png", image_bytes(16, 16, 0, ImageFormat::Png))]);
    let err = curator.start_import(&m, &archive).unwrap_err();
    assert!(matches!(err, Error::ImportInProgress(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(curator.import_status(&m).unwrap().total, 10);
}

#[test]
fn test_import_into_unknown_match() {
    let tmp = tempfile::tempdir().unwrap();
    let (curator, _) = open(&tmp.path().join("root"));
    let err = curator
        .start_import("missing", &tmp.path().join("upload.zip"))
        .unwrap_err();
    assert!(matches!(err, Error::MatchNotFound(_)));
}

// ── Curation through publication ─────────────────────────────────

#[test]
fn test_full_pipeline_publishes_deterministically() {
    let tmp = tempfile::tempdir().unwrap();
    let crops = tmp.path().join("crops");
    fs::create_dir_all(&crops).unwrap();
    let (mut curator, m) = open(&tmp.path().join("root"));
    import_fixture(&curator, &m, tmp.path());
    let (cluster, faces) = cluster_all(&curator, &m, &crops);

    curator.mark_reviewed(&m).unwrap();
    curator
        .update_cluster(
            &cluster,
            &ClusterUpdate {
                decision: Some(Decision::Approved),
                covers: None,
            },
        )
        .unwrap();

    let mut rendered = Vec::new();
    let report = curator
        .publish(
            &m,
            Some(&mut |p| {
                if let PublishProgress::Rendered { face_id, .. } = p {
                    rendered.push(face_id);
                }
            }),
        )
        .unwrap();
    assert_eq!(report.clusters_processed, 1);
    assert_eq!(report.images_generated, 3);
    assert_eq!(rendered.len(), 3);
    assert_eq!(curator.get_match(&m).unwrap().status, MatchStatus::Published);

    // No explicit cover: the sharpest faces were chosen and persisted
    let cover = curator.catalog().get_cluster(&cluster).unwrap().cover.unwrap();
    assert_eq!(cover.face_ids(), &[faces[2].clone(), faces[1].clone(), faces[0].clone()]);

    let first = curator.published_preview(&m, &cluster, &faces[0]).unwrap();
    let report = curator.publish(&m, None).unwrap();
    assert_eq!(report.images_generated, 3);
    let second = curator.published_preview(&m, &cluster, &faces[0]).unwrap();
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.etag, second.etag);
    assert_eq!(
        curator.catalog().get_cluster(&cluster).unwrap().cover.unwrap(),
        cover
    );
}

#[test]
fn test_merge_detach_then_publish_drops_stale_cover() {
    let tmp = tempfile::tempdir().unwrap();
    let crops = tmp.path().join("crops");
    fs::create_dir_all(&crops).unwrap();
    let (mut curator, m) = open(&tmp.path().join("root"));
    import_fixture(&curator, &m, tmp.path());
    let (a, faces) = cluster_all(&curator, &m, &crops);
    let b = curator.catalog().insert_cluster(&m, Decision::Pending).unwrap();

    // Drop the sharpest face, then fold an empty cluster into `a`
    curator.detach_face(&m, &a, &faces[2]).unwrap();
    let update = ClusterUpdate {
        decision: Some(Decision::Approved),
        covers: Some(vec![faces[0].clone(), faces[1].clone()]),
    };
    curator.update_cluster(&a, &update).unwrap();
    let outcome = curator
        .merge_clusters(&m, &MergeRequest::new(vec![a.clone(), b.clone()]))
        .unwrap();
    assert_eq!(outcome.target, a);
    assert_eq!(outcome.absorbed, vec![b.clone()]);
    assert!(matches!(
        curator.catalog().get_cluster(&b),
        Err(Error::ClusterNotFound(_))
    ));

    // Covered face leaves the cluster; the cover still names it
    curator.detach_face(&m, &a, &faces[0]).unwrap();
    let report = curator.publish(&m, None).unwrap();
    assert_eq!(report.images_generated, 1);
    assert!(curator.published_preview(&m, &a, &faces[1]).is_ok());
    assert!(matches!(
        curator.published_preview(&m, &a, &faces[0]),
        Err(Error::PreviewNotFound(_))
    ));
}

#[test]
fn test_face_preview_serves_crop_with_etag() {
    let tmp = tempfile::tempdir().unwrap();
    let crops = tmp.path().join("crops");
    fs::create_dir_all(&crops).unwrap();
    let (curator, m) = open(&tmp.path().join("root"));
    import_fixture(&curator, &m, tmp.path());
    let (_, faces) = cluster_all(&curator, &m, &crops);

    let preview = curator.face_preview(&m, &faces[1]).unwrap();
    assert_eq!(preview.bytes, fs::read(crops.join("face-1.jpg")).unwrap());
    assert_eq!(preview.content_type, "image/jpeg");
    assert!(preview.etag.starts_with('"') && preview.etag.ends_with('"'));
}

#[test]
fn test_settings_persist_across_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("root");
    {
        let curator = Curator::open(&root).unwrap();
        curator.set_setting("publish_width", "640").unwrap();
        assert!(matches!(
            curator.set_setting("publish_width", "wide"),
            Err(Error::InvalidSetting { .. })
        ));
    }
    let curator = Curator::open(&root).unwrap();
    assert_eq!(curator.settings().unwrap().publish_width, 640);
}
