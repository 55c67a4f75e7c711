pub mod catalog;
pub mod clustering;
pub mod config;
pub mod curation;
pub mod domain;
pub mod error;
pub mod hasher;
pub mod imaging;
pub mod import;
pub mod layout;
pub mod publish;
pub mod selection;

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use catalog::Catalog;
use config::Settings;
use curation::{ClusterUpdate, MergeOutcome, MergeRequest};
use domain::*;
use error::{Error, Result};
use hasher::PreviewBytes;
use import::jobs::{InMemoryJobStore, ImportJob, JobStatus, JobStore};
use import::{ImportHandle, ImportOptions};
use layout::Layout;
use publish::{PublishProgress, PublishReport};
use selection::{dedupe_by_photo, select_best_shots, Candidate};

/// The main entry point for the matchpack library.
///
/// Owns the catalog connection, the on-disk layout under the data root and
/// the import job store shared with background workers.
pub struct Curator {
    catalog: Catalog,
    layout: Layout,
    jobs: Arc<dyn JobStore>,
}

impl Curator {
    /// Open or create a data root, with a process-local job store.
    pub fn open(root: &Path) -> Result<Self> {
        Self::with_job_store(root, Arc::new(InMemoryJobStore::new()))
    }

    pub fn with_job_store(root: &Path, jobs: Arc<dyn JobStore>) -> Result<Self> {
        let layout = Layout::new(root);
        let catalog = Catalog::open(&layout.catalog_path())?;
        Ok(Self {
            catalog,
            layout,
            jobs,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn settings(&self) -> Result<Settings> {
        Settings::load(&self.catalog)
    }

    /// Validate and persist one setting. Returns the resulting settings.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<Settings> {
        Settings::set(&self.catalog, key, value)
    }

    // ── Matches ─────────────────────────────────────────────────────

    pub fn create_match(&self, title: &str, date: NaiveDate) -> Result<Match> {
        let m = self.catalog.create_match(title, date)?;
        info!(match_id = %m.id, title, "match created");
        Ok(m)
    }

    /// All matches, newest first.
    pub fn matches(&self) -> Result<Vec<Match>> {
        self.catalog.list_matches()
    }

    pub fn get_match(&self, match_id: &str) -> Result<Match> {
        self.catalog.get_match(match_id)
    }

    pub fn summary(&self, match_id: &str) -> Result<MatchSummary> {
        self.catalog.get_match(match_id)?;
        self.catalog.match_summary(match_id)
    }

    /// Returns the status the match had before.
    pub fn mark_reviewed(&self, match_id: &str) -> Result<MatchStatus> {
        self.catalog.set_match_status(match_id, MatchStatus::Reviewed)
    }

    // ── Import ──────────────────────────────────────────────────────

    /// Start importing a photo archive into a match on a background thread.
    ///
    /// Archive and job errors are returned here; per-entry failures are only
    /// visible through [`Curator::import_status`].
    pub fn start_import(&self, match_id: &str, archive: &Path) -> Result<ImportHandle> {
        self.catalog.get_match(match_id)?;
        let options = ImportOptions::from(&self.settings()?);
        import::start(&self.layout, Arc::clone(&self.jobs), options, match_id, archive)
    }

    pub fn import_status(&self, match_id: &str) -> Option<ImportJob> {
        self.jobs.get_job(match_id)
    }

    pub fn remove_job(&self, match_id: &str) -> bool {
        self.jobs.remove_job(match_id)
    }

    // ── Clusters ────────────────────────────────────────────────────

    pub fn clusters(&self, match_id: &str) -> Result<Vec<Cluster>> {
        self.catalog.get_match(match_id)?;
        self.catalog.list_clusters(match_id)
    }

    /// Faces of a cluster, in member order. The cluster must belong to the match.
    pub fn cluster_faces(&self, match_id: &str, cluster_id: &str) -> Result<Vec<Face>> {
        self.cluster_in_match(match_id, cluster_id)?;
        self.catalog.list_cluster_faces(match_id, cluster_id)
    }

    /// Diverse best shots of a cluster, one face per source photo at most.
    pub fn suggest_covers(&self, cluster_id: &str) -> Result<Vec<String>> {
        let settings = self.settings()?;
        let cluster = self.catalog.get_cluster(cluster_id)?;
        let faces = self.catalog.list_cluster_faces(&cluster.match_id, &cluster.id)?;
        let candidates: Vec<Candidate<'_>> = dedupe_by_photo(&faces)
            .into_iter()
            .map(Candidate::from)
            .collect();
        Ok(select_best_shots(
            &candidates,
            settings.max_covers,
            settings.diversity_threshold,
        ))
    }

    /// The cover an operator sees: the persisted selection while any of it is
    /// still in the cluster, otherwise a fresh suggestion. Nothing is written.
    pub fn effective_covers(&self, cluster_id: &str) -> Result<Vec<String>> {
        let cluster = self.catalog.get_cluster(cluster_id)?;
        let persisted: Vec<String> = cluster
            .cover
            .as_ref()
            .map(|cover| {
                cover
                    .face_ids()
                    .iter()
                    .filter(|id| cluster.has_member(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if persisted.is_empty() {
            self.suggest_covers(cluster_id)
        } else {
            Ok(persisted)
        }
    }

    pub fn update_cluster(&mut self, cluster_id: &str, update: &ClusterUpdate) -> Result<Cluster> {
        let max_covers = self.settings()?.max_covers;
        curation::update_cluster(&mut self.catalog, cluster_id, update, max_covers)
    }

    pub fn merge_clusters(&mut self, match_id: &str, request: &MergeRequest) -> Result<MergeOutcome> {
        self.catalog.get_match(match_id)?;
        curation::merge(&mut self.catalog, match_id, request)
    }

    /// Returns the cluster's remaining members.
    pub fn detach_face(&mut self, match_id: &str, cluster_id: &str, face_id: &str) -> Result<Vec<String>> {
        curation::detach_face(&mut self.catalog, match_id, cluster_id, face_id)
    }

    // ── Publication ─────────────────────────────────────────────────

    /// Render watermarked previews for every approved cluster of a match.
    /// Calls `progress_cb` with progress updates if provided.
    pub fn publish(
        &self,
        match_id: &str,
        progress_cb: Option<&mut dyn FnMut(PublishProgress)>,
    ) -> Result<PublishReport> {
        let settings = self.settings()?;
        publish::publish(&self.catalog, &self.layout, &settings, match_id, progress_cb)
    }

    // ── External clustering ─────────────────────────────────────────

    /// Replace a match's clusters with a fresh run of the clustering command.
    /// Returns the number of clusters it produced.
    pub fn generate_clusters(&mut self, match_id: &str) -> Result<usize> {
        self.catalog.get_match(match_id)?;
        if self
            .jobs
            .get_job(match_id)
            .is_some_and(|job| job.status == JobStatus::Processing)
        {
            return Err(Error::ImportInProgress(match_id.to_string()));
        }
        if self.catalog.count_photos(match_id)? == 0 {
            return Err(Error::NoPhotos(match_id.to_string()));
        }
        let command = self
            .settings()?
            .clustering_command
            .ok_or(Error::ClusteringNotConfigured)?;

        let removed = self.catalog.delete_clusters_for_match(match_id)?;
        info!(match_id, removed, "cleared existing clusters");
        clustering::run_clustering(&command, &self.layout.catalog_path(), match_id)?;

        let clusters = self.catalog.rebuild_member_caches(match_id)?;
        info!(match_id, clusters, "clustering finished");
        Ok(clusters)
    }

    // ── Preview bytes ───────────────────────────────────────────────

    /// The face crop the clustering step wrote.
    pub fn face_preview(&self, match_id: &str, face_id: &str) -> Result<PreviewBytes> {
        let face = self.catalog.get_face(face_id)?;
        if face.match_id != match_id {
            return Err(Error::FaceNotFound(face_id.to_string()));
        }
        PreviewBytes::read(&face.crop_path)
    }

    /// A watermarked publication artifact.
    pub fn published_preview(&self, match_id: &str, cluster_id: &str, face_id: &str) -> Result<PreviewBytes> {
        PreviewBytes::read(&self.layout.published_path(match_id, cluster_id, face_id)?)
    }

    fn cluster_in_match(&self, match_id: &str, cluster_id: &str) -> Result<Cluster> {
        let cluster = self.catalog.get_cluster(cluster_id)?;
        if cluster.match_id != match_id {
            return Err(Error::ClusterNotFound(cluster_id.to_string()));
        }
        Ok(cluster)
    }
}
