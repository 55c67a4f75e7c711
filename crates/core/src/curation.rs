//! Cluster edits that must never be observed half-applied.
//!
//! Every operation here runs inside a single store transaction. Any error
//! drops the transaction, which rolls back whatever was written.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{load_cluster, refresh_member_cache, write_cover, Catalog};
use crate::domain::{Cluster, CoverSelection, Decision};
use crate::error::{Error, Result};

/// Fold several clusters into one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeRequest {
    pub sources: Vec<String>,
    /// Defaults to the first source.
    pub target: Option<String>,
}

impl MergeRequest {
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources,
            target: None,
        }
    }

    pub fn into_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Partial update of a cluster. At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterUpdate {
    pub decision: Option<Decision>,
    /// An empty list clears the selection.
    pub covers: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub target: String,
    /// Source clusters that were absorbed and deleted.
    pub absorbed: Vec<String>,
    pub faces_moved: usize,
}

fn cluster_match(conn: &Connection, cluster_id: &str) -> Result<Option<String>> {
    let match_id = conn
        .query_row(
            "SELECT match_id FROM clusters WHERE id = ?1",
            params![cluster_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match_id)
}

/// Move every face of the source clusters into the target and delete the sources.
///
/// Sources that no longer exist count as already absorbed, so repeating a
/// completed merge is a successful no-op. Sources from another match are an error.
pub fn merge(catalog: &mut Catalog, match_id: &str, request: &MergeRequest) -> Result<MergeOutcome> {
    let mut distinct: Vec<&str> = Vec::with_capacity(request.sources.len());
    for source in &request.sources {
        if !distinct.contains(&source.as_str()) {
            distinct.push(source);
        }
    }
    if distinct.len() < 2 {
        return Err(Error::InsufficientSources(distinct.len()));
    }
    let target = request.target.as_deref().unwrap_or(distinct[0]);

    let tx = catalog.transaction()?;
    match cluster_match(&tx, target)? {
        Some(m) if m == match_id => {}
        _ => return Err(Error::ClusterNotFound(target.to_string())),
    }

    let mut absorbed = Vec::new();
    for source in distinct.into_iter().filter(|s| *s != target) {
        match cluster_match(&tx, source)? {
            None => debug!(cluster_id = source, "merge source already absorbed"),
            Some(m) if m == match_id => absorbed.push(source.to_string()),
            Some(_) => return Err(Error::ClusterNotFound(source.to_string())),
        }
    }
    if absorbed.is_empty() {
        return Ok(MergeOutcome {
            target: target.to_string(),
            absorbed,
            faces_moved: 0,
        });
    }

    let mut next_position: i64 = tx.query_row(
        "SELECT COUNT(*) FROM cluster_members WHERE cluster_id = ?1",
        params![target],
        |row| row.get(0),
    )?;
    let mut faces_moved = 0;
    for source in &absorbed {
        // Carry the cached order over so absorbed members follow the target's own
        let cached: i64 = tx.query_row(
            "SELECT COUNT(*) FROM cluster_members WHERE cluster_id = ?1",
            params![source],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE cluster_members SET cluster_id = ?1, position = position + ?2
             WHERE cluster_id = ?3",
            params![target, next_position, source],
        )?;
        next_position += cached;

        faces_moved += tx.execute(
            "UPDATE faces SET cluster_id = ?1 WHERE cluster_id = ?2",
            params![target, source],
        )?;
        tx.execute("DELETE FROM clusters WHERE id = ?1", params![source])?;
    }
    let members = refresh_member_cache(&tx, target)?;
    tx.commit()?;

    info!(
        match_id,
        target,
        absorbed = absorbed.len(),
        faces_moved,
        members = members.len(),
        "clusters merged"
    );
    Ok(MergeOutcome {
        target: target.to_string(),
        absorbed,
        faces_moved,
    })
}

/// Take a face out of its cluster. Returns the cluster's remaining members.
pub fn detach_face(
    catalog: &mut Catalog,
    match_id: &str,
    cluster_id: &str,
    face_id: &str,
) -> Result<Vec<String>> {
    let tx = catalog.transaction()?;
    let detached = tx.execute(
        "UPDATE faces SET cluster_id = NULL
         WHERE id = ?1 AND cluster_id = ?2 AND match_id = ?3",
        params![face_id, cluster_id, match_id],
    )?;
    if detached == 0 {
        return Err(Error::FaceNotInCluster {
            face_id: face_id.to_string(),
            cluster_id: cluster_id.to_string(),
        });
    }
    let members = refresh_member_cache(&tx, cluster_id)?;
    tx.commit()?;

    info!(match_id, cluster_id, face_id, remaining = members.len(), "face detached");
    Ok(members)
}

/// Validate the cover list against the cluster before anything is written.
fn validate_covers(cluster: &Cluster, face_ids: &[String], max_covers: usize) -> Result<CoverSelection> {
    if face_ids.len() > max_covers {
        return Err(Error::InvalidCoverSelection(format!(
            "at most {max_covers} faces allowed, got {}",
            face_ids.len()
        )));
    }
    let cover = CoverSelection::new(face_ids.to_vec())?;
    if let Some(stranger) = cover.face_ids().iter().find(|id| !cluster.has_member(id)) {
        return Err(Error::InvalidCoverSelection(format!(
            "face {stranger} is not a member of cluster {}",
            cluster.id
        )));
    }
    Ok(cover)
}

/// Apply a decision and/or cover selection to a cluster. Returns the updated cluster.
pub fn update_cluster(
    catalog: &mut Catalog,
    cluster_id: &str,
    update: &ClusterUpdate,
    max_covers: usize,
) -> Result<Cluster> {
    if update.decision.is_none() && update.covers.is_none() {
        return Err(Error::NoUpdates);
    }

    let tx = catalog.transaction()?;
    let cluster = load_cluster(&tx, cluster_id)?;
    let cover = update
        .covers
        .as_deref()
        .map(|ids| validate_covers(&cluster, ids, max_covers))
        .transpose()?;

    if let Some(decision) = update.decision {
        tx.execute(
            "UPDATE clusters SET decision = ?1 WHERE id = ?2",
            params![decision.as_str(), cluster_id],
        )?;
    }
    if let Some(cover) = &cover {
        write_cover(&tx, cluster_id, Some(cover).filter(|c| !c.is_empty()))?;
    }
    let updated = load_cluster(&tx, cluster_id)?;
    tx.commit()?;

    debug!(cluster_id, decision = %updated.decision, "cluster updated");
    Ok(updated)
}
