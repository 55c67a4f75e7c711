use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{conversion_error, now_timestamp, Catalog};
use crate::domain::*;
use crate::error::{Error, Result};

const FACE_COLUMNS: &str = "f.id, f.match_id, f.photo_id, f.cluster_id, f.crop_path,
     f.bbox_x, f.bbox_y, f.bbox_w, f.bbox_h, f.score, f.embedding,
     f.blur_score, f.face_count, f.secondary_score";

/// Embeddings are stored as packed little-endian f32 values.
pub(crate) fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn face_from_row(row: &Row<'_>) -> rusqlite::Result<Face> {
    let bbox = match (
        row.get::<_, Option<f64>>(5)?,
        row.get::<_, Option<f64>>(6)?,
        row.get::<_, Option<f64>>(7)?,
        row.get::<_, Option<f64>>(8)?,
    ) {
        (Some(x), Some(y), Some(width), Some(height)) => Some(BoundingBox {
            x,
            y,
            width,
            height,
        }),
        _ => None,
    };

    Ok(Face {
        id: row.get(0)?,
        match_id: row.get(1)?,
        photo_id: row.get(2)?,
        cluster_id: row.get(3)?,
        crop_path: PathBuf::from(row.get::<_, String>(4)?),
        bbox,
        score: row.get(9)?,
        embedding: row
            .get::<_, Option<Vec<u8>>>(10)?
            .map(|bytes| decode_embedding(&bytes)),
        blur_score: row.get(11)?,
        face_count: row.get::<_, i64>(12)?.max(0) as u32,
        secondary_score: row.get(13)?,
    })
}

fn parse_decision(column: usize, value: String) -> rusqlite::Result<Decision> {
    value.parse().map_err(|e: Error| conversion_error(column, e))
}

/// Load a cluster with its cached members and cover selection.
pub(crate) fn load_cluster(conn: &Connection, cluster_id: &str) -> Result<Cluster> {
    let (match_id, decision) = conn
        .query_row(
            "SELECT match_id, decision FROM clusters WHERE id = ?1",
            params![cluster_id],
            |row| Ok((row.get::<_, String>(0)?, parse_decision(1, row.get(1)?)?)),
        )
        .optional()?
        .ok_or_else(|| Error::ClusterNotFound(cluster_id.to_string()))?;

    let member_ids = conn
        .prepare("SELECT face_id FROM cluster_members WHERE cluster_id = ?1 ORDER BY position")?
        .query_map(params![cluster_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    let cover_ids = conn
        .prepare("SELECT face_id FROM cluster_covers WHERE cluster_id = ?1 ORDER BY position")?
        .query_map(params![cluster_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(Cluster {
        id: cluster_id.to_string(),
        match_id,
        member_ids,
        decision,
        cover: stored_cover(cover_ids),
    })
}

/// Rows in `cluster_covers` were validated on write; an empty set means no selection.
fn stored_cover(face_ids: Vec<String>) -> Option<CoverSelection> {
    if face_ids.is_empty() {
        None
    } else {
        CoverSelection::new(face_ids).ok()
    }
}

/// Recompute the cached member list of a cluster from the faces pointing at it.
/// Faces already cached keep their relative order; newcomers are appended in
/// insertion order.
pub(crate) fn refresh_member_cache(conn: &Connection, cluster_id: &str) -> Result<Vec<String>> {
    let member_ids = conn
        .prepare(
            "SELECT f.id FROM faces f
             LEFT JOIN cluster_members cm ON cm.face_id = f.id AND cm.cluster_id = ?1
             WHERE f.cluster_id = ?1
             ORDER BY cm.position IS NULL, cm.position, f.rowid",
        )?
        .query_map(params![cluster_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    conn.execute(
        "DELETE FROM cluster_members WHERE cluster_id = ?1",
        params![cluster_id],
    )?;
    let mut insert = conn.prepare(
        "INSERT INTO cluster_members (cluster_id, position, face_id) VALUES (?1, ?2, ?3)",
    )?;
    for (position, face_id) in member_ids.iter().enumerate() {
        insert.execute(params![cluster_id, position as i64, face_id])?;
    }
    Ok(member_ids)
}

/// Replace the persisted cover selection. `None` or an empty selection clears it.
pub(crate) fn write_cover(
    conn: &Connection,
    cluster_id: &str,
    cover: Option<&CoverSelection>,
) -> Result<()> {
    conn.execute(
        "DELETE FROM cluster_covers WHERE cluster_id = ?1",
        params![cluster_id],
    )?;
    if let Some(cover) = cover {
        let mut insert = conn.prepare(
            "INSERT INTO cluster_covers (cluster_id, position, face_id) VALUES (?1, ?2, ?3)",
        )?;
        for (position, face_id) in cover.face_ids().iter().enumerate() {
            insert.execute(params![cluster_id, position as i64, face_id])?;
        }
    }
    Ok(())
}

impl Catalog {
    // ── Clusters ─────────────────────────────────────────────────────

    /// Create an empty cluster. Used by the clustering step that fills the store.
    pub fn insert_cluster(&self, match_id: &str, decision: Decision) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO clusters (id, match_id, decision, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, match_id, decision.as_str(), now_timestamp()],
        )?;
        Ok(id)
    }

    pub fn get_cluster(&self, cluster_id: &str) -> Result<Cluster> {
        load_cluster(&self.conn, cluster_id)
    }

    /// All clusters of a match in creation order, members and covers included.
    pub fn list_clusters(&self, match_id: &str) -> Result<Vec<Cluster>> {
        let mut members: HashMap<String, Vec<String>> = HashMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT cm.cluster_id, cm.face_id FROM cluster_members cm
             JOIN clusters c ON c.id = cm.cluster_id
             WHERE c.match_id = ?1
             ORDER BY cm.cluster_id, cm.position",
        )?;
        let rows = stmt.query_map(params![match_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (cluster_id, face_id) = row?;
            members.entry(cluster_id).or_default().push(face_id);
        }

        let mut covers: HashMap<String, Vec<String>> = HashMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT cc.cluster_id, cc.face_id FROM cluster_covers cc
             JOIN clusters c ON c.id = cc.cluster_id
             WHERE c.match_id = ?1
             ORDER BY cc.cluster_id, cc.position",
        )?;
        let rows = stmt.query_map(params![match_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (cluster_id, face_id) = row?;
            covers.entry(cluster_id).or_default().push(face_id);
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, match_id, decision FROM clusters WHERE match_id = ?1
             ORDER BY created_at, rowid",
        )?;
        let clusters = stmt
            .query_map(params![match_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    parse_decision(2, row.get(2)?)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id, match_id, decision)| Cluster {
                member_ids: members.remove(&id).unwrap_or_default(),
                cover: stored_cover(covers.remove(&id).unwrap_or_default()),
                id,
                match_id,
                decision,
            })
            .collect();
        Ok(clusters)
    }

    pub fn set_decision(&self, cluster_id: &str, decision: Decision) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE clusters SET decision = ?1 WHERE id = ?2",
            params![decision.as_str(), cluster_id],
        )?;
        if updated == 0 {
            return Err(Error::ClusterNotFound(cluster_id.to_string()));
        }
        Ok(())
    }

    /// Persist a cover selection as-is. Membership checks are the caller's concern.
    pub fn set_cover(&self, cluster_id: &str, cover: Option<&CoverSelection>) -> Result<()> {
        write_cover(&self.conn, cluster_id, cover)
    }

    /// Delete a single cluster. Its faces become unclustered.
    pub fn delete_cluster(&self, cluster_id: &str) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM clusters WHERE id = ?1", params![cluster_id])?;
        if deleted == 0 {
            return Err(Error::ClusterNotFound(cluster_id.to_string()));
        }
        Ok(())
    }

    /// Delete every cluster of a match. Returns how many were removed.
    pub fn delete_clusters_for_match(&self, match_id: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM clusters WHERE match_id = ?1", params![match_id])?;
        Ok(deleted)
    }

    /// Recompute every cluster's member cache for a match in one transaction.
    /// Needed after the external clustering step writes faces directly.
    pub fn rebuild_member_caches(&mut self, match_id: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let cluster_ids = tx
            .prepare("SELECT id FROM clusters WHERE match_id = ?1")?
            .query_map(params![match_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        for cluster_id in &cluster_ids {
            refresh_member_cache(&tx, cluster_id)?;
        }
        tx.commit()?;
        Ok(cluster_ids.len())
    }

    // ── Faces ────────────────────────────────────────────────────────

    /// Register a face. When it names a cluster, that cluster must be in the
    /// same match, and its member cache is refreshed.
    pub fn insert_face(&self, face: &Face) -> Result<()> {
        if let Some(cluster_id) = &face.cluster_id {
            let cluster_match: String = self
                .conn
                .query_row(
                    "SELECT match_id FROM clusters WHERE id = ?1",
                    params![cluster_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| Error::ClusterNotFound(cluster_id.clone()))?;
            if cluster_match != face.match_id {
                return Err(Error::ClusterMatchMismatch {
                    cluster_id: cluster_id.clone(),
                    cluster_match,
                    match_id: face.match_id.clone(),
                });
            }
        }

        self.conn.execute(
            "INSERT INTO faces (id, match_id, photo_id, cluster_id, crop_path,
                bbox_x, bbox_y, bbox_w, bbox_h, score, embedding,
                blur_score, face_count, secondary_score, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                face.id,
                face.match_id,
                face.photo_id,
                face.cluster_id,
                face.crop_path.to_string_lossy(),
                face.bbox.map(|b| b.x),
                face.bbox.map(|b| b.y),
                face.bbox.map(|b| b.width),
                face.bbox.map(|b| b.height),
                face.score,
                face.embedding.as_deref().map(encode_embedding),
                face.blur_score,
                face.face_count as i64,
                face.secondary_score,
                now_timestamp(),
            ],
        )?;

        if let Some(cluster_id) = &face.cluster_id {
            refresh_member_cache(&self.conn, cluster_id)?;
        }
        Ok(())
    }

    pub fn get_face(&self, face_id: &str) -> Result<Face> {
        self.conn
            .query_row(
                &format!("SELECT {FACE_COLUMNS} FROM faces f WHERE f.id = ?1"),
                params![face_id],
                face_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::FaceNotFound(face_id.to_string()))
    }

    /// Faces currently in a cluster, in cached member order.
    pub fn list_cluster_faces(&self, match_id: &str, cluster_id: &str) -> Result<Vec<Face>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FACE_COLUMNS} FROM faces f
             LEFT JOIN cluster_members cm ON cm.face_id = f.id AND cm.cluster_id = f.cluster_id
             WHERE f.cluster_id = ?1 AND f.match_id = ?2
             ORDER BY cm.position IS NULL, cm.position, f.rowid"
        ))?;
        let faces = stmt
            .query_map(params![cluster_id, match_id], face_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(faces)
    }

    /// Top members of a cluster by descending blur score (sharpest first).
    pub fn sharpest_faces(&self, cluster_id: &str, limit: usize) -> Result<Vec<String>> {
        let ids = self
            .conn
            .prepare(
                "SELECT id FROM faces WHERE cluster_id = ?1
                 ORDER BY blur_score DESC, rowid LIMIT ?2",
            )?
            .query_map(params![cluster_id, limit as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
