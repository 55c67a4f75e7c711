use rusqlite::{params, Connection};

use crate::error::Result;

pub const SCHEMA_VERSION: &str = "1";

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS matches (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            date        TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'imported'
                        CHECK (status IN ('imported', 'reviewed', 'published')),
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS photos (
            id             TEXT PRIMARY KEY,
            match_id       TEXT NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
            original_name  TEXT NOT NULL,
            original_path  TEXT NOT NULL,
            preview_path   TEXT NOT NULL,
            created_at     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_photos_match ON photos(match_id);

        CREATE TABLE IF NOT EXISTS clusters (
            id          TEXT PRIMARY KEY,
            match_id    TEXT NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
            decision    TEXT NOT NULL DEFAULT 'pending'
                        CHECK (decision IN ('pending', 'approved', 'rejected', 'needs_review')),
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_clusters_match ON clusters(match_id);

        CREATE TABLE IF NOT EXISTS faces (
            id               TEXT PRIMARY KEY,
            match_id         TEXT NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
            photo_id         TEXT NOT NULL REFERENCES photos(id) ON DELETE CASCADE,
            cluster_id       TEXT REFERENCES clusters(id) ON DELETE SET NULL,
            crop_path        TEXT NOT NULL,
            bbox_x           REAL,
            bbox_y           REAL,
            bbox_w           REAL,
            bbox_h           REAL,
            score            REAL NOT NULL DEFAULT 0,
            embedding        BLOB,
            blur_score       REAL NOT NULL DEFAULT 0,
            face_count       INTEGER NOT NULL DEFAULT 1,
            secondary_score  REAL,
            created_at       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_faces_cluster ON faces(cluster_id);
        CREATE INDEX IF NOT EXISTS idx_faces_match ON faces(match_id);
        CREATE INDEX IF NOT EXISTS idx_faces_photo ON faces(photo_id);

        CREATE TABLE IF NOT EXISTS cluster_members (
            cluster_id  TEXT NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            face_id     TEXT NOT NULL REFERENCES faces(id) ON DELETE CASCADE,
            PRIMARY KEY (cluster_id, face_id)
        );

        CREATE TABLE IF NOT EXISTS cluster_covers (
            cluster_id  TEXT NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            face_id     TEXT NOT NULL REFERENCES faces(id) ON DELETE CASCADE,
            PRIMARY KEY (cluster_id, position)
        );

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Stamp the schema version on first open.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO config (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION],
    )?;
    Ok(())
}
