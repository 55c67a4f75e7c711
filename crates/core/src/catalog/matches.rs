use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{conversion_error, now_timestamp, Catalog};
use crate::domain::*;
use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<Match> {
    let date: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(Match {
        id: row.get(0)?,
        title: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| conversion_error(2, e))?,
        status: status.parse().map_err(|e: Error| conversion_error(3, e))?,
        created_at: row.get(4)?,
    })
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        match_id: row.get(1)?,
        original_name: row.get(2)?,
        original_path: PathBuf::from(row.get::<_, String>(3)?),
        preview_path: PathBuf::from(row.get::<_, String>(4)?),
    })
}

impl Catalog {
    // ── Matches ──────────────────────────────────────────────────────

    pub fn create_match(&self, title: &str, date: NaiveDate) -> Result<Match> {
        let record = Match {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            date,
            status: MatchStatus::Imported,
            created_at: now_timestamp(),
        };
        self.conn.execute(
            "INSERT INTO matches (id, title, date, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.title,
                record.date.format(DATE_FORMAT).to_string(),
                record.status.as_str(),
                record.created_at,
            ],
        )?;
        Ok(record)
    }

    pub fn get_match(&self, match_id: &str) -> Result<Match> {
        self.conn
            .query_row(
                "SELECT id, title, date, status, created_at FROM matches WHERE id = ?1",
                params![match_id],
                match_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::MatchNotFound(match_id.to_string()))
    }

    /// All matches, newest first.
    pub fn list_matches(&self) -> Result<Vec<Match>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, date, status, created_at FROM matches
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let matches = stmt
            .query_map([], match_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    /// Move a match to `status`. Returns the previous status.
    pub fn set_match_status(&self, match_id: &str, status: MatchStatus) -> Result<MatchStatus> {
        let current = self.get_match(match_id)?.status;
        if !current.can_advance_to(status) {
            return Err(Error::InvalidStatusTransition {
                from: current.to_string(),
                to: status.to_string(),
            });
        }
        self.conn.execute(
            "UPDATE matches SET status = ?1 WHERE id = ?2",
            params![status.as_str(), match_id],
        )?;
        Ok(current)
    }

    // ── Photos ───────────────────────────────────────────────────────

    pub fn insert_photo(&self, photo: &Photo) -> Result<()> {
        self.conn.execute(
            "INSERT INTO photos (id, match_id, original_name, original_path, preview_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                photo.id,
                photo.match_id,
                photo.original_name,
                photo.original_path.to_string_lossy(),
                photo.preview_path.to_string_lossy(),
                now_timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn get_photo(&self, photo_id: &str) -> Result<Option<Photo>> {
        let photo = self
            .conn
            .query_row(
                "SELECT id, match_id, original_name, original_path, preview_path
                 FROM photos WHERE id = ?1",
                params![photo_id],
                photo_from_row,
            )
            .optional()?;
        Ok(photo)
    }

    /// Photos of a match in registration order.
    pub fn list_photos(&self, match_id: &str) -> Result<Vec<Photo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, match_id, original_name, original_path, preview_path
             FROM photos WHERE match_id = ?1 ORDER BY rowid",
        )?;
        let photos = stmt
            .query_map(params![match_id], photo_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    pub fn count_photos(&self, match_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE match_id = ?1",
            params![match_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Record counts for the status view (single query).
    pub fn match_summary(&self, match_id: &str) -> Result<MatchSummary> {
        let summary = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM photos WHERE match_id = ?1),
                (SELECT COUNT(*) FROM faces WHERE match_id = ?1),
                (SELECT COUNT(*) FROM clusters WHERE match_id = ?1),
                (SELECT COUNT(*) FROM clusters WHERE match_id = ?1 AND decision = 'approved')",
            params![match_id],
            |row| {
                Ok(MatchSummary {
                    photos: row.get::<_, i64>(0)? as usize,
                    faces: row.get::<_, i64>(1)? as usize,
                    clusters: row.get::<_, i64>(2)? as usize,
                    approved: row.get::<_, i64>(3)? as usize,
                })
            },
        )?;
        Ok(summary)
    }
}
