mod clusters;
mod matches;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::Result;

pub(crate) use clusters::{load_cluster, refresh_member_cache, write_cover};

/// SQLite-backed store for matches, photos, faces and clusters.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create a catalog at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // Import workers hold a second connection to the same file
        conn.busy_timeout(Duration::from_secs(10))?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory catalog (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Start a transaction. Dropping it without `commit` rolls everything back.
    pub(crate) fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    // ── Config ───────────────────────────────────────────────────

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn remove_config(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM config WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}

pub(crate) fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Wrap a domain parse failure so it can travel through a rusqlite row mapper.
pub(crate) fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_config() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert_eq!(catalog.get_config("publish_width").unwrap(), None);

        catalog.set_config("publish_width", "640").unwrap();
        assert_eq!(
            catalog.get_config("publish_width").unwrap(),
            Some("640".to_string())
        );
    }

    #[test]
    fn test_set_config_overwrite() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.set_config("watermark_text", "old").unwrap();
        catalog.set_config("watermark_text", "new").unwrap();
        assert_eq!(
            catalog.get_config("watermark_text").unwrap(),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_remove_config() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.set_config("clustering_command", "/bin/true").unwrap();
        assert!(catalog.remove_config("clustering_command").unwrap());
        assert!(!catalog.remove_config("clustering_command").unwrap());
        assert_eq!(catalog.get_config("clustering_command").unwrap(), None);
    }

    // ── Schema version tracking ─────────────────────────────────

    #[test]
    fn test_schema_version_set_on_fresh_db() {
        let catalog = Catalog::open_in_memory().unwrap();
        let version = catalog.get_config("schema_version").unwrap();
        assert_eq!(version, Some(schema::SCHEMA_VERSION.to_string()));
    }

    #[test]
    fn test_open_creates_parent_dirs_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested/dir/catalog.db");

        {
            let catalog = Catalog::open(&db_path).unwrap();
            catalog.set_config("publish_quality", "65").unwrap();
        }
        let catalog = Catalog::open(&db_path).unwrap();
        assert_eq!(
            catalog.get_config("publish_quality").unwrap(),
            Some("65".to_string())
        );
    }
}
