use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// On-disk arrangement of a data root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

/// Reject identifiers that would escape their directory when joined into a path.
pub fn validate_segment(id: &str) -> Result<&str> {
    let bad = id.is_empty()
        || id.starts_with('.')
        || id.contains('/')
        || id.contains('\\')
        || id.contains("..")
        || id.contains('\0');
    if bad {
        return Err(Error::InvalidIdentifier(id.to_string()));
    }
    Ok(id)
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog.db")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    /// Where an uploaded archive is parked while its import runs.
    pub fn temp_archive(&self, match_id: &str) -> Result<PathBuf> {
        let match_id = validate_segment(match_id)?;
        Ok(self
            .temp_dir()
            .join(format!("{match_id}_{}.zip", uuid::Uuid::new_v4())))
    }

    pub fn match_dir(&self, match_id: &str) -> Result<PathBuf> {
        Ok(self.root.join("matches").join(validate_segment(match_id)?))
    }

    pub fn raw_dir(&self, match_id: &str) -> Result<PathBuf> {
        Ok(self.match_dir(match_id)?.join("raw"))
    }

    pub fn preview_dir(&self, match_id: &str) -> Result<PathBuf> {
        Ok(self.match_dir(match_id)?.join("preview"))
    }

    /// `ext` is stored lowercased.
    pub fn raw_path(&self, match_id: &str, photo_id: &str, ext: &str) -> Result<PathBuf> {
        let photo_id = validate_segment(photo_id)?;
        let ext = validate_segment(ext)?.to_ascii_lowercase();
        Ok(self.raw_dir(match_id)?.join(format!("{photo_id}.{ext}")))
    }

    pub fn preview_path(&self, match_id: &str, photo_id: &str) -> Result<PathBuf> {
        let photo_id = validate_segment(photo_id)?;
        Ok(self.preview_dir(match_id)?.join(format!("{photo_id}_preview.jpg")))
    }

    /// Root of all publication artifacts for a match.
    pub fn published_match_dir(&self, match_id: &str) -> Result<PathBuf> {
        Ok(self.root.join("previews").join(validate_segment(match_id)?))
    }

    pub fn published_cluster_dir(&self, match_id: &str, cluster_id: &str) -> Result<PathBuf> {
        Ok(self
            .published_match_dir(match_id)?
            .join(validate_segment(cluster_id)?))
    }

    /// Publication artifacts are keyed by face id so re-rendering overwrites in place.
    pub fn published_path(&self, match_id: &str, cluster_id: &str, face_id: &str) -> Result<PathBuf> {
        let face_id = validate_segment(face_id)?;
        Ok(self
            .published_cluster_dir(match_id, cluster_id)?
            .join(format!("{face_id}.jpg")))
    }
}
