use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};

/// Maximum number of faces a cover selection may hold.
pub const MAX_COVER_FACES: usize = 3;

/// Lifecycle of a match. Ordered: a match only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Imported,
    Reviewed,
    Published,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Imported => "imported",
            MatchStatus::Reviewed => "reviewed",
            MatchStatus::Published => "published",
        }
    }

    /// Whether a match in `self` may move to `next`.
    /// Forward moves and staying put are allowed; `published` can be re-entered.
    pub fn can_advance_to(&self, next: MatchStatus) -> bool {
        next >= *self
    }
}

impl FromStr for MatchStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "imported" => Ok(MatchStatus::Imported),
            "reviewed" => Ok(MatchStatus::Reviewed),
            "published" => Ok(MatchStatus::Published),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator decision on a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    Pending,
    Approved,
    Rejected,
    NeedsReview,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Pending => "pending",
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::NeedsReview => "needs_review",
        }
    }

    pub fn is_publishable(&self) -> bool {
        matches!(self, Decision::Approved)
    }
}

impl FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Decision::Pending),
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            "needs_review" => Ok(Decision::NeedsReview),
            other => Err(Error::InvalidDecision(other.to_string())),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    pub status: MatchStatus,
    pub created_at: i64,
}

/// An imported image. Never modified after registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Photo {
    pub id: String,
    pub match_id: String,
    pub original_name: String,
    pub original_path: PathBuf,
    pub preview_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A detected face crop with the quality data the clustering step computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Face {
    pub id: String,
    pub match_id: String,
    pub photo_id: String,
    pub cluster_id: Option<String>,
    pub crop_path: PathBuf,
    pub bbox: Option<BoundingBox>,
    /// Detector confidence.
    pub score: f64,
    pub embedding: Option<Vec<f32>>,
    /// Higher is sharper.
    pub blur_score: f64,
    /// Number of faces detected in the same source photo.
    pub face_count: u32,
    pub secondary_score: Option<f64>,
}

/// Ordered, duplicate-free list of at most [`MAX_COVER_FACES`] face ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct CoverSelection(Vec<String>);

impl CoverSelection {
    pub fn new(face_ids: Vec<String>) -> Result<Self> {
        if face_ids.len() > MAX_COVER_FACES {
            return Err(Error::InvalidCoverSelection(format!(
                "at most {MAX_COVER_FACES} faces allowed, got {}",
                face_ids.len()
            )));
        }
        for (i, id) in face_ids.iter().enumerate() {
            if id.is_empty() {
                return Err(Error::InvalidCoverSelection("empty face id".to_string()));
            }
            if face_ids[..i].contains(id) {
                return Err(Error::InvalidCoverSelection(format!("duplicate face id {id}")));
            }
        }
        Ok(Self(face_ids))
    }

    pub fn face_ids(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, face_id: &str) -> bool {
        self.0.iter().any(|id| id == face_id)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// A group of faces believed to show the same person.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub id: String,
    pub match_id: String,
    /// Cached ordered member list, kept equal to the faces pointing at this cluster.
    pub member_ids: Vec<String>,
    pub decision: Decision,
    pub cover: Option<CoverSelection>,
}

impl Cluster {
    pub fn has_member(&self, face_id: &str) -> bool {
        self.member_ids.iter().any(|id| id == face_id)
    }
}

/// Record counts for a single match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MatchSummary {
    pub photos: usize,
    pub faces: usize,
    pub clusters: usize,
    pub approved: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_roundtrip() {
        for d in [
            Decision::Pending,
            Decision::Approved,
            Decision::Rejected,
            Decision::NeedsReview,
        ] {
            assert_eq!(d.as_str().parse::<Decision>().unwrap(), d);
        }
    }

    #[test]
    fn test_decision_rejects_unknown() {
        let err = "maybe".parse::<Decision>().unwrap_err();
        assert!(matches!(err, Error::InvalidDecision(ref s) if s == "maybe"));
    }

    #[test]
    fn test_status_forward_only() {
        assert!(MatchStatus::Imported.can_advance_to(MatchStatus::Reviewed));
        assert!(MatchStatus::Imported.can_advance_to(MatchStatus::Published));
        assert!(MatchStatus::Published.can_advance_to(MatchStatus::Published));
        assert!(!MatchStatus::Published.can_advance_to(MatchStatus::Reviewed));
        assert!(!MatchStatus::Reviewed.can_advance_to(MatchStatus::Imported));
    }

    #[test]
    fn test_cover_selection_limits() {
        assert!(CoverSelection::new(vec![]).unwrap().is_empty());
        let ok = CoverSelection::new(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        assert_eq!(ok.len(), 3);
        assert!(ok.contains("b"));

        let too_many = CoverSelection::new(vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        assert!(matches!(too_many, Err(Error::InvalidCoverSelection(_))));
    }

    #[test]
    fn test_cover_selection_rejects_duplicates() {
        let dup = CoverSelection::new(vec!["a".into(), "a".into()]);
        assert!(matches!(dup, Err(Error::InvalidCoverSelection(ref m)) if m.contains("duplicate")));
    }

    #[test]
    fn test_cover_selection_keeps_order() {
        let cover = CoverSelection::new(vec!["y".into(), "x".into()]).unwrap();
        assert_eq!(cover.face_ids(), ["y".to_string(), "x".to_string()]);
        assert_eq!(cover.into_vec(), vec!["y".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_cluster_has_member() {
        let cluster = Cluster {
            id: "c".into(),
            match_id: "m".into(),
            member_ids: vec!["f1".into(), "f2".into()],
            decision: Decision::Pending,
            cover: None,
        };
        assert!(cluster.has_member("f2"));
        assert!(!cluster.has_member("f3"));
    }
}
