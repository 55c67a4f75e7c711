use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("resize error: {0}")]
    Resize(String),

    #[error("match not found: {0}")]
    MatchNotFound(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("face not found: {0}")]
    FaceNotFound(String),

    #[error("face {face_id} is not a member of cluster {cluster_id}")]
    FaceNotInCluster { face_id: String, cluster_id: String },

    #[error("cluster {cluster_id} belongs to match {cluster_match}, not {match_id}")]
    ClusterMatchMismatch {
        cluster_id: String,
        cluster_match: String,
        match_id: String,
    },

    #[error("need at least 2 distinct clusters to merge, got {0}")]
    InsufficientSources(usize),

    #[error("invalid decision: {0} (expected pending, approved, rejected or needs_review)")]
    InvalidDecision(String),

    #[error("invalid match status: {0}")]
    InvalidStatus(String),

    #[error("cannot move match from {from} back to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("invalid cover selection: {0}")]
    InvalidCoverSelection(String),

    #[error("no updates provided")]
    NoUpdates,

    #[error("an import is already running for match {0}")]
    ImportInProgress(String),

    #[error("no photos to cluster for match {0}")]
    NoPhotos(String),

    #[error("clustering command not configured, run `matchpack config set clustering_command <cmd>`")]
    ClusteringNotConfigured,

    #[error("clustering failed ({status}): {stderr}")]
    ClusteringFailed { status: String, stderr: String },

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("preview not found: {}", .0.display())]
    PreviewNotFound(PathBuf),

    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    #[error("invalid value for {key}: {message}")]
    InvalidSetting { key: String, message: String },
}

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any mutation.
    Validation,
    /// Unknown record, or a face outside the named cluster.
    NotFound,
    /// The operation clashes with work already in flight.
    Conflict,
    /// The store could not complete the operation; nothing was applied.
    Transaction,
    /// File-level failure.
    Io,
    /// A background or external job failed.
    Job,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InsufficientSources(_)
            | Error::InvalidDecision(_)
            | Error::InvalidStatus(_)
            | Error::InvalidStatusTransition { .. }
            | Error::InvalidCoverSelection(_)
            | Error::NoUpdates
            | Error::InvalidIdentifier(_)
            | Error::UnknownSetting(_)
            | Error::InvalidSetting { .. }
            | Error::ClusterMatchMismatch { .. }
            | Error::NoPhotos(_)
            | Error::ClusteringNotConfigured => ErrorKind::Validation,
            Error::MatchNotFound(_)
            | Error::ClusterNotFound(_)
            | Error::FaceNotFound(_)
            | Error::FaceNotInCluster { .. }
            | Error::PreviewNotFound(_) => ErrorKind::NotFound,
            Error::ImportInProgress(_) => ErrorKind::Conflict,
            Error::Database(_) => ErrorKind::Transaction,
            Error::Io(_) | Error::Image(_) | Error::Archive(_) | Error::Resize(_) => ErrorKind::Io,
            Error::ClusteringFailed { .. } => ErrorKind::Job,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
