use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Preview artifacts are content-addressed by their ETag and never rewritten
/// in place with different bytes for the same inputs.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Image bytes plus the response metadata a thin endpoint needs to serve them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewBytes {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub cache_control: &'static str,
    /// Quoted strong validator.
    pub etag: String,
}

impl PreviewBytes {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::PreviewNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let etag = format!("\"{}\"", sha256_hex(&bytes));
        Ok(Self {
            bytes,
            content_type: JPEG_CONTENT_TYPE,
            cache_control: IMMUTABLE_CACHE_CONTROL,
            etag,
        })
    }
}
