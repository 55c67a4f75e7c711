use std::fs;
use std::path::Path;

use anyhow::Result;
use matchpack_core::Curator;

/// Write a face crop, or with `cluster` the published preview, to `out`.
pub fn run(curator: &Curator, match_id: &str, face_id: &str, cluster: Option<&str>, out: &Path) -> Result<()> {
    let preview = match cluster {
        Some(cluster_id) => curator.published_preview(match_id, cluster_id, face_id)?,
        None => curator.face_preview(match_id, face_id)?,
    };
    fs::write(out, &preview.bytes)?;
    println!(
        "Wrote {} ({} bytes, {}, ETag {})",
        out.display(),
        preview.bytes.len(),
        preview.content_type,
        preview.etag
    );
    Ok(())
}
