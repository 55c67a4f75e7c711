pub mod distance;

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain::Face;
use distance::euclidean_distance;

/// Default minimum embedding distance between two picked shots.
pub const DEFAULT_DIVERSITY_THRESHOLD: f32 = 0.5;

/// The quality data best-shot selection looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'a> {
    pub id: &'a str,
    pub blur_score: f64,
    /// Faces detected in the same source photo. Fewer means a more isolated subject.
    pub face_count: u32,
    pub embedding: Option<&'a [f32]>,
}

impl<'a> From<&'a Face> for Candidate<'a> {
    fn from(face: &'a Face) -> Self {
        Self {
            id: &face.id,
            blur_score: face.blur_score,
            face_count: face.face_count,
            embedding: face.embedding.as_deref(),
        }
    }
}

/// Quality order: fewest faces in the photo first, then sharpest.
fn by_quality(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.face_count
        .cmp(&b.face_count)
        .then_with(|| b.blur_score.total_cmp(&a.blur_score))
}

/// Pick up to `max_count` representative shots, best quality first, such that
/// no two picks have embeddings closer than `diversity_threshold`.
///
/// Candidates without an embedding are never picked. The walk is greedy: once
/// a candidate is accepted, a later more diverse one does not replace it.
/// The sort is stable, so the result depends only on the input (order included).
pub fn select_best_shots(
    candidates: &[Candidate<'_>],
    max_count: usize,
    diversity_threshold: f32,
) -> Vec<String> {
    let mut eligible: Vec<(&Candidate<'_>, &[f32])> = candidates
        .iter()
        .filter_map(|c| c.embedding.map(|e| (c, e)))
        .collect();
    eligible.sort_by(|(a, _), (b, _)| by_quality(a, b));

    let mut picked: Vec<(&str, &[f32])> = Vec::with_capacity(max_count);
    for (candidate, embedding) in eligible {
        if picked.len() >= max_count {
            break;
        }
        let diverse = picked
            .iter()
            .all(|(_, chosen)| euclidean_distance(embedding, chosen) >= diversity_threshold);
        if diverse {
            picked.push((candidate.id, embedding));
        }
    }

    picked.into_iter().map(|(id, _)| id.to_string()).collect()
}

/// Keep only the sharpest face per source photo, in first-seen order.
/// Several crops of the same photo would otherwise compete for cover slots.
pub fn dedupe_by_photo(faces: &[Face]) -> Vec<&Face> {
    let mut order: Vec<&str> = Vec::new();
    let mut best: HashMap<&str, &Face> = HashMap::new();
    for face in faces {
        match best.get(face.photo_id.as_str()) {
            Some(existing) if existing.blur_score >= face.blur_score => {}
            Some(_) => {
                best.insert(&face.photo_id, face);
            }
            None => {
                order.push(&face.photo_id);
                best.insert(&face.photo_id, face);
            }
        }
    }
    order.into_iter().filter_map(|photo| best.get(photo).copied()).collect()
}
