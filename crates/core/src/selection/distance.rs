/// Euclidean distance between two embeddings.
/// Vectors of different length are compared as if the shorter one were
/// zero-padded.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    let shared = a.len().min(b.len());
    let mut sum: f32 = a[..shared]
        .iter()
        .zip(&b[..shared])
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    let tail = if a.len() > shared { &a[shared..] } else { &b[shared..] };
    sum += tail.iter().map(|v| v * v).sum::<f32>();
    sum.sqrt()
}
