// Vector operations for risk embeddings: cosine similarity, byte codec, top-k.

/// Cosine similarity between two vectors. Returns 0.0–1.0; zero-length,
/// mismatched or all-zero inputs score 0.0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || denom < f64::EPSILON {
        return 0.0;
    }

    let raw = dot / denom;
    if !raw.is_finite() {
        return 0.0;
    }
    raw.clamp(0.0, 1.0)
}

/// Serialize f64 vector to bytes (little-endian)
pub fn vec_to_bytes(v: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 8);
    for &f in v {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

/// Deserialize bytes to f64 vector (little-endian). Trailing bytes that do
/// not form a whole `f64` are ignored.
pub fn bytes_to_vec(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let arr: [u8; 8] = chunk.try_into().unwrap_or([0; 8]);
            f64::from_le_bytes(arr)
        })
        .collect()
}

/// Score every candidate against `query` and keep the `limit` most similar,
/// ordered by ascending cosine distance. Equal scores keep input order.
pub fn nearest<T>(
    query: &[f64],
    candidates: impl IntoIterator<Item = (T, Vec<f64>)>,
    limit: usize,
) -> Vec<(T, f64)> {
    let mut scored: Vec<(T, f64)> = candidates
        .into_iter()
        .map(|(item, v)| {
            let sim = cosine_similarity(query, &v);
            (item, sim)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    scored
}
