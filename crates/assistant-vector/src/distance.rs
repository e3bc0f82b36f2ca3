//! Distance and relevance functions

use assistant_core::DistanceMetric;

pub fn magnitude(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (ma, mb) = (magnitude(a), magnitude(b));
    if ma == 0.0 || mb == 0.0 {
        return 0.0;
    }
    dot(a, b) / (ma * mb)
}

/// Distance between two vectors under `metric` (lower is closer)
pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::L2 => euclidean_distance(a, b),
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        DistanceMetric::Ip => 1.0 - dot(a, b),
    }
}

/// Map a distance to a relevance score, higher is better.
///
/// For normalized embeddings the score lies in [0, 1].
pub fn relevance_score(metric: DistanceMetric, distance: f32) -> f32 {
    match metric {
        DistanceMetric::L2 => 1.0 - distance / std::f32::consts::SQRT_2,
        DistanceMetric::Cosine | DistanceMetric::Ip => 1.0 - distance,
    }
}
