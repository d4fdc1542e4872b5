//! Distances between embeddings and first-occurrence arg selection.

use ndarray::Array1;

use crate::error::EmbeddingError;

fn squared_sum(a: &Array1<f64>, b: &Array1<f64>) -> Result<f64, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum())
}

/// Euclidean (L2) distance.
pub fn euclidean_distance(a: &Array1<f64>, b: &Array1<f64>) -> Result<f64, EmbeddingError> {
    Ok(squared_sum(a, b)?.sqrt())
}

/// Root-mean-square distance: the squared-difference sum is divided by the
/// dimensionality before the square root, so scores are comparable across
/// embedding models of different sizes.
pub fn rms_distance(a: &Array1<f64>, b: &Array1<f64>) -> Result<f64, EmbeddingError> {
    let dims = a.len().max(1) as f64;
    Ok((squared_sum(a, b)? / dims).sqrt())
}

/// Index of the smallest value; ties go to the earliest index.
pub fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v >= b || v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the largest value; ties go to the earliest index.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b || v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
