//! Embedding vector math.
//!
//! Dimensions must agree; a mismatch is a contract violation and is reported
//! as [`EngineError::DimensionMismatch`], never truncated or padded.

use crate::error::EngineError;

/// Coordinate-wise mean of `vectors`.
///
/// # Errors
///
/// [`EngineError::EmptyVectorSet`] for no input, [`EngineError::DimensionMismatch`]
/// if any vector's length differs from the first.
pub fn centroid(vectors: &[Vec<f32>]) -> Result<Vec<f32>, EngineError> {
    let first = vectors.first().ok_or(EngineError::EmptyVectorSet)?;
    let dim = first.len();

    let mut sums = vec![0.0_f64; dim];
    for vector in vectors {
        if vector.len() != dim {
            return Err(EngineError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        for (sum, &x) in sums.iter_mut().zip(vector) {
            *sum += f64::from(x);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let n = vectors.len() as f64;
    #[allow(clippy::cast_possible_truncation)]
    Ok(sums.into_iter().map(|s| (s / n) as f32).collect())
}

/// `dot(a, b) / (|a| * |b|)`, accumulated in `f64`.
///
/// Returns `Ok(None)` when either vector has zero magnitude, where the
/// similarity is undefined.
///
/// # Errors
///
/// [`EngineError::DimensionMismatch`] if the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<Option<f64>, EngineError> {
    if a.len() != b.len() {
        return Err(EngineError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return Ok(None);
    }
    Ok(Some((dot / denom).clamp(-1.0, 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-6;

    #[test]
    fn self_similarity_is_one() {
        let v = vec![0.3_f32, -1.2, 4.5, 0.0, 2.2];
        let s = cosine_similarity(&v, &v).unwrap().unwrap();
        assert!((s - 1.0).abs() < TOL, "got {s}");
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = vec![1.0_f32, 2.0, 3.0];
        let b = vec![-2.0_f32, 0.5, 1.0];
        let ab = cosine_similarity(&a, &b).unwrap().unwrap();
        let ba = cosine_similarity(&b, &a).unwrap().unwrap();
        assert!((ab - ba).abs() < TOL);
    }

    #[test]
    fn orthogonal_and_opposite_vectors() {
        let s = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().unwrap();
        assert!(s.abs() < TOL);
        let s = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap().unwrap();
        assert!((s + 1.0).abs() < TOL);
    }

    #[test]
    fn zero_vector_similarity_is_undefined() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), None);
    }

    #[test]
    fn similarity_rejects_mismatched_dimensions() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn centroid_is_coordinate_mean() {
        let c = centroid(&[vec![1.0, 0.0], vec![0.9, 0.1], vec![0.95, 0.05]]).unwrap();
        assert_eq!(c.len(), 2);
        assert!((f64::from(c[0]) - 0.95).abs() < TOL);
        assert!((f64::from(c[1]) - 0.05).abs() < TOL);
    }

    #[test]
    fn centroid_rejects_mismatched_dimensions() {
        let err = centroid(&[vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn centroid_of_nothing_is_an_error() {
        assert!(matches!(centroid(&[]), Err(EngineError::EmptyVectorSet)));
    }

    #[test]
    fn acme_scenario_similarity() {
        let c = centroid(&[vec![1.0, 0.0], vec![0.9, 0.1], vec![0.95, 0.05]]).unwrap();
        let s = cosine_similarity(&[0.0, 1.0], &c).unwrap().unwrap();
        assert!(s < 0.85);
        assert!((s - 0.0525).abs() < 1e-3, "got {s}");
    }
}
