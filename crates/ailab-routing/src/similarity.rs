//! Vector math for embedding comparison.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, RoutingError};

fn check_dims(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(RoutingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}

pub fn dot(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dims(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine of the angle between `a` and `b`, in `[-1, 1]`.
///
/// A zero vector has no direction; its similarity to anything is `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let product = dot(a, b)?;
    let norms = magnitude(a) * magnitude(b);
    if norms == 0.0 {
        return Ok(0.0);
    }
    Ok(product / norms)
}

/// Component-wise mean of `vectors`.
pub fn centroid(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = vectors.first().ok_or(RoutingError::Empty { what: "centroid input" })?;
    let mut sum = vec![0.0f32; first.len()];
    for v in vectors {
        check_dims(first, v)?;
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let n = vectors.len() as f32;
    Ok(sum.into_iter().map(|x| x / n).collect())
}

/// Coarse reading of a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityLabel {
    /// Above 0.8.
    HighlySimilar,
    /// Above 0.5.
    Related,
    Unrelated,
}

impl SimilarityLabel {
    pub fn from_score(score: f32) -> Self {
        if score > 0.8 {
            Self::HighlySimilar
        } else if score > 0.5 {
            Self::Related
        } else {
            Self::Unrelated
        }
    }
}

impl fmt::Display for SimilarityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HighlySimilar => "highly similar",
            Self::Related => "related",
            Self::Unrelated => "unrelated",
        })
    }
}
