//! Nearest-neighbour distance between two timestamp sequences.
//!
//! For every sample `a` of the first sequence, the deviation is the distance
//! to the closest stamp of the reference sequence. The measure is not
//! symmetric: swapping the sequences generally changes the result.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviationError {
    #[error("Reference sequence is empty")]
    EmptyReference,

    #[error("Sample sequence is empty")]
    EmptySamples,
}

/// `D[i] = min over b of |a[i] - b|`
pub fn deviations(a: &[f64], b: &[f64]) -> Result<Vec<f64>, DeviationError> {
    if b.is_empty() {
        return Err(DeviationError::EmptyReference);
    }

    Ok(a.iter()
        .map(|ai| b.iter().map(|bj| (ai - bj).abs()).fold(f64::INFINITY, f64::min))
        .collect())
}

fn checked_deviations(a: &[f64], b: &[f64]) -> Result<Vec<f64>, DeviationError> {
    if a.is_empty() {
        return Err(DeviationError::EmptySamples);
    }

    deviations(a, b)
}

pub fn avg_deviation(a: &[f64], b: &[f64]) -> Result<f64, DeviationError> {
    let d = checked_deviations(a, b)?;
    Ok(d.iter().sum::<f64>() / d.len() as f64)
}

pub fn min_deviation(a: &[f64], b: &[f64]) -> Result<f64, DeviationError> {
    Ok(checked_deviations(a, b)?
        .into_iter()
        .fold(f64::INFINITY, f64::min))
}

pub fn max_deviation(a: &[f64], b: &[f64]) -> Result<f64, DeviationError> {
    Ok(checked_deviations(a, b)?
        .into_iter()
        .fold(0.0, f64::max))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub count: usize,
}

impl DeviationStats {
    /// All three statistics from a single pass over the deviations
    pub fn compute(a: &[f64], b: &[f64]) -> Result<Self, DeviationError> {
        let d = checked_deviations(a, b)?;

        let (min, max, sum) = d.iter().fold((f64::INFINITY, 0.0f64, 0.0), |(min, max, sum), x| {
            (min.min(*x), max.max(*x), sum + x)
        });

        Ok(DeviationStats {
            min,
            avg: sum / d.len() as f64,
            max,
            count: d.len(),
        })
    }
}

impl fmt::Display for DeviationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.6} <= {:.6} <= {:.6}]", self.min, self.avg, self.max)
    }
}
