// Pairwise distance kernels for `calc distance`

use crate::{
    error::ParameterError,
    types::MetricType,
    validation::CalcParams,
};

/// Distance reported for a vector that could not be resolved.
pub const MISSING_DISTANCE: f32 = -1.0;

/// Vectors of one operand after imported ids were fetched. `None` marks an id the collection
/// does not contain.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedVectors {
    Float(Vec<Option<Vec<f32>>>),
    Binary(Vec<Option<Vec<u8>>>),
}

impl ResolvedVectors {
    pub fn len(&self) -> usize {
        match self {
            ResolvedVectors::Float(v) => v.len(),
            ResolvedVectors::Binary(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_dims(left: usize, right: usize) -> Result<(), ParameterError> {
    if left != right {
        return Err(ParameterError::DimensionMismatch { left, right });
    }
    Ok(())
}

fn l2(a: &[f32], b: &[f32], sqrt: bool) -> f32 {
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    if sqrt {
        sum.sqrt()
    } else {
        sum
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Keeps the first `dim` bits of `bytes` (most significant bit first).
fn masked(bytes: &[u8], dim: Option<u32>) -> Vec<u8> {
    let Some(dim) = dim.map(|d| d as usize) else {
        return bytes.to_vec();
    };
    bytes
        .iter()
        .enumerate()
        .map(|(i, byte)| {
            let start = i * 8;
            if start >= dim {
                0
            } else if start + 8 <= dim {
                *byte
            } else {
                byte & (0xFFu8 << (8 - (dim - start)))
            }
        })
        .collect()
}

fn hamming(a: &[u8], b: &[u8]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum::<u32>() as f32
}

fn tanimoto(a: &[u8], b: &[u8]) -> f32 {
    let ones = |v: &[u8]| v.iter().map(|x| x.count_ones()).sum::<u32>();
    let common: u32 = a.iter().zip(b).map(|(x, y)| (x & y).count_ones()).sum();
    let union = ones(a) + ones(b) - common;
    if union == 0 {
        return 0.0;
    }
    1.0 - common as f32 / union as f32
}

/// `left.len() × right.len()` matrix of distances under `params`.
pub fn distance_matrix(
    left: &ResolvedVectors,
    right: &ResolvedVectors,
    params: &CalcParams,
) -> Result<Vec<Vec<f32>>, ParameterError> {
    let metric = params.metric_type;
    match (left, right) {
        (ResolvedVectors::Float(l), ResolvedVectors::Float(r)) if !metric.is_binary() => {
            let sqrt = params.sqrt.unwrap_or(false);
            pairwise(l, r, |a, b| {
                check_dims(a.len(), b.len())?;
                Ok(match metric {
                    MetricType::Ip => inner_product(a, b),
                    _ => l2(a, b, sqrt),
                })
            })
        }
        (ResolvedVectors::Binary(l), ResolvedVectors::Binary(r)) if metric.is_binary() => {
            pairwise(l, r, |a, b| {
                check_dims(a.len(), b.len())?;
                let (a, b) = (masked(a, params.dim), masked(b, params.dim));
                Ok(match metric {
                    MetricType::Tanimoto => tanimoto(&a, &b),
                    _ => hamming(&a, &b),
                })
            })
        }
        _ => Err(ParameterError::InvalidVectorFormat(format!(
            "metric {} does not apply to these vector types",
            metric
        ))),
    }
}

fn pairwise<T>(
    left: &[Option<Vec<T>>],
    right: &[Option<Vec<T>>],
    kernel: impl Fn(&[T], &[T]) -> Result<f32, ParameterError>,
) -> Result<Vec<Vec<f32>>, ParameterError> {
    left.iter()
        .map(|l| {
            right
                .iter()
                .map(|r| match (l, r) {
                    (Some(a), Some(b)) => kernel(a.as_slice(), b.as_slice()),
                    _ => Ok(MISSING_DISTANCE),
                })
                .collect::<Result<Vec<f32>, _>>()
        })
        .collect()
}
