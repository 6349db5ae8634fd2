use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::model::Dataset;
use crate::service::{ReductionMethod, ReductionRequest, ReductionResponse, ReductionService};

pub const DEFAULT_FALLBACK_RANGE: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionOptions {
    pub method: ReductionMethod,
    /// 2 or 3; anything else is clamped into that range.
    pub dims: usize,
    /// Fallback components are drawn uniformly from `[-range, range]`.
    pub fallback_range: f32,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            method: ReductionMethod::Pca,
            dims: 3,
            fallback_range: DEFAULT_FALLBACK_RANGE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmbeddingPoint {
    /// Token id; also the row of the source embedding.
    pub token: usize,
    /// Unused trailing components are zero.
    pub coords: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    pub points: Vec<EmbeddingPoint>,
    pub dims: usize,
    pub method: ReductionMethod,
    /// Why synthesized coordinates were used, if they were.
    pub fallback: Option<String>,
    /// Present only when the service produced the coordinates.
    pub quality: Option<ReductionQuality>,
}

/// What the reduction service reported alongside its coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReductionQuality {
    pub original_dim: Option<usize>,
    pub distance_correlation: Option<f32>,
}

impl ReductionQuality {
    fn from_response(response: &ReductionResponse) -> Self {
        let stats = response.stats.unwrap_or_default();
        Self {
            original_dim: response.original_dim.or(stats.original_dim),
            distance_correlation: stats.distance_correlation.filter(|value| value.is_finite()),
        }
    }
}

impl Projection {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

pub struct CoordinateProjector {
    options: ProjectionOptions,
    service: Option<Arc<dyn ReductionService>>,
}

impl CoordinateProjector {
    pub fn new(options: ProjectionOptions, service: Option<Arc<dyn ReductionService>>) -> Self {
        Self { options, service }
    }

    pub fn options(&self) -> &ProjectionOptions {
        &self.options
    }

    fn dims(&self) -> usize {
        self.options.dims.clamp(2, 3)
    }

    /// One point per token, in token order. Never fails: service problems
    /// and missing embeddings produce a flagged random layout instead.
    pub fn project<R: Rng + ?Sized>(&self, dataset: &Dataset, rng: &mut R) -> Projection {
        let count = dataset.token_count();
        let dims = self.dims();

        let outcome = match (&dataset.embeddings, &self.service) {
            (None, _) => Err("no embeddings in dataset".to_owned()),
            (Some(embeddings), _) if embeddings.is_empty() => {
                Err("no embeddings in dataset".to_owned())
            }
            (Some(_), None) => Err("reduction service not configured".to_owned()),
            (Some(embeddings), Some(service)) => self
                .request(service.as_ref(), embeddings, count)
                .map_err(|error| error.to_string()),
        };

        match outcome {
            Ok((coords, quality)) => {
                info!(
                    method = self.options.method.label(),
                    dims,
                    points = coords.len(),
                    original_dim = quality.original_dim,
                    distance_correlation = quality.distance_correlation,
                    "projected embeddings"
                );
                Projection {
                    points: points_from(coords),
                    dims,
                    method: self.options.method,
                    fallback: None,
                    quality: Some(quality),
                }
            }
            Err(reason) => {
                warn!(%reason, tokens = count, "using random embedding coordinates");
                Projection {
                    points: points_from(fallback_coordinates(
                        count,
                        dims,
                        self.options.fallback_range,
                        rng,
                    )),
                    dims,
                    method: self.options.method,
                    fallback: Some(reason),
                    quality: None,
                }
            }
        }
    }

    fn request(
        &self,
        service: &dyn ReductionService,
        embeddings: &[Vec<f32>],
        count: usize,
    ) -> Result<(Vec<[f32; 3]>, ReductionQuality), ServiceError> {
        // Embeddings beyond the token list have nothing to attach to.
        let rows = embeddings.len().min(count);
        let request = ReductionRequest {
            embeddings: embeddings[..rows].to_vec(),
            method: self.options.method,
            n_components: self.dims(),
        };
        let response = service.reduce(&request)?;
        let mut coords = validate_coordinates(&response.coordinates, count, self.dims())?;
        normalize_axes(&mut coords, self.dims());
        Ok((coords, ReductionQuality::from_response(&response)))
    }
}

fn points_from(coords: Vec<[f32; 3]>) -> Vec<EmbeddingPoint> {
    coords
        .into_iter()
        .enumerate()
        .map(|(token, coords)| EmbeddingPoint { token, coords })
        .collect()
}

/// Checks one finite row of `dims` components per token.
pub fn validate_coordinates(
    rows: &[Vec<f32>],
    expected_rows: usize,
    dims: usize,
) -> Result<Vec<[f32; 3]>, ServiceError> {
    if rows.len() != expected_rows {
        return Err(ServiceError::Shape(format!(
            "expected {expected_rows} coordinate rows, got {}",
            rows.len()
        )));
    }

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            if row.len() != dims {
                return Err(ServiceError::Shape(format!(
                    "row {index} has {} components, expected {dims}",
                    row.len()
                )));
            }
            if row.iter().any(|value| !value.is_finite()) {
                return Err(ServiceError::Shape(format!("row {index} is not finite")));
            }
            let mut coords = [0.0; 3];
            coords[..dims].copy_from_slice(row);
            Ok(coords)
        })
        .collect()
}

/// Min-max scales each used axis into `[-1, 1]`. A flat axis maps to -1.
pub fn normalize_axes(coords: &mut [[f32; 3]], dims: usize) {
    for axis in 0..dims.min(3) {
        let (min, max) = coords
            .iter()
            .map(|point| point[axis])
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), value| {
                (lo.min(value), hi.max(value))
            });
        let mut range = max - min;
        if !range.is_finite() {
            continue;
        }
        if range == 0.0 {
            range = 1.0;
        }
        for point in coords.iter_mut() {
            point[axis] = 2.0 * (point[axis] - min) / range - 1.0;
        }
    }
}

pub fn fallback_coordinates<R: Rng + ?Sized>(
    count: usize,
    dims: usize,
    range: f32,
    rng: &mut R,
) -> Vec<[f32; 3]> {
    let range = if range.is_finite() { range.abs() } else { DEFAULT_FALLBACK_RANGE };
    (0..count)
        .map(|_| {
            let mut coords = [0.0; 3];
            for value in coords.iter_mut().take(dims.min(3)) {
                *value = rng.gen_range(-range..=range);
            }
            coords
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn rejects_wrong_row_count_and_width() {
        let rows = vec![vec![0.0, 1.0], vec![2.0, 3.0]];
        assert!(validate_coordinates(&rows, 3, 2).is_err());
        assert!(validate_coordinates(&rows, 2, 3).is_err());
        let parsed = validate_coordinates(&rows, 2, 2).expect("valid");
        assert_eq!(parsed[1], [2.0, 3.0, 0.0]);
    }

    #[test]
    fn normalization_spans_unit_range() {
        let mut coords = vec![[0.0, 5.0, 0.0], [10.0, 5.0, 0.0], [5.0, 5.0, 0.0]];
        normalize_axes(&mut coords, 2);
        assert_eq!(coords[0][0], -1.0);
        assert_eq!(coords[1][0], 1.0);
        assert_eq!(coords[2][0], 0.0);
        assert_eq!(coords[0][1], -1.0);
    }

    #[test]
    fn fallback_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let coords = fallback_coordinates(64, 2, 0.5, &mut rng);
        assert_eq!(coords.len(), 64);
        for point in coords {
            assert!(point[0].abs() <= 0.5 && point[1].abs() <= 0.5);
            assert_eq!(point[2], 0.0);
        }
    }
}
