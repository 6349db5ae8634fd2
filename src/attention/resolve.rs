use tracing::warn;

use crate::model::{AttentionTensor, Dataset, SparseWeights, TensorForm, TensorStats, head_key};

use super::DenseMatrix;

/// Sparse shapes beyond this many cells are treated as malformed.
const MAX_RECONSTRUCTED_CELLS: usize = 4096 * 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeadSelector {
    Average,
    Head(usize),
}

impl HeadSelector {
    pub fn label(self) -> String {
        match self {
            Self::Average => "average".to_owned(),
            Self::Head(index) => format!("head {index}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MatrixSelector {
    pub layer: usize,
    pub head: HeadSelector,
}

impl Default for MatrixSelector {
    fn default() -> Self {
        Self {
            layer: 0,
            head: HeadSelector::Average,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixSource {
    Dense,
    Sparse,
    /// Neither form was present; the matrix is all zeros and callers
    /// substitute their own demo data.
    Fallback,
}

#[derive(Clone, Debug)]
pub struct ResolvedMatrix {
    pub matrix: DenseMatrix,
    pub source: MatrixSource,
    pub stats: TensorStats,
    pub sampling_rate: Option<f32>,
}

impl ResolvedMatrix {
    pub fn is_fallback(&self) -> bool {
        self.source == MatrixSource::Fallback
    }

    fn fallback(side: usize) -> Self {
        Self {
            matrix: DenseMatrix::zeros(side, side),
            source: MatrixSource::Fallback,
            stats: TensorStats::default(),
            sampling_rate: None,
        }
    }
}

/// Writes every listed value into a zeroed `rows × cols` buffer. Indices
/// outside the shape (or negative) are dropped. A shape larger than
/// [`MAX_RECONSTRUCTED_CELLS`] yields an empty matrix.
pub fn reconstruct_sparse(sparse: &SparseWeights) -> DenseMatrix {
    let [rows, cols] = sparse.shape;
    let Some(cell_count) = rows
        .checked_mul(cols)
        .filter(|cells| *cells <= MAX_RECONSTRUCTED_CELLS)
    else {
        warn!(rows, cols, "sparse attention shape too large, skipping reconstruction");
        return DenseMatrix::zeros(0, 0);
    };
    let mut matrix = DenseMatrix::zeros(rows, cols);
    if cell_count == 0 {
        return matrix;
    }

    let mut dropped = 0usize;
    for (&index, &value) in sparse.indices.iter().zip(&sparse.values) {
        let Ok(index) = usize::try_from(index) else {
            dropped += 1;
            continue;
        };
        if index >= cell_count {
            dropped += 1;
            continue;
        }

        let value = if value.is_finite() { value } else { 0.0 };
        matrix.set(index / cols, index % cols, value);
    }

    if dropped > 0 {
        warn!(dropped, rows, cols, "dropped out-of-range sparse attention indices");
    }
    matrix
}

pub fn resolve_tensor(tensor: Option<&AttentionTensor>, fallback_side: usize) -> ResolvedMatrix {
    let Some(tensor) = tensor else {
        return ResolvedMatrix::fallback(fallback_side);
    };

    let (matrix, source) = match tensor.form() {
        TensorForm::Dense(rows) => (DenseMatrix::from_rows(rows), MatrixSource::Dense),
        TensorForm::Sparse(sparse) => {
            let [rows, cols] = sparse.shape;
            if rows.saturating_mul(cols) > MAX_RECONSTRUCTED_CELLS {
                warn!(rows, cols, "sparse attention shape too large, using fallback");
                return ResolvedMatrix::fallback(fallback_side);
            }
            (reconstruct_sparse(sparse), MatrixSource::Sparse)
        }
        TensorForm::Missing => return ResolvedMatrix::fallback(fallback_side),
    };

    let stats = tensor.stats.unwrap_or_else(|| matrix.stats());
    ResolvedMatrix {
        matrix,
        source,
        stats,
        sampling_rate: tensor.sampling_rate(),
    }
}

/// Picks the `(layer, head)` tensor out of a dataset. The "average" tensor is
/// whatever the producer sent; heads are never averaged here.
pub fn resolve(dataset: &Dataset, selector: MatrixSelector) -> ResolvedMatrix {
    let tensor = dataset.layer(selector.layer).and_then(|layer| match selector.head {
        HeadSelector::Average => layer.average.as_ref(),
        HeadSelector::Head(index) => layer.heads.get(&head_key(index)),
    });
    resolve_tensor(tensor, dataset.token_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttentionTensor;

    #[test]
    fn sparse_reconstruction_places_values() {
        let tensor = AttentionTensor::sparse(vec![0, 5, 7], vec![0.9, 0.4, 0.1], [3, 3]);
        let resolved = resolve_tensor(Some(&tensor), 3);
        assert_eq!(resolved.source, MatrixSource::Sparse);
        assert_eq!(resolved.matrix.get(0, 0), 0.9);
        assert_eq!(resolved.matrix.get(1, 2), 0.4);
        assert_eq!(resolved.matrix.get(2, 1), 0.1);
        assert_eq!(resolved.matrix.get(2, 2), 0.0);
    }

    #[test]
    fn out_of_range_and_negative_indices_are_dropped() {
        let tensor = AttentionTensor::sparse(vec![-1, 4, 9, 400], vec![0.3, 0.7, 0.5, 0.2], [3, 3]);
        let resolved = resolve_tensor(Some(&tensor), 3);
        let nonzero = resolved
            .matrix
            .as_slice()
            .iter()
            .filter(|value| **value != 0.0)
            .count();
        assert_eq!(nonzero, 1);
        assert_eq!(resolved.matrix.get(1, 1), 0.7);
    }

    #[test]
    fn missing_tensor_requests_fallback() {
        let resolved = resolve_tensor(Some(&AttentionTensor::default()), 4);
        assert!(resolved.is_fallback());
        assert_eq!(resolved.matrix, DenseMatrix::zeros(4, 4));

        let resolved = resolve_tensor(None, 2);
        assert!(resolved.is_fallback());
        assert_eq!(resolved.matrix.rows(), 2);
    }

    #[test]
    fn oversized_sparse_shape_falls_back() {
        let tensor = AttentionTensor::sparse(vec![0], vec![1.0], [1 << 20, 1 << 20]);
        let resolved = resolve_tensor(Some(&tensor), 5);
        assert!(resolved.is_fallback());
        assert_eq!(resolved.matrix.rows(), 5);
    }

    #[test]
    fn overflowing_sparse_shape_reconstructs_empty() {
        let sparse = SparseWeights {
            indices: vec![0, 3],
            values: vec![0.5, 0.25],
            shape: [usize::MAX / 2, 4],
            sampling_rate: None,
        };
        let matrix = reconstruct_sparse(&sparse);
        assert_eq!((matrix.rows(), matrix.cols()), (0, 0));

        let too_large = SparseWeights {
            shape: [1 << 20, 1 << 20],
            ..sparse
        };
        assert_eq!(reconstruct_sparse(&too_large), DenseMatrix::zeros(0, 0));
    }

    #[test]
    fn provided_stats_take_precedence() {
        let mut tensor = AttentionTensor::dense(vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        tensor.stats = Some(TensorStats {
            max: 9.0,
            min: 0.0,
            mean: 1.0,
            std: 2.0,
        });
        let resolved = resolve_tensor(Some(&tensor), 2);
        assert_eq!(resolved.stats.max, 9.0);
    }
}
