use crate::model::TensorStats;

/// Row-major dense matrix of attention weights.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn filled(side: usize, value: f32) -> Self {
        Self {
            rows: side,
            cols: side,
            data: vec![value; side * side],
        }
    }

    /// Ragged input is padded with zeros to the widest row; non-finite
    /// values become zero.
    pub fn from_rows(rows: &[Vec<f32>]) -> Self {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut matrix = Self::zeros(rows.len(), cols);
        for (row_index, row) in rows.iter().enumerate() {
            for (col_index, value) in row.iter().enumerate() {
                if value.is_finite() {
                    matrix.data[row_index * cols + col_index] = *value;
                }
            }
        }
        matrix
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col]
        } else {
            0.0
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col] = value;
        }
    }

    pub fn row(&self, row: usize) -> &[f32] {
        if row >= self.rows {
            return &[];
        }
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Crops or zero-pads to `side × side`.
    pub fn to_square(&self, side: usize) -> Self {
        if self.rows == side && self.cols == side {
            return self.clone();
        }

        let mut square = Self::zeros(side, side);
        for row in 0..side.min(self.rows) {
            for col in 0..side.min(self.cols) {
                square.data[row * side + col] = self.data[row * self.cols + col];
            }
        }
        square
    }

    /// Sum of each column: how much attention every token receives.
    pub fn column_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for row in 0..self.rows {
            for (sum, value) in sums.iter_mut().zip(self.row(row)) {
                *sum += value;
            }
        }
        sums
    }

    pub fn stats(&self) -> TensorStats {
        if self.data.is_empty() {
            return TensorStats::default();
        }

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0_f64;
        for value in &self.data {
            min = min.min(*value);
            max = max.max(*value);
            sum += f64::from(*value);
        }

        let count = self.data.len() as f64;
        let mean = sum / count;
        let variance = self
            .data
            .iter()
            .map(|value| {
                let delta = f64::from(*value) - mean;
                delta * delta
            })
            .sum::<f64>()
            / count;

        TensorStats {
            max,
            min,
            mean: mean as f32,
            std: variance.sqrt() as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_padded() {
        let matrix = DenseMatrix::from_rows(&[vec![1.0], vec![0.5, f32::NAN, 0.25]]);
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.cols(), 3);
        assert_eq!(matrix.get(0, 2), 0.0);
        assert_eq!(matrix.get(1, 1), 0.0);
        assert_eq!(matrix.get(1, 2), 0.25);
        assert_eq!(matrix.get(9, 9), 0.0);
    }

    #[test]
    fn square_crop_and_pad() {
        let matrix = DenseMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let cropped = matrix.to_square(2);
        assert_eq!(cropped.as_slice(), &[1.0, 2.0, 4.0, 5.0]);
        let padded = matrix.to_square(3);
        assert_eq!(padded.row(2), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn stats_of_constant_matrix() {
        let stats = DenseMatrix::filled(4, 0.25).stats();
        assert_eq!(stats.min, 0.25);
        assert_eq!(stats.max, 0.25);
        assert!((stats.mean - 0.25).abs() < 1e-6);
        assert!(stats.std.abs() < 1e-6);
    }
}
