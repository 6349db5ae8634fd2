use std::ops::Range;

use tracing::debug;

use super::DenseMatrix;

pub const DEFAULT_HEATMAP_SIDE: usize = 100;

#[derive(Clone, Debug)]
pub struct Downsampled {
    pub matrix: DenseMatrix,
    pub block_size: usize,
    pub source_size: usize,
    pub labels: Vec<String>,
}

impl Downsampled {
    /// Source token indices covered by output row or column `index`.
    pub fn block_range(&self, index: usize) -> Range<usize> {
        let start = (index * self.block_size).min(self.source_size);
        let end = (start + self.block_size).min(self.source_size);
        start..end
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MatrixDownsampler {
    pub target: usize,
}

impl Default for MatrixDownsampler {
    fn default() -> Self {
        Self {
            target: DEFAULT_HEATMAP_SIDE,
        }
    }
}

impl MatrixDownsampler {
    pub fn new(target: usize) -> Self {
        Self { target }
    }

    pub fn block_size(&self, source_size: usize) -> usize {
        source_size.div_ceil(self.target.max(1)).max(1)
    }

    /// Block-averages `matrix` so neither side exceeds the target. Partial
    /// blocks on the trailing edges average only the cells they cover.
    pub fn downsample(&self, matrix: &DenseMatrix, labels: &[String]) -> Downsampled {
        let source_size = matrix.rows().max(matrix.cols());
        let block_size = self.block_size(source_size);

        if block_size == 1 {
            return Downsampled {
                matrix: matrix.clone(),
                block_size,
                source_size,
                labels: (0..source_size)
                    .map(|index| {
                        labels
                            .get(index)
                            .cloned()
                            .unwrap_or_else(|| index.to_string())
                    })
                    .collect(),
            };
        }

        let out_rows = matrix.rows().div_ceil(block_size);
        let out_cols = matrix.cols().div_ceil(block_size);
        let mut output = DenseMatrix::zeros(out_rows, out_cols);

        for out_row in 0..out_rows {
            let row_start = out_row * block_size;
            let row_end = (row_start + block_size).min(matrix.rows());
            for out_col in 0..out_cols {
                let col_start = out_col * block_size;
                let col_end = (col_start + block_size).min(matrix.cols());

                let mut sum = 0.0_f64;
                let mut count = 0usize;
                for row in row_start..row_end {
                    for value in &matrix.row(row)[col_start..col_end] {
                        sum += f64::from(*value);
                        count += 1;
                    }
                }

                if count > 0 {
                    output.set(out_row, out_col, (sum / count as f64) as f32);
                }
            }
        }

        let out_side = out_rows.max(out_cols);
        let labels = (0..out_side)
            .map(|index| {
                let first = index * block_size;
                let last = ((index + 1) * block_size).min(source_size) - 1;
                if first == last {
                    format!("[{first}]")
                } else {
                    format!("[{first}-{last}]")
                }
            })
            .collect();

        debug!(source_size, block_size, out_side, "downsampled attention matrix");

        Downsampled {
            matrix: output,
            block_size,
            source_size,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_and_output_side() {
        let downsampler = MatrixDownsampler::new(100);
        assert_eq!(downsampler.block_size(100), 1);
        assert_eq!(downsampler.block_size(101), 2);
        assert_eq!(downsampler.block_size(512), 6);

        let result = downsampler.downsample(&DenseMatrix::zeros(512, 512), &[]);
        assert_eq!(result.matrix.rows(), 86);
        assert_eq!(result.matrix.cols(), 86);
    }

    #[test]
    fn partial_blocks_average_only_covered_cells() {
        let mut matrix = DenseMatrix::zeros(3, 3);
        for row in 0..3 {
            for col in 0..3 {
                matrix.set(row, col, (row * 3 + col) as f32);
            }
        }

        let result = MatrixDownsampler::new(2).downsample(&matrix, &[]);
        assert_eq!(result.block_size, 2);
        assert_eq!(result.matrix.get(0, 0), (0.0 + 1.0 + 3.0 + 4.0) / 4.0);
        assert_eq!(result.matrix.get(0, 1), (2.0 + 5.0) / 2.0);
        assert_eq!(result.matrix.get(1, 0), (6.0 + 7.0) / 2.0);
        assert_eq!(result.matrix.get(1, 1), 8.0);
    }

    #[test]
    fn labels_become_ranges_when_blocked() {
        let labels = (0..5).map(|index| format!("t{index}")).collect::<Vec<_>>();
        let identity = MatrixDownsampler::new(8).downsample(&DenseMatrix::zeros(5, 5), &labels);
        assert_eq!(identity.labels, labels);

        let blocked = MatrixDownsampler::new(2).downsample(&DenseMatrix::zeros(5, 5), &labels);
        assert_eq!(blocked.block_size, 3);
        assert_eq!(blocked.labels, vec!["[0-2]", "[3-4]"]);
        assert_eq!(blocked.block_range(1), 3..5);
    }
}
