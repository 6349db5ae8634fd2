use tracing::debug;

use super::DenseMatrix;

pub const DEFAULT_EDGE_PERCENTILE: f32 = 0.75;
pub const DEFAULT_EDGE_AMPLIFICATION: f32 = 5.0;

/// Directed attention edge: `source` (query token) attends to `target`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttentionEdge {
    pub source: usize,
    pub target: usize,
    pub weight: f32,
    pub strength: f32,
}

#[derive(Clone, Debug, Default)]
pub struct EdgeSelection {
    pub edges: Vec<AttentionEdge>,
    pub threshold: Option<f32>,
    /// Edges above threshold before the cap was applied.
    pub candidates: usize,
}

impl EdgeSelection {
    pub fn truncated(&self) -> bool {
        self.candidates > self.edges.len()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EdgeSelector {
    pub cap: usize,
    pub percentile: f32,
    pub amplification: f32,
}

impl Default for EdgeSelector {
    fn default() -> Self {
        Self {
            cap: 500,
            percentile: DEFAULT_EDGE_PERCENTILE,
            amplification: DEFAULT_EDGE_AMPLIFICATION,
        }
    }
}

pub fn edge_strength(weight: f32, amplification: f32) -> f32 {
    (weight * amplification).clamp(0.0, 1.0)
}

impl EdgeSelector {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            cap,
            ..Self::default()
        }
    }

    /// Value at `floor(percentile × count)` of the sorted off-diagonal cells
    /// of the leading square block.
    pub fn threshold(&self, matrix: &DenseMatrix) -> Option<f32> {
        let side = matrix.rows().min(matrix.cols());
        let mut values = Vec::with_capacity(side * side.saturating_sub(1));
        for row in 0..side {
            for (col, value) in matrix.row(row).iter().take(side).enumerate() {
                if row != col {
                    values.push(*value);
                }
            }
        }

        if values.is_empty() {
            return None;
        }

        values.sort_by(f32::total_cmp);
        let percentile = self.percentile.clamp(0.0, 1.0);
        let index = ((percentile * values.len() as f32).floor() as usize).min(values.len() - 1);
        Some(values[index])
    }

    pub fn select(&self, matrix: &DenseMatrix) -> EdgeSelection {
        let Some(threshold) = self.threshold(matrix) else {
            return EdgeSelection::default();
        };

        let side = matrix.rows().min(matrix.cols());
        let mut edges = Vec::new();
        for row in 0..side {
            for (col, &weight) in matrix.row(row).iter().take(side).enumerate() {
                if row == col || weight <= threshold {
                    continue;
                }
                edges.push(AttentionEdge {
                    source: row,
                    target: col,
                    weight,
                    strength: edge_strength(weight, self.amplification),
                });
            }
        }

        let candidates = edges.len();
        if candidates > self.cap {
            // Stable sort keeps row-major order between equal weights.
            edges.sort_by(|a, b| b.weight.total_cmp(&a.weight));
            edges.truncate(self.cap);
        }

        debug!(
            candidates,
            kept = edges.len(),
            cap = self.cap,
            threshold,
            "selected attention edges"
        );

        EdgeSelection {
            edges,
            threshold: Some(threshold),
            candidates,
        }
    }
}
