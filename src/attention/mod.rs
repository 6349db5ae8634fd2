mod downsample;
mod edges;
mod matrix;
mod resolve;

pub use downsample::{DEFAULT_HEATMAP_SIDE, Downsampled, MatrixDownsampler};
pub use edges::{
    AttentionEdge, DEFAULT_EDGE_AMPLIFICATION, DEFAULT_EDGE_PERCENTILE, EdgeSelection,
    EdgeSelector, edge_strength,
};
pub use matrix::DenseMatrix;
pub use resolve::{
    HeadSelector, MatrixSelector, MatrixSource, ResolvedMatrix, reconstruct_sparse, resolve,
    resolve_tensor,
};
