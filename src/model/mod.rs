mod dataset;
pub mod demo;
mod token;

pub use dataset::{
    AttentionData, AttentionTensor, Dataset, EmbeddingStats, HiddenLayerSummary, HiddenStateSummary,
    HiddenStates, LayerAttention, Metadata, SparseWeights, TensorForm, TensorStats, head_key,
    layer_key,
};
pub use token::{Token, TokenCategory, clean_label, point_size, tokens_from};
