//! Contracts of the two external services and the clients that talk to them.

mod http;
mod worker;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::Dataset;

pub use http::{HttpInferenceClient, HttpReductionClient, MAX_TEXT_CHARS};
pub use worker::LatestRequest;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMethod {
    #[default]
    Pca,
    Tsne,
    Umap,
}

impl ReductionMethod {
    pub const ALL: [Self; 3] = [Self::Pca, Self::Tsne, Self::Umap];

    pub fn label(self) -> &'static str {
        match self {
            Self::Pca => "PCA",
            Self::Tsne => "t-SNE",
            Self::Umap => "UMAP",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceOptions {
    pub return_attention: bool,
    pub return_embeddings: bool,
    pub return_hidden_states: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            return_attention: true,
            return_embeddings: true,
            return_hidden_states: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub text: String,
    #[serde(rename = "model")]
    pub model_id: String,
    pub options: InferenceOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReductionRequest {
    pub embeddings: Vec<Vec<f32>>,
    pub method: ReductionMethod,
    pub n_components: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReductionResponse {
    pub coordinates: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_dim: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ReductionStats>,
}

/// Service-side report on the reduction. Every field is optional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionStats {
    /// Rank correlation between pairwise distances before and after.
    pub distance_correlation: Option<f32>,
    pub n_tokens: Option<usize>,
    pub original_dim: Option<usize>,
    pub reduced_dim: Option<usize>,
}

/// Produces tokens, attention and embeddings for a text.
pub trait InferenceService: Send + Sync {
    fn infer(&self, request: &InferenceRequest) -> Result<Dataset, ServiceError>;
}

/// Projects embeddings to 2 or 3 dimensions.
pub trait ReductionService: Send + Sync {
    fn reduce(&self, request: &ReductionRequest) -> Result<ReductionResponse, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_serialize_to_wire_names() {
        let request = ReductionRequest {
            embeddings: vec![vec![0.5, 1.0]],
            method: ReductionMethod::Tsne,
            n_components: 2,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["method"], "tsne");
        assert_eq!(json["n_components"], 2);

        let request = InferenceRequest {
            text: "hi".into(),
            model_id: "gpt2".into(),
            options: InferenceOptions::default(),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["model"], "gpt2");
        assert_eq!(json["options"]["return_attention"], true);
    }
}
