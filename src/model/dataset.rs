use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One inference result: tokens plus whatever attention, embedding and
/// hidden-state data the producer chose to return.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Dataset {
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub attention: Option<AttentionData>,
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub embedding_stats: Option<EmbeddingStats>,
    #[serde(default)]
    pub hidden_states: Option<HiddenStates>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Metadata {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default)]
    pub num_tokens: usize,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EmbeddingStats {
    #[serde(default)]
    pub mean: f32,
    #[serde(default)]
    pub std: f32,
    #[serde(default)]
    pub shape: Vec<usize>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AttentionData {
    #[serde(default)]
    pub num_layers: Option<usize>,
    #[serde(default)]
    pub layers: BTreeMap<String, LayerAttention>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LayerAttention {
    #[serde(default)]
    pub average: Option<AttentionTensor>,
    #[serde(default)]
    pub heads: BTreeMap<String, AttentionTensor>,
    #[serde(default)]
    pub num_heads: Option<usize>,
    #[serde(default)]
    pub sampling_rate: Option<f32>,
    #[serde(default)]
    pub seq_len: Option<usize>,
}

/// A single attention matrix. Producers send either `weights` (dense) or
/// `sparse_weights`; a tensor carrying neither is tolerated and resolves to
/// the zero fallback.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AttentionTensor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<Vec<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_weights: Option<SparseWeights>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TensorStats>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SparseWeights {
    #[serde(default)]
    pub indices: Vec<i64>,
    #[serde(default)]
    pub values: Vec<f32>,
    #[serde(default)]
    pub shape: [usize; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<f32>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TensorStats {
    pub max: f32,
    pub min: f32,
    pub mean: f32,
    pub std: f32,
}

pub enum TensorForm<'a> {
    Dense(&'a [Vec<f32>]),
    Sparse(&'a SparseWeights),
    Missing,
}

impl AttentionTensor {
    pub fn dense(weights: Vec<Vec<f32>>) -> Self {
        Self {
            weights: Some(weights),
            ..Self::default()
        }
    }

    pub fn sparse(indices: Vec<i64>, values: Vec<f32>, shape: [usize; 2]) -> Self {
        Self {
            sparse_weights: Some(SparseWeights {
                indices,
                values,
                shape,
                sampling_rate: None,
            }),
            ..Self::default()
        }
    }

    /// Dense data wins when a producer sends both forms.
    pub fn form(&self) -> TensorForm<'_> {
        if let Some(weights) = &self.weights {
            TensorForm::Dense(weights)
        } else if let Some(sparse) = &self.sparse_weights {
            TensorForm::Sparse(sparse)
        } else {
            TensorForm::Missing
        }
    }

    pub fn sampling_rate(&self) -> Option<f32> {
        self.sparse_weights.as_ref().and_then(|sparse| sparse.sampling_rate)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HiddenStates {
    Raw(Vec<Vec<Vec<f32>>>),
    Summary(HiddenStateSummary),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HiddenStateSummary {
    #[serde(default)]
    pub num_layers: Option<usize>,
    #[serde(default)]
    pub layers: BTreeMap<String, HiddenLayerSummary>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HiddenLayerSummary {
    #[serde(default)]
    pub token_norms: Vec<f32>,
}

impl HiddenStates {
    /// Per-token L2 norms for one layer, if the producer supplied them.
    pub fn token_norms(&self, layer: usize) -> Option<Vec<f32>> {
        match self {
            Self::Raw(layers) => layers.get(layer).map(|tokens| {
                tokens
                    .iter()
                    .map(|vector| vector.iter().map(|value| value * value).sum::<f32>().sqrt())
                    .collect()
            }),
            Self::Summary(summary) => summary
                .layers
                .get(&layer_key(layer))
                .map(|entry| entry.token_norms.clone()),
        }
    }

    /// Number of hidden-state layers, counting the embedding output at index 0
    /// when the producer includes it.
    pub fn layer_count(&self) -> usize {
        match self {
            Self::Raw(layers) => layers.len(),
            Self::Summary(summary) => {
                let from_keys = summary
                    .layers
                    .keys()
                    .filter_map(|key| parse_index(key, "layer_"))
                    .map(|index| index + 1)
                    .max()
                    .unwrap_or(0);
                from_keys.max(summary.num_layers.unwrap_or(0))
            }
        }
    }
}

pub fn layer_key(index: usize) -> String {
    format!("layer_{index}")
}

pub fn head_key(index: usize) -> String {
    format!("head_{index}")
}

fn parse_index(key: &str, prefix: &str) -> Option<usize> {
    key.strip_prefix(prefix)?.parse().ok()
}

impl Dataset {
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn model_name(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|meta| meta.model_name.as_str())
            .unwrap_or("unknown")
    }

    pub fn layer(&self, index: usize) -> Option<&LayerAttention> {
        self.attention.as_ref()?.layers.get(&layer_key(index))
    }

    /// Highest layer index present plus one, or the producer's own count.
    pub fn layer_count(&self) -> usize {
        let Some(attention) = &self.attention else {
            return 0;
        };

        let from_keys = attention
            .layers
            .keys()
            .filter_map(|key| parse_index(key, "layer_"))
            .max()
            .map(|index| index + 1)
            .unwrap_or(0);
        from_keys.max(attention.num_layers.unwrap_or(0))
    }

    pub fn head_count(&self, layer: usize) -> usize {
        let Some(layer) = self.layer(layer) else {
            return 0;
        };

        let from_keys = layer
            .heads
            .keys()
            .filter_map(|key| parse_index(key, "head_"))
            .max()
            .map(|index| index + 1)
            .unwrap_or(0);
        from_keys.max(layer.num_heads.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dense_and_sparse_layers() {
        let raw = r#"{
            "tokens": ["[CLS]", "hi", "[SEP]"],
            "attention": {
                "num_layers": 1,
                "layers": {
                    "layer_0": {
                        "num_heads": 2,
                        "average": {"weights": [[1,0,0],[0,1,0],[0,0,1]], "stats": {"max":1,"min":0,"mean":0.33,"std":0.47}},
                        "heads": {
                            "head_0": {"sparse_weights": {"indices": [0, 4], "values": [0.5, 0.25], "shape": [3, 3], "sampling_rate": 0.7}},
                            "head_1": {"stats": {"max":0,"min":0,"mean":0,"std":0}}
                        }
                    }
                }
            },
            "metadata": {"model_name": "distilbert", "processing_time": 0.2, "num_tokens": 3}
        }"#;

        let dataset: Dataset = serde_json::from_str(raw).expect("parse dataset");
        assert_eq!(dataset.token_count(), 3);
        assert_eq!(dataset.layer_count(), 1);
        assert_eq!(dataset.head_count(0), 2);
        assert_eq!(dataset.model_name(), "distilbert");

        let layer = dataset.layer(0).expect("layer 0");
        assert!(matches!(
            layer.average.as_ref().map(AttentionTensor::form),
            Some(TensorForm::Dense(_))
        ));
        let head_0 = layer.heads.get("head_0").expect("head 0");
        assert!(matches!(head_0.form(), TensorForm::Sparse(_)));
        assert_eq!(head_0.sampling_rate(), Some(0.7));
        let head_1 = layer.heads.get("head_1").expect("head 1");
        assert!(matches!(head_1.form(), TensorForm::Missing));
    }

    #[test]
    fn hidden_state_norms_from_both_forms() {
        let raw: HiddenStates =
            serde_json::from_str("[[[3.0, 4.0], [0.0, 1.0]]]").expect("raw hidden states");
        assert_eq!(raw.token_norms(0), Some(vec![5.0, 1.0]));
        assert_eq!(raw.token_norms(1), None);

        let summary: HiddenStates = serde_json::from_str(
            r#"{"num_layers": 1, "layers": {"layer_0": {"token_norms": [2.0, 7.5]}}}"#,
        )
        .expect("summary hidden states");
        assert_eq!(summary.token_norms(0), Some(vec![2.0, 7.5]));
        assert_eq!(raw.layer_count(), 1);
        assert_eq!(summary.layer_count(), 1);

        let gapped: HiddenStates = serde_json::from_str(
            r#"{"num_layers": 2, "layers": {"layer_6": {"token_norms": [1.0]}}}"#,
        )
        .expect("summary hidden states");
        assert_eq!(gapped.layer_count(), 7);
    }
}
