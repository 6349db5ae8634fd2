use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::dataset::{
    AttentionData, AttentionTensor, Dataset, LayerAttention, Metadata, head_key, layer_key,
};

pub const MAX_DEMO_TOKENS: usize = 512;
const DEMO_EMBEDDING_DIM: usize = 48;

pub struct ExampleText {
    pub title: &'static str,
    pub category: &'static str,
    pub text: &'static str,
}

pub const EXAMPLE_TEXTS: [ExampleText; 5] = [
    ExampleText {
        title: "Simple Sentence",
        category: "basic",
        text: "The quick brown fox jumps over the lazy dog.",
    },
    ExampleText {
        title: "Question",
        category: "basic",
        text: "What is the meaning of life, the universe, and everything?",
    },
    ExampleText {
        title: "Technical Description",
        category: "technical",
        text: "Neural networks process information through layers of interconnected nodes, transforming input data into meaningful outputs.",
    },
    ExampleText {
        title: "Short Story Opening",
        category: "narrative",
        text: "Once upon a time, in a land far away, there lived a wise old wizard who knew the secrets of the universe.",
    },
    ExampleText {
        title: "Code Comment",
        category: "technical",
        text: "This function calculates the attention weights between tokens in a sequence using scaled dot-product attention.",
    },
];

/// Splits on whitespace and peels punctuation into its own tokens, wrapped in
/// `[CLS]`/`[SEP]` like a BERT tokenizer would.
pub fn demo_tokenize(text: &str) -> Vec<String> {
    let mut tokens = vec!["[CLS]".to_owned()];
    for word in text.split_whitespace() {
        let mut current = String::new();
        for ch in word.chars() {
            if ch.is_ascii_punctuation() && ch != '\'' && ch != '-' {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(ch.to_string());
            } else {
                current.push(ch);
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
    }
    tokens.truncate(MAX_DEMO_TOKENS - 1);
    tokens.push("[SEP]".to_owned());
    tokens
}

/// Builds a deterministic stand-in dataset for when the inference service is
/// unreachable. Rows favor nearby tokens and the leading `[CLS]`, with a
/// per-head locality width, and every row sums to one.
pub fn synthesize(text: &str, layers: usize, heads: usize, seed: u64) -> Dataset {
    let tokens = demo_tokenize(text);
    let n = tokens.len();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut layer_map = BTreeMap::new();
    for layer in 0..layers {
        let mut head_map = BTreeMap::new();
        let mut average = vec![vec![0.0_f32; n]; n];

        for head in 0..heads {
            let width = 0.6 + (head % 4) as f32 * 0.9 + layer as f32 * 0.35;
            let cls_bias = 0.15 + (layer as f32 * 0.08);
            let mut weights = vec![vec![0.0_f32; n]; n];
            for (row, weights_row) in weights.iter_mut().enumerate() {
                for (col, cell) in weights_row.iter_mut().enumerate() {
                    let distance = (row as f32 - col as f32).abs();
                    let mut value = (-distance / width).exp();
                    if col == 0 {
                        value += cls_bias;
                    }
                    value += rng.gen_range(0.0..0.05);
                    *cell = value;
                }

                let sum = weights_row.iter().sum::<f32>();
                if sum > 0.0 {
                    for cell in weights_row.iter_mut() {
                        *cell /= sum;
                    }
                }
            }

            for (avg_row, row) in average.iter_mut().zip(&weights) {
                for (avg, value) in avg_row.iter_mut().zip(row) {
                    *avg += value / heads as f32;
                }
            }
            head_map.insert(head_key(head), AttentionTensor::dense(weights));
        }

        layer_map.insert(
            layer_key(layer),
            LayerAttention {
                average: Some(AttentionTensor::dense(average)),
                heads: head_map,
                num_heads: Some(heads),
                sampling_rate: Some(1.0),
                seq_len: Some(n),
            },
        );
    }

    let embeddings = (0..n)
        .map(|_| {
            (0..DEMO_EMBEDDING_DIM)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect()
        })
        .collect();

    Dataset {
        tokens,
        attention: Some(AttentionData {
            num_layers: Some(layers),
            layers: layer_map,
        }),
        embeddings: Some(embeddings),
        embedding_stats: None,
        hidden_states: None,
        metadata: Some(Metadata {
            model_name: "demo".to_owned(),
            processing_time: 0.0,
            num_tokens: n,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_splits_punctuation() {
        let tokens = demo_tokenize("Hello, world!");
        assert_eq!(tokens, vec!["[CLS]", "Hello", ",", "world", "!", "[SEP]"]);
    }

    #[test]
    fn synthesized_rows_are_normalized() {
        let dataset = synthesize(EXAMPLE_TEXTS[0].text, 2, 3, 7);
        assert_eq!(dataset.layer_count(), 2);
        assert_eq!(dataset.head_count(1), 3);

        let layer = dataset.layer(1).expect("layer 1");
        let weights = layer.heads["head_2"].weights.as_ref().expect("dense weights");
        assert_eq!(weights.len(), dataset.token_count());
        for row in weights {
            let sum = row.iter().sum::<f32>();
            assert!((sum - 1.0).abs() < 1e-4, "row sum {sum}");
        }
    }

    #[test]
    fn synthesis_is_deterministic_per_seed() {
        let a = synthesize("a b c", 1, 1, 42);
        let b = synthesize("a b c", 1, 1, 42);
        assert_eq!(a.embeddings, b.embeddings);
    }
}
