use eframe::egui::{Vec2, vec2};
use rand::Rng;
use tracing::debug;

use crate::model::HiddenStates;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowOptions {
    pub layer_count: usize,
    pub max_tokens: usize,
    /// Secondary edges are only built up to this many tokens.
    pub connection_limit: usize,
    pub show_connections: bool,
    pub layer_spacing: f32,
    pub width: f32,
    pub jitter_per_layer: f32,
    pub max_jitter: f32,
    pub base_radius: f32,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            layer_count: 6,
            max_tokens: 40,
            connection_limit: 30,
            show_connections: true,
            layer_spacing: 90.0,
            width: 800.0,
            jitter_per_layer: 6.0,
            max_jitter: 30.0,
            base_radius: 6.0,
        }
    }
}

pub const PRIMARY_STRENGTH: f32 = 1.0;
pub const SECONDARY_STRENGTH: f32 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowNode {
    pub token: usize,
    pub position: Vec2,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowEdgeKind {
    Primary,
    Secondary,
}

/// Connects `source` in one frame to `target` in the next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowEdge {
    pub source: usize,
    pub target: usize,
    pub strength: f32,
    pub kind: FlowEdgeKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerFrame {
    pub index: usize,
    pub nodes: Vec<FlowNode>,
    /// Empty for the last frame.
    pub edges: Vec<FlowEdge>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerFlow {
    pub frames: Vec<LayerFrame>,
    pub token_count: usize,
    pub total_tokens: usize,
}

impl LayerFlow {
    pub fn truncated(&self) -> bool {
        self.total_tokens > self.token_count
    }

    /// Center of the laid-out frames in world units.
    pub fn center(&self, options: &FlowOptions) -> Vec2 {
        let depth = self.frames.len().saturating_sub(1) as f32;
        vec2(0.0, depth * options.layer_spacing * 0.5)
    }
}

pub struct LayerFlowBuilder {
    options: FlowOptions,
}

impl LayerFlowBuilder {
    pub fn new(options: FlowOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FlowOptions {
        &self.options
    }

    pub fn build<R: Rng + ?Sized>(
        &self,
        total_tokens: usize,
        hidden_states: Option<&HiddenStates>,
        rng: &mut R,
    ) -> LayerFlow {
        let options = &self.options;
        let count = total_tokens.min(options.max_tokens);
        let secondary = options.show_connections && count <= options.connection_limit;
        // Index 0 holds the embedding output when there is one more state than layers.
        let offset = usize::from(
            hidden_states.is_some_and(|states| states.layer_count() == options.layer_count + 1),
        );

        let frames = (0..options.layer_count)
            .map(|layer| {
                let radii = layer_radii(hidden_states, layer + offset, count, options.base_radius);
                let nodes = (0..count)
                    .map(|token| FlowNode {
                        token,
                        position: vec2(
                            token_x(token, count, options.width) + jitter(layer, options, rng),
                            layer as f32 * options.layer_spacing,
                        ),
                        radius: radii[token],
                    })
                    .collect();
                let edges = if layer + 1 < options.layer_count {
                    inter_layer_edges(count, secondary)
                } else {
                    Vec::new()
                };
                LayerFrame {
                    index: layer,
                    nodes,
                    edges,
                }
            })
            .collect();

        debug!(
            tokens = count,
            total_tokens,
            layers = options.layer_count,
            secondary,
            state_offset = offset,
            "built layer flow"
        );

        LayerFlow {
            frames,
            token_count: count,
            total_tokens,
        }
    }
}

fn token_x(token: usize, count: usize, width: f32) -> f32 {
    if count <= 1 {
        return 0.0;
    }
    (token as f32 / (count - 1) as f32 - 0.5) * width
}

fn jitter<R: Rng + ?Sized>(layer: usize, options: &FlowOptions, rng: &mut R) -> f32 {
    let bound =
        (layer as f32 * options.jitter_per_layer.max(0.0)).min(options.max_jitter.max(0.0));
    if bound <= 0.0 || !bound.is_finite() {
        return 0.0;
    }
    rng.gen_range(-bound..=bound)
}

fn layer_radii(
    hidden_states: Option<&HiddenStates>,
    layer: usize,
    count: usize,
    base: f32,
) -> Vec<f32> {
    let Some(norms) = hidden_states.and_then(|states| states.token_norms(layer)) else {
        return vec![base; count];
    };

    let used = &norms[..norms.len().min(count)];
    let (min, max) = used
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), value| {
            (lo.min(*value), hi.max(*value))
        });
    let span = max - min;

    (0..count)
        .map(|token| match used.get(token) {
            Some(norm) if span > f32::EPSILON && span.is_finite() => {
                base * (0.6 + 0.8 * ((norm - min) / span))
            }
            _ => base,
        })
        .collect()
}

fn inter_layer_edges(count: usize, secondary: bool) -> Vec<FlowEdge> {
    let mut edges = Vec::with_capacity(if secondary { count * 3 } else { count });
    for token in 0..count {
        edges.push(FlowEdge {
            source: token,
            target: token,
            strength: PRIMARY_STRENGTH,
            kind: FlowEdgeKind::Primary,
        });
        if !secondary {
            continue;
        }
        let neighbors = [token.checked_sub(1), Some(token + 1).filter(|next| *next < count)];
        for target in neighbors.into_iter().flatten() {
            edges.push(FlowEdge {
                source: token,
                target,
                strength: SECONDARY_STRENGTH,
                kind: FlowEdgeKind::Secondary,
            });
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn build(tokens: usize, options: FlowOptions) -> LayerFlow {
        let mut rng = StdRng::seed_from_u64(5);
        LayerFlowBuilder::new(options).build(tokens, None, &mut rng)
    }

    #[test]
    fn frames_stack_by_layer_spacing() {
        let flow = build(10, FlowOptions::default());
        assert_eq!(flow.frames.len(), 6);
        for frame in &flow.frames {
            assert_eq!(frame.nodes.len(), 10);
            for node in &frame.nodes {
                assert_eq!(node.position.y, frame.index as f32 * 90.0);
            }
        }
        assert!(flow.frames[5].edges.is_empty());
    }

    #[test]
    fn first_layer_is_unjittered_and_later_layers_are_bounded() {
        let flow = build(12, FlowOptions::default());
        for (token, node) in flow.frames[0].nodes.iter().enumerate() {
            assert_eq!(node.position.x, token_x(token, 12, 800.0));
        }
        for frame in &flow.frames {
            let bound = (frame.index as f32 * 6.0).min(30.0);
            for (token, node) in frame.nodes.iter().enumerate() {
                assert!((node.position.x - token_x(token, 12, 800.0)).abs() <= bound + 1e-3);
            }
        }
    }

    #[test]
    fn token_cap_and_secondary_edges() {
        let flow = build(100, FlowOptions::default());
        assert_eq!(flow.token_count, 40);
        assert!(flow.truncated());
        assert!(
            flow.frames[0]
                .edges
                .iter()
                .all(|edge| edge.kind == FlowEdgeKind::Primary && edge.strength == 1.0)
        );

        let flow = build(4, FlowOptions::default());
        let edges = &flow.frames[0].edges;
        assert_eq!(edges.len(), 4 + 6);
        assert!(
            edges
                .iter()
                .filter(|edge| edge.kind == FlowEdgeKind::Secondary)
                .all(|edge| edge.strength == 0.3 && edge.source.abs_diff(edge.target) == 1)
        );

        let flow = build(
            4,
            FlowOptions {
                show_connections: false,
                ..FlowOptions::default()
            },
        );
        assert_eq!(flow.frames[0].edges.len(), 4);
    }

    #[test]
    fn hidden_state_norms_scale_radius() {
        let states: HiddenStates = serde_json::from_str(
            r#"{"layers": {"layer_0": {"token_norms": [1.0, 3.0, 2.0]}}}"#,
        )
        .expect("summary");
        let mut rng = StdRng::seed_from_u64(1);
        let flow = LayerFlowBuilder::new(FlowOptions::default()).build(3, Some(&states), &mut rng);
        let radii: Vec<f32> = flow.frames[0].nodes.iter().map(|node| node.radius).collect();
        assert!(radii[1] > radii[2] && radii[2] > radii[0]);
        assert!(flow.frames[1].nodes.iter().all(|node| node.radius == 6.0));
    }

    #[test]
    fn embedding_state_is_skipped_when_one_extra_layer_is_present() {
        let mut layers = serde_json::Map::new();
        layers.insert(
            "layer_0".into(),
            serde_json::json!({"token_norms": [1.0, 1.0, 1.0]}),
        );
        layers.insert(
            "layer_1".into(),
            serde_json::json!({"token_norms": [1.0, 3.0, 2.0]}),
        );
        for index in 2..7 {
            layers.insert(
                format!("layer_{index}"),
                serde_json::json!({"token_norms": [2.0, 2.0, 2.0]}),
            );
        }
        let states: HiddenStates =
            serde_json::from_value(serde_json::json!({"num_layers": 7, "layers": layers}))
                .expect("summary");
        assert_eq!(states.layer_count(), 7);

        let mut rng = StdRng::seed_from_u64(1);
        let flow = LayerFlowBuilder::new(FlowOptions::default()).build(3, Some(&states), &mut rng);
        let radii: Vec<f32> = flow.frames[0].nodes.iter().map(|node| node.radius).collect();
        assert!(radii[1] > radii[2] && radii[2] > radii[0], "{radii:?}");
        assert_eq!(flow.frames.len(), 6);
        assert!(flow.frames[5].nodes.iter().all(|node| node.radius == 6.0));
    }

    #[test]
    fn negative_jitter_options_leave_tokens_in_place() {
        let flow = build(
            8,
            FlowOptions {
                jitter_per_layer: 6.0,
                max_jitter: -30.0,
                ..FlowOptions::default()
            },
        );
        for frame in &flow.frames {
            for (token, node) in frame.nodes.iter().enumerate() {
                assert_eq!(node.position.x, token_x(token, 8, 800.0));
            }
        }

        let flow = build(
            8,
            FlowOptions {
                jitter_per_layer: -6.0,
                ..FlowOptions::default()
            },
        );
        for (token, node) in flow.frames[3].nodes.iter().enumerate() {
            assert_eq!(node.position.x, token_x(token, 8, 800.0));
        }
    }

    #[test]
    fn secondary_edges_stop_above_connection_limit() {
        let secondary_count = |tokens: usize| {
            build(tokens, FlowOptions::default()).frames[0]
                .edges
                .iter()
                .filter(|edge| edge.kind == FlowEdgeKind::Secondary)
                .count()
        };
        assert_eq!(secondary_count(30), 2 * 29);
        assert_eq!(secondary_count(31), 0);
    }
}
