//! Graph rendering: the strategy selector and the two interchangeable
//! backends behind [`GraphBackend`].

pub mod palette;
mod raster;
pub mod render_utils;
mod retained;
mod strategy;

use eframe::egui::{Color32, Context, Painter, Pos2, Rect};

use crate::attention::AttentionEdge;
use crate::interaction::ViewTransform;
use crate::model::Token;
use crate::physics::LayoutNode;

pub use raster::{RasterBackend, RasterSurface};
pub use retained::{RetainedBackend, SceneElement};
pub use strategy::{
    DEFAULT_IMMEDIATE_EDGE_CAP, DEFAULT_IMMEDIATE_NODE_THRESHOLD, DEFAULT_RETAINED_EDGE_CAP,
    PerformanceMode, RenderStrategy, select_strategy,
};

use render_utils::{blend_color, dim_color};

/// Extra screen pixels granted around a node when hit testing.
pub const HIT_SLACK: f32 = 4.0;

/// Hover, selection and search state applied on top of category colors.
#[derive(Clone, Copy, Debug, Default)]
pub struct Highlight<'a> {
    pub hovered: Option<usize>,
    pub selected: Option<usize>,
    /// One flag per node; empty when no search is active.
    pub matches: &'a [bool],
}

impl Highlight<'_> {
    fn searching(&self) -> bool {
        self.matches.iter().any(|matched| *matched)
    }

    fn is_match(&self, node: usize) -> bool {
        self.matches.get(node).copied().unwrap_or(false)
    }
}

/// Everything a backend needs for one update. Nodes and tokens are parallel
/// slices indexed by token id; edges reference the same ids.
#[derive(Clone, Copy, Debug)]
pub struct GraphFrame<'a> {
    pub nodes: &'a [LayoutNode],
    pub tokens: &'a [Token],
    pub edges: &'a [AttentionEdge],
    /// Bumped whenever the node or edge set is rebuilt.
    pub revision: u64,
    pub highlight: Highlight<'a>,
}

impl GraphFrame<'_> {
    pub fn label(&self, node: usize) -> &str {
        self.tokens
            .get(node)
            .map(|token| token.label.as_str())
            .unwrap_or_default()
    }

    pub fn node_fill(&self, node: usize) -> Color32 {
        let base = self
            .tokens
            .get(node)
            .map(|token| palette::category_color(token.category))
            .unwrap_or(palette::LABEL);
        let highlight = &self.highlight;

        if highlight.hovered == Some(node) {
            blend_color(base, palette::HOVER, 0.7)
        } else if highlight.selected == Some(node) {
            blend_color(base, palette::SELECTED, 0.7)
        } else if highlight.is_match(node) {
            blend_color(base, palette::SEARCH_MATCH, 0.6)
        } else if highlight.searching() {
            dim_color(base, 0.35)
        } else {
            base
        }
    }

    pub(crate) fn edge_in_range(&self, edge: &AttentionEdge) -> bool {
        edge.source < self.nodes.len() && edge.target < self.nodes.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackendOptions {
    /// Retained mode draws labels only up to this many nodes.
    pub label_limit: usize,
    /// Raster mode draws labels only at or above this zoom.
    pub label_zoom: f32,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            label_limit: 50,
            label_zoom: 1.5,
        }
    }
}

/// Shared contract of the retained and immediate backends. The owning view
/// swaps implementations through this trait when the performance mode
/// changes, without knowing which one it holds.
pub trait GraphBackend {
    fn strategy(&self) -> RenderStrategy;

    fn update(&mut self, frame: &GraphFrame<'_>);

    fn view(&self) -> &ViewTransform;

    fn view_mut(&mut self) -> &mut ViewTransform;

    fn reset_view(&mut self) {
        self.view_mut().reset();
    }

    /// Node id under `screen`, if any.
    fn hit_test(&self, viewport: Rect, screen: Pos2) -> Option<usize>;

    fn paint(&mut self, ctx: &Context, painter: &Painter, viewport: Rect);

    /// Releases owned elements and surfaces. Safe to call more than once.
    fn destroy(&mut self);

    fn is_destroyed(&self) -> bool;
}

pub fn create_backend(strategy: RenderStrategy, options: BackendOptions) -> Box<dyn GraphBackend> {
    match strategy {
        RenderStrategy::Retained => Box::new(RetainedBackend::new(options.label_limit)),
        RenderStrategy::Immediate => Box::new(RasterBackend::new(options.label_zoom)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use eframe::egui::vec2;

    use crate::attention::AttentionEdge;
    use crate::model::{Token, tokens_from};
    use crate::physics::LayoutNode;

    pub fn line_graph(count: usize) -> (Vec<LayoutNode>, Vec<Token>, Vec<AttentionEdge>) {
        let nodes = (0..count)
            .map(|index| LayoutNode::new(index, vec2(index as f32 * 40.0, 0.0), 6.0))
            .collect();
        let raw: Vec<String> = (0..count).map(|index| format!("tok{index}")).collect();
        let edges = (1..count)
            .map(|index| AttentionEdge {
                source: index,
                target: index - 1,
                weight: 0.2,
                strength: 1.0,
            })
            .collect();
        (nodes, tokens_from(&raw), edges)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::line_graph;
    use super::*;

    #[test]
    fn backends_share_one_contract() {
        let (nodes, tokens, edges) = line_graph(4);
        let frame = GraphFrame {
            nodes: &nodes,
            tokens: &tokens,
            edges: &edges,
            revision: 1,
            highlight: Highlight::default(),
        };

        for strategy in [RenderStrategy::Retained, RenderStrategy::Immediate] {
            let mut backend = create_backend(strategy, BackendOptions::default());
            assert_eq!(backend.strategy(), strategy);
            backend.update(&frame);
            backend.view_mut().zoom = 3.0;
            backend.reset_view();
            assert_eq!(*backend.view(), ViewTransform::default());
            backend.destroy();
            backend.destroy();
            assert!(backend.is_destroyed());
        }
    }

    #[test]
    fn search_dims_non_matching_nodes() {
        let (nodes, tokens, edges) = line_graph(3);
        let matches = [true, false, false];
        let frame = GraphFrame {
            nodes: &nodes,
            tokens: &tokens,
            edges: &edges,
            revision: 0,
            highlight: Highlight {
                matches: &matches,
                ..Highlight::default()
            },
        };
        let base = palette::category_color(tokens[1].category);
        assert_ne!(frame.node_fill(0), base);
        assert!(frame.node_fill(1).r() <= base.r());
        assert!(frame.node_fill(1).b() < base.b());
    }
}
