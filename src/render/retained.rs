use eframe::egui::{Align2, Color32, Context, FontId, Painter, Pos2, Rect, Stroke, Vec2, vec2};
use tracing::debug;

use crate::interaction::ViewTransform;

use super::palette::{LABEL, edge_color};
use super::render_utils::{circle_visible, draw_background, edge_visible};
use super::{GraphBackend, GraphFrame, HIT_SLACK, RenderStrategy};

/// One addressable element of the vector scene.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneElement {
    Edge {
        source: usize,
        target: usize,
        strength: f32,
    },
    Node {
        id: usize,
        center: Vec2,
        radius: f32,
        fill: Color32,
    },
    Label {
        id: usize,
        anchor: Vec2,
        offset: f32,
        text: String,
    },
}

/// Vector scene kept between frames. Positions and colors are patched in
/// place through per-node slots; the element list is only rebuilt when the
/// frame revision changes.
pub struct RetainedBackend {
    view: ViewTransform,
    elements: Vec<SceneElement>,
    node_slots: Vec<usize>,
    label_slots: Vec<Option<usize>>,
    revision: Option<u64>,
    label_limit: usize,
    destroyed: bool,
}

impl RetainedBackend {
    pub fn new(label_limit: usize) -> Self {
        Self {
            view: ViewTransform::default(),
            elements: Vec::new(),
            node_slots: Vec::new(),
            label_slots: Vec::new(),
            revision: None,
            label_limit,
            destroyed: false,
        }
    }

    pub fn elements(&self) -> &[SceneElement] {
        &self.elements
    }

    pub fn shows_labels(&self) -> bool {
        self.label_slots.iter().any(Option::is_some)
    }

    fn rebuild(&mut self, frame: &GraphFrame<'_>) {
        self.elements.clear();
        self.node_slots.clear();
        self.label_slots.clear();

        // Edges first so nodes paint over them.
        for edge in frame.edges.iter().filter(|edge| frame.edge_in_range(edge)) {
            self.elements.push(SceneElement::Edge {
                source: edge.source,
                target: edge.target,
                strength: edge.strength,
            });
        }

        for (id, node) in frame.nodes.iter().enumerate() {
            self.node_slots.push(self.elements.len());
            self.elements.push(SceneElement::Node {
                id,
                center: node.position,
                radius: node.radius,
                fill: frame.node_fill(id),
            });
        }

        let labelled = frame.nodes.len() <= self.label_limit;
        for (id, node) in frame.nodes.iter().enumerate() {
            if !labelled {
                self.label_slots.push(None);
                continue;
            }
            self.label_slots.push(Some(self.elements.len()));
            self.elements.push(SceneElement::Label {
                id,
                anchor: node.position,
                offset: node.radius + 4.0,
                text: frame.label(id).to_owned(),
            });
        }

        self.revision = Some(frame.revision);
        debug!(
            elements = self.elements.len(),
            labelled, "rebuilt retained scene"
        );
    }

    fn patch(&mut self, frame: &GraphFrame<'_>) {
        for (id, node) in frame.nodes.iter().enumerate() {
            if let Some(SceneElement::Node { center, fill, .. }) =
                self.elements.get_mut(self.node_slots[id])
            {
                *center = node.position;
                *fill = frame.node_fill(id);
            }

            if let Some(Some(slot)) = self.label_slots.get(id)
                && let Some(SceneElement::Label { anchor, .. }) = self.elements.get_mut(*slot)
            {
                *anchor = node.position;
            }
        }
    }

    fn node_center(&self, id: usize) -> Option<Vec2> {
        match self.elements.get(*self.node_slots.get(id)?)? {
            SceneElement::Node { center, .. } => Some(*center),
            _ => None,
        }
    }
}

impl GraphBackend for RetainedBackend {
    fn strategy(&self) -> RenderStrategy {
        RenderStrategy::Retained
    }

    fn update(&mut self, frame: &GraphFrame<'_>) {
        if self.destroyed {
            return;
        }

        if self.revision != Some(frame.revision) || self.node_slots.len() != frame.nodes.len() {
            self.rebuild(frame);
        } else {
            self.patch(frame);
        }
    }

    fn view(&self) -> &ViewTransform {
        &self.view
    }

    fn view_mut(&mut self) -> &mut ViewTransform {
        &mut self.view
    }

    /// Topmost node element whose circle contains the pointer.
    fn hit_test(&self, viewport: Rect, screen: Pos2) -> Option<usize> {
        self.node_slots.iter().rev().find_map(|slot| {
            let SceneElement::Node {
                id, center, radius, ..
            } = &self.elements[*slot]
            else {
                return None;
            };
            let on_screen = self.view.world_to_screen(viewport, *center);
            (on_screen.distance(screen) <= radius * self.view.zoom + HIT_SLACK).then_some(*id)
        })
    }

    fn paint(&mut self, _ctx: &Context, painter: &Painter, viewport: Rect) {
        if self.destroyed {
            return;
        }

        draw_background(painter, viewport, &self.view);
        let zoom = self.view.zoom;

        for element in &self.elements {
            match element {
                SceneElement::Edge {
                    source,
                    target,
                    strength,
                } => {
                    let (Some(from), Some(to)) = (self.node_center(*source), self.node_center(*target))
                    else {
                        continue;
                    };
                    let from = self.view.world_to_screen(viewport, from);
                    let to = self.view.world_to_screen(viewport, to);
                    if !edge_visible(viewport, from, to, 2.0) {
                        continue;
                    }
                    let width = (0.5 + strength * 2.5) * zoom.sqrt();
                    painter.line_segment([from, to], Stroke::new(width, edge_color(*strength)));
                }
                SceneElement::Node {
                    center,
                    radius,
                    fill,
                    ..
                } => {
                    let position = self.view.world_to_screen(viewport, *center);
                    let radius = radius * zoom;
                    if !circle_visible(viewport, position, radius) {
                        continue;
                    }
                    painter.circle_filled(position, radius, *fill);
                    painter.circle_stroke(
                        position,
                        radius,
                        Stroke::new(1.0, Color32::from_black_alpha(120)),
                    );
                }
                SceneElement::Label {
                    anchor,
                    offset,
                    text,
                    ..
                } => {
                    let position = self.view.world_to_screen(viewport, *anchor)
                        - vec2(0.0, offset * zoom);
                    if !viewport.contains(position) {
                        continue;
                    }
                    painter.text(
                        position,
                        Align2::CENTER_BOTTOM,
                        text,
                        FontId::proportional(11.0),
                        LABEL,
                    );
                }
            }
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.elements = Vec::new();
        self.node_slots = Vec::new();
        self.label_slots = Vec::new();
        self.revision = None;
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::pos2;

    use super::*;
    use crate::interaction::viewport_of_size;
    use crate::render::Highlight;
    use crate::render::test_support::line_graph;

    fn frame<'a>(
        nodes: &'a [crate::physics::LayoutNode],
        tokens: &'a [crate::model::Token],
        edges: &'a [crate::attention::AttentionEdge],
        revision: u64,
    ) -> GraphFrame<'a> {
        GraphFrame {
            nodes,
            tokens,
            edges,
            revision,
            highlight: Highlight::default(),
        }
    }

    #[test]
    fn same_revision_patches_elements_in_place() {
        let (mut nodes, tokens, edges) = line_graph(5);
        let mut backend = RetainedBackend::new(50);
        backend.update(&frame(&nodes, &tokens, &edges, 1));
        let count = backend.elements().len();
        assert_eq!(count, 4 + 5 + 5);

        nodes[2].position = vec2(-300.0, 120.0);
        backend.update(&frame(&nodes, &tokens, &edges, 1));
        assert_eq!(backend.elements().len(), count);
        assert_eq!(backend.node_center(2), Some(vec2(-300.0, 120.0)));
    }

    #[test]
    fn labels_only_for_small_graphs() {
        let (nodes, tokens, edges) = line_graph(50);
        let mut backend = RetainedBackend::new(50);
        backend.update(&frame(&nodes, &tokens, &edges, 0));
        assert!(backend.shows_labels());

        let (nodes, tokens, edges) = line_graph(51);
        backend.update(&frame(&nodes, &tokens, &edges, 1));
        assert!(!backend.shows_labels());
    }

    #[test]
    fn hit_test_uses_element_containment() {
        let (nodes, tokens, edges) = line_graph(3);
        let mut backend = RetainedBackend::new(50);
        backend.update(&frame(&nodes, &tokens, &edges, 0));

        let viewport = viewport_of_size(400.0, 300.0);
        let center = viewport.center();
        assert_eq!(backend.hit_test(viewport, center), Some(0));
        assert_eq!(backend.hit_test(viewport, center + vec2(40.0, 3.0)), Some(1));
        assert_eq!(backend.hit_test(viewport, pos2(5.0, 5.0)), None);
    }

    #[test]
    fn destroy_releases_scene_and_ignores_updates() {
        let (nodes, tokens, edges) = line_graph(3);
        let mut backend = RetainedBackend::new(50);
        backend.update(&frame(&nodes, &tokens, &edges, 0));
        backend.destroy();
        backend.destroy();
        backend.update(&frame(&nodes, &tokens, &edges, 1));
        assert!(backend.elements().is_empty());
        assert!(backend.is_destroyed());
    }
}
