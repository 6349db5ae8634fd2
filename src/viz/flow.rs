use std::sync::Arc;
use std::sync::mpsc::Receiver;

use eframe::egui::{Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Ui, Vec2, vec2};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::interaction::{PointerInput, ViewTransform, nearest_within};
use crate::projection::{FlowEdgeKind, FlowOptions, LayerFlow, LayerFlowBuilder};
use crate::render::HIT_SLACK;
use crate::render::palette::{self, BACKGROUND, LABEL};
use crate::render::render_utils::{blend_color, dim_color, edge_visible};
use crate::util::stable_seed;

use super::{EventHub, EventKind, HitTarget, NodeInfo, Session, ViewMode, Visualization, VizEvent};

/// Stacked per-layer token rows with edges between consecutive layers.
pub struct FlowView {
    session: Session,
    options: FlowOptions,
    flow: LayerFlow,
    view: ViewTransform,
    /// (layer, token)
    hovered: Option<(usize, usize)>,
    selected: Option<(usize, usize)>,
    events: EventHub,
    destroyed: bool,
}

fn build_flow(session: &Session, options: FlowOptions) -> LayerFlow {
    let mut rng = StdRng::seed_from_u64(stable_seed(&session.dataset.tokens));
    LayerFlowBuilder::new(options).build(
        session.token_count(),
        session.dataset.hidden_states.as_ref(),
        &mut rng,
    )
}

impl FlowView {
    pub fn new(session: &Session) -> Self {
        let options = session.config.flow_options();
        Self {
            session: session.clone(),
            options,
            flow: build_flow(session, options),
            view: ViewTransform::default(),
            hovered: None,
            selected: None,
            events: EventHub::default(),
            destroyed: false,
        }
    }

    pub fn flow(&self) -> &LayerFlow {
        &self.flow
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    /// Node position with the flow centered on the world origin.
    pub fn world_position(&self, layer: usize, token: usize) -> Option<Vec2> {
        let node = self.flow.frames.get(layer)?.nodes.get(token)?;
        Some(node.position - self.flow.center(&self.options))
    }

    fn hit(&self, viewport: Rect, screen: Pos2) -> Option<(usize, usize)> {
        let count = self.flow.token_count.max(1);
        let center = self.flow.center(&self.options);
        nearest_within(
            self.flow.frames.iter().flat_map(|frame| {
                frame.nodes.iter().map(move |node| {
                    (
                        frame.index * count + node.token,
                        node.position - center,
                        node.radius,
                    )
                })
            }),
            &self.view,
            viewport,
            screen,
            HIT_SLACK,
        )
        .map(|key| (key / count, key % count))
    }

    /// Edges into and out of one node, counted from the current frames.
    fn connections(&self, layer: usize, token: usize) -> usize {
        let outgoing = self
            .flow
            .frames
            .get(layer)
            .map(|frame| frame.edges.iter().filter(|edge| edge.source == token).count())
            .unwrap_or(0);
        let incoming = layer
            .checked_sub(1)
            .and_then(|previous| self.flow.frames.get(previous))
            .map(|frame| frame.edges.iter().filter(|edge| edge.target == token).count())
            .unwrap_or(0);
        outgoing + incoming
    }

    fn event(&self, kind: EventKind, (layer, token): (usize, usize)) -> Option<VizEvent> {
        let node = self.flow.frames.get(layer)?.nodes.get(token)?;
        let info = self.session.tokens.get(token)?;
        Some(VizEvent {
            kind,
            target: HitTarget::Node(NodeInfo {
                id: token,
                label: info.label.clone(),
                category: info.category,
                position: node.position,
                radius: node.radius,
                connections: self.connections(layer, token),
                layer: Some(layer),
                attention_received: None,
            }),
            dataset: Arc::clone(&self.session.dataset),
        })
    }

    fn node_color(&self, layer: usize, token: usize) -> Color32 {
        let base = self
            .session
            .tokens
            .get(token)
            .map(|info| palette::category_color(info.category))
            .unwrap_or(LABEL);
        if self.hovered == Some((layer, token)) {
            blend_color(base, palette::HOVER, 0.7)
        } else if self.selected == Some((layer, token)) {
            blend_color(base, palette::SELECTED, 0.7)
        } else if self.session.is_match(token) {
            blend_color(base, palette::SEARCH_MATCH, 0.6)
        } else if self.session.searching() {
            dim_color(base, 0.35)
        } else {
            base
        }
    }

    fn paint(&self, ui: &Ui, viewport: Rect) {
        let painter = ui.painter_at(viewport);
        painter.rect_filled(viewport, 0.0, BACKGROUND);
        let center = self.flow.center(&self.options);
        let to_screen = |position: Vec2| self.view.world_to_screen(viewport, position - center);
        let zoom = self.view.zoom;

        for pair in self.flow.frames.windows(2) {
            let (upper, lower) = (&pair[0], &pair[1]);
            for edge in &upper.edges {
                let (Some(from), Some(to)) = (upper.nodes.get(edge.source), lower.nodes.get(edge.target))
                else {
                    continue;
                };
                let (from, to) = (to_screen(from.position), to_screen(to.position));
                if !edge_visible(viewport, from, to, 2.0) {
                    continue;
                }
                let (width, alpha) = match edge.kind {
                    FlowEdgeKind::Primary => (1.4, 150),
                    FlowEdgeKind::Secondary => (0.8, 70),
                };
                painter.line_segment(
                    [from, to],
                    Stroke::new(
                        width * zoom.sqrt(),
                        Color32::from_rgba_unmultiplied(150, 170, 200, (alpha as f32 * edge.strength) as u8),
                    ),
                );
            }
        }

        let label_font = FontId::proportional(11.0);
        for frame in &self.flow.frames {
            if let Some(first) = frame.nodes.first() {
                let anchor = to_screen(first.position) - vec2(24.0, 0.0);
                painter.text(
                    anchor,
                    Align2::RIGHT_CENTER,
                    format!("Layer {}", frame.index),
                    label_font.clone(),
                    Color32::from_gray(170),
                );
            }
            for node in &frame.nodes {
                let position = to_screen(node.position);
                let radius = node.radius * zoom;
                painter.circle_filled(position, radius, self.node_color(frame.index, node.token));
                let emphasized = self.hovered == Some((frame.index, node.token));
                if (frame.index == 0 || emphasized)
                    && let Some(info) = self.session.tokens.get(node.token)
                {
                    painter.text(
                        position - vec2(0.0, radius + 3.0),
                        Align2::CENTER_BOTTOM,
                        &info.label,
                        label_font.clone(),
                        LABEL,
                    );
                }
            }
        }

        painter.text(
            viewport.left_top() + vec2(10.0, 8.0),
            Align2::LEFT_TOP,
            self.status().join("   "),
            FontId::monospace(12.0),
            Color32::from_gray(200),
        );
    }
}

impl Visualization for FlowView {
    fn mode(&self) -> ViewMode {
        ViewMode::Flow
    }

    fn update(&mut self, session: &Session) {
        if self.destroyed {
            return;
        }
        let options = session.config.flow_options();
        let rebuild = !self.session.same_dataset(session) || options != self.options;
        self.session = session.clone();
        if rebuild {
            self.options = options;
            self.flow = build_flow(session, options);
            self.hovered = None;
            self.selected = None;
        }
    }

    fn reset_view(&mut self) {
        self.view.reset();
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.events.clear();
        self.flow = LayerFlow::default();
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn subscribe(&mut self) -> Receiver<VizEvent> {
        self.events.subscribe()
    }

    fn listener_count(&self) -> usize {
        self.events.listener_count()
    }

    fn needs_frame(&self) -> bool {
        false
    }

    fn advance_frame(&mut self) -> bool {
        false
    }

    fn pointer(&mut self, input: PointerInput, viewport: Rect) -> Option<VizEvent> {
        if self.destroyed {
            return None;
        }

        if let Some(position) = input.position {
            self.view.zoom_at(viewport, position, input.scroll);
        }
        let pan = input.pan_delta + input.drag_delta;
        if pan != Vec2::ZERO {
            self.view.pan_by(pan);
        }

        let hit = input
            .position
            .and_then(|position| self.hit(viewport, position));

        let mut emitted = None;
        if hit != self.hovered {
            self.hovered = hit;
            if let Some(node) = hit {
                emitted = self.event(EventKind::Hover, node);
            }
        }
        if input.clicked {
            self.selected = hit;
            if let Some(node) = hit {
                emitted = self.event(EventKind::Click, node);
            }
        }

        if let Some(event) = &emitted {
            self.events.emit(event);
        }
        emitted
    }

    fn status(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{} layers · {} tokens",
            self.flow.frames.len(),
            self.flow.token_count
        )];
        if self.flow.truncated() {
            lines.push(format!("first {} of {}", self.flow.token_count, self.flow.total_tokens));
        }
        lines
    }

    fn show(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let input = PointerInput::from_response(ui, &response);
        self.pointer(input, rect);
        if !self.destroyed {
            self.paint(ui, rect);
        }
    }
}
