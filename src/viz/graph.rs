use std::sync::Arc;
use std::sync::mpsc::Receiver;

use eframe::egui::{Align2, Color32, FontId, Rect, Sense, Ui, Vec2, vec2};
use tracing::debug;

use crate::attention::{EdgeSelection, MatrixSelector, ResolvedMatrix, resolve};
use crate::interaction::{PointerInput, connection_count};
use crate::model::Token;
use crate::physics::{ForceSimulation, LayoutLink, LayoutNode, initial_positions};
use crate::render::render_utils::node_radius;
use crate::render::{
    GraphBackend, GraphFrame, Highlight, RenderStrategy, create_backend, select_strategy,
};

use super::{EventHub, EventKind, HitTarget, NodeInfo, Session, ViewMode, Visualization, VizEvent};

/// Attention graph: one node per token, edges from the thresholded matrix,
/// positions from the force simulation.
pub struct GraphView {
    session: Session,
    resolved: ResolvedMatrix,
    selection: EdgeSelection,
    received: Vec<f32>,
    nodes: Vec<LayoutNode>,
    links: Vec<LayoutLink>,
    simulation: ForceSimulation,
    backend: Box<dyn GraphBackend>,
    revision: u64,
    hovered: Option<usize>,
    selected: Option<usize>,
    dragging: Option<usize>,
    events: EventHub,
    destroyed: bool,
}

struct GraphModel {
    resolved: ResolvedMatrix,
    selection: EdgeSelection,
    received: Vec<f32>,
    nodes: Vec<LayoutNode>,
    links: Vec<LayoutLink>,
    strategy: RenderStrategy,
}

fn build_model(session: &Session) -> GraphModel {
    let count = session.token_count();
    let config = &session.config;
    let strategy = select_strategy(
        session.performance_mode,
        count,
        config.immediate_node_threshold,
    );

    let resolved = resolve(&session.dataset, session.selector);
    // Edge ids must stay inside the token list even if the matrix disagrees.
    let matrix = resolved.matrix.to_square(count);
    let selection = config.edge_selector(strategy).select(&matrix);

    let received = matrix.column_sums();
    let (min, max) = received
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), value| {
            (lo.min(*value), hi.max(*value))
        });

    let nodes = initial_positions(count, Vec2::ZERO)
        .into_iter()
        .enumerate()
        .map(|(id, position)| {
            let radius = node_radius(received.get(id).copied().unwrap_or(0.0), min, max);
            LayoutNode::new(id, position, radius)
        })
        .collect();
    let links = selection
        .edges
        .iter()
        .map(|edge| LayoutLink {
            source: edge.source,
            target: edge.target,
            strength: edge.strength,
        })
        .collect();

    debug!(
        nodes = count,
        edges = selection.edges.len(),
        candidates = selection.candidates,
        fallback = resolved.is_fallback(),
        "built attention graph"
    );

    GraphModel {
        resolved,
        selection,
        received,
        nodes,
        links,
        strategy,
    }
}

impl GraphView {
    pub fn new(session: &Session) -> Self {
        let model = build_model(session);
        let config = &session.config;
        let mut view = Self {
            session: session.clone(),
            resolved: model.resolved,
            selection: model.selection,
            received: model.received,
            nodes: model.nodes,
            links: model.links,
            simulation: ForceSimulation::new(config.force_params(), config.cooling_schedule()),
            backend: create_backend(model.strategy, config.backend_options()),
            revision: 0,
            hovered: None,
            selected: None,
            dragging: None,
            events: EventHub::default(),
            destroyed: false,
        };
        view.push_frame();
        view
    }

    pub fn strategy(&self) -> RenderStrategy {
        self.backend.strategy()
    }

    pub fn nodes(&self) -> &[LayoutNode] {
        &self.nodes
    }

    pub fn selection(&self) -> &EdgeSelection {
        &self.selection
    }

    pub fn backend(&self) -> &dyn GraphBackend {
        self.backend.as_ref()
    }

    fn rebuild(&mut self, session: &Session) {
        let model = build_model(session);
        let view = *self.backend.view();
        if model.strategy != self.backend.strategy() {
            self.backend.destroy();
            self.backend = create_backend(model.strategy, session.config.backend_options());
            *self.backend.view_mut() = view;
        }

        self.session = session.clone();
        self.resolved = model.resolved;
        self.selection = model.selection;
        self.received = model.received;
        self.nodes = model.nodes;
        self.links = model.links;
        self.simulation = ForceSimulation::new(
            session.config.force_params(),
            session.config.cooling_schedule(),
        );
        self.hovered = None;
        self.selected = None;
        self.dragging = None;
        self.revision += 1;
    }

    fn push_frame(&mut self) {
        let frame = GraphFrame {
            nodes: &self.nodes,
            tokens: &self.session.tokens,
            edges: &self.selection.edges,
            revision: self.revision,
            highlight: Highlight {
                hovered: self.hovered,
                selected: self.selected,
                matches: &self.session.search_matches,
            },
        };
        self.backend.update(&frame);
    }

    fn node_info(&self, id: usize) -> Option<NodeInfo> {
        let node = self.nodes.get(id)?;
        let token: &Token = self.session.tokens.get(id)?;
        Some(NodeInfo {
            id,
            label: token.label.clone(),
            category: token.category,
            position: node.position,
            radius: node.radius,
            connections: connection_count(id, &self.selection.edges),
            layer: None,
            attention_received: self.received.get(id).copied(),
        })
    }

    fn event(&self, kind: EventKind, id: usize) -> Option<VizEvent> {
        Some(VizEvent {
            kind,
            target: HitTarget::Node(self.node_info(id)?),
            dataset: Arc::clone(&self.session.dataset),
        })
    }

    fn handle_drag(&mut self, input: &PointerInput, viewport: Rect, hit: Option<usize>) {
        if input.drag_started
            && let Some(id) = hit
        {
            self.dragging = Some(id);
            self.simulation.drag_start(&mut self.nodes[id]);
        }

        if let Some(id) = self.dragging {
            if input.dragging
                && let Some(position) = input.position
            {
                let world = self.backend.view().screen_to_world(viewport, position);
                self.simulation.drag_to(&mut self.nodes[id], world);
            }
            if input.drag_stopped {
                self.simulation.drag_end(&mut self.nodes[id]);
                self.dragging = None;
            }
        }
    }

    fn header(&self, ui: &Ui, rect: Rect) {
        let text = self.status().join("   ");
        ui.painter_at(rect).text(
            rect.left_top() + vec2(10.0, 8.0),
            Align2::LEFT_TOP,
            text,
            FontId::monospace(12.0),
            Color32::from_gray(200),
        );
    }
}

impl Visualization for GraphView {
    fn mode(&self) -> ViewMode {
        ViewMode::Graph
    }

    fn update(&mut self, session: &Session) {
        if self.destroyed {
            return;
        }

        let rebuild = !self.session.same_dataset(session)
            || self.session.selector != session.selector
            || self.session.performance_mode != session.performance_mode
            || self.session.config != session.config;
        if rebuild {
            self.rebuild(session);
        } else {
            self.session.search_matches = Arc::clone(&session.search_matches);
        }
        self.push_frame();
    }

    fn reset_view(&mut self) {
        self.backend.reset_view();
        if !self.destroyed {
            self.simulation.restart();
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.simulation.stop();
        self.events.clear();
        self.backend.destroy();
        self.nodes = Vec::new();
        self.links = Vec::new();
        self.selection = EdgeSelection::default();
        self.dragging = None;
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
        !self.destroyed && !self.simulation.is_settled()
    }

    fn advance_frame(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        let moved = self.simulation.tick(&mut self.nodes, &self.links);
        if moved {
            self.push_frame();
        }
        moved
    }

    fn pointer(&mut self, input: PointerInput, viewport: Rect) -> Option<VizEvent> {
        if self.destroyed {
            return None;
        }

        if let Some(position) = input.position {
            self.backend.view_mut().zoom_at(viewport, position, input.scroll);
        }
        if input.pan_delta != Vec2::ZERO {
            self.backend.view_mut().pan_by(input.pan_delta);
        }

        let hit = input
            .position
            .and_then(|position| self.backend.hit_test(viewport, position));
        self.handle_drag(&input, viewport, hit);

        let mut emitted = None;
        if hit != self.hovered {
            self.hovered = hit;
            if let Some(id) = hit {
                emitted = self.event(EventKind::Hover, id);
            }
        }
        if input.clicked {
            self.selected = hit;
            if let Some(id) = hit {
                emitted = self.event(EventKind::Click, id);
            }
        }

        if let Some(event) = &emitted {
            self.events.emit(event);
        }
        self.push_frame();
        emitted
    }

    fn status(&self) -> Vec<String> {
        let selector: MatrixSelector = self.session.selector;
        let mut lines = vec![
            format!(
                "layer {} · {} · {}",
                selector.layer,
                selector.head.label(),
                self.backend.strategy().label()
            ),
            format!(
                "{} nodes · {} edges · {} mode",
                self.nodes.len(),
                self.selection.edges.len(),
                self.session.performance_mode.label()
            ),
        ];
        if self.selection.truncated() {
            lines.push(format!("capped from {}", self.selection.candidates));
        }
        if self.resolved.is_fallback() {
            lines.push("no attention data for this selection".to_owned());
        }
        lines
    }

    fn show(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        let input = PointerInput::from_response(ui, &response);
        self.pointer(input, rect);

        if self.advance_frame() || self.dragging.is_some() {
            ui.ctx().request_repaint();
        }

        self.backend.paint(ui.ctx(), &painter, rect);
        self.header(ui, rect);
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::pos2;

    use super::*;
    use crate::config::VizConfig;
    use crate::interaction::viewport_of_size;
    use crate::model::demo::synthesize;
    use crate::render::PerformanceMode;

    fn session(tokens: usize, mode: PerformanceMode) -> Session {
        let text = (0..tokens.saturating_sub(2))
            .map(|index| format!("w{index}"))
            .collect::<Vec<_>>()
            .join(" ");
        let mut session = Session::new(
            synthesize(&text, 2, 2, 3),
            Arc::new(VizConfig::default()),
            None,
        );
        session.performance_mode = mode;
        session
    }

    #[test]
    fn selects_backend_from_mode_and_size() {
        let small = GraphView::new(&session(20, PerformanceMode::Auto));
        assert_eq!(small.strategy(), RenderStrategy::Retained);
        let fast = GraphView::new(&session(20, PerformanceMode::Speed));
        assert_eq!(fast.strategy(), RenderStrategy::Immediate);
    }

    #[test]
    fn switching_mode_swaps_backend_and_keeps_view() {
        let base = session(12, PerformanceMode::Quality);
        let mut view = GraphView::new(&base);
        view.backend.view_mut().zoom = 2.0;

        let mut faster = base.clone();
        faster.performance_mode = PerformanceMode::Speed;
        view.update(&faster);
        assert_eq!(view.strategy(), RenderStrategy::Immediate);
        assert_eq!(view.backend().view().zoom, 2.0);
    }

    #[test]
    fn click_on_node_emits_event_with_live_degree() {
        let mut view = GraphView::new(&session(8, PerformanceMode::Quality));
        while view.advance_frame() {}
        let events = view.subscribe();
        let viewport = viewport_of_size(600.0, 400.0);
        let target = view.nodes()[0].position;
        let screen = view.backend().view().world_to_screen(viewport, target);

        let event = view
            .pointer(PointerInput::click(screen), viewport)
            .expect("click hits node 0");
        assert_eq!(event.kind, EventKind::Click);
        let HitTarget::Node(info) = event.target else {
            panic!("expected a node target");
        };
        assert_eq!(info.id, 0);
        assert_eq!(
            info.connections,
            connection_count(0, &view.selection().edges)
        );
        assert!(events.try_recv().is_ok());

        assert!(view.pointer(PointerInput::click(pos2(-50.0, -50.0)), viewport).is_none());
    }

    #[test]
    fn destroy_stops_frames_and_drops_listeners() {
        let mut view = GraphView::new(&session(8, PerformanceMode::Auto));
        let _events = view.subscribe();
        assert!(view.needs_frame());
        view.destroy();
        view.destroy();
        assert!(!view.needs_frame());
        assert!(!view.advance_frame());
        assert_eq!(view.listener_count(), 0);
        assert!(view.backend().is_destroyed());
    }
}
