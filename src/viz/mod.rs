//! Visualization instances. Each one owns everything it derives from the
//! session and is torn down with [`Visualization::destroy`] before the host
//! constructs the next.

mod embedding;
mod flow;
mod graph;
mod heatmap;
mod session;

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use eframe::egui::{Rect, Ui, Vec2};

use crate::interaction::PointerInput;
use crate::model::{Dataset, TokenCategory};

pub use embedding::EmbeddingView;
pub use flow::FlowView;
pub use graph::GraphView;
pub use heatmap::HeatmapView;
pub use session::Session;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    #[default]
    Graph,
    Heatmap,
    Embedding,
    Flow,
}

impl ViewMode {
    pub const ALL: [Self; 4] = [Self::Graph, Self::Heatmap, Self::Embedding, Self::Flow];

    pub fn label(self) -> &'static str {
        match self {
            Self::Graph => "Attention graph",
            Self::Heatmap => "Attention heatmap",
            Self::Embedding => "Embedding space",
            Self::Flow => "Layer flow",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Hover,
    Click,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeInfo {
    pub id: usize,
    pub label: String,
    pub category: TokenCategory,
    pub position: Vec2,
    pub radius: f32,
    /// Live degree in the current edge set.
    pub connections: usize,
    /// Set for layer-flow nodes.
    pub layer: Option<usize>,
    /// Column sum of the active attention matrix, for graph nodes.
    pub attention_received: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointInfo {
    pub id: usize,
    pub label: String,
    pub category: TokenCategory,
    pub coords: [f32; 3],
    pub dims: usize,
    /// L2 norm of the source embedding, when it is available.
    pub embedding_norm: Option<f32>,
    pub fallback: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CellInfo {
    /// Block indices in the displayed (possibly downsampled) matrix.
    pub row: usize,
    pub col: usize,
    pub row_label: String,
    pub col_label: String,
    pub value: f32,
    pub block_size: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HitTarget {
    Node(NodeInfo),
    Point(PointInfo),
    Cell(CellInfo),
}

#[derive(Clone, Debug)]
pub struct VizEvent {
    pub kind: EventKind,
    pub target: HitTarget,
    pub dataset: Arc<Dataset>,
}

/// Registered listeners. Disconnected receivers are pruned on emit.
#[derive(Default)]
pub struct EventHub {
    listeners: Vec<Sender<VizEvent>>,
}

impl EventHub {
    pub fn subscribe(&mut self) -> Receiver<VizEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    pub fn emit(&mut self, event: &VizEvent) {
        self.listeners
            .retain(|listener| listener.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

/// Lifecycle and interaction contract shared by every view.
pub trait Visualization {
    fn mode(&self) -> ViewMode;

    /// Applies a new session. Derived structures are rebuilt when the
    /// dataset, matrix selection or performance mode changed.
    fn update(&mut self, session: &Session);

    fn reset_view(&mut self);

    /// Stops per-frame work, drops listeners and releases surfaces.
    /// Calling it again is a no-op.
    fn destroy(&mut self);

    fn is_destroyed(&self) -> bool;

    fn subscribe(&mut self) -> Receiver<VizEvent>;

    fn listener_count(&self) -> usize;

    /// Whether the view wants another frame without new input.
    fn needs_frame(&self) -> bool;

    /// Runs one frame of continuous work. Returns whether anything moved.
    fn advance_frame(&mut self) -> bool;

    /// Applies one frame of pointer input and emits the resulting event.
    fn pointer(&mut self, input: PointerInput, viewport: Rect) -> Option<VizEvent>;

    /// Short status lines for the host's header.
    fn status(&self) -> Vec<String>;

    fn show(&mut self, ui: &mut Ui);
}

pub fn construct(mode: ViewMode, session: &Session) -> Box<dyn Visualization> {
    match mode {
        ViewMode::Graph => Box::new(GraphView::new(session)),
        ViewMode::Heatmap => Box::new(HeatmapView::new(session)),
        ViewMode::Embedding => Box::new(EmbeddingView::new(session)),
        ViewMode::Flow => Box::new(FlowView::new(session)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_prunes_dropped_listeners() {
        let mut hub = EventHub::default();
        let kept = hub.subscribe();
        drop(hub.subscribe());
        assert_eq!(hub.listener_count(), 2);

        let event = VizEvent {
            kind: EventKind::Click,
            target: HitTarget::Cell(CellInfo {
                row: 0,
                col: 1,
                row_label: "a".into(),
                col_label: "b".into(),
                value: 0.5,
                block_size: 1,
            }),
            dataset: Arc::new(Dataset::default()),
        };
        hub.emit(&event);
        assert_eq!(hub.listener_count(), 1);
        assert!(matches!(
            kept.try_recv().map(|event| event.target),
            Ok(HitTarget::Cell(CellInfo { col: 1, .. }))
        ));

        hub.clear();
        assert_eq!(hub.listener_count(), 0);
    }
}
