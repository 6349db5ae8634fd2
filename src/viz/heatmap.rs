use std::sync::Arc;
use std::sync::mpsc::Receiver;

use eframe::egui::{
    Align2, Color32, FontId, Rect, Sense, Stroke, StrokeKind, Ui, Vec2, pos2, vec2,
};
use tracing::debug;

use crate::attention::{Downsampled, MatrixSource, ResolvedMatrix, resolve};
use crate::interaction::{GridLayout, PointerInput, ViewTransform, hit_cell};
use crate::render::palette::{BACKGROUND, HOVER, LABEL, SELECTED, viridis};
use crate::render::render_utils::circle_visible;

use super::{CellInfo, EventHub, EventKind, HitTarget, Session, ViewMode, Visualization, VizEvent};

const GRID_EXTENT: f32 = 600.0;
const AXIS_LABEL_LIMIT: usize = 40;

/// Attention matrix as a colored grid, block-averaged down to a bounded
/// side. Redraws only on input.
pub struct HeatmapView {
    session: Session,
    resolved: ResolvedMatrix,
    downsampled: Downsampled,
    grid: GridLayout,
    scale_max: f32,
    view: ViewTransform,
    hovered: Option<(usize, usize)>,
    selected: Option<(usize, usize)>,
    events: EventHub,
    destroyed: bool,
}

impl HeatmapView {
    pub fn new(session: &Session) -> Self {
        let (resolved, downsampled) = Self::build(session);
        let grid = GridLayout::centered(
            downsampled.matrix.rows(),
            downsampled.matrix.cols(),
            GRID_EXTENT,
        );
        let scale_max = downsampled.matrix.stats().max;
        Self {
            session: session.clone(),
            resolved,
            downsampled,
            grid,
            scale_max,
            view: ViewTransform::default(),
            hovered: None,
            selected: None,
            events: EventHub::default(),
            destroyed: false,
        }
    }

    fn build(session: &Session) -> (ResolvedMatrix, Downsampled) {
        let resolved = resolve(&session.dataset, session.selector);
        let labels: Vec<String> = session
            .tokens
            .iter()
            .map(|token| token.label.clone())
            .collect();
        let downsampled = session
            .config
            .downsampler()
            .downsample(&resolved.matrix, &labels);
        debug!(
            source = downsampled.source_size,
            block = downsampled.block_size,
            side = downsampled.matrix.rows(),
            "prepared heatmap"
        );
        (resolved, downsampled)
    }

    pub fn downsampled(&self) -> &Downsampled {
        &self.downsampled
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    fn cell_info(&self, (row, col): (usize, usize)) -> CellInfo {
        let label = |index: usize| {
            self.downsampled
                .labels
                .get(index)
                .cloned()
                .unwrap_or_else(|| index.to_string())
        };
        CellInfo {
            row,
            col,
            row_label: label(row),
            col_label: label(col),
            value: self.downsampled.matrix.get(row, col),
            block_size: self.downsampled.block_size,
        }
    }

    fn event(&self, kind: EventKind, cell: (usize, usize)) -> VizEvent {
        VizEvent {
            kind,
            target: HitTarget::Cell(self.cell_info(cell)),
            dataset: Arc::clone(&self.session.dataset),
        }
    }

    fn cell_screen_rect(&self, viewport: Rect, row: usize, col: usize) -> Rect {
        let (min, max) = self.grid.cell_rect(row, col);
        Rect::from_min_max(
            self.view.world_to_screen(viewport, min),
            self.view.world_to_screen(viewport, max),
        )
    }

    fn paint(&self, ui: &Ui, viewport: Rect) {
        let painter = ui.painter_at(viewport);
        painter.rect_filled(viewport, 0.0, BACKGROUND);

        let matrix = &self.downsampled.matrix;
        let scale = if self.scale_max > 0.0 { self.scale_max } else { 1.0 };
        let half = self.grid.cell_size * self.view.zoom * 0.75;
        for row in 0..matrix.rows() {
            for col in 0..matrix.cols() {
                let rect = self.cell_screen_rect(viewport, row, col);
                if !circle_visible(viewport, rect.center(), half) {
                    continue;
                }
                painter.rect_filled(rect, 0.0, viridis(matrix.get(row, col) / scale));
            }
        }

        for (cell, color) in [(self.selected, SELECTED), (self.hovered, HOVER)] {
            if let Some((row, col)) = cell {
                painter.rect_stroke(
                    self.cell_screen_rect(viewport, row, col),
                    0.0,
                    Stroke::new(2.0, color),
                    StrokeKind::Outside,
                );
            }
        }

        if matrix.rows() <= AXIS_LABEL_LIMIT {
            let font = FontId::proportional(10.0);
            for index in 0..matrix.rows() {
                let label = self.downsampled.labels.get(index).map(String::as_str).unwrap_or("");
                let row_rect = self.cell_screen_rect(viewport, index, 0);
                painter.text(
                    pos2(row_rect.left() - 4.0, row_rect.center().y),
                    Align2::RIGHT_CENTER,
                    label,
                    font.clone(),
                    LABEL,
                );
                let col_rect = self.cell_screen_rect(viewport, 0, index);
                painter.text(
                    pos2(col_rect.center().x, col_rect.top() - 4.0),
                    Align2::CENTER_BOTTOM,
                    label,
                    font.clone(),
                    LABEL,
                );
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

impl Visualization for HeatmapView {
    fn mode(&self) -> ViewMode {
        ViewMode::Heatmap
    }

    fn update(&mut self, session: &Session) {
        if self.destroyed {
            return;
        }
        let rebuild = !self.session.same_dataset(session)
            || self.session.selector != session.selector
            || self.session.config != session.config;
        self.session = session.clone();
        if !rebuild {
            return;
        }

        let (resolved, downsampled) = Self::build(session);
        self.grid = GridLayout::centered(
            downsampled.matrix.rows(),
            downsampled.matrix.cols(),
            GRID_EXTENT,
        );
        self.scale_max = downsampled.matrix.stats().max;
        self.resolved = resolved;
        self.downsampled = downsampled;
        self.hovered = None;
        self.selected = None;
    }

    fn reset_view(&mut self) {
        self.view.reset();
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.events.clear();
        self.hovered = None;
        self.selected = None;
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
            .and_then(|position| hit_cell(&self.grid, &self.view, viewport, position));

        let mut emitted = None;
        if hit != self.hovered {
            self.hovered = hit;
            emitted = hit.map(|cell| self.event(EventKind::Hover, cell));
        }
        if input.clicked {
            self.selected = hit;
            if let Some(cell) = hit {
                emitted = Some(self.event(EventKind::Click, cell));
            }
        }

        if let Some(event) = &emitted {
            self.events.emit(event);
        }
        emitted
    }

    fn status(&self) -> Vec<String> {
        let selector = self.session.selector;
        let side = self.downsampled.matrix.rows();
        let source = match self.resolved.source {
            MatrixSource::Dense => "dense",
            MatrixSource::Sparse => "sparse",
            MatrixSource::Fallback => "no data",
        };
        let stats = self.resolved.stats;
        let mut lines = vec![
            format!("layer {} · {} · {source}", selector.layer, selector.head.label()),
            format!(
                "min {:.3} max {:.3} mean {:.3} std {:.3}",
                stats.min, stats.max, stats.mean, stats.std
            ),
        ];
        if self.downsampled.block_size > 1 {
            lines.push(format!(
                "{side}×{side} blocks of {} from {}",
                self.downsampled.block_size, self.downsampled.source_size
            ));
        }
        if let Some(rate) = self.resolved.sampling_rate {
            lines.push(format!("sampled {:.0}%", rate * 100.0));
        }
        if let Some(layer) = self.session.dataset.layer(selector.layer) {
            if let Some(heads) = layer.num_heads {
                lines.push(format!("{heads} heads"));
            }
            if let Some(seq_len) = layer.seq_len {
                lines.push(format!("seq {seq_len}"));
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VizConfig;
    use crate::interaction::viewport_of_size;
    use crate::model::demo::synthesize;

    fn session(config: VizConfig) -> Session {
        Session::new(
            synthesize("one two three four five six seven eight", 1, 1, 9),
            Arc::new(config),
            None,
        )
    }

    #[test]
    fn click_reports_cell_and_value() {
        let mut view = HeatmapView::new(&session(VizConfig::default()));
        let viewport = viewport_of_size(800.0, 800.0);
        let (min, max) = view.grid.cell_rect(2, 3);
        let screen = view.view().world_to_screen(viewport, (min + max) * 0.5);

        let event = view
            .pointer(PointerInput::click(screen), viewport)
            .expect("cell hit");
        let HitTarget::Cell(cell) = event.target else {
            panic!("expected a cell");
        };
        assert_eq!((cell.row, cell.col), (2, 3));
        assert_eq!(cell.value, view.downsampled().matrix.get(2, 3));
        assert_eq!(cell.row_label, "two");
        assert!(!view.needs_frame());
    }

    #[test]
    fn large_matrix_is_block_labelled() {
        let config = VizConfig {
            heatmap_max_side: 4,
            ..VizConfig::default()
        };
        let view = HeatmapView::new(&session(config));
        let downsampled = view.downsampled();
        assert_eq!(downsampled.source_size, 10);
        assert_eq!(downsampled.block_size, 3);
        assert_eq!(downsampled.matrix.rows(), 4);
        assert!(view.status().iter().any(|line| line.contains("blocks of 3")));
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut view = HeatmapView::new(&session(VizConfig::default()));
        let _events = view.subscribe();
        view.destroy();
        view.destroy();
        assert_eq!(view.listener_count(), 0);
        let viewport = viewport_of_size(800.0, 800.0);
        assert!(view.pointer(PointerInput::click(pos2(400.0, 400.0)), viewport).is_none());
    }
}
