use std::sync::Arc;
use std::sync::mpsc::Receiver;

use eframe::egui::{Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Ui, Vec2, vec2};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::interaction::{PointerInput, nearest_on_screen};
use crate::model::point_size;
use crate::projection::{CoordinateProjector, Projection};
use crate::render::HIT_SLACK;
use crate::render::palette::{self, BACKGROUND, LABEL};
use crate::render::render_utils::{blend_color, dim_color};
use crate::service::LatestRequest;
use crate::util::{stable_seed, vector_norm};

use super::{EventHub, EventKind, HitTarget, PointInfo, Session, ViewMode, Visualization, VizEvent};

const DAMPING: f32 = 0.15;
const SETTLE_EPSILON: f32 = 1e-3;
const MIN_DISTANCE: f32 = 1.5;
const MAX_DISTANCE: f32 = 12.0;
const LABEL_LIMIT: usize = 60;

/// Orbit camera whose state eases toward its targets once per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitCamera {
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    pub pan: Vec2,
    target_yaw: f32,
    target_pitch: f32,
    target_distance: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            yaw: 0.6,
            pitch: 0.35,
            distance: 3.5,
            pan: Vec2::ZERO,
            target_yaw: 0.6,
            target_pitch: 0.35,
            target_distance: 3.5,
        }
    }
}

impl OrbitCamera {
    pub fn orbit(&mut self, delta: Vec2) {
        self.target_yaw += delta.x * 0.01;
        self.target_pitch = (self.target_pitch + delta.y * 0.01).clamp(-1.4, 1.4);
    }

    pub fn dolly(&mut self, scroll: f32) {
        if scroll.abs() <= f32::EPSILON {
            return;
        }
        let factor = (1.0 - scroll * 0.0015).clamp(0.85, 1.15);
        self.target_distance = (self.target_distance * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    pub fn is_moving(&self) -> bool {
        (self.target_yaw - self.yaw).abs() > SETTLE_EPSILON
            || (self.target_pitch - self.pitch).abs() > SETTLE_EPSILON
            || (self.target_distance - self.distance).abs() > SETTLE_EPSILON
    }

    /// One damping step. Returns whether the camera moved.
    pub fn step(&mut self) -> bool {
        if !self.is_moving() {
            return false;
        }
        self.yaw += (self.target_yaw - self.yaw) * DAMPING;
        self.pitch += (self.target_pitch - self.pitch) * DAMPING;
        self.distance += (self.target_distance - self.distance) * DAMPING;
        true
    }

    /// Screen position and perspective scale of a point.
    pub fn project(&self, coords: [f32; 3], dims: usize, viewport: Rect) -> (Pos2, f32) {
        let extent = viewport.width().min(viewport.height()) * 0.4;
        let origin = viewport.center() + self.pan;
        let [x, y, z] = coords;

        if dims < 3 {
            let scale = 3.5 / self.distance;
            return (origin + vec2(x, -y) * extent * scale, scale);
        }

        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let x1 = x * cos_yaw + z * sin_yaw;
        let z1 = -x * sin_yaw + z * cos_yaw;
        let y1 = y * cos_pitch - z1 * sin_pitch;
        let z2 = y * sin_pitch + z1 * cos_pitch;
        let scale = 3.5 / (self.distance - z2).max(0.5);
        (origin + vec2(x1, -y1) * extent * scale, scale)
    }
}

/// Token embeddings projected to 2 or 3 dimensions. The projection runs in
/// the background when a reduction service is configured.
pub struct EmbeddingView {
    session: Session,
    projection: Option<Projection>,
    worker: LatestRequest<Projection>,
    camera: OrbitCamera,
    hovered: Option<usize>,
    selected: Option<usize>,
    events: EventHub,
    destroyed: bool,
}

impl EmbeddingView {
    pub fn new(session: &Session) -> Self {
        let mut view = Self {
            session: session.clone(),
            projection: None,
            worker: LatestRequest::new(),
            camera: OrbitCamera::default(),
            hovered: None,
            selected: None,
            events: EventHub::default(),
            destroyed: false,
        };
        view.start_projection();
        view
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn is_loading(&self) -> bool {
        self.worker.is_pending()
    }

    fn start_projection(&mut self) {
        let session = &self.session;
        let projector =
            CoordinateProjector::new(session.config.projection_options(), session.reduction.clone());
        let seed = stable_seed(&session.dataset.tokens);
        let dataset = Arc::clone(&session.dataset);
        self.hovered = None;
        self.selected = None;

        let remote = session.reduction.is_some()
            && dataset
                .embeddings
                .as_ref()
                .is_some_and(|rows| !rows.is_empty());
        if !remote {
            self.worker.cancel();
            self.projection = Some(projector.project(&dataset, &mut StdRng::seed_from_u64(seed)));
            return;
        }

        self.projection = None;
        self.worker.submit(move || {
            projector.project(&dataset, &mut StdRng::seed_from_u64(seed))
        });
    }

    fn screen_points(&self, viewport: Rect) -> Vec<(usize, Pos2, f32)> {
        let Some(projection) = &self.projection else {
            return Vec::new();
        };
        projection
            .points
            .iter()
            .map(|point| {
                let (position, scale) = self.camera.project(point.coords, projection.dims, viewport);
                let size = self
                    .session
                    .tokens
                    .get(point.token)
                    .map(point_size)
                    .unwrap_or(4.0);
                (point.token, position, size * scale)
            })
            .collect()
    }

    fn point_info(&self, id: usize) -> Option<PointInfo> {
        let projection = self.projection.as_ref()?;
        let point = projection.points.iter().find(|point| point.token == id)?;
        let token = self.session.tokens.get(id)?;
        let embedding_norm = self
            .session
            .dataset
            .embeddings
            .as_ref()
            .and_then(|rows| rows.get(id))
            .map(|row| vector_norm(row));
        Some(PointInfo {
            id,
            label: token.label.clone(),
            category: token.category,
            coords: point.coords,
            dims: projection.dims,
            embedding_norm,
            fallback: projection.is_fallback(),
        })
    }

    fn event(&self, kind: EventKind, id: usize) -> Option<VizEvent> {
        Some(VizEvent {
            kind,
            target: HitTarget::Point(self.point_info(id)?),
            dataset: Arc::clone(&self.session.dataset),
        })
    }

    fn point_color(&self, id: usize) -> Color32 {
        let base = self
            .session
            .tokens
            .get(id)
            .map(|token| palette::category_color(token.category))
            .unwrap_or(LABEL);
        if self.hovered == Some(id) {
            blend_color(base, palette::HOVER, 0.7)
        } else if self.selected == Some(id) {
            blend_color(base, palette::SELECTED, 0.7)
        } else if self.session.is_match(id) {
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

        let header = viewport.left_top() + vec2(10.0, 8.0);
        if self.projection.is_none() {
            painter.text(
                viewport.center(),
                Align2::CENTER_CENTER,
                "Projecting embeddings…",
                FontId::proportional(16.0),
                LABEL,
            );
            return;
        }

        let mut points = self.screen_points(viewport);
        // Far points first so near ones draw on top.
        points.sort_by(|a, b| a.2.total_cmp(&b.2));
        let show_all_labels = points.len() <= LABEL_LIMIT;
        for &(id, position, radius) in &points {
            painter.circle_filled(position, radius, self.point_color(id));
            painter.circle_stroke(position, radius, Stroke::new(0.8, Color32::from_black_alpha(140)));
            let emphasized = self.hovered == Some(id) || self.selected == Some(id);
            if (show_all_labels || emphasized)
                && let Some(token) = self.session.tokens.get(id)
            {
                painter.text(
                    position - vec2(0.0, radius + 3.0),
                    Align2::CENTER_BOTTOM,
                    &token.label,
                    FontId::proportional(11.0),
                    LABEL,
                );
            }
        }

        for (line, text) in self.status().into_iter().enumerate() {
            let color = if text.starts_with('⚠') {
                palette::HOVER
            } else {
                Color32::from_gray(200)
            };
            painter.text(
                header + vec2(0.0, line as f32 * 16.0),
                Align2::LEFT_TOP,
                text,
                FontId::monospace(12.0),
                color,
            );
        }
    }
}

impl Visualization for EmbeddingView {
    fn mode(&self) -> ViewMode {
        ViewMode::Embedding
    }

    fn update(&mut self, session: &Session) {
        if self.destroyed {
            return;
        }
        let reproject = !self.session.same_dataset(session)
            || self.session.config.projection_options() != session.config.projection_options();
        self.session = session.clone();
        if reproject {
            self.start_projection();
        }
    }

    fn reset_view(&mut self) {
        self.camera = OrbitCamera::default();
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.worker.cancel();
        self.events.clear();
        self.projection = None;
        self.camera = OrbitCamera::default();
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
        !self.destroyed && (self.worker.is_pending() || self.camera.is_moving())
    }

    fn advance_frame(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        let mut changed = false;
        if let Some(projection) = self.worker.poll() {
            self.projection = Some(projection);
            changed = true;
        }
        self.camera.step() || changed
    }

    fn pointer(&mut self, input: PointerInput, viewport: Rect) -> Option<VizEvent> {
        if self.destroyed {
            return None;
        }

        self.camera.dolly(input.scroll);
        let three_d = self.projection.as_ref().is_some_and(|p| p.dims == 3);
        if three_d {
            self.camera.orbit(input.drag_delta);
            self.camera.pan += input.pan_delta;
        } else {
            self.camera.pan += input.drag_delta + input.pan_delta;
        }

        let hit = input.position.and_then(|position| {
            nearest_on_screen(self.screen_points(viewport), position, HIT_SLACK)
        });

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
        emitted
    }

    fn status(&self) -> Vec<String> {
        let Some(projection) = &self.projection else {
            return vec!["projecting…".to_owned()];
        };
        let mut lines = vec![format!(
            "{} · {}D · {} points",
            projection.method.label(),
            projection.dims,
            projection.points.len()
        )];
        if let Some(reason) = &projection.fallback {
            lines.push(format!("⚠ random coordinates: {reason}"));
        }
        if let Some(quality) = &projection.quality {
            let mut parts = Vec::new();
            if let Some(dim) = quality.original_dim {
                parts.push(format!("from {dim}D"));
            }
            if let Some(correlation) = quality.distance_correlation {
                parts.push(format!("distance correlation {correlation:.3}"));
            }
            if !parts.is_empty() {
                lines.push(format!("reduction {}", parts.join(", ")));
            }
        }
        if let Some(stats) = &self.session.dataset.embedding_stats {
            lines.push(format!(
                "embeddings mean {:.3} std {:.3} shape {:?}",
                stats.mean, stats.std, stats.shape
            ));
        }
        lines
    }

    fn show(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let input = PointerInput::from_response(ui, &response);
        self.pointer(input, rect);
        if self.advance_frame() || self.needs_frame() {
            ui.ctx().request_repaint();
        }
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
    use crate::model::Dataset;

    fn session() -> Session {
        let dataset = Dataset {
            tokens: ["[CLS]", "a", "b", "[SEP]"].map(String::from).to_vec(),
            ..Dataset::default()
        };
        Session::new(dataset, Arc::new(VizConfig::default()), None)
    }

    #[test]
    fn missing_embeddings_project_synchronously_as_fallback() {
        let view = EmbeddingView::new(&session());
        let projection = view.projection().expect("synchronous fallback");
        assert!(projection.is_fallback());
        assert_eq!(projection.points.len(), 4);
        assert!(view.status().iter().any(|line| line.starts_with('⚠')));
        assert!(!view.is_loading());
    }

    #[test]
    fn camera_damping_settles() {
        let mut view = EmbeddingView::new(&session());
        view.camera.orbit(vec2(120.0, 0.0));
        assert!(view.needs_frame());
        let mut frames = 0;
        while view.advance_frame() {
            frames += 1;
            assert!(frames < 500, "camera never settled");
        }
        assert!(!view.camera().is_moving());
    }

    #[test]
    fn hovering_a_point_reports_it() {
        let mut view = EmbeddingView::new(&session());
        let viewport = viewport_of_size(500.0, 500.0);
        let (id, position, _) = view.screen_points(viewport)[2];
        let event = view
            .pointer(PointerInput::hover(position), viewport)
            .expect("hover event");
        let HitTarget::Point(point) = event.target else {
            panic!("expected a point");
        };
        assert_eq!(point.id, id);
        assert!(point.fallback);
        assert_eq!(point.embedding_norm, None);
    }

    #[test]
    fn destroy_stops_frames() {
        let mut view = EmbeddingView::new(&session());
        view.camera.orbit(vec2(50.0, 0.0));
        view.destroy();
        view.destroy();
        assert!(!view.needs_frame());
        assert!(view.projection().is_none());
    }
}
