//! Pointer handling that does not depend on any widget toolkit: screen
//! coordinates go through the inverse view transform and are matched
//! against logical entities.

use eframe::egui::{self, Pos2, Rect, Ui, Vec2, pos2};

use crate::attention::AttentionEdge;
use crate::physics::LayoutNode;

pub const MIN_ZOOM: f32 = 0.05;
pub const MAX_ZOOM: f32 = 8.0;

/// Pan offset plus zoom scale. World origin maps to the viewport center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub pan: Vec2,
    pub zoom: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl ViewTransform {
    pub fn world_to_screen(&self, viewport: Rect, world: Vec2) -> Pos2 {
        viewport.center() + self.pan + world * self.zoom
    }

    pub fn screen_to_world(&self, viewport: Rect, screen: Pos2) -> Vec2 {
        (screen - viewport.center() - self.pan) / self.zoom
    }

    /// Zooms around `pointer` so the world point under it stays put.
    pub fn zoom_at(&mut self, viewport: Rect, pointer: Pos2, scroll: f32) {
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let world_before = self.screen_to_world(viewport, pointer);
        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.zoom = (self.zoom * zoom_factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.pan = pointer - viewport.center() - (world_before * self.zoom);
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += delta;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One frame of pointer state, already extracted from the toolkit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerInput {
    pub position: Option<Pos2>,
    pub drag_started: bool,
    pub dragging: bool,
    pub drag_stopped: bool,
    pub clicked: bool,
    /// Primary-button drag movement this frame.
    pub drag_delta: Vec2,
    /// Secondary or middle button drag movement this frame.
    pub pan_delta: Vec2,
    pub scroll: f32,
}

impl PointerInput {
    pub fn hover(position: Pos2) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn click(position: Pos2) -> Self {
        Self {
            position: Some(position),
            clicked: true,
            ..Self::default()
        }
    }

    pub fn from_response(ui: &Ui, response: &egui::Response) -> Self {
        let primary = egui::PointerButton::Primary;
        let pan_delta = if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            response.drag_delta()
        } else {
            Vec2::ZERO
        };
        let scroll = if response.hovered() {
            ui.input(|input| input.raw_scroll_delta.y)
        } else {
            0.0
        };

        Self {
            position: response.hover_pos().or_else(|| response.interact_pointer_pos()),
            drag_started: response.drag_started_by(primary),
            dragging: response.dragged_by(primary),
            drag_stopped: response.drag_stopped_by(primary),
            clicked: response.clicked_by(primary),
            drag_delta: if response.dragged_by(primary) {
                response.drag_delta()
            } else {
                Vec2::ZERO
            },
            pan_delta,
            scroll,
        }
    }
}

/// Nearest candidate whose screen-space circle, grown by `slack` pixels,
/// contains `screen`.
pub fn nearest_on_screen<I>(candidates: I, screen: Pos2, slack: f32) -> Option<usize>
where
    I: IntoIterator<Item = (usize, Pos2, f32)>,
{
    candidates
        .into_iter()
        .filter_map(|(index, center, radius)| {
            let distance = center.distance(screen);
            (distance <= radius + slack).then_some((index, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}

/// [`nearest_on_screen`] for world-space candidates seen through `transform`.
pub fn nearest_within<I>(
    candidates: I,
    transform: &ViewTransform,
    viewport: Rect,
    screen: Pos2,
    slack: f32,
) -> Option<usize>
where
    I: IntoIterator<Item = (usize, Vec2, f32)>,
{
    nearest_on_screen(
        candidates.into_iter().map(|(index, center, radius)| {
            (
                index,
                transform.world_to_screen(viewport, center),
                radius * transform.zoom,
            )
        }),
        screen,
        slack,
    )
}

pub fn hit_node(
    nodes: &[LayoutNode],
    transform: &ViewTransform,
    viewport: Rect,
    screen: Pos2,
    slack: f32,
) -> Option<usize> {
    nearest_within(
        nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (index, node.position, node.radius)),
        transform,
        viewport,
        screen,
        slack,
    )
}

/// A square grid placed in world space, used by the heatmap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    pub origin: Vec2,
    pub cell_size: f32,
    pub rows: usize,
    pub cols: usize,
}

impl GridLayout {
    /// Centers a `rows × cols` grid on the world origin so it fits `extent`.
    pub fn centered(rows: usize, cols: usize, extent: f32) -> Self {
        let cell_size = extent / rows.max(cols).max(1) as f32;
        let size = Vec2::new(cols as f32, rows as f32) * cell_size;
        Self {
            origin: -size * 0.5,
            cell_size,
            rows,
            cols,
        }
    }

    pub fn cell_rect(&self, row: usize, col: usize) -> (Vec2, Vec2) {
        let min = self.origin + Vec2::new(col as f32, row as f32) * self.cell_size;
        (min, min + Vec2::splat(self.cell_size))
    }

    pub fn cell_at(&self, world: Vec2) -> Option<(usize, usize)> {
        if self.cell_size <= 0.0 {
            return None;
        }
        let local = (world - self.origin) / self.cell_size;
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        let (row, col) = (local.y.floor() as usize, local.x.floor() as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }
}

pub fn hit_cell(
    grid: &GridLayout,
    transform: &ViewTransform,
    viewport: Rect,
    screen: Pos2,
) -> Option<(usize, usize)> {
    grid.cell_at(transform.screen_to_world(viewport, screen))
}

/// Live degree of `node` in the current edge set; recomputed on every call.
pub fn connection_count(node: usize, edges: &[AttentionEdge]) -> usize {
    edges
        .iter()
        .filter(|edge| edge.source == node || edge.target == node)
        .count()
}

pub fn viewport_of_size(width: f32, height: f32) -> Rect {
    Rect::from_min_max(pos2(0.0, 0.0), pos2(width, height))
}
