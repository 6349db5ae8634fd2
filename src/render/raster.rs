use eframe::egui::{
    Align2, Color32, ColorImage, Context, FontId, Painter, Pos2, Rect, TextureHandle,
    TextureOptions, Vec2, pos2, vec2,
};

use crate::interaction::{ViewTransform, nearest_within};

use super::palette::{BACKGROUND, LABEL, edge_color};
use super::{GraphBackend, GraphFrame, HIT_SLACK, RenderStrategy};

const MAX_SURFACE_SIDE: usize = 4096;

/// RGBA8 pixel buffer drawn into on the CPU and uploaded as one texture.
#[derive(Clone, Debug, Default)]
pub struct RasterSurface {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl RasterSurface {
    pub fn new(width: usize, height: usize) -> Self {
        let mut surface = Self::default();
        surface.resize(width, height);
        surface
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        let width = width.min(MAX_SURFACE_SIDE);
        let height = height.min(MAX_SURFACE_SIDE);
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width * height * 4];
    }

    pub fn release(&mut self) {
        *self = Self::default();
    }

    pub fn clear(&mut self, color: Color32) {
        let rgba = color.to_srgba_unmultiplied();
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y * self.width + x) * 4;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + 4]);
        Some(rgba)
    }

    fn blend(&mut self, x: i64, y: i64, color: [u8; 4], coverage: f32) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let alpha = (color[3] as f32 / 255.0) * coverage.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let offset = (y as usize * self.width + x as usize) * 4;
        let target = &mut self.pixels[offset..offset + 4];
        for channel in 0..3 {
            let mixed = color[channel] as f32 * alpha + target[channel] as f32 * (1.0 - alpha);
            target[channel] = mixed.round() as u8;
        }
        target[3] = 255;
    }

    /// Anti-aliased filled disc.
    pub fn fill_circle(&mut self, center: Pos2, radius: f32, color: Color32) {
        if radius <= 0.0 {
            return;
        }
        let rgba = color.to_srgba_unmultiplied();
        let min_x = (center.x - radius - 1.0).floor().max(0.0) as i64;
        let max_x = (center.x + radius + 1.0).ceil().min(self.width as f32) as i64;
        let min_y = (center.y - radius - 1.0).floor().max(0.0) as i64;
        let max_y = (center.y + radius + 1.0).ceil().min(self.height as f32) as i64;

        for y in min_y..max_y {
            for x in min_x..max_x {
                let sample = pos2(x as f32 + 0.5, y as f32 + 0.5);
                let coverage = radius + 0.5 - sample.distance(center);
                if coverage > 0.0 {
                    self.blend(x, y, rgba, coverage);
                }
            }
        }
    }

    /// Anti-aliased one-pixel line, clipped to the surface.
    pub fn draw_line(&mut self, from: Pos2, to: Pos2, color: Color32) {
        let Some((from, to)) = clip_segment(from, to, self.width as f32, self.height as f32) else {
            return;
        };
        let rgba = color.to_srgba_unmultiplied();
        let delta = to - from;
        let steps = delta.x.abs().max(delta.y.abs()).ceil().max(1.0) as usize;
        let step = delta / steps as f32;
        let steep = delta.y.abs() > delta.x.abs();

        let mut point = from;
        for _ in 0..=steps {
            if steep {
                let x = point.x - 0.5;
                let base = x.floor();
                let fraction = x - base;
                self.blend(base as i64, point.y as i64, rgba, 1.0 - fraction);
                self.blend(base as i64 + 1, point.y as i64, rgba, fraction);
            } else {
                let y = point.y - 0.5;
                let base = y.floor();
                let fraction = y - base;
                self.blend(point.x as i64, base as i64, rgba, 1.0 - fraction);
                self.blend(point.x as i64, base as i64 + 1, rgba, fraction);
            }
            point += step;
        }
    }

    pub fn to_color_image(&self) -> ColorImage {
        ColorImage::from_rgba_unmultiplied([self.width, self.height], &self.pixels)
    }
}

/// Liang-Barsky clip against `[0, width] × [0, height]`.
fn clip_segment(from: Pos2, to: Pos2, width: f32, height: f32) -> Option<(Pos2, Pos2)> {
    let delta = to - from;
    let mut t0 = 0.0_f32;
    let mut t1 = 1.0_f32;

    for (p, q) in [
        (-delta.x, from.x),
        (delta.x, width - from.x),
        (-delta.y, from.y),
        (delta.y, height - from.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    Some((from + delta * t0, from + delta * t1))
}

#[derive(Clone, Debug)]
struct RasterNode {
    center: Vec2,
    radius: f32,
    fill: Color32,
    label: String,
}

/// Immediate-mode backend: keeps only a snapshot of the latest frame and
/// redraws the whole surface on every paint.
pub struct RasterBackend {
    view: ViewTransform,
    label_zoom: f32,
    nodes: Vec<RasterNode>,
    edges: Vec<(usize, usize, f32)>,
    surface: RasterSurface,
    texture: Option<TextureHandle>,
    destroyed: bool,
}

impl RasterBackend {
    pub fn new(label_zoom: f32) -> Self {
        Self {
            view: ViewTransform::default(),
            label_zoom,
            nodes: Vec::new(),
            edges: Vec::new(),
            surface: RasterSurface::default(),
            texture: None,
            destroyed: false,
        }
    }

    pub fn shows_labels(&self) -> bool {
        self.view.zoom >= self.label_zoom
    }

    pub fn surface(&self) -> &RasterSurface {
        &self.surface
    }

    /// Redraws the snapshot into the surface for a viewport of `viewport`
    /// points at `pixels_per_point`.
    pub fn rasterize(&mut self, viewport: Rect, pixels_per_point: f32) {
        let width = (viewport.width() * pixels_per_point).round().max(1.0) as usize;
        let height = (viewport.height() * pixels_per_point).round().max(1.0) as usize;
        self.surface.resize(width, height);
        self.surface.clear(BACKGROUND);

        let to_pixel = |world: Vec2, view: &ViewTransform| -> Pos2 {
            let screen = view.world_to_screen(viewport, world);
            pos2(
                (screen.x - viewport.left()) * pixels_per_point,
                (screen.y - viewport.top()) * pixels_per_point,
            )
        };

        for &(source, target, strength) in &self.edges {
            let from = to_pixel(self.nodes[source].center, &self.view);
            let to = to_pixel(self.nodes[target].center, &self.view);
            self.surface.draw_line(from, to, edge_color(strength));
        }

        let scale = self.view.zoom * pixels_per_point;
        for node in &self.nodes {
            let center = to_pixel(node.center, &self.view);
            self.surface.fill_circle(center, node.radius * scale, node.fill);
        }
    }
}

impl GraphBackend for RasterBackend {
    fn strategy(&self) -> RenderStrategy {
        RenderStrategy::Immediate
    }

    fn update(&mut self, frame: &GraphFrame<'_>) {
        if self.destroyed {
            return;
        }

        self.nodes.clear();
        self.nodes
            .extend(frame.nodes.iter().enumerate().map(|(id, node)| RasterNode {
                center: node.position,
                radius: node.radius,
                fill: frame.node_fill(id),
                label: frame.label(id).to_owned(),
            }));

        self.edges.clear();
        self.edges.extend(
            frame
                .edges
                .iter()
                .filter(|edge| frame.edge_in_range(edge))
                .map(|edge| (edge.source, edge.target, edge.strength)),
        );
    }

    fn view(&self) -> &ViewTransform {
        &self.view
    }

    fn view_mut(&mut self) -> &mut ViewTransform {
        &mut self.view
    }

    /// Nearest node within its radius plus slack.
    fn hit_test(&self, viewport: Rect, screen: Pos2) -> Option<usize> {
        nearest_within(
            self.nodes
                .iter()
                .enumerate()
                .map(|(id, node)| (id, node.center, node.radius)),
            &self.view,
            viewport,
            screen,
            HIT_SLACK,
        )
    }

    fn paint(&mut self, ctx: &Context, painter: &Painter, viewport: Rect) {
        if self.destroyed {
            return;
        }

        self.rasterize(viewport, ctx.pixels_per_point());
        let image = self.surface.to_color_image();
        if let Some(texture) = &mut self.texture {
            texture.set(image, TextureOptions::LINEAR);
        } else {
            self.texture = Some(ctx.load_texture(
                "attention-graph-raster",
                image,
                TextureOptions::LINEAR,
            ));
        }
        let Some(texture) = &self.texture else {
            return;
        };
        painter.image(
            texture.id(),
            viewport,
            Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
            Color32::WHITE,
        );

        if !self.shows_labels() {
            return;
        }
        for node in &self.nodes {
            let position = self.view.world_to_screen(viewport, node.center)
                - vec2(0.0, (node.radius + 4.0) * self.view.zoom);
            if viewport.contains(position) {
                painter.text(
                    position,
                    Align2::CENTER_BOTTOM,
                    &node.label,
                    FontId::proportional(11.0),
                    LABEL,
                );
            }
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.texture = None;
        self.surface.release();
        self.nodes = Vec::new();
        self.edges = Vec::new();
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::viewport_of_size;
    use crate::render::Highlight;
    use crate::render::test_support::line_graph;

    #[test]
    fn circle_covers_center_and_spares_corners() {
        let mut surface = RasterSurface::new(20, 20);
        surface.clear(Color32::BLACK);
        surface.fill_circle(pos2(10.0, 10.0), 4.0, Color32::from_rgb(255, 0, 0));

        assert_eq!(surface.pixel(10, 10), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(surface.pixel(20, 0), None);
    }

    #[test]
    fn lines_are_clipped_to_the_surface() {
        let mut surface = RasterSurface::new(10, 10);
        surface.clear(Color32::BLACK);
        surface.draw_line(pos2(-1.0e6, 5.5), pos2(1.0e6, 5.5), Color32::WHITE);
        assert_eq!(surface.pixel(3, 5), Some([255, 255, 255, 255]));

        assert!(clip_segment(pos2(-5.0, -5.0), pos2(-1.0, -1.0), 10.0, 10.0).is_none());
    }

    #[test]
    fn rasterizes_snapshot_and_hits_nearest_node() {
        let (nodes, tokens, edges) = line_graph(3);
        let mut backend = RasterBackend::new(1.5);
        backend.update(&GraphFrame {
            nodes: &nodes,
            tokens: &tokens,
            edges: &edges,
            revision: 0,
            highlight: Highlight::default(),
        });

        let viewport = viewport_of_size(200.0, 100.0);
        backend.rasterize(viewport, 1.0);
        assert_eq!(backend.surface().width(), 200);
        let center = backend.surface().pixel(100, 50).expect("center pixel");
        assert_ne!(center, BACKGROUND.to_srgba_unmultiplied());

        assert_eq!(backend.hit_test(viewport, viewport.center() + vec2(38.0, 0.0)), Some(1));
        assert!(!backend.shows_labels());
        backend.view_mut().zoom = 2.0;
        assert!(backend.shows_labels());
    }

    #[test]
    fn destroy_releases_surface() {
        let mut backend = RasterBackend::new(1.5);
        backend.rasterize(viewport_of_size(50.0, 50.0), 1.0);
        backend.destroy();
        backend.destroy();
        assert_eq!(backend.surface().width(), 0);
        assert!(backend.is_destroyed());
    }
}
