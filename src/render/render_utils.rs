use eframe::egui::{Color32, Painter, Pos2, Rect, Stroke};

use crate::interaction::ViewTransform;

use super::palette::BACKGROUND;

pub fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

pub fn dim_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        (color.r() as f32 * factor) as u8,
        (color.g() as f32 * factor) as u8,
        (color.b() as f32 * factor) as u8,
        (color.a() as f32 * (0.45 + (factor * 0.55))) as u8,
    )
}

pub fn draw_background(painter: &Painter, viewport: Rect, view: &ViewTransform) {
    painter.rect_filled(viewport, 0.0, BACKGROUND);

    let step = (56.0 * view.zoom.clamp(0.6, 1.8)).max(20.0);
    let origin = viewport.center() + view.pan;
    let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(60, 70, 80, 70));

    let mut x = viewport.left() + (origin.x - viewport.left()).rem_euclid(step);
    while x < viewport.right() {
        painter.line_segment(
            [Pos2::new(x, viewport.top()), Pos2::new(x, viewport.bottom())],
            stroke,
        );
        x += step;
    }

    let mut y = viewport.top() + (origin.y - viewport.top()).rem_euclid(step);
    while y < viewport.bottom() {
        painter.line_segment(
            [Pos2::new(viewport.left(), y), Pos2::new(viewport.right(), y)],
            stroke,
        );
        y += step;
    }
}

pub fn circle_visible(viewport: Rect, position: Pos2, radius: f32) -> bool {
    !(position.x + radius < viewport.left()
        || position.x - radius > viewport.right()
        || position.y + radius < viewport.top()
        || position.y - radius > viewport.bottom())
}

pub fn edge_visible(viewport: Rect, start: Pos2, end: Pos2, padding: f32) -> bool {
    let min_x = start.x.min(end.x) - padding;
    let max_x = start.x.max(end.x) + padding;
    let min_y = start.y.min(end.y) - padding;
    let max_y = start.y.max(end.y) + padding;

    if max_x < viewport.left()
        || min_x > viewport.right()
        || max_y < viewport.top()
        || min_y > viewport.bottom()
    {
        return false;
    }

    if viewport.contains(start) || viewport.contains(end) {
        return true;
    }

    let top_left = viewport.left_top();
    let top_right = viewport.right_top();
    let bottom_left = viewport.left_bottom();
    let bottom_right = viewport.right_bottom();

    segments_intersect(start, end, top_left, top_right)
        || segments_intersect(start, end, top_right, bottom_right)
        || segments_intersect(start, end, bottom_right, bottom_left)
        || segments_intersect(start, end, bottom_left, top_left)
}

fn segments_intersect(a1: Pos2, a2: Pos2, b1: Pos2, b2: Pos2) -> bool {
    fn cross(o: Pos2, a: Pos2, b: Pos2) -> f32 {
        let oa = a - o;
        let ob = b - o;
        (oa.x * ob.y) - (oa.y * ob.x)
    }

    let c1 = cross(a1, a2, b1);
    let c2 = cross(a1, a2, b2);
    let c3 = cross(b1, b2, a1);
    let c4 = cross(b1, b2, a2);

    (c1 <= 0.0 && c2 >= 0.0 || c1 >= 0.0 && c2 <= 0.0)
        && (c3 <= 0.0 && c4 >= 0.0 || c3 >= 0.0 && c4 <= 0.0)
}

/// Maps how much attention a token receives onto a node radius.
pub fn node_radius(received: f32, min: f32, max: f32) -> f32 {
    let span = max - min;
    let t = if span.abs() < f32::EPSILON {
        0.5
    } else {
        ((received - min) / span).clamp(0.0, 1.0)
    };
    5.0 + t * 11.0
}
