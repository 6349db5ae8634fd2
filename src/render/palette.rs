use eframe::egui::Color32;

use crate::model::TokenCategory;

pub const BACKGROUND: Color32 = Color32::from_rgb(19, 23, 29);
pub const HOVER: Color32 = Color32::from_rgb(255, 164, 101);
pub const SELECTED: Color32 = Color32::from_rgb(245, 206, 93);
pub const SEARCH_MATCH: Color32 = Color32::from_rgb(103, 196, 255);
pub const LABEL: Color32 = Color32::from_gray(238);

pub fn category_color(category: TokenCategory) -> Color32 {
    match category {
        TokenCategory::Special => Color32::from_rgb(239, 83, 80),
        TokenCategory::Capitalized => Color32::from_rgb(171, 130, 255),
        TokenCategory::Numeric => Color32::from_rgb(255, 183, 77),
        TokenCategory::Punctuation => Color32::from_rgb(144, 164, 174),
        TokenCategory::Word => Color32::from_rgb(79, 195, 247),
    }
}

const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

/// Piecewise-linear viridis ramp over `t ∈ [0, 1]`.
pub fn viridis(t: f32) -> Color32 {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (VIRIDIS.len() - 1) as f32;
    let index = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let fraction = scaled - index as f32;
    let [r0, g0, b0] = VIRIDIS[index];
    let [r1, g1, b1] = VIRIDIS[index + 1];
    let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * fraction).round() as u8;
    Color32::from_rgb(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}

pub fn edge_color(strength: f32) -> Color32 {
    let strength = strength.clamp(0.0, 1.0);
    let alpha = (40.0 + strength * 180.0) as u8;
    Color32::from_rgba_unmultiplied(150, 170, 200, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viridis_endpoints_and_clamping() {
        assert_eq!(viridis(0.0), Color32::from_rgb(68, 1, 84));
        assert_eq!(viridis(1.0), Color32::from_rgb(253, 231, 37));
        assert_eq!(viridis(-3.0), viridis(0.0));
        assert_eq!(viridis(f32::NAN), viridis(0.0));
    }
}
