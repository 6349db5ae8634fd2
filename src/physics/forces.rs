use eframe::egui::{Vec2, vec2};

use super::LayoutLink;
use super::quadtree::QuadNode;

const MIN_DISTANCE_SQ: f32 = 1.0;

/// Deterministic tiny offset for coincident points, so forces never divide by zero.
pub(super) fn jiggle(a: usize, b: usize) -> Vec2 {
    let angle = ((a as f32) * 0.618_034 + (b as f32) * 0.414_214) * std::f32::consts::TAU;
    vec2(angle.cos(), angle.sin()) * 1e-3
}

/// Spring along every link toward `distance`, using velocity-predicted
/// positions. Displacement is split by degree so hubs move less.
pub(super) fn apply_links(
    positions: &[Vec2],
    velocities: &mut [Vec2],
    links: &[LayoutLink],
    link_counts: &[usize],
    distance: f32,
    alpha: f32,
) {
    let node_count = positions.len();
    for link in links {
        let (source, target) = (link.source, link.target);
        if source >= node_count || target >= node_count || source == target {
            continue;
        }

        let mut delta = (positions[target] + velocities[target])
            - (positions[source] + velocities[source]);
        if delta.length_sq() <= f32::EPSILON {
            delta = jiggle(source, target);
        }

        let length = delta.length();
        let source_count = link_counts[source].max(1) as f32;
        let target_count = link_counts[target].max(1) as f32;
        let strength = link.strength / source_count.min(target_count);
        let bias = source_count / (source_count + target_count);

        let correction = delta * ((length - distance) / length * alpha * strength);
        velocities[target] -= correction * bias;
        velocities[source] += correction * (1.0 - bias);
    }
}

/// Many-body charge with the Barnes-Hut approximation. A negative `charge`
/// repels.
pub(super) fn accumulate_charge_for_node(
    node: &QuadNode,
    index: usize,
    positions: &[Vec2],
    charge: f32,
    theta: f32,
    alpha: f32,
    velocity: &mut Vec2,
) {
    if node.mass <= 0.0 {
        return;
    }

    let point = positions[index];

    if node.is_leaf() {
        for &other_index in &node.indices {
            if other_index == index {
                continue;
            }
            let mut delta = positions[other_index] - point;
            if delta.length_sq() <= f32::EPSILON {
                delta = jiggle(index, other_index);
            }
            let distance_sq = delta.length_sq().max(MIN_DISTANCE_SQ);
            *velocity += delta * (charge * alpha / distance_sq);
        }
        return;
    }

    let delta = node.center_of_mass - point;
    let distance_sq = delta.length_sq().max(MIN_DISTANCE_SQ);
    let side = node.bounds.side_length();
    let can_approximate =
        !node.bounds.contains(point) && (side * side) / (theta * theta) < distance_sq;

    if can_approximate {
        *velocity += delta * (charge * node.mass * alpha / distance_sq);
        return;
    }

    for child in node.children.iter().flatten() {
        accumulate_charge_for_node(child, index, positions, charge, theta, alpha, velocity);
    }
}

#[derive(Clone, Copy)]
pub(super) struct CollisionParams {
    pub(super) strength: f32,
    pub(super) max_collision_distance_sq: f32,
}

fn resolve_overlap(
    from: usize,
    to: usize,
    predicted: &[Vec2],
    radii: &[f32],
    strength: f32,
    impulses: &mut [Vec2],
) {
    let min_distance = radii[from] + radii[to];
    let mut delta = predicted[from] - predicted[to];
    if delta.length_sq() <= f32::EPSILON {
        delta = jiggle(from, to);
    }

    let distance = delta.length();
    if distance >= min_distance {
        return;
    }

    let push = delta * ((min_distance - distance) / distance * strength);
    let from_sq = radii[from] * radii[from];
    let to_sq = radii[to] * radii[to];
    let share = to_sq / (from_sq + to_sq);
    impulses[from] += push * share;
    impulses[to] -= push * (1.0 - share);
}

/// Walks the quadtree against itself and separates every overlapping pair.
pub(super) fn accumulate_collision_pairs(
    node_a: &QuadNode,
    node_b: &QuadNode,
    same_node: bool,
    predicted: &[Vec2],
    radii: &[f32],
    params: CollisionParams,
    impulses: &mut [Vec2],
) {
    if node_a.bounds.distance_sq_to(node_b.bounds) > params.max_collision_distance_sq {
        return;
    }

    if node_a.is_leaf() && node_b.is_leaf() {
        if same_node {
            for (offset, &from) in node_a.indices.iter().enumerate() {
                for &to in &node_a.indices[offset + 1..] {
                    resolve_overlap(from, to, predicted, radii, params.strength, impulses);
                }
            }
        } else {
            for &from in &node_a.indices {
                for &to in &node_b.indices {
                    resolve_overlap(from, to, predicted, radii, params.strength, impulses);
                }
            }
        }
        return;
    }

    if same_node {
        for first in 0..4 {
            let Some(child_a) = node_a.children[first].as_ref() else {
                continue;
            };

            accumulate_collision_pairs(child_a, child_a, true, predicted, radii, params, impulses);

            for second in (first + 1)..4 {
                let Some(child_b) = node_a.children[second].as_ref() else {
                    continue;
                };
                accumulate_collision_pairs(
                    child_a, child_b, false, predicted, radii, params, impulses,
                );
            }
        }
        return;
    }

    let split_a = if node_a.is_leaf() {
        false
    } else if node_b.is_leaf() {
        true
    } else {
        node_a.bounds.half_extent >= node_b.bounds.half_extent
    };

    if split_a {
        for child in node_a.children.iter().flatten() {
            accumulate_collision_pairs(child, node_b, false, predicted, radii, params, impulses);
        }
    } else {
        for child in node_b.children.iter().flatten() {
            accumulate_collision_pairs(node_a, child, false, predicted, radii, params, impulses);
        }
    }
}

/// Translates every position so the centroid sits on `center`.
pub(super) fn apply_centering(positions: &mut [Vec2], center: Vec2) {
    if positions.is_empty() {
        return;
    }

    let mut centroid = Vec2::ZERO;
    for position in positions.iter() {
        centroid += *position;
    }
    centroid /= positions.len() as f32;

    let shift = center - centroid;
    if shift.length_sq() <= 1e-12 {
        return;
    }
    for position in positions.iter_mut() {
        *position += shift;
    }
}
