//! Force-directed layout for the attention graph.
//!
//! [`advance`] is a pure step over caller-owned nodes; [`ForceSimulation`]
//! adds the cooling schedule (alpha) and drag pinning on top of it.

mod forces;
mod quadtree;

use eframe::egui::{Vec2, vec2};

use forces::{
    CollisionParams, accumulate_charge_for_node, accumulate_collision_pairs, apply_centering,
    apply_links,
};
use quadtree::QuadNode;

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutNode {
    pub id: usize,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    /// Pinned nodes are exempt from forces and held at this position.
    pub pinned: Option<Vec2>,
}

impl LayoutNode {
    pub fn new(id: usize, position: Vec2, radius: f32) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            radius,
            pinned: None,
        }
    }
}

/// Link between two entries of the node slice (slice indices, not token ids).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutLink {
    pub source: usize,
    pub target: usize,
    pub strength: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceParams {
    pub link_distance: f32,
    pub charge: f32,
    pub collide_padding: f32,
    pub collide_strength: f32,
    pub velocity_decay: f32,
    pub theta: f32,
    pub center: Vec2,
}

impl Default for ForceParams {
    fn default() -> Self {
        Self {
            link_distance: 100.0,
            charge: -300.0,
            collide_padding: 2.0,
            collide_strength: 0.7,
            velocity_decay: 0.4,
            theta: 0.9,
            center: Vec2::ZERO,
        }
    }
}

#[derive(Default)]
struct ForceScratch {
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    predicted: Vec<Vec2>,
    radii: Vec<f32>,
    impulses: Vec<Vec2>,
    link_counts: Vec<usize>,
}

/// One relaxation step: link, charge, centering and collision forces scaled
/// by `alpha`, then velocity decay and integration.
pub fn advance(nodes: &mut [LayoutNode], links: &[LayoutLink], alpha: f32, params: &ForceParams) {
    advance_with(nodes, links, alpha, params, &mut ForceScratch::default());
}

fn advance_with(
    nodes: &mut [LayoutNode],
    links: &[LayoutLink],
    alpha: f32,
    params: &ForceParams,
    scratch: &mut ForceScratch,
) {
    let node_count = nodes.len();
    if node_count == 0 {
        return;
    }

    scratch.positions.clear();
    scratch.velocities.clear();
    scratch.radii.clear();
    let mut max_radius = 0.0_f32;
    for node in nodes.iter() {
        scratch.positions.push(node.position);
        scratch.velocities.push(node.velocity);
        let radius = node.radius + params.collide_padding;
        scratch.radii.push(radius);
        max_radius = max_radius.max(radius);
    }

    scratch.link_counts.clear();
    scratch.link_counts.resize(node_count, 0);
    for link in links {
        if link.source < node_count && link.target < node_count && link.source != link.target {
            scratch.link_counts[link.source] += 1;
            scratch.link_counts[link.target] += 1;
        }
    }

    apply_links(
        &scratch.positions,
        &mut scratch.velocities,
        links,
        &scratch.link_counts,
        params.link_distance,
        alpha,
    );

    if node_count > 1
        && let Some(tree) = QuadNode::build(&scratch.positions)
    {
        for (index, velocity) in scratch.velocities.iter_mut().enumerate() {
            accumulate_charge_for_node(
                &tree,
                index,
                &scratch.positions,
                params.charge,
                params.theta,
                alpha,
                velocity,
            );
        }
    }

    apply_centering(&mut scratch.positions, params.center);

    scratch.predicted.clear();
    scratch
        .predicted
        .extend(scratch.positions.iter().zip(&scratch.velocities).map(|(p, v)| *p + *v));
    scratch.impulses.clear();
    scratch.impulses.resize(node_count, Vec2::ZERO);
    if node_count > 1
        && max_radius > 0.0
        && let Some(tree) = QuadNode::build(&scratch.predicted)
    {
        let reach = max_radius * 2.0;
        accumulate_collision_pairs(
            &tree,
            &tree,
            true,
            &scratch.predicted,
            &scratch.radii,
            CollisionParams {
                strength: params.collide_strength,
                max_collision_distance_sq: reach * reach,
            },
            &mut scratch.impulses,
        );
    }

    let retain = 1.0 - params.velocity_decay.clamp(0.0, 1.0);
    for (index, node) in nodes.iter_mut().enumerate() {
        if let Some(pin) = node.pinned {
            node.position = pin;
            node.velocity = Vec2::ZERO;
            continue;
        }

        let velocity = (scratch.velocities[index] + scratch.impulses[index]) * retain;
        node.velocity = velocity;
        node.position = scratch.positions[index] + velocity;
    }
}

/// Phyllotaxis spiral around `center`, deterministic per index.
pub fn initial_positions(count: usize, center: Vec2) -> Vec<Vec2> {
    const INITIAL_RADIUS: f32 = 10.0;
    let golden_angle = std::f32::consts::PI * (3.0 - 5.0_f32.sqrt());

    (0..count)
        .map(|index| {
            let radius = INITIAL_RADIUS * (0.5 + index as f32).sqrt();
            let angle = index as f32 * golden_angle;
            center + vec2(radius * angle.cos(), radius * angle.sin())
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoolingSchedule {
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub drag_alpha_target: f32,
    pub reheat_alpha: f32,
}

impl Default for CoolingSchedule {
    fn default() -> Self {
        let alpha_min = 0.001_f32;
        Self {
            alpha_min,
            alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
            drag_alpha_target: 0.3,
            reheat_alpha: 0.3,
        }
    }
}

/// Owns the cooling state; the caller owns the nodes.
pub struct ForceSimulation {
    params: ForceParams,
    schedule: CoolingSchedule,
    alpha: f32,
    alpha_target: f32,
    scratch: ForceScratch,
}

impl ForceSimulation {
    pub fn new(params: ForceParams, schedule: CoolingSchedule) -> Self {
        Self {
            params,
            schedule,
            alpha: 1.0,
            alpha_target: 0.0,
            scratch: ForceScratch::default(),
        }
    }

    pub fn params(&self) -> &ForceParams {
        &self.params
    }

    pub fn set_center(&mut self, center: Vec2) {
        self.params.center = center;
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_settled(&self) -> bool {
        self.alpha < self.schedule.alpha_min && self.alpha_target < self.schedule.alpha_min
    }

    /// Steps once unless settled. Returns whether a step happened.
    pub fn tick(&mut self, nodes: &mut [LayoutNode], links: &[LayoutLink]) -> bool {
        if self.is_settled() {
            return false;
        }

        self.alpha += (self.alpha_target - self.alpha) * self.schedule.alpha_decay;
        advance_with(nodes, links, self.alpha, &self.params, &mut self.scratch);
        true
    }

    pub fn reheat(&mut self) {
        self.alpha = self.alpha.max(self.schedule.reheat_alpha);
    }

    pub fn restart(&mut self) {
        self.alpha = 1.0;
    }

    pub fn stop(&mut self) {
        self.alpha = 0.0;
        self.alpha_target = 0.0;
    }

    pub fn drag_start(&mut self, node: &mut LayoutNode) {
        node.pinned = Some(node.position);
        self.alpha_target = self.schedule.drag_alpha_target;
        self.reheat();
    }

    pub fn drag_to(&mut self, node: &mut LayoutNode, position: Vec2) {
        node.pinned = Some(position);
        node.position = position;
    }

    pub fn drag_end(&mut self, node: &mut LayoutNode) {
        node.pinned = None;
        self.alpha_target = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(count: usize) -> Vec<LayoutNode> {
        initial_positions(count, Vec2::ZERO)
            .into_iter()
            .enumerate()
            .map(|(index, position)| LayoutNode::new(index, position, 6.0))
            .collect()
    }

    fn run_to_rest(nodes: &mut [LayoutNode], links: &[LayoutLink]) -> usize {
        let mut simulation = ForceSimulation::new(ForceParams::default(), CoolingSchedule::default());
        let mut ticks = 0;
        while simulation.tick(nodes, links) {
            ticks += 1;
            assert!(ticks < 1_000, "simulation never settled");
        }
        ticks
    }

    #[test]
    fn linked_pair_relaxes_toward_link_distance() {
        let mut nodes = nodes(2);
        let links = [LayoutLink {
            source: 0,
            target: 1,
            strength: 1.0,
        }];
        run_to_rest(&mut nodes, &links);

        let distance = (nodes[0].position - nodes[1].position).length();
        assert!(distance > 60.0 && distance < 200.0, "distance {distance}");
    }

    #[test]
    fn settles_after_cooling_schedule() {
        let mut nodes = nodes(20);
        let ticks = run_to_rest(&mut nodes, &[]);
        assert!((290..=310).contains(&ticks), "ticks {ticks}");

        let before = nodes.clone();
        let mut simulation = ForceSimulation::new(ForceParams::default(), CoolingSchedule::default());
        simulation.stop();
        assert!(!simulation.tick(&mut nodes, &[]));
        assert_eq!(before, nodes);
    }

    #[test]
    fn centroid_tracks_center() {
        let mut nodes = nodes(12);
        let mut params = ForceParams::default();
        params.center = vec2(400.0, 300.0);
        for _ in 0..50 {
            advance(&mut nodes, &[], 0.5, &params);
        }

        let centroid = nodes.iter().map(|node| node.position).fold(Vec2::ZERO, |a, b| a + b)
            / nodes.len() as f32;
        assert!((centroid - params.center).length() < 25.0, "centroid {centroid:?}");
    }

    #[test]
    fn collision_separates_overlapping_nodes() {
        let mut nodes = vec![
            LayoutNode::new(0, vec2(0.0, 0.0), 10.0),
            LayoutNode::new(1, vec2(1.0, 0.0), 10.0),
        ];
        let params = ForceParams {
            charge: 0.0,
            ..ForceParams::default()
        };
        for _ in 0..200 {
            advance(&mut nodes, &[], 0.1, &params);
        }

        let distance = (nodes[0].position - nodes[1].position).length();
        assert!(distance >= 20.0, "distance {distance}");
    }

    #[test]
    fn dragged_node_stays_pinned() {
        let mut nodes = nodes(8);
        let mut simulation = ForceSimulation::new(ForceParams::default(), CoolingSchedule::default());
        let target = vec2(250.0, -40.0);

        simulation.drag_start(&mut nodes[0]);
        simulation.drag_to(&mut nodes[0], target);
        for _ in 0..30 {
            simulation.tick(&mut nodes, &[]);
        }
        assert_eq!(nodes[0].position, target);
        assert!(!simulation.is_settled());

        simulation.drag_end(&mut nodes[0]);
        assert_eq!(nodes[0].pinned, None);
    }
}
