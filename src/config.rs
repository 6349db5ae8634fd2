use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::attention::{EdgeSelector, MatrixDownsampler};
use crate::physics::{CoolingSchedule, ForceParams};
use crate::projection::{FlowOptions, ProjectionOptions};
use crate::render::{BackendOptions, PerformanceMode, RenderStrategy};
use crate::service::ReductionMethod;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub display_name: &'static str,
    pub layers: usize,
    pub heads: usize,
    pub embedding_dim: usize,
    pub max_length: usize,
}

pub const MODELS: [ModelInfo; 2] = [
    ModelInfo {
        id: "distilbert",
        name: "distilbert-base-uncased",
        display_name: "DistilBERT Base",
        layers: 6,
        heads: 12,
        embedding_dim: 768,
        max_length: 512,
    },
    ModelInfo {
        id: "gpt2",
        name: "gpt2",
        display_name: "GPT-2 Small",
        layers: 12,
        heads: 12,
        embedding_dim: 768,
        max_length: 1024,
    },
];

pub fn model_info(id: &str) -> Option<&'static ModelInfo> {
    MODELS
        .iter()
        .find(|model| model.id == id || model.name == id)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    pub link_distance: f32,
    pub charge: f32,
    pub collide_padding: f32,
    pub collide_strength: f32,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub velocity_decay: f32,
    pub drag_alpha_target: f32,
    pub theta: f32,
}

impl Default for ForceConfig {
    fn default() -> Self {
        let params = ForceParams::default();
        let schedule = CoolingSchedule::default();
        Self {
            link_distance: params.link_distance,
            charge: params.charge,
            collide_padding: params.collide_padding,
            collide_strength: params.collide_strength,
            alpha_min: schedule.alpha_min,
            alpha_decay: schedule.alpha_decay,
            velocity_decay: params.velocity_decay,
            drag_alpha_target: schedule.drag_alpha_target,
            theta: params.theta,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Inference endpoint; without it the host synthesizes demo data.
    pub inference_url: Option<String>,
    /// Reduction endpoint; without it embeddings get random coordinates.
    pub reduction_url: Option<String>,
    pub timeout_secs: u64,
    pub model: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            inference_url: None,
            reduction_url: None,
            timeout_secs: 30,
            model: "distilbert".to_owned(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VizConfig {
    pub performance_mode: PerformanceMode,
    /// Overrides both per-backend caps when set.
    pub max_edges: Option<usize>,
    pub max_edges_retained: usize,
    pub max_edges_immediate: usize,
    pub edge_percentile: f32,
    pub edge_amplification: f32,
    pub immediate_node_threshold: usize,
    pub retained_label_limit: usize,
    pub immediate_label_zoom: f32,
    pub heatmap_max_side: usize,
    pub max_tokens_in_flow: usize,
    pub flow_connection_limit: usize,
    pub show_connections: bool,
    pub flow_layer_count: usize,
    pub flow_layer_spacing: f32,
    pub flow_jitter_per_layer: f32,
    pub flow_max_jitter: f32,
    pub reduction_method: ReductionMethod,
    pub reduction_dims: usize,
    pub fallback_range: f32,
    pub forces: ForceConfig,
    pub services: ServiceConfig,
}

impl Default for VizConfig {
    fn default() -> Self {
        let flow = FlowOptions::default();
        let projection = ProjectionOptions::default();
        let backend = BackendOptions::default();
        let edges = EdgeSelector::default();
        Self {
            performance_mode: PerformanceMode::Auto,
            max_edges: None,
            max_edges_retained: RenderStrategy::Retained.default_edge_cap(),
            max_edges_immediate: RenderStrategy::Immediate.default_edge_cap(),
            edge_percentile: edges.percentile,
            edge_amplification: edges.amplification,
            immediate_node_threshold: crate::render::DEFAULT_IMMEDIATE_NODE_THRESHOLD,
            retained_label_limit: backend.label_limit,
            immediate_label_zoom: backend.label_zoom,
            heatmap_max_side: MatrixDownsampler::default().target,
            max_tokens_in_flow: flow.max_tokens,
            flow_connection_limit: flow.connection_limit,
            show_connections: flow.show_connections,
            flow_layer_count: flow.layer_count,
            flow_layer_spacing: flow.layer_spacing,
            flow_jitter_per_layer: flow.jitter_per_layer,
            flow_max_jitter: flow.max_jitter,
            reduction_method: projection.method,
            reduction_dims: projection.dims,
            fallback_range: projection.fallback_range,
            forces: ForceConfig::default(),
            services: ServiceConfig::default(),
        }
    }
}

impl VizConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// Clamps out-of-range values back into something the pipeline accepts.
    pub fn sanitized(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.edge_percentile) {
            warn!(value = self.edge_percentile, "edge_percentile outside [0, 1], clamping");
            self.edge_percentile = if self.edge_percentile.is_finite() {
                self.edge_percentile.clamp(0.0, 1.0)
            } else {
                EdgeSelector::default().percentile
            };
        }
        if !(2..=3).contains(&self.reduction_dims) {
            warn!(value = self.reduction_dims, "reduction_dims must be 2 or 3, clamping");
            self.reduction_dims = self.reduction_dims.clamp(2, 3);
        }
        if self.heatmap_max_side == 0 {
            warn!("heatmap_max_side must be positive, using 1");
            self.heatmap_max_side = 1;
        }
        // A zero decay or floor would keep alpha above alpha_min forever.
        let decay = self.forces.alpha_decay;
        if !decay.is_finite() || decay <= 0.0 || decay >= 1.0 {
            warn!(value = decay, "alpha_decay outside (0, 1), using default");
            self.forces.alpha_decay = CoolingSchedule::default().alpha_decay;
        }
        let floor = self.forces.alpha_min;
        if !floor.is_finite() || floor <= 0.0 || floor >= 1.0 {
            warn!(value = floor, "alpha_min outside (0, 1), using default");
            self.forces.alpha_min = CoolingSchedule::default().alpha_min;
        }
        for (name, value) in [
            ("flow_jitter_per_layer", &mut self.flow_jitter_per_layer),
            ("flow_max_jitter", &mut self.flow_max_jitter),
        ] {
            if !value.is_finite() || *value < 0.0 {
                warn!(value = *value, "{name} must be non-negative, using 0");
                *value = 0.0;
            }
        }
        self
    }

    pub fn model(&self) -> Option<&'static ModelInfo> {
        model_info(&self.services.model)
    }

    pub fn edge_cap(&self, strategy: RenderStrategy) -> usize {
        self.max_edges.unwrap_or(match strategy {
            RenderStrategy::Retained => self.max_edges_retained,
            RenderStrategy::Immediate => self.max_edges_immediate,
        })
    }

    pub fn edge_selector(&self, strategy: RenderStrategy) -> EdgeSelector {
        EdgeSelector {
            cap: self.edge_cap(strategy),
            percentile: self.edge_percentile,
            amplification: self.edge_amplification,
        }
    }

    pub fn downsampler(&self) -> MatrixDownsampler {
        MatrixDownsampler::new(self.heatmap_max_side)
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            label_limit: self.retained_label_limit,
            label_zoom: self.immediate_label_zoom,
        }
    }

    pub fn force_params(&self) -> ForceParams {
        ForceParams {
            link_distance: self.forces.link_distance,
            charge: self.forces.charge,
            collide_padding: self.forces.collide_padding,
            collide_strength: self.forces.collide_strength,
            velocity_decay: self.forces.velocity_decay,
            theta: self.forces.theta,
            ..ForceParams::default()
        }
    }

    pub fn cooling_schedule(&self) -> CoolingSchedule {
        CoolingSchedule {
            alpha_min: self.forces.alpha_min,
            alpha_decay: self.forces.alpha_decay,
            drag_alpha_target: self.forces.drag_alpha_target,
            ..CoolingSchedule::default()
        }
    }

    pub fn flow_options(&self) -> FlowOptions {
        FlowOptions {
            layer_count: self.flow_layer_count,
            max_tokens: self.max_tokens_in_flow,
            connection_limit: self.flow_connection_limit,
            show_connections: self.show_connections,
            layer_spacing: self.flow_layer_spacing,
            jitter_per_layer: self.flow_jitter_per_layer,
            max_jitter: self.flow_max_jitter,
            ..FlowOptions::default()
        }
    }

    pub fn projection_options(&self) -> ProjectionOptions {
        ProjectionOptions {
            method: self.reduction_method,
            dims: self.reduction_dims,
            fallback_range: self.fallback_range,
        }
    }
}
