use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_IMMEDIATE_NODE_THRESHOLD: usize = 150;
pub const DEFAULT_RETAINED_EDGE_CAP: usize = 500;
pub const DEFAULT_IMMEDIATE_EDGE_CAP: usize = 300;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    #[default]
    Auto,
    Quality,
    Speed,
}

impl PerformanceMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Quality => "Quality",
            Self::Speed => "Speed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderStrategy {
    /// Addressable per-node scene elements with per-node labels.
    Retained,
    /// One raster surface redrawn every frame.
    Immediate,
}

impl RenderStrategy {
    pub fn label(self) -> &'static str {
        match self {
            Self::Retained => "vector",
            Self::Immediate => "raster",
        }
    }

    pub fn default_edge_cap(self) -> usize {
        match self {
            Self::Retained => DEFAULT_RETAINED_EDGE_CAP,
            Self::Immediate => DEFAULT_IMMEDIATE_EDGE_CAP,
        }
    }
}

/// `speed` always rasterizes, `quality` always keeps vector elements, and
/// `auto` rasterizes once the node count exceeds `immediate_threshold`.
pub fn select_strategy(
    mode: PerformanceMode,
    node_count: usize,
    immediate_threshold: usize,
) -> RenderStrategy {
    let strategy = match mode {
        PerformanceMode::Speed => RenderStrategy::Immediate,
        PerformanceMode::Quality => RenderStrategy::Retained,
        PerformanceMode::Auto if node_count > immediate_threshold => RenderStrategy::Immediate,
        PerformanceMode::Auto => RenderStrategy::Retained,
    };
    debug!(?mode, node_count, backend = strategy.label(), "selected render strategy");
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_modes_ignore_node_count() {
        for count in [0, 10, 150, 151, 512] {
            assert_eq!(
                select_strategy(PerformanceMode::Speed, count, 150),
                RenderStrategy::Immediate
            );
            assert_eq!(
                select_strategy(PerformanceMode::Quality, count, 150),
                RenderStrategy::Retained
            );
        }
    }

    #[test]
    fn edge_caps_follow_strategy() {
        assert_eq!(RenderStrategy::Retained.default_edge_cap(), 500);
        assert_eq!(RenderStrategy::Immediate.default_edge_cap(), 300);
    }
}
