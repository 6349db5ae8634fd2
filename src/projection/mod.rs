mod flow;
mod projector;

pub use flow::{
    FlowEdge, FlowEdgeKind, FlowNode, FlowOptions, LayerFlow, LayerFlowBuilder, LayerFrame,
    PRIMARY_STRENGTH, SECONDARY_STRENGTH,
};
pub use projector::{
    CoordinateProjector, DEFAULT_FALLBACK_RANGE, EmbeddingPoint, Projection, ProjectionOptions,
    ReductionQuality, fallback_coordinates, normalize_axes, validate_coordinates,
};
