pub mod config;
pub mod labels;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    ContactOverride, DiffusionConfig, DivisionConfig, DivisionCriterionType, GrowthConfig, MechanicsConfig,
    MeshConfig, MeshSource, OutputConfig, RootCapConfig, RootCapPreset, SimulationConfig, TimingConfig,
};
pub use labels::{CellType, DevZone, Direction};
pub use sim_params::{DivisionCriterion, GrowthRates, PinWeights, SimParams, TypeBounds, ZoneBounds};
pub use snapshot::{CellRecord, LineageRecord, Snapshot, VertexRecord};
pub use vecmath::{Vec2, axis_overlap, clamp};
