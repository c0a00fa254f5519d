use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::labels::{DevZone, Direction};
use crate::sim_params::{DivisionCriterion, GrowthRates, PinWeights, SimParams, TypeBounds, ZoneBounds};
use std::path::Path;

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    /// Length of one tick in hours.
    #[serde(default = "default_dt_hours")]
    pub dt_hours: f64,
    pub total_ticks: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval_ticks: u32,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshSource {
    /// Rectangular grid generated from the `[mesh]` parameters.
    Grid,
    /// Vertex CSV plus cell CSV.
    Files,
    /// A single JSON payload file.
    Json,
}

// Initial mesh, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MeshConfig {
    #[serde(default = "default_mesh_source")]
    pub source: MeshSource,
    // Grid settings (used if source == Grid)
    #[serde(default = "default_grid_dim")]
    pub rows: u32,
    #[serde(default = "default_grid_dim")]
    pub columns: u32,
    #[serde(default = "default_cell_size")]
    pub cell_width_um: f64,
    #[serde(default = "default_cell_size")]
    pub cell_height_um: f64,
    #[serde(default)]
    pub origin_x_um: f64,
    #[serde(default)]
    pub origin_y_um: f64,
    #[serde(default = "default_initial_concentration")]
    pub initial_concentration: f64,
    /// Half-width of the uniform noise added to the initial concentration.
    #[serde(default)]
    pub concentration_jitter: f64,
    #[serde(default)]
    pub seed: u64,
    // File settings (used if source == Files / Json)
    #[serde(default)]
    pub vertex_file: Option<String>,
    #[serde(default)]
    pub cell_file: Option<String>,
    #[serde(default)]
    pub payload_file: Option<String>,
}

/// A hand-specified direction for a pair of cells whose contact the geometry rules
/// cannot classify on their own.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactOverride {
    pub cell: u32,
    pub neighbor: u32,
    pub direction: Direction,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCapPreset {
    None,
    /// Root-cap ids and contact overrides of the hand-built reference root.
    ReferenceRoot,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RootCapConfig {
    #[serde(default = "default_root_cap_preset")]
    pub preset: RootCapPreset,
    /// Extra root-cap ids, added to the preset's.
    #[serde(default)]
    pub cell_ids: Vec<u32>,
    /// Extra overrides, consulted before the preset's.
    #[serde(default)]
    pub overrides: Vec<ContactOverride>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MechanicsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_stiffness")]
    pub stiffness: f64,
    #[serde(default = "default_mobility")]
    pub mobility: f64,
    /// Largest displacement a vertex may take in one tick (um).
    #[serde(default = "default_max_step")]
    pub max_step_um: f64,
    #[serde(default = "default_max_halvings")]
    pub max_halvings: u32,
    /// Cells stop growing once their rest height reaches this (um).
    #[serde(default = "default_max_cell_height")]
    pub max_cell_height_um: f64,
}

// Zone boundaries are distances from the root tip (um); rates are um/um/hr.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GrowthConfig {
    #[serde(default = "default_roottip_end")]
    pub roottip_end_um: f64,
    #[serde(default = "default_meristematic_end")]
    pub meristematic_end_um: f64,
    #[serde(default = "default_transition_end")]
    pub transition_end_um: f64,
    #[serde(default = "default_elongation_end")]
    pub elongation_end_um: f64,
    #[serde(default)]
    pub roottip_rate: f64,
    #[serde(default = "default_fast_rate")]
    pub meristematic_rate: f64,
    #[serde(default = "default_fast_rate")]
    pub transition_rate: f64,
    #[serde(default = "default_slow_rate")]
    pub elongation_rate: f64,
    #[serde(default = "default_slow_rate")]
    pub differentiation_rate: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DiffusionConfig {
    #[serde(default = "default_diffusion_coefficient")]
    pub coefficient: f64,
    /// Enables per-cell synthesis/degradation.
    #[serde(default)]
    pub sources_enabled: bool,
    /// Rate of PIN-driven polar efflux; zero disables it.
    #[serde(default)]
    pub pin_rate: f64,
    /// Relative PIN amount on each membrane.
    #[serde(default)]
    pub pin_weights: PinWeights,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisionCriterionType {
    AreaRatio,
    Quantity,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DivisionConfig {
    #[serde(default = "default_division_criterion")]
    pub criterion: DivisionCriterionType,
    #[serde(default = "default_area_ratio")]
    pub area_ratio: f64,
    #[serde(default)]
    pub quantity_threshold: Option<f64>,
    /// Zones in which cells may divide. Missing means every zone.
    #[serde(default)]
    pub zones: Option<Vec<DevZone>>,
    #[serde(default)]
    pub divide_root_cap: bool,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_cells_csv: bool,
    #[serde(default = "default_true")]
    pub save_snapshots: bool,
    #[serde(default)]
    pub save_lineage: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub timing: TimingConfig,
    pub mesh: MeshConfig,
    #[serde(default)]
    pub root_cap: RootCapConfig,
    #[serde(default)]
    pub mechanics: MechanicsConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
    #[serde(default)]
    pub diffusion: DiffusionConfig,
    #[serde(default)]
    pub division: DivisionConfig,
    pub output: OutputConfig,
}

impl Default for RootCapConfig {
    fn default() -> Self {
        RootCapConfig {
            preset: RootCapPreset::None,
            cell_ids: Vec::new(),
            overrides: Vec::new(),
        }
    }
}

impl Default for MechanicsConfig {
    fn default() -> Self {
        MechanicsConfig {
            enabled: true,
            stiffness: default_stiffness(),
            mobility: default_mobility(),
            max_step_um: default_max_step(),
            max_halvings: default_max_halvings(),
            max_cell_height_um: default_max_cell_height(),
        }
    }
}

impl Default for GrowthConfig {
    fn default() -> Self {
        GrowthConfig {
            roottip_end_um: default_roottip_end(),
            meristematic_end_um: default_meristematic_end(),
            transition_end_um: default_transition_end(),
            elongation_end_um: default_elongation_end(),
            roottip_rate: 0.0,
            meristematic_rate: default_fast_rate(),
            transition_rate: default_fast_rate(),
            elongation_rate: default_slow_rate(),
            differentiation_rate: default_slow_rate(),
        }
    }
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        DiffusionConfig {
            coefficient: default_diffusion_coefficient(),
            sources_enabled: false,
            pin_rate: 0.0,
            pin_weights: PinWeights::default(),
        }
    }
}

impl Default for DivisionConfig {
    fn default() -> Self {
        DivisionConfig {
            criterion: DivisionCriterionType::AreaRatio,
            area_ratio: default_area_ratio(),
            quantity_threshold: None,
            zones: None,
            divide_root_cap: false,
        }
    }
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.timing.dt_hours <= 0.0 {
            anyhow::bail!("dt_hours must be positive.");
        }
        if self.timing.record_interval_ticks == 0 {
            anyhow::bail!("record_interval_ticks must be greater than 0.");
        }
        match self.mesh.source {
            MeshSource::Grid => {
                if self.mesh.rows == 0 || self.mesh.columns == 0 {
                    anyhow::bail!("Grid mesh needs at least one row and one column.");
                }
                if self.mesh.cell_width_um <= 0.0 || self.mesh.cell_height_um <= 0.0 {
                    anyhow::bail!("Grid cell dimensions must be positive.");
                }
                if self.mesh.concentration_jitter < 0.0
                    || self.mesh.concentration_jitter > self.mesh.initial_concentration
                {
                    anyhow::bail!("concentration_jitter must lie in [0, initial_concentration].");
                }
            }
            MeshSource::Files => {
                if self.mesh.vertex_file.is_none() || self.mesh.cell_file.is_none() {
                    anyhow::bail!("mesh.source = \"files\" needs both vertex_file and cell_file.");
                }
            }
            MeshSource::Json => {
                if self.mesh.payload_file.is_none() {
                    anyhow::bail!("mesh.source = \"json\" needs payload_file.");
                }
            }
        }
        if self.mesh.initial_concentration < 0.0 {
            anyhow::bail!("initial_concentration must not be negative.");
        }
        if self.mechanics.stiffness < 0.0 || self.mechanics.mobility < 0.0 {
            anyhow::bail!("stiffness and mobility must not be negative.");
        }
        if self.mechanics.max_step_um <= 0.0 {
            anyhow::bail!("max_step_um must be positive.");
        }
        let g = &self.growth;
        if !(g.roottip_end_um <= g.meristematic_end_um
            && g.meristematic_end_um <= g.transition_end_um
            && g.transition_end_um <= g.elongation_end_um)
        {
            anyhow::bail!("Growth zone boundaries must be non-decreasing.");
        }
        if self.diffusion.coefficient < 0.0 {
            anyhow::bail!("Diffusion coefficient must not be negative.");
        }
        let w = &self.diffusion.pin_weights;
        if self.diffusion.pin_rate < 0.0 || w.apical < 0.0 || w.basal < 0.0 || w.lateral < 0.0 || w.medial < 0.0 {
            anyhow::bail!("pin_rate and pin_weights must not be negative.");
        }
        if self.diffusion.pin_rate > 0.0 && w.sum() <= 0.0 {
            anyhow::bail!("pin_weights must not all be zero when pin_rate is set.");
        }
        match self.division.criterion {
            DivisionCriterionType::AreaRatio => {
                if self.division.area_ratio <= 1.0 {
                    anyhow::bail!("area_ratio must be greater than 1.");
                }
            }
            DivisionCriterionType::Quantity => match self.division.quantity_threshold {
                Some(t) if t > 0.0 => {}
                _ => anyhow::bail!("Quantity criterion needs a positive quantity_threshold."),
            },
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let mut root_cap_ids = self.root_cap.cell_ids.clone();
        let mut contact_overrides = self.root_cap.overrides.clone();
        if self.root_cap.preset == RootCapPreset::ReferenceRoot {
            root_cap_ids.extend_from_slice(&REFERENCE_ROOT_CAP_IDS);
            contact_overrides.extend(reference_root_overrides());
        }
        root_cap_ids.sort_unstable();
        root_cap_ids.dedup();

        let division_criterion = match self.division.criterion {
            DivisionCriterionType::AreaRatio => DivisionCriterion::AreaRatio(self.division.area_ratio),
            DivisionCriterionType::Quantity => {
                DivisionCriterion::Quantity(self.division.quantity_threshold.unwrap_or(f64::INFINITY))
            }
        };

        // Tolerance scales with the smallest grid dimension for generated meshes.
        let length_scale = self.mesh.cell_width_um.min(self.mesh.cell_height_um).max(1.0);

        SimParams {
            // Time
            dt: self.timing.dt_hours,
            total_ticks: self.timing.total_ticks,
            record_interval_ticks: self.timing.record_interval_ticks,
            tick: 0,
            // Geometry
            geometry_eps: 1e-9 * length_scale,
            // Mechanics
            mechanics_enabled: self.mechanics.enabled,
            stiffness: self.mechanics.stiffness,
            mobility: self.mechanics.mobility,
            max_step: self.mechanics.max_step_um,
            max_halvings: self.mechanics.max_halvings,
            max_cell_height: self.mechanics.max_cell_height_um,
            // Growth
            zone_bounds: ZoneBounds {
                roottip_end: self.growth.roottip_end_um,
                meristematic_end: self.growth.meristematic_end_um,
                transition_end: self.growth.transition_end_um,
                elongation_end: self.growth.elongation_end_um,
            },
            growth_rates: GrowthRates {
                roottip: self.growth.roottip_rate,
                meristematic: self.growth.meristematic_rate,
                transition: self.growth.transition_rate,
                elongation: self.growth.elongation_rate,
                differentiation: self.growth.differentiation_rate,
            },
            type_bounds: TypeBounds::default(),
            // Diffusion
            diffusion_coefficient: self.diffusion.coefficient,
            sources_enabled: self.diffusion.sources_enabled,
            pin_rate: self.diffusion.pin_rate,
            pin_weights: self.diffusion.pin_weights.normalized(),
            // Division
            division_criterion,
            division_zones: self.division.zones.clone(),
            divide_root_cap: self.division.divide_root_cap,
            // Root cap
            root_cap_ids,
            contact_overrides,
        }
    }
}

/// Root-cap cell ids of the hand-built reference root.
pub const REFERENCE_ROOT_CAP_IDS: [u32; 14] = [60, 90, 120, 136, 166, 210, 296, 75, 105, 135, 151, 181, 225, 311];

/// Irregular contacts of the hand-built reference root: pairs whose shared edge
/// shrinks to a single vertex (or none) as the tissue grows.
pub fn reference_root_overrides() -> Vec<ContactOverride> {
    use Direction::{Apical as A, Basal as B, Lateral as L, Medial as M};
    let table: [(u32, u32, Direction); 44] = [
        // Pairs sharing one vertex
        (10, 20, A), (20, 10, B),
        (11, 25, A), (25, 11, B),
        (16, 36, A), (36, 16, B),
        (19, 37, A), (37, 19, B),
        (20, 26, B), (26, 20, L),
        (20, 36, A), (36, 20, B),
        (25, 27, B), (27, 25, L),
        (25, 37, A), (37, 25, B),
        (38, 39, M), (39, 38, L),
        (39, 46, L), (46, 39, M),
        (42, 43, L), (43, 42, M),
        (42, 47, L), (47, 42, M),
        (44, 50, M), (50, 44, L),
        (45, 51, M), (51, 45, L),
        (50, 52, L), (52, 50, M),
        (51, 59, L), (59, 51, M),
        (54, 65, A), (65, 54, B),
        (54, 66, A), (66, 54, B),
        (57, 69, A), (69, 57, B),
        (57, 70, A), (70, 57, B),
        // Pairs sharing no vertex
        (17, 20, L), (20, 17, B),
        (18, 25, L), (25, 18, B),
    ];
    table
        .iter()
        .map(|&(cell, neighbor, direction)| ContactOverride { cell, neighbor, direction })
        .collect()
}

// Default functions
fn default_dt_hours() -> f64 {
    1.0
}

fn default_record_interval() -> u32 {
    1
}

fn default_mesh_source() -> MeshSource {
    MeshSource::Grid
}

fn default_grid_dim() -> u32 {
    4
}

fn default_cell_size() -> f64 {
    10.0
}

fn default_initial_concentration() -> f64 {
    1.0
}

fn default_root_cap_preset() -> RootCapPreset {
    RootCapPreset::None
}

fn default_true() -> bool {
    true
}

fn default_stiffness() -> f64 {
    1.0
}

fn default_mobility() -> f64 {
    0.5
}

fn default_max_step() -> f64 {
    1.0
}

fn default_max_halvings() -> u32 {
    4
}

fn default_max_cell_height() -> f64 {
    250.0
}

fn default_roottip_end() -> f64 {
    74.0
}

fn default_meristematic_end() -> f64 {
    160.0
}

fn default_transition_end() -> f64 {
    340.0
}

fn default_elongation_end() -> f64 {
    460.0
}

fn default_fast_rate() -> f64 {
    0.0179
}

fn default_slow_rate() -> f64 {
    0.00112
}

fn default_diffusion_coefficient() -> f64 {
    0.01
}

fn default_division_criterion() -> DivisionCriterionType {
    DivisionCriterionType::AreaRatio
}

fn default_area_ratio() -> f64 {
    2.0
}
