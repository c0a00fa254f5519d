use serde::{Deserialize, Serialize};
use crate::config::ContactOverride;
use crate::labels::{CellType, DevZone, Direction};

/// When a cell is ready to divide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DivisionCriterion {
    /// Current area at least this multiple of the cell's initial area.
    AreaRatio(f64),
    /// Accumulated quantity (concentration times area) at least this value.
    Quantity(f64),
}

/// Upper bounds (distance from the root tip, um) of the developmental zones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBounds {
    pub roottip_end: f64,
    pub meristematic_end: f64,
    pub transition_end: f64,
    pub elongation_end: f64,
}

impl ZoneBounds {
    pub fn zone_at(&self, dist_from_tip: f64) -> DevZone {
        if dist_from_tip < self.roottip_end {
            DevZone::RootTip
        } else if dist_from_tip < self.meristematic_end {
            DevZone::Meristematic
        } else if dist_from_tip < self.transition_end {
            DevZone::Transition
        } else if dist_from_tip < self.elongation_end {
            DevZone::Elongation
        } else {
            DevZone::Differentiation
        }
    }
}

/// Relative growth rate per zone (um per um per hour).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthRates {
    pub roottip: f64,
    pub meristematic: f64,
    pub transition: f64,
    pub elongation: f64,
    pub differentiation: f64,
}

impl GrowthRates {
    pub fn rate_for(&self, zone: DevZone) -> f64 {
        match zone {
            DevZone::RootTip => self.roottip,
            DevZone::Meristematic => self.meristematic,
            DevZone::Transition => self.transition,
            DevZone::Elongation => self.elongation,
            DevZone::Differentiation => self.differentiation,
        }
    }
}

/// Share of a cell's membrane-bound PIN on each membrane. Normalized to sum
/// to one when parameters are derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinWeights {
    pub apical: f64,
    pub basal: f64,
    pub lateral: f64,
    pub medial: f64,
}

impl PinWeights {
    pub fn weight(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Apical => self.apical,
            Direction::Basal => self.basal,
            Direction::Lateral => self.lateral,
            Direction::Medial => self.medial,
        }
    }

    pub fn sum(&self) -> f64 {
        self.apical + self.basal + self.lateral + self.medial
    }

    /// Scaled to sum to one; all zero when the sum is not positive.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if sum <= 0.0 {
            return PinWeights { apical: 0.0, basal: 0.0, lateral: 0.0, medial: 0.0 };
        }
        PinWeights {
            apical: self.apical / sum,
            basal: self.basal / sum,
            lateral: self.lateral / sum,
            medial: self.medial / sum,
        }
    }
}

impl Default for PinWeights {
    fn default() -> Self {
        PinWeights { apical: 0.25, basal: 0.25, lateral: 0.25, medial: 0.25 }
    }
}

/// Upper bounds (distance from the root midline, um) of the tissue layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeBounds {
    pub vasculature: f64,
    pub pericycle: f64,
    pub endodermis: f64,
    pub cortex: f64,
    pub epidermis: f64,
}

impl Default for TypeBounds {
    fn default() -> Self {
        TypeBounds {
            vasculature: 12.0,
            pericycle: 17.0,
            endodermis: 24.0,
            cortex: 35.0,
            epidermis: 45.0,
        }
    }
}

impl TypeBounds {
    pub fn type_at(&self, dist_from_midline: f64) -> CellType {
        if dist_from_midline < self.vasculature {
            CellType::Vasculature
        } else if dist_from_midline < self.pericycle {
            CellType::Pericycle
        } else if dist_from_midline < self.endodermis {
            CellType::Endodermis
        } else if dist_from_midline < self.cortex {
            CellType::Cortex
        } else if dist_from_midline < self.epidermis {
            CellType::Epidermis
        } else {
            CellType::Unclassified
        }
    }
}

/// Simulation parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Time
    pub dt: f64, // Hours per tick
    pub total_ticks: u32,
    pub record_interval_ticks: u32,
    pub tick: u32, // Current simulation tick

    // Geometry
    pub geometry_eps: f64, // Coordinate tolerance (um)

    // Mechanics
    pub mechanics_enabled: bool,
    pub stiffness: f64,
    pub mobility: f64,
    pub max_step: f64,
    pub max_halvings: u32,
    pub max_cell_height: f64,

    // Growth
    pub zone_bounds: ZoneBounds,
    pub growth_rates: GrowthRates,
    pub type_bounds: TypeBounds,

    // Diffusion
    pub diffusion_coefficient: f64,
    pub sources_enabled: bool,
    pub pin_rate: f64, // Polar efflux rate (per hour)
    pub pin_weights: PinWeights,

    // Division
    pub division_criterion: DivisionCriterion,
    pub division_zones: Option<Vec<DevZone>>,
    pub divide_root_cap: bool,

    // Root cap
    pub root_cap_ids: Vec<u32>,
    pub contact_overrides: Vec<ContactOverride>,
}
