use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a cell on which a neighbor sits, relative to the root axes.
///
/// Apical points toward the shoot (larger y), basal toward the root tip
/// (smaller y). Lateral points away from the root midline, medial toward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "a")]
    Apical,
    #[serde(alias = "b")]
    Basal,
    #[serde(alias = "l")]
    Lateral,
    #[serde(alias = "m")]
    Medial,
}

impl Direction {
    /// Single-letter code used in CSV output.
    pub fn code(&self) -> &'static str {
        match self {
            Direction::Apical => "a",
            Direction::Basal => "b",
            Direction::Lateral => "l",
            Direction::Medial => "m",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Developmental zone, determined by distance from the root tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevZone {
    RootTip,
    Meristematic,
    Transition,
    Elongation,
    Differentiation,
}

impl fmt::Display for DevZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DevZone::RootTip => "roottip",
            DevZone::Meristematic => "meristematic",
            DevZone::Transition => "transition",
            DevZone::Elongation => "elongation",
            DevZone::Differentiation => "differentiation",
        };
        f.write_str(name)
    }
}

/// Tissue layer, determined by distance from the root midline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Vasculature,
    Pericycle,
    Endodermis,
    Cortex,
    Epidermis,
    RootCap,
    Unclassified,
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CellType::Vasculature => "vasc",
            CellType::Pericycle => "peri",
            CellType::Endodermis => "endo",
            CellType::Cortex => "cortex",
            CellType::Epidermis => "epidermis",
            CellType::RootCap => "rootcap",
            CellType::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}
