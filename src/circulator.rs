//! Diffusion of the tracked substance across the neighbor graph.

use crate::error::MeshError;
use crate::mesh::{Cell, CellId, Tissue, VertexArena};
use log::trace;
use std::collections::BTreeMap;
use tissue_common::{Direction, SimParams};

/// What one circulation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CirculationReport {
    /// Linked pairs that exchanged anything by diffusion.
    pub pairs: usize,
    /// Total quantity moved between cells.
    pub transferred: f64,
    /// Part of `transferred` carried by PIN-driven polar efflux.
    pub polar: f64,
    /// Donors whose outflow had to be scaled down to what they held.
    pub limited_donors: usize,
    /// Net quantity added by source terms.
    pub produced: f64,
}

/// Exchanges the tracked quantity between linked cells once per tick.
///
/// The flux across a link is `D * L * (c_a - c_b) * dt` in quantity units,
/// where `L` is the stored contact length. With a positive `pin_rate` each
/// cell also exports through its PIN-loaded membranes (see [`polar_efflux`]).
/// All fluxes are computed from the pre-tick state and applied together.
#[derive(Debug, Clone, Default)]
pub struct Circulator;

impl Circulator {
    pub fn new() -> Self {
        Circulator
    }

    pub fn step(&self, tissue: &mut Tissue, params: &SimParams) -> Result<CirculationReport, MeshError> {
        let eps = tissue.eps();
        let mut report = CirculationReport::default();

        // --- 1. Read Pre-Tick State ---
        let mut areas: BTreeMap<CellId, f64> = BTreeMap::new();
        let mut quantities: BTreeMap<CellId, f64> = BTreeMap::new();
        for cell in tissue.cells() {
            let area = cell.area(tissue.vertices())?;
            areas.insert(cell.id(), area);
            quantities.insert(cell.id(), cell.concentration() * area);
        }

        // --- 2. Pair Fluxes (positive: first cell to second) ---
        let mut fluxes: Vec<(CellId, CellId, f64)> = Vec::new();
        for cell in tissue.cells() {
            let a = cell.id();
            for (&b, edge) in cell.neighbors().range(a + 1..) {
                let other = tissue.cell(b).ok_or(MeshError::UnknownCell(b))?;
                if edge.length <= eps || areas[&a] <= eps || areas[&b] <= eps {
                    continue;
                }
                let flux = params.diffusion_coefficient
                    * edge.length
                    * (cell.concentration() - other.concentration())
                    * params.dt;
                if flux != 0.0 {
                    fluxes.push((a, b, flux));
                }
            }
        }

        let diffusive = fluxes.len();
        if params.pin_rate > 0.0 {
            let root_midpoint_x = tissue.root_midpoint_x();
            for cell in tissue.cells() {
                let a = cell.id();
                if areas[&a] <= eps {
                    continue;
                }
                for (b, amount) in polar_efflux(cell, quantities[&a], tissue.vertices(), root_midpoint_x, params, eps)? {
                    fluxes.push((a, b, amount));
                }
            }
        }

        // --- 3. Limit Donor Outflow ---
        let mut outflow: BTreeMap<CellId, f64> = BTreeMap::new();
        for &(a, b, flux) in &fluxes {
            let donor = if flux > 0.0 { a } else { b };
            *outflow.entry(donor).or_insert(0.0) += flux.abs();
        }
        let scale: BTreeMap<CellId, f64> = outflow
            .iter()
            .map(|(&donor, &out)| {
                let held = quantities[&donor].max(0.0);
                (donor, if out > held { held / out } else { 1.0 })
            })
            .collect();
        report.limited_donors = scale.values().filter(|&&s| s < 1.0).count();

        // --- 4. Accumulate Deltas ---
        let mut deltas: BTreeMap<CellId, f64> = BTreeMap::new();
        for (i, (a, b, flux)) in fluxes.into_iter().enumerate() {
            let donor = if flux > 0.0 { a } else { b };
            let moved = flux * scale[&donor];
            *deltas.entry(a).or_insert(0.0) -= moved;
            *deltas.entry(b).or_insert(0.0) += moved;
            report.transferred += moved.abs();
            if i < diffusive {
                report.pairs += 1;
            } else {
                report.polar += moved.abs();
            }
        }

        // --- 5. Apply Simultaneously ---
        let ids: Vec<CellId> = areas.keys().copied().collect();
        for id in ids {
            let area = areas[&id];
            if area <= eps {
                continue;
            }
            let cell = tissue.cell_mut(id).ok_or(MeshError::UnknownCell(id))?;
            let mut quantity = quantities[&id] + deltas.get(&id).copied().unwrap_or(0.0);
            if params.sources_enabled {
                let produced = cell.source().rate(cell.concentration()) * area * params.dt;
                let before = quantity;
                quantity = (quantity + produced).max(0.0);
                report.produced += quantity - before;
            }
            let concentration = quantity / area;
            let tolerance = 1e-9 * (1.0 + cell.concentration().abs());
            if concentration < -tolerance {
                return Err(MeshError::NegativeConcentration { cell: id, value: concentration });
            }
            cell.set_concentration(concentration.max(0.0));
        }

        trace!("Circulator: {:?}", report);
        Ok(report)
    }
}

/// PIN-driven export of `cell` to each neighbor, from the pre-tick quantity.
///
/// The quantity facing a membrane is `quantity * memfrac`; a
/// `pin_rate * weight` share of it leaves per hour, split among the neighbors
/// on that membrane by contact length. Membranes with no neighbor export
/// nothing.
pub fn polar_efflux(
    cell: &Cell,
    quantity: f64,
    arena: &VertexArena,
    root_midpoint_x: f64,
    params: &SimParams,
    eps: f64,
) -> Result<Vec<(CellId, f64)>, MeshError> {
    let mut contact: BTreeMap<Direction, f64> = BTreeMap::new();
    for edge in cell.neighbors().values().filter(|e| e.length > eps) {
        *contact.entry(edge.direction).or_insert(0.0) += edge.length;
    }
    let mut out = Vec::new();
    for (&n, edge) in cell.neighbors() {
        let weight = params.pin_weights.weight(edge.direction);
        if edge.length <= eps || weight <= 0.0 {
            continue;
        }
        let memfrac = cell.perimeter().memfrac(edge.direction, arena, root_midpoint_x)?;
        let share = edge.length / contact[&edge.direction];
        let amount = params.pin_rate * weight * quantity.max(0.0) * memfrac * share * params.dt;
        if amount > 0.0 {
            out.push((n, amount));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshPayload;
    use crate::test_support::{params, seed};
    use approx::assert_relative_eq;
    use tissue_common::PinWeights;

    /// Two 10x10 cells side by side.
    fn pair(c0: f64, c1: f64) -> Tissue {
        let payload = MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (0.0, 10.0), (10.0, 10.0), (20.0, 10.0)],
            cells: vec![seed(vec![0, 1, 4, 3], c0), seed(vec![1, 2, 5, 4], c1)],
        };
        Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap()
    }

    #[test]
    fn test_flux_follows_gradient() {
        let mut tissue = pair(2.0, 1.0);
        let mut params = params();
        params.diffusion_coefficient = 0.1;
        let report = Circulator::new().step(&mut tissue, &params).unwrap();
        // flux = 0.1 * 10 * (2 - 1) * 1 = 1 quantity, over an area of 100
        assert_eq!(report.pairs, 1);
        assert_relative_eq!(report.transferred, 1.0);
        assert_relative_eq!(tissue.cell(0).unwrap().concentration(), 1.99);
        assert_relative_eq!(tissue.cell(1).unwrap().concentration(), 1.01);
    }

    #[test]
    fn test_quantity_is_conserved() {
        let mut tissue = pair(5.0, 0.0);
        let params = params();
        let before = tissue.total_quantity().unwrap();
        let circulator = Circulator::new();
        for _ in 0..20 {
            circulator.step(&mut tissue, &params).unwrap();
        }
        assert_relative_eq!(tissue.total_quantity().unwrap(), before, max_relative = 1e-12);
    }

    #[test]
    fn test_outflow_is_limited_to_holdings() {
        let mut tissue = pair(1.0, 0.0);
        let mut params = params();
        params.diffusion_coefficient = 100.0;
        let report = Circulator::new().step(&mut tissue, &params).unwrap();
        assert_eq!(report.limited_donors, 1);
        assert_relative_eq!(tissue.cell(0).unwrap().concentration(), 0.0);
        assert_relative_eq!(tissue.cell(1).unwrap().concentration(), 1.0);
    }

    #[test]
    fn test_equal_concentrations_exchange_nothing() {
        let mut tissue = pair(3.0, 3.0);
        let report = Circulator::new().step(&mut tissue, &params()).unwrap();
        assert_eq!(report.pairs, 0);
        assert_eq!(tissue.cell(0).unwrap().concentration(), 3.0);
    }

    /// Two 10x10 cells stacked along the growth axis; cell 1 is on top.
    fn stack(c0: f64, c1: f64) -> Tissue {
        let payload = MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0), (0.0, 20.0), (10.0, 20.0)],
            cells: vec![seed(vec![0, 1, 3, 2], c0), seed(vec![2, 3, 5, 4], c1)],
        };
        Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap()
    }

    fn pin_params(apical: f64, basal: f64, lateral: f64, medial: f64) -> SimParams {
        let mut params = params();
        params.pin_rate = 0.1;
        params.pin_weights = PinWeights { apical, basal, lateral, medial }.normalized();
        params
    }

    #[test]
    fn test_basal_pin_moves_quantity_rootward() {
        let mut tissue = stack(1.0, 1.0);
        let report = Circulator::new().step(&mut tissue, &pin_params(0.0, 1.0, 0.0, 0.0)).unwrap();
        // 0.1 * 1 * 100 * (10 / 40) = 2.5 leaves the top cell; the bottom
        // cell's basal membrane has no neighbor.
        assert_eq!(report.pairs, 0);
        assert_relative_eq!(report.polar, 2.5);
        assert_relative_eq!(report.transferred, 2.5);
        assert_relative_eq!(tissue.cell(1).unwrap().concentration(), 0.975);
        assert_relative_eq!(tissue.cell(0).unwrap().concentration(), 1.025);

        let mut tissue = stack(1.0, 1.0);
        Circulator::new().step(&mut tissue, &pin_params(1.0, 0.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(tissue.cell(0).unwrap().concentration(), 0.975);
        assert_relative_eq!(tissue.cell(1).unwrap().concentration(), 1.025);
    }

    #[test]
    fn test_polar_efflux_splits_by_contact_length() {
        // A tall cell left of the midline faces two stacked cells on its
        // medial side; their medial sides face it back.
        let payload = MeshPayload {
            vertices: vec![
                (0.0, 0.0), (10.0, 0.0), (20.0, 0.0),
                (10.0, 10.0), (20.0, 10.0),
                (0.0, 20.0), (10.0, 20.0), (20.0, 20.0),
            ],
            cells: vec![
                seed(vec![0, 1, 6, 5], 1.0),
                seed(vec![1, 2, 4, 3], 1.0),
                seed(vec![3, 4, 7, 6], 1.0),
            ],
        };
        let mut tissue = Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap();
        let mut params = pin_params(0.0, 0.0, 0.0, 1.0);
        params.pin_rate = 0.3;

        let tall = tissue.cell(0).unwrap();
        let out = polar_efflux(tall, 200.0, tissue.vertices(), tissue.root_midpoint_x(), &params, 1e-9).unwrap();
        // 0.3 * 200 * (20 / 60) = 20, halved between the two contacts.
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[0].1, 10.0);
        assert_relative_eq!(out[1].1, 10.0);

        let before = tissue.total_quantity().unwrap();
        Circulator::new().step(&mut tissue, &params).unwrap();
        // Each small cell sends 0.3 * 100 * (10 / 40) = 7.5 back.
        assert_relative_eq!(tissue.cell(0).unwrap().concentration(), 0.975);
        assert_relative_eq!(tissue.cell(1).unwrap().concentration(), 1.025);
        assert_relative_eq!(tissue.cell(2).unwrap().concentration(), 1.025);
        assert_relative_eq!(tissue.total_quantity().unwrap(), before, max_relative = 1e-12);
    }

    #[test]
    fn test_source_term_adds_quantity() {
        let payload = MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
            cells: vec![crate::mesh::CellSeed {
                source: crate::mesh::SourceTerm { k_s: 1.0, k_d: 0.5, w: 2.0 },
                ..seed(vec![0, 1, 2, 3], 1.0)
            }],
        };
        let mut tissue = Tissue::from_payload(&payload, &[], Vec::new(), 1e-9).unwrap();
        let mut params = params();
        params.sources_enabled = true;
        let report = Circulator::new().step(&mut tissue, &params).unwrap();
        // (1 * 2 - 0.5 * 1) * 100 * 1 = 150
        assert_relative_eq!(report.produced, 150.0);
        assert_relative_eq!(tissue.cell(0).unwrap().concentration(), 2.5);
    }
}
