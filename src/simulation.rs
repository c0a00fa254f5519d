use crate::circulator::{CirculationReport, Circulator};
use crate::divider::{DivisionReport, Divider};
use crate::mesh::{ContactRefresh, MeshPayload, Tissue};
use crate::mover::{MoveReport, Mover};
use anyhow::Result;
use log::{debug, info, trace};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tissue_common::{CellRecord, LineageRecord, SimParams, SimulationConfig, Snapshot, VertexRecord};

/// What happened during one tick, phase by phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// The tick that was run (0 for the first).
    pub tick: u32,
    pub moves: MoveReport,
    pub contacts: ContactRefresh,
    pub circulation: CirculationReport,
    pub divisions: DivisionReport,
}

/// Owns the tissue for the duration of a run and drives the per-tick pipeline.
pub struct Simulation {
    /// Runtime parameters derived from the configuration.
    params: SimParams,
    /// The mesh: vertices, live cells and lineage.
    tissue: Tissue,
    mover: Mover,
    circulator: Circulator,
    divider: Divider,
    /// Number of ticks completed so far.
    current_tick: u32,
}

impl Simulation {
    /// Creates a simulation from a loaded configuration and an initial mesh.
    pub fn new(config: &SimulationConfig, payload: &MeshPayload) -> Result<Self> {
        Self::from_params(config.get_sim_params(), payload)
    }

    /// Creates a simulation from already derived parameters.
    pub fn from_params(params: SimParams, payload: &MeshPayload) -> Result<Self> {
        let tissue = Tissue::from_payload(
            payload,
            &params.root_cap_ids,
            params.contact_overrides.clone(),
            params.geometry_eps,
        )?;
        tissue.check_invariants()?;

        let root_caps = tissue.cells().filter(|c| c.is_root_cap()).count();
        if root_caps > 0 {
            info!("{} root-cap cells in the initial mesh.", root_caps);
        }
        let mover = Mover::new(&tissue);
        debug!("{} anchored vertices on the shoot-side row.", mover.anchors(&tissue).len());

        Ok(Simulation {
            params,
            tissue,
            mover,
            circulator: Circulator::new(),
            divider: Divider::new(),
            current_tick: 0,
        })
    }

    /// Advances the simulation by one tick: move, refresh contacts, circulate, divide.
    pub fn step(&mut self) -> Result<TickReport> {
        self.params.tick = self.current_tick;
        let mut report = TickReport { tick: self.current_tick, ..TickReport::default() };

        // --- 1. Move Vertices (Parallel Forces, Field Commit) ---
        report.moves = self.mover.step(&mut self.tissue, &self.params)?;

        // --- 2. Refresh Contacts After Movement ---
        if report.moves.moved > 0 {
            report.contacts = self.tissue.refresh_contacts()?;
        }

        // --- 3. Circulate (Simultaneous Update) ---
        report.circulation = self.circulator.step(&mut self.tissue, &self.params)?;

        // --- 4. Divide (Candidates Fixed, Ascending Id) ---
        report.divisions = self.divider.step(&mut self.tissue, &self.params)?;
        for &(parent, children) in &report.divisions.divided {
            debug!("Tick {}: cell {} -> {:?}", self.current_tick, parent, children);
        }
        if !report.divisions.degenerate.is_empty() {
            debug!(
                "Tick {}: division deferred for {:?} (no valid split)",
                self.current_tick, report.divisions.degenerate
            );
        }

        // --- 5. Verify Topology ---
        self.tissue.check_invariants()?;

        trace!("Tick {} report: {:?}", self.current_tick, report);
        self.current_tick += 1;
        Ok(report)
    }

    /// Runs up to `ticks` ticks, handing the simulation and each tick's
    /// report to `on_tick`. `stop` is checked between ticks only, so it may be
    /// raised from inside `on_tick`. Returns the number of ticks run.
    pub fn run_ticks<F>(&mut self, ticks: u32, stop: &AtomicBool, mut on_tick: F) -> Result<u32>
    where
        F: FnMut(&Simulation, &TickReport) -> Result<()>,
    {
        let mut completed = 0;
        for _ in 0..ticks {
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested after {} ticks.", completed);
                break;
            }
            let report = self.step()?;
            completed += 1;
            on_tick(self, &report)?;
        }
        Ok(completed)
    }

    /// True when the tick just completed falls on the record interval or ends the run.
    pub fn should_record(&self) -> bool {
        self.current_tick % self.params.record_interval_ticks == 0 || self.current_tick == self.params.total_ticks
    }

    /// Read-only view of the current state for the output collaborators.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let tissue = &self.tissue;
        let arena = tissue.vertices();
        let params = &self.params;

        let cells: Vec<CellRecord> = tissue
            .cells()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|cell| {
                let perimeter = cell.perimeter();
                Ok(CellRecord {
                    id: cell.id(),
                    concentration: cell.concentration(),
                    vertex_ids: cell.vertex_ids().to_vec(),
                    division_count: cell.division_count(),
                    area: cell.area(arena)?,
                    apical_memlen: perimeter.apical_memlen(arena)?,
                    basal_memlen: perimeter.basal_memlen(arena)?,
                    left_memlen: perimeter.left_memlen(arena)?,
                    right_memlen: perimeter.right_memlen(arena)?,
                    dev_zone: tissue.dev_zone(cell, &params.zone_bounds)?,
                    cell_type: tissue.cell_type(cell, &params.type_bounds)?,
                    root_cap: cell.is_root_cap(),
                    parent: cell.parent(),
                    neighbors: cell.neighbors().iter().map(|(&n, e)| (n, e.length)).collect(),
                })
            })
            .collect::<Result<_, crate::error::MeshError>>()?;

        let vertices = arena
            .iter()
            .map(|v| VertexRecord { id: v.v_id(), x: v.x(), y: v.y() })
            .collect();

        Ok(Snapshot {
            tick: self.current_tick,
            time: self.time(),
            division_count: tissue.division_count(),
            root_tip_y: tissue.root_tip_y(),
            root_midpoint_x: tissue.root_midpoint_x(),
            total_quantity: tissue.total_quantity()?,
            cells,
            vertices,
        })
    }

    /// Structural check of the whole mesh.
    pub fn check_invariants(&self) -> Result<()> {
        self.tissue.check_invariants()?;
        Ok(())
    }

    pub fn lineage_records(&self) -> Vec<LineageRecord> {
        self.tissue.lineage_records().cloned().collect()
    }

    pub fn tissue(&self) -> &Tissue {
        &self.tissue
    }

    /// Returns a reference to the simulation parameters.
    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    /// Simulated time in hours.
    pub fn time(&self) -> f64 {
        self.current_tick as f64 * self.params.dt
    }

    pub fn cell_count(&self) -> usize {
        self.tissue.cell_count()
    }

    pub fn division_count(&self) -> u32 {
        self.tissue.division_count()
    }

    pub fn root_tip_y(&self) -> f64 {
        self.tissue.root_tip_y()
    }

    pub fn root_midpoint_x(&self) -> f64 {
        self.tissue.root_midpoint_x()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeshError;
    use crate::test_support::{grid, params, seed};
    use approx::assert_relative_eq;
    use tissue_common::DivisionCriterion;

    fn still_params() -> SimParams {
        let mut params = params();
        params.mechanics_enabled = false;
        params.total_ticks = 4;
        params
    }

    #[test]
    fn test_step_advances_tick_and_time() {
        let mut sim = Simulation::from_params(still_params(), &grid(2, 2, 10.0, 10.0, 1.0)).unwrap();
        let report = sim.step().unwrap();
        assert_eq!(report.tick, 0);
        assert_eq!(sim.current_tick(), 1);
        assert_relative_eq!(sim.time(), 1.0);
        assert_eq!(sim.cell_count(), 4);
    }

    #[test]
    fn test_snapshot_lists_live_cells_and_vertices() {
        let sim = Simulation::from_params(still_params(), &grid(2, 2, 10.0, 10.0, 1.0)).unwrap();
        let snapshot = sim.snapshot().unwrap();
        assert_eq!(snapshot.tick, 0);
        assert_eq!(snapshot.cells.len(), 4);
        assert_eq!(snapshot.vertices.len(), 9);
        assert_relative_eq!(snapshot.total_quantity, 400.0);
        assert_relative_eq!(snapshot.root_midpoint_x, 10.0);
        let first = &snapshot.cells[0];
        assert_eq!(first.id, 0);
        assert_relative_eq!(first.area, 100.0);
        assert_relative_eq!(first.apical_memlen, 10.0);
        // Right and top neighbors.
        assert_eq!(first.neighbors.iter().map(|&(n, _)| n).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_run_ticks_records_on_interval() {
        let mut params = still_params();
        params.record_interval_ticks = 2;
        let mut sim = Simulation::from_params(params, &grid(1, 2, 10.0, 10.0, 1.0)).unwrap();
        let stop = AtomicBool::new(false);
        let mut recorded = Vec::new();
        let ran = sim
            .run_ticks(4, &stop, |sim, report| {
                assert_eq!(report.tick + 1, sim.current_tick());
                if sim.should_record() {
                    recorded.push(sim.snapshot()?.tick);
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(ran, 4);
        assert_eq!(recorded, vec![2, 4]);
    }

    #[test]
    fn test_stop_flag_is_checked_between_ticks() {
        let mut sim = Simulation::from_params(still_params(), &grid(1, 2, 10.0, 10.0, 1.0)).unwrap();
        let stop = AtomicBool::new(true);
        let ran = sim.run_ticks(4, &stop, |_, _| Ok(())).unwrap();
        assert_eq!(ran, 0);
        assert_eq!(sim.current_tick(), 0);
    }

    #[test]
    fn test_stop_raised_during_a_tick_ends_the_run() {
        let mut sim = Simulation::from_params(still_params(), &grid(1, 2, 10.0, 10.0, 1.0)).unwrap();
        let stop = AtomicBool::new(false);
        let ran = sim
            .run_ticks(10, &stop, |sim, _| {
                if sim.current_tick() == 3 {
                    stop.store(true, Ordering::Relaxed);
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(ran, 3);
        assert_eq!(sim.current_tick(), 3);
    }

    #[test]
    fn test_division_follows_circulation() {
        // The left cell sits just under the threshold and only crosses it by
        // what this tick's circulation brings in. The narrow right donor holds
        // more concentration but never enough quantity.
        let mut params = still_params();
        params.division_criterion = DivisionCriterion::Quantity(500.0);
        params.diffusion_coefficient = 0.5;
        let payload = crate::mesh::MeshPayload {
            vertices: vec![(0.0, 0.0), (10.0, 0.0), (15.0, 0.0), (0.0, 10.0), (10.0, 10.0), (15.0, 10.0)],
            cells: vec![seed(vec![0, 1, 4, 3], 4.9), seed(vec![1, 2, 5, 4], 9.0)],
        };
        let mut sim = Simulation::from_params(params, &payload).unwrap();
        let arena = sim.tissue().vertices();
        assert_relative_eq!(sim.tissue().cell(0).unwrap().quantity(arena).unwrap(), 490.0, epsilon = 1e-9);
        assert_relative_eq!(sim.tissue().cell(1).unwrap().quantity(arena).unwrap(), 450.0, epsilon = 1e-9);
        let divider = Divider::new();
        assert!(divider.candidates(sim.tissue(), sim.params()).unwrap().is_empty());

        let report = sim.step().unwrap();
        // 0.5 * 10 * (9.0 - 4.9) * 1 = 20.5 moves left.
        assert_relative_eq!(report.circulation.transferred, 20.5, epsilon = 1e-9);
        assert_eq!(report.divisions.divided.len(), 1);
        assert_eq!(report.divisions.divided[0].0, 0);
        assert!(sim.tissue().cell(1).is_some());
        assert_eq!(sim.division_count(), 1);
        assert_eq!(sim.lineage_records().len(), 1);
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let payload = crate::mesh::MeshPayload {
            vertices: vec![(0.0, 0.0), (1.0, 0.0)],
            cells: vec![seed(vec![0, 1], 1.0)],
        };
        let err = Simulation::from_params(still_params(), &payload).err().unwrap();
        assert_eq!(
            err.downcast_ref::<MeshError>(),
            Some(&MeshError::TooFewVertices { cell: Some(0), count: 2 })
        );
    }
}
