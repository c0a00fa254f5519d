//! Builds the initial mesh payload: a generated grid, a pair of CSV files or a
//! JSON payload file, as selected by `[mesh] source`.

use crate::mesh::{CellSeed, MeshPayload, SourceTerm, VertexId};
use anyhow::{Context, Result};
use log::{debug, info};
use rand::distr::Uniform;
use rand::prelude::*;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tissue_common::{MeshConfig, MeshSource, SimulationConfig};

/// Loads the payload named by the configuration. Relative file names are
/// resolved against `base_dir`.
pub fn load_payload(config: &SimulationConfig, base_dir: &Path) -> Result<MeshPayload> {
    let mesh = &config.mesh;
    let payload = match mesh.source {
        MeshSource::Grid => grid_payload(mesh)?,
        MeshSource::Files => {
            let (Some(vertex_file), Some(cell_file)) = (&mesh.vertex_file, &mesh.cell_file) else {
                anyhow::bail!("mesh.source = \"files\" needs both vertex_file and cell_file.");
            };
            let vertex_path = base_dir.join(vertex_file);
            let cell_path = base_dir.join(cell_file);
            let vertices = read_vertex_csv(open(&vertex_path)?)
                .with_context(|| format!("Failed to read vertex file '{}'", vertex_path.display()))?;
            let cells = read_cell_csv(open(&cell_path)?)
                .with_context(|| format!("Failed to read cell file '{}'", cell_path.display()))?;
            MeshPayload { vertices, cells }
        }
        MeshSource::Json => {
            let Some(payload_file) = &mesh.payload_file else {
                anyhow::bail!("mesh.source = \"json\" needs payload_file.");
            };
            let path = base_dir.join(payload_file);
            read_payload_json(open(&path)?)
                .with_context(|| format!("Failed to read payload file '{}'", path.display()))?
        }
    };
    info!(
        "Loaded mesh payload: {} vertices, {} cells.",
        payload.vertices.len(),
        payload.cells.len()
    );
    Ok(payload)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| anyhow::anyhow!("Failed to open '{}': {}", path.display(), e))?;
    Ok(BufReader::new(file))
}

/// A rectangular grid of `rows` x `columns` cells. Row 0 is the root tip;
/// cell ids run row-major from the bottom-left corner.
pub fn rect_grid(
    rows: u32,
    columns: u32,
    cell_width: f64,
    cell_height: f64,
    origin: (f64, f64),
    concentration: f64,
) -> MeshPayload {
    let stride = columns + 1;
    let mut vertices = Vec::with_capacity(((rows + 1) * stride) as usize);
    for r in 0..=rows {
        for c in 0..=columns {
            vertices.push((origin.0 + c as f64 * cell_width, origin.1 + r as f64 * cell_height));
        }
    }
    let at = |r: u32, c: u32| -> VertexId { r * stride + c };

    let mut cells = Vec::with_capacity((rows * columns) as usize);
    for r in 0..rows {
        for c in 0..columns {
            cells.push(CellSeed {
                id: None,
                vertices: vec![at(r, c), at(r, c + 1), at(r + 1, c + 1), at(r + 1, c)],
                concentration,
                growing: true,
                root_cap: false,
                source: SourceTerm::default(),
            });
        }
    }
    MeshPayload { vertices, cells }
}

/// The grid described by `[mesh]`, with seeded uniform jitter on the initial
/// concentration.
pub fn grid_payload(mesh: &MeshConfig) -> Result<MeshPayload> {
    let mut payload = rect_grid(
        mesh.rows,
        mesh.columns,
        mesh.cell_width_um,
        mesh.cell_height_um,
        (mesh.origin_x_um, mesh.origin_y_um),
        mesh.initial_concentration,
    );
    if mesh.concentration_jitter > 0.0 {
        let mut rng = StdRng::seed_from_u64(mesh.seed);
        let jitter = Uniform::new_inclusive(-mesh.concentration_jitter, mesh.concentration_jitter)?;
        for cell in &mut payload.cells {
            cell.concentration = (cell.concentration + rng.sample(jitter)).max(0.0);
        }
    }
    debug!(
        "Generated {}x{} grid of {}x{} um cells.",
        mesh.rows, mesh.columns, mesh.cell_width_um, mesh.cell_height_um
    );
    Ok(payload)
}

#[derive(Debug, Deserialize)]
struct VertexRow {
    x: f64,
    y: f64,
}

/// Reads vertex coordinates from CSV with `x` and `y` columns. The row index
/// is the vertex id.
pub fn read_vertex_csv<R: Read>(reader: R) -> Result<Vec<(f64, f64)>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut vertices = Vec::new();
    for (row, record) in csv_reader.deserialize::<VertexRow>().enumerate() {
        let record = record.with_context(|| format!("Bad vertex row {}", row))?;
        vertices.push((record.x, record.y));
    }
    Ok(vertices)
}

#[derive(Debug, Deserialize)]
struct CellRow {
    #[serde(default)]
    id: Option<u32>,
    /// Perimeter as a list literal, e.g. `"[0, 1, 5, 4]"`.
    vertices: String,
    #[serde(default, alias = "auxin")]
    concentration: f64,
    #[serde(default)]
    growing: Option<String>,
    #[serde(default)]
    root_cap: Option<String>,
    #[serde(default)]
    k_s: f64,
    #[serde(default)]
    k_d: f64,
    #[serde(default, alias = "auxin_w")]
    w: f64,
}

/// Reads cell seeds from CSV. Only `vertices` is required; `concentration`
/// (or `auxin`), `growing`, `root_cap`, `k_s`, `k_d` and `w` are optional.
pub fn read_cell_csv<R: Read>(reader: R) -> Result<Vec<CellSeed>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut cells = Vec::new();
    for (row, record) in csv_reader.deserialize::<CellRow>().enumerate() {
        let record = record.with_context(|| format!("Bad cell row {}", row))?;
        let vertices: Vec<VertexId> = serde_json::from_str(&record.vertices)
            .with_context(|| format!("Bad vertex list '{}' in cell row {}", record.vertices, row))?;
        cells.push(CellSeed {
            id: record.id,
            vertices,
            concentration: record.concentration,
            growing: record.growing.as_deref().map_or(true, parse_flag),
            root_cap: record.root_cap.as_deref().is_some_and(parse_flag),
            source: SourceTerm { k_s: record.k_s, k_d: record.k_d, w: record.w },
        });
    }
    Ok(cells)
}

/// Reads a whole payload serialized as JSON.
pub fn read_payload_json<R: Read>(reader: R) -> Result<MeshPayload> {
    let payload = serde_json::from_reader(reader)?;
    Ok(payload)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "true" | "True" | "TRUE" | "1" | "yes")
}
