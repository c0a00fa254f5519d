//! Output collaborators: per-cell CSV rows and a snapshot archive.
//!
//! Sinks own their files; the simulation only hands them snapshots.

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tissue_common::{LineageRecord, Snapshot};

/// Result of a sink operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Written,
    /// The sink does not implement this capability.
    NotYetAvailable(&'static str),
}

/// Receives snapshots after recorded ticks.
pub trait SnapshotSink {
    fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<OutputStatus>;

    fn write_lineage(&mut self, _records: &[LineageRecord]) -> Result<OutputStatus> {
        Ok(OutputStatus::NotYetAvailable("lineage"))
    }

    /// Flushes or writes everything buffered. Called once at the end of a run.
    fn finish(&mut self) -> Result<OutputStatus>;
}

const CELL_COLUMNS: [&str; 16] = [
    "tick",
    "cell",
    "concentration",
    "area",
    "apical_memlen",
    "basal_memlen",
    "left_memlen",
    "right_memlen",
    "dev_zone",
    "cell_type",
    "division_count",
    "root_cap",
    "parent",
    "vertices",
    "neighbors",
    "time_h",
];

/// One CSV row per live cell per recorded tick.
pub struct CsvCellWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl CsvCellWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| anyhow::anyhow!("Error creating CSV file '{}': {}", path.display(), e))?;
        Self::from_writer(BufWriter::new(file))
    }
}

impl<W: Write> CsvCellWriter<W> {
    /// Wraps `inner` and writes the header row.
    pub fn from_writer(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(CELL_COLUMNS)?;
        Ok(CsvCellWriter { writer, rows: 0 })
    }

    /// Data rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))
    }
}

impl<W: Write> SnapshotSink for CsvCellWriter<W> {
    fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<OutputStatus> {
        for cell in &snapshot.cells {
            let vertices = serde_json::to_string(&cell.vertex_ids)?;
            let neighbors = serde_json::to_string(&cell.neighbors.iter().map(|&(n, _)| n).collect::<Vec<_>>())?;
            self.writer.write_record([
                snapshot.tick.to_string(),
                cell.id.to_string(),
                format!("{:.6}", cell.concentration),
                format!("{:.4}", cell.area),
                format!("{:.4}", cell.apical_memlen),
                format!("{:.4}", cell.basal_memlen),
                format!("{:.4}", cell.left_memlen),
                format!("{:.4}", cell.right_memlen),
                cell.dev_zone.to_string(),
                cell.cell_type.to_string(),
                cell.division_count.to_string(),
                cell.root_cap.to_string(),
                cell.parent.map(|p| p.to_string()).unwrap_or_default(),
                vertices,
                neighbors,
                format!("{:.3}", snapshot.time),
            ])?;
            self.rows += 1;
        }
        Ok(OutputStatus::Written)
    }

    fn finish(&mut self) -> Result<OutputStatus> {
        self.writer.flush()?;
        Ok(OutputStatus::Written)
    }
}

/// Encoding of the snapshot archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Json,
    Bincode,
    MessagePack,
}

impl ArchiveFormat {
    /// Parses `output.format`; unknown names fall back to JSON.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.unwrap_or("json") {
            "json" => ArchiveFormat::Json,
            "bincode" => ArchiveFormat::Bincode,
            "messagepack" => ArchiveFormat::MessagePack,
            other => {
                warn!("Unknown output format: {}. Using JSON instead.", other);
                ArchiveFormat::Json
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Json => "json",
            ArchiveFormat::Bincode => "bin",
            ArchiveFormat::MessagePack => "msgpack",
        }
    }
}

/// Borrowed form written by `SnapshotArchive::encode`. Fields are always
/// present: the binary formats are positional.
#[derive(Serialize)]
struct ArchiveContents<'a> {
    snapshots: &'a [Snapshot],
    lineage: Option<&'a [LineageRecord]>,
}

/// An archive read back from disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArchiveData {
    pub snapshots: Vec<Snapshot>,
    pub lineage: Option<Vec<LineageRecord>>,
}

/// Buffers every recorded snapshot and writes them as one file on `finish`.
pub struct SnapshotArchive {
    path: PathBuf,
    format: ArchiveFormat,
    snapshots: Vec<Snapshot>,
    lineage: Option<Vec<LineageRecord>>,
}

impl SnapshotArchive {
    /// Archive written to `{base_filename}_snapshots.{ext}`.
    pub fn new(base_filename: &str, format: ArchiveFormat) -> Self {
        SnapshotArchive {
            path: PathBuf::from(format!("{}_snapshots.{}", base_filename, format.extension())),
            format,
            snapshots: Vec::new(),
            lineage: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Serializes the buffered snapshots (and lineage, if given) into `writer`.
    pub fn encode<W: Write>(&self, mut writer: W) -> Result<()> {
        let contents = ArchiveContents {
            snapshots: &self.snapshots,
            lineage: self.lineage.as_deref(),
        };
        match self.format {
            ArchiveFormat::Json => serde_json::to_writer(&mut writer, &contents)?,
            ArchiveFormat::Bincode => bincode::serialize_into(&mut writer, &contents)?,
            ArchiveFormat::MessagePack => rmp_serde::encode::write(&mut writer, &contents)?,
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads an archive written by `encode` in `format`.
    pub fn decode<R: Read>(format: ArchiveFormat, mut reader: R) -> Result<ArchiveData> {
        Ok(match format {
            ArchiveFormat::Json => serde_json::from_reader(&mut reader)?,
            ArchiveFormat::Bincode => bincode::deserialize_from(&mut reader)?,
            ArchiveFormat::MessagePack => rmp_serde::from_read(&mut reader)?,
        })
    }

    /// Opens and decodes the archive at `path`.
    pub fn load<P: AsRef<Path>>(path: P, format: ArchiveFormat) -> Result<ArchiveData> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| anyhow::anyhow!("Error opening snapshot archive '{}': {}", path.display(), e))?;
        Self::decode(format, BufReader::new(file))
    }
}

impl SnapshotSink for SnapshotArchive {
    fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<OutputStatus> {
        self.snapshots.push(snapshot.clone());
        Ok(OutputStatus::Written)
    }

    fn write_lineage(&mut self, records: &[LineageRecord]) -> Result<OutputStatus> {
        self.lineage = Some(records.to_vec());
        Ok(OutputStatus::Written)
    }

    fn finish(&mut self) -> Result<OutputStatus> {
        let file = match File::create(&self.path) {
            Ok(file) => file,
            Err(e) => {
                error!("Error creating snapshot file '{}': {}", self.path.display(), e);
                anyhow::bail!("Failed to create snapshot archive.");
            }
        };
        self.encode(BufWriter::new(file))?;
        info!(
            "All {} snapshots saved to {} ({:?} format)",
            self.snapshots.len(),
            self.path.display(),
            self.format
        );
        Ok(OutputStatus::Written)
    }
}
