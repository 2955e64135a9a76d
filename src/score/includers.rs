//! The pre-aggregated includer graph (`.scor.incl`).
//!
//! The exporter already walked the include dependency graph and aggregated,
//! per included header, everything that pulls it in. This decoder only
//! deserializes that adjacency; answering "who includes this header, and how
//! expensively" is then a single indexed lookup.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;

use crate::score::cursor::ByteCursor;
use crate::score::decode::read_shared;
use crate::score::Session;

/// One header-to-header includer edge, with the aggregate cost the includer
/// contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncluderValue {
    /// Index of the including value in the Include-category collection.
    pub value_index: u32,
    /// Total time this includer spent on the includee, in microseconds.
    pub accumulated: u64,
    /// Total self time.
    pub self_accumulated: u64,
    /// Cheapest single inclusion.
    pub min: u32,
    /// Most expensive single inclusion.
    pub max: u32,
    /// Number of inclusions.
    pub count: u32,
    /// Unit exhibiting `max`, if the file recorded a valid one.
    pub max_unit: Option<u32>,
}

/// One unit-to-header includer edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncluderUnit {
    /// Index of the including unit.
    pub unit_index: u32,
    /// Time that unit spent directly including the includee.
    pub duration: u32,
}

/// All recorded includers of one Include-category value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludersEntry {
    /// Other headers that include this one.
    pub values: Vec<IncluderValue>,
    /// Units that include this one directly.
    pub units: Vec<IncluderUnit>,
}

/// The includee → includers adjacency, indexed like the Include-category
/// value collection.
#[derive(Debug, Clone, Default)]
pub struct IncludersGraph {
    entries: Vec<IncludersEntry>,
}

impl IncludersGraph {
    /// Number of includee entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the graph holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The includers of the Include-category value at `index`.
    pub fn includers_of(&self, index: u32) -> Option<&IncludersEntry> {
        self.entries.get(index as usize)
    }
}

/// Path of the includers file for a given score path.
pub fn includers_path(score: &Path) -> PathBuf {
    PathBuf::from(format!("{}.incl", score.display()))
}

/// Decodes the includer graph at `path`.
///
/// A missing file is `Ok(None)`: the exporter only writes includer data
/// when asked to, and every consumer treats "no graph" as "no edges". The
/// file is written alongside the main score, so the version must match the
/// loaded session's.
pub fn load(path: &Path, session: &Session, unit_count: usize) -> io::Result<Option<IncludersGraph>> {
    let bytes = match read_shared(path, 4, Duration::from_millis(100))? {
        Some(bytes) => bytes,
        None => {
            info!("no includers data at {}", path.display());
            return Ok(None);
        }
    };

    let mut cursor = ByteCursor::new(&bytes);
    let version = cursor.read_u32()?;
    if version != session.version {
        return invalid_data_error!(
            "includers version {} does not match score version {}",
            version,
            session.version
        );
    }

    let entry_count = cursor.read_u32()? as usize;
    let mut entries = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        let value_count = cursor.read_u32()? as usize;
        let mut values = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            let value_index = cursor.read_u32()?;
            let accumulated = cursor.read_u64()?;
            let self_accumulated = cursor.read_u64()?;
            let min = cursor.read_u32()?;
            let max = cursor.read_u32()?;
            let count = cursor.read_u32()?;
            let raw_unit = cursor.read_u32()?;
            values.push(IncluderValue {
                value_index,
                accumulated,
                self_accumulated,
                min,
                max,
                count,
                max_unit: if (raw_unit as usize) < unit_count {
                    Some(raw_unit)
                } else {
                    None
                },
            });
        }

        let unit_edge_count = cursor.read_u32()? as usize;
        let mut units = Vec::with_capacity(unit_edge_count);
        for _ in 0..unit_edge_count {
            units.push(IncluderUnit {
                unit_index: cursor.read_u32()?,
                duration: cursor.read_u32()?,
            });
        }

        entries.push(IncludersEntry { values, units });
    }

    Ok(Some(IncludersGraph { entries }))
}
