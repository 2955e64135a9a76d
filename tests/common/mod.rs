//! Shared helpers for the integration tests: builders that synthesize the
//! little-endian score family byte streams directly, since the writer side
//! lives in the external exporter.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use scorch::score::{Category, VERSION};

/// Raw little-endian stream assembly.
#[derive(Default, Clone)]
pub struct Bytes {
    buf: Vec<u8>,
}

impl Bytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn str(mut self, s: &str) -> Self {
        self = self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// One aggregated value record; `u32::MAX` unit references decode to "no
/// reference".
#[derive(Clone)]
pub struct ValueSpec {
    pub name: String,
    pub accumulated: u64,
    pub self_accumulated: u64,
    pub min: u32,
    pub max: u32,
    pub self_max: u32,
    pub count: u32,
    pub max_unit: u32,
    pub self_max_unit: u32,
}

impl ValueSpec {
    /// A single-occurrence value attributed to `max_unit`.
    pub fn once(name: &str, cost: u32, max_unit: u32) -> Self {
        ValueSpec {
            name: name.to_string(),
            accumulated: u64::from(cost),
            self_accumulated: u64::from(cost) * 3 / 4,
            min: cost,
            max: cost,
            self_max: cost * 3 / 4,
            count: 1,
            max_unit,
            self_max_unit: max_unit,
        }
    }

    fn encode(&self, b: Bytes) -> Bytes {
        b.str(&self.name)
            .u64(self.accumulated)
            .u64(self.self_accumulated)
            .u32(self.min)
            .u32(self.max)
            .u32(self.self_max)
            .u32(self.count)
            .u32(self.max_unit)
            .u32(self.self_max_unit)
    }
}

#[derive(Clone, Default)]
pub struct FolderSpec {
    pub name: String,
    pub children: Vec<u32>,
    pub units: Vec<u32>,
    pub includes: Vec<u32>,
}

impl FolderSpec {
    pub fn named(name: &str) -> Self {
        FolderSpec {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Assembles a complete `.scor` stream.
pub struct ScoreSpec {
    pub version: u32,
    pub packing: u32,
    pub total_duration: u64,
    pub threads: u32,
    pub totals: Vec<u64>,
    /// (name, per-category durations); omitted categories are 0.
    pub units: Vec<(String, Vec<(Category, u32)>)>,
    /// Value tables for categories below `Category::SEVERITY`.
    pub values: Vec<(Category, Vec<ValueSpec>)>,
    pub folders: Vec<FolderSpec>,
}

impl Default for ScoreSpec {
    fn default() -> Self {
        ScoreSpec {
            version: VERSION,
            packing: 1,
            total_duration: 1_000_000,
            threads: 4,
            totals: vec![0; Category::DISPLAY],
            units: Vec::new(),
            values: Vec::new(),
            folders: Vec::new(),
        }
    }
}

impl ScoreSpec {
    pub fn encode(&self) -> Vec<u8> {
        let mut b = Bytes::new()
            .u32(self.version)
            .u32(self.packing)
            .u64(self.total_duration)
            .u32(self.threads);
        for category in 0..Category::DISPLAY {
            b = b.u64(self.totals.get(category).copied().unwrap_or(0));
        }

        b = b.u32(self.units.len() as u32);
        for (name, durations) in &self.units {
            b = b.str(name);
            let mut columns = [0u32; Category::DISPLAY];
            for (category, duration) in durations {
                columns[category.index()] = *duration;
            }
            for column in columns {
                b = b.u32(column);
            }
        }

        for category in Category::all().take(Category::SEVERITY) {
            let table = self
                .values
                .iter()
                .find(|(c, _)| *c == category)
                .map(|(_, v)| v.as_slice())
                .unwrap_or(&[]);
            b = b.u32(table.len() as u32);
            for value in table {
                b = value.encode(b);
            }
        }

        b = b.u32(self.folders.len() as u32);
        for folder in &self.folders {
            b = b.str(&folder.name);
            b = encode_list(b, &folder.children);
            b = encode_list(b, &folder.units);
            b = encode_list(b, &folder.includes);
        }
        b.finish()
    }

    pub fn write_to(&self, path: &Path) {
        std::fs::write(path, self.encode()).unwrap();
    }
}

fn encode_list(mut b: Bytes, list: &[u32]) -> Bytes {
    b = b.u32(list.len() as u32);
    for v in list {
        b = b.u32(*v);
    }
    b
}

/// Encodes a `.scor.gbl` stream from value tables for the extension
/// categories (`SEVERITY..GATHER`); omitted tables are empty.
pub fn encode_globals(version: u32, tables: &[(Category, Vec<ValueSpec>)]) -> Vec<u8> {
    let mut b = Bytes::new().u32(version);
    for category in Category::all().skip(Category::SEVERITY).take(Category::GATHER - Category::SEVERITY) {
        let table = tables
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[]);
        b = b.u32(table.len() as u32);
        for value in table {
            b = value.encode(b);
        }
    }
    b.finish()
}

/// One includer edge from another Include value.
pub struct InclValueSpec {
    pub value_index: u32,
    pub accumulated: u64,
    pub self_accumulated: u64,
    pub min: u32,
    pub max: u32,
    pub count: u32,
    pub max_unit: u32,
}

/// Encodes a `.scor.incl` stream; one entry per Include value, in order.
pub fn encode_includers(
    version: u32,
    entries: &[(Vec<InclValueSpec>, Vec<(u32, u32)>)],
) -> Vec<u8> {
    let mut b = Bytes::new().u32(version).u32(entries.len() as u32);
    for (values, units) in entries {
        b = b.u32(values.len() as u32);
        for v in values {
            b = b
                .u32(v.value_index)
                .u64(v.accumulated)
                .u64(v.self_accumulated)
                .u32(v.min)
                .u32(v.max)
                .u32(v.count)
                .u32(v.max_unit);
        }
        b = b.u32(units.len() as u32);
        for (unit_index, duration) in units {
            b = b.u32(*unit_index).u32(*duration);
        }
    }
    b.finish()
}

/// One timeline event: (start, duration, self, event id, category).
pub type TEvent = (u32, u32, u32, u32, Category);

/// Encodes one `.tNNNN` stream: records in packed order, each a list of
/// tracks, each a start-sorted event list. The self field is emitted only
/// for versions that carry it.
pub fn encode_timeline(version: u32, records: &[Vec<Vec<TEvent>>]) -> Vec<u8> {
    let with_self = version >= 7;
    let mut b = Bytes::new().u32(version);
    for tracks in records {
        b = b.u32(tracks.len() as u32);
        for events in tracks {
            b = b.u32(events.len() as u32);
            for &(start, duration, self_duration, event_id, category) in events {
                b = b.u32(start).u32(duration);
                if with_self {
                    b = b.u32(self_duration);
                }
                b = b.u32(event_id).u8(category.index() as u8);
            }
        }
    }
    b.finish()
}

/// A per-test scratch directory under the system temp dir.
pub fn scratch(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("scorch-it-{}-{}", tag, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
