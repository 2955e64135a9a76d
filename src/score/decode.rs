//! Decoding of the main `.scor` file and its `.scor.gbl` extension.
//!
//! Both decoders run off the owning thread; they only produce immutable
//! chunks, which the loader applies later. A missing file is "no data", a
//! version outside the supported range aborts the decode with a logged
//! error, and a truncated stream fails the whole load so no partial dataset
//! is ever published.

use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::score::cursor::ByteCursor;
use crate::score::data::{CompileDataset, CompileValue, UnitValue};
use crate::score::folders::FolderTree;
use crate::score::severity::SeveritySettings;
use crate::score::{version_supported, Category, Session, VERSION, VERSION_MIN};

/// Everything decoded from one `.scor` file, before it is applied to a live
/// dataset.
#[derive(Debug)]
pub struct MainChunk {
    /// Decoded session header.
    pub session: Session,
    /// Unit table, indices assigned by position.
    pub units: Vec<UnitValue>,
    /// Post-processed value collections for `0..Category::SEVERITY`.
    pub datasets: Vec<CompileDataset>,
    /// Raw per-category totals in enum order.
    pub totals: Vec<u64>,
    /// Decoded folder hierarchy.
    pub folders: FolderTree,
}

/// Path of the globals extension file for a given score path.
pub fn globals_path(score: &Path) -> PathBuf {
    PathBuf::from(format!("{}.gbl", score.display()))
}

/// Reads a whole file, tolerating a concurrent writer.
///
/// The exporter may still be writing while we react to a change
/// notification, so a failed open/read is retried a few times before giving
/// up. A file that does not exist at all is `Ok(None)`.
pub fn read_shared(path: &Path, retries: u32, delay: Duration) -> io::Result<Option<Vec<u8>>> {
    let mut attempt = 0;
    loop {
        match std::fs::read(path) {
            Ok(bytes) => return Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                if attempt >= retries {
                    return Err(e);
                }
                attempt += 1;
                warn!(
                    "retrying read of {} after {} ({}/{})",
                    path.display(),
                    e,
                    attempt,
                    retries
                );
                thread::sleep(delay);
            }
        }
    }
}

fn check_version(version: u32, path: &Path) -> io::Result<()> {
    if !version_supported(version) {
        error!(
            "{}: unsupported format version {} (supported {}..={}), re-export the trace",
            path.display(),
            version,
            VERSION_MIN,
            VERSION
        );
        return invalid_data_error!(
            "unsupported format version {} (supported {}..={})",
            version,
            VERSION_MIN,
            VERSION
        );
    }
    Ok(())
}

/// Decodes the `.scor` file at `path`.
///
/// Returns `Ok(None)` when the file does not exist. Severity
/// classification and name indices are built here too, so the returned
/// chunk is ready to apply as-is.
pub fn load_main(path: &Path, settings: &SeveritySettings) -> io::Result<Option<MainChunk>> {
    let bytes = match read_shared(path, 4, Duration::from_millis(100))? {
        Some(bytes) => bytes,
        None => {
            info!("no score data at {}", path.display());
            return Ok(None);
        }
    };
    decode_main(&bytes, path, settings).map(Some)
}

fn decode_main(bytes: &[u8], path: &Path, settings: &SeveritySettings) -> io::Result<MainChunk> {
    let mut cursor = ByteCursor::new(bytes);

    let version = cursor.read_u32()?;
    check_version(version, path)?;

    let session = Session {
        version,
        timeline_packing: cursor.read_u32()?,
        total_duration: cursor.read_u64()?,
        num_threads: cursor.read_u32()?,
    };

    let mut totals = Vec::with_capacity(Category::DISPLAY);
    for _ in 0..Category::DISPLAY {
        totals.push(cursor.read_u64()?);
    }

    let unit_count = cursor.read_u32()? as usize;
    let mut units = Vec::with_capacity(unit_count);
    for index in 0..unit_count {
        let name = cursor.read_string()?;
        let mut values = [0u32; Category::DISPLAY];
        for slot in values.iter_mut() {
            *slot = cursor.read_u32()?;
        }
        units.push(UnitValue {
            name,
            index: index as u32,
            values,
        });
    }

    let mut datasets = Vec::with_capacity(Category::SEVERITY);
    for _ in 0..Category::SEVERITY {
        let mut dataset = decode_value_table(&mut cursor, unit_count)?;
        dataset.post_process(settings);
        datasets.push(dataset);
    }

    let folders = FolderTree::decode(&mut cursor)?;

    Ok(MainChunk {
        session,
        units,
        datasets,
        totals,
        folders,
    })
}

/// Decodes the `.scor.gbl` extension at `path` into the value collections
/// for `Category::SEVERITY..Category::GATHER`.
///
/// The globals file is written by the same exporter run as the main score,
/// so its version must match the loaded session's exactly.
pub fn load_globals(
    path: &Path,
    session: &Session,
    unit_count: usize,
    settings: &SeveritySettings,
) -> io::Result<Option<Vec<CompileDataset>>> {
    let bytes = match read_shared(path, 4, Duration::from_millis(100))? {
        Some(bytes) => bytes,
        None => {
            info!("no globals data at {}", path.display());
            return Ok(None);
        }
    };

    let mut cursor = ByteCursor::new(&bytes);
    let version = cursor.read_u32()?;
    check_version(version, path)?;
    if version != session.version {
        error!(
            "{}: version {} does not match the loaded score (version {})",
            path.display(),
            version,
            session.version
        );
        return invalid_data_error!(
            "globals version {} does not match score version {}",
            version,
            session.version
        );
    }

    let mut datasets = Vec::with_capacity(Category::GATHER - Category::SEVERITY);
    for _ in Category::SEVERITY..Category::GATHER {
        let mut dataset = decode_value_table(&mut cursor, unit_count)?;
        dataset.post_process(settings);
        datasets.push(dataset);
    }
    Ok(Some(datasets))
}

fn decode_value_table(cursor: &mut ByteCursor<'_>, unit_count: usize) -> io::Result<CompileDataset> {
    let count = cursor.read_u32()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let name = cursor.read_string()?;
        let accumulated = cursor.read_u64()?;
        let self_accumulated = cursor.read_u64()?;
        let min = cursor.read_u32()?;
        let max = cursor.read_u32()?;
        let self_max = cursor.read_u32()?;
        let count = cursor.read_u32()?;
        let max_unit = resolve_unit_ref(cursor.read_u32()?, unit_count);
        let self_max_unit = resolve_unit_ref(cursor.read_u32()?, unit_count);
        values.push(CompileValue {
            name,
            accumulated,
            self_accumulated,
            min,
            max,
            self_max,
            count,
            max_unit,
            self_max_unit,
            severity: 0,
        });
    }
    Ok(CompileDataset {
        values,
        ..Default::default()
    })
}

// Out-of-range unit references resolve to "no reference"; the writer uses
// an out-of-range sentinel for values whose worst unit was not tracked.
fn resolve_unit_ref(raw: u32, unit_count: usize) -> Option<u32> {
    if (raw as usize) < unit_count {
        Some(raw)
    } else {
        None
    }
}
