//! Reconstruction of per-unit execution timelines from `.tNNNN` files.
//!
//! Timelines for many units are packed into fewer files: a unit's stable
//! index and the session's packing factor select the file and the record
//! within it. Each record is a set of tracks, and each track is a flat event
//! stream sorted by start time with no parent pointers; the nesting is
//! rebuilt here in a single pass.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info};

use crate::score::cursor::ByteCursor;
use crate::score::data::{CompileValue, ScoreData, UnitValue};
use crate::score::decode::read_shared;
use crate::score::{Category, TIMELINE_SUFFIX_DIGITS, VERSION_SELF_DURATION};

/// One interval in a reconstructed timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineNode {
    /// Resolved display label: the referenced value or unit name when the
    /// event id resolves, the category name otherwise.
    pub label: String,
    /// Start offset within the unit's compilation, in microseconds.
    pub start: u32,
    /// Inclusive duration.
    pub duration: u32,
    /// Self duration; recorded by the writer from format version 7 on,
    /// reconstructed from the children before that.
    pub self_duration: u32,
    /// Compile-phase category of the event.
    pub category: Category,
    /// Raw event id, an index into the category's value collection (or the
    /// unit table for `ExecuteCompiler` events).
    pub event_id: u32,
    /// Depth level, offset per track so concurrent tracks never share rows.
    pub depth: u32,
    /// Deepest depth level reached in this node's subtree.
    pub max_depth: u32,
    /// Nested child intervals, in start order.
    pub children: Vec<TimelineNode>,
}

impl TimelineNode {
    /// End offset of the interval.
    pub fn end(&self) -> u32 {
        self.start + self.duration
    }

    /// Pre-order walk over this node and all descendants.
    pub fn visit(&self, f: &mut impl FnMut(&TimelineNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    /// The aggregated value this event represents, when its id resolves.
    pub fn compile_value<'a>(&self, data: &'a ScoreData) -> Option<&'a CompileValue> {
        data.value(self.category, self.event_id)
    }

    /// The unit this event represents, for `ExecuteCompiler` events.
    pub fn unit_value<'a>(&self, data: &'a ScoreData) -> Option<&'a UnitValue> {
        if self.category == Category::ExecuteCompiler {
            data.unit(self.event_id)
        } else {
            None
        }
    }
}

/// A reconstructed timeline for one unit. The root node is synthetic and
/// spans all top-level tracks.
#[derive(Debug, Clone)]
pub struct Timeline {
    /// The unit the timeline belongs to.
    pub unit_index: u32,
    /// Synthetic root; its children are every track's top-level intervals.
    pub root: TimelineNode,
}

impl Timeline {
    /// Deepest depth level in the whole timeline.
    pub fn max_depth(&self) -> u32 {
        self.root.max_depth
    }
}

/// The timeline file a unit's record lives in.
pub fn file_number(unit_index: u32, packing: u32) -> u32 {
    unit_index / packing.max(1)
}

/// The record position of a unit within its timeline file.
pub fn record_offset(unit_index: u32, packing: u32) -> u32 {
    unit_index % packing.max(1)
}

/// Path of timeline file `number` for a given score path.
pub fn path_for(score: &Path, number: u32) -> PathBuf {
    PathBuf::from(format!(
        "{}.t{:0width$}",
        score.display(),
        number,
        width = TIMELINE_SUFFIX_DIGITS
    ))
}

struct RawEvent {
    start: u32,
    duration: u32,
    self_duration: u32,
    event_id: u32,
    category: Category,
}

/// Loads and reconstructs the timeline for `unit_index`.
///
/// `score` is the path of the main score file the dataset was decoded from;
/// the timeline file's version must match the loaded session's. A missing
/// timeline file is `Ok(None)`.
pub fn load(score: &Path, data: &ScoreData, unit_index: u32) -> io::Result<Option<Timeline>> {
    let packing = data.session.timeline_packing;
    let path = path_for(score, file_number(unit_index, packing));
    let bytes = match read_shared(&path, 4, Duration::from_millis(100))? {
        Some(bytes) => bytes,
        None => {
            info!("no timeline data at {}", path.display());
            return Ok(None);
        }
    };

    let mut cursor = ByteCursor::new(&bytes);
    let version = cursor.read_u32()?;
    if version != data.session.version {
        error!(
            "{}: version {} does not match the loaded score (version {})",
            path.display(),
            version,
            data.session.version
        );
        return invalid_data_error!(
            "timeline version {} does not match score version {}",
            version,
            data.session.version
        );
    }

    let has_self = version >= VERSION_SELF_DURATION;
    let event_size = if has_self { 17 } else { 13 };
    for _ in 0..record_offset(unit_index, packing) {
        skip_record(&mut cursor, event_size)?;
    }

    let track_count = cursor.read_u32()? as usize;
    let mut tracks = Vec::with_capacity(track_count);
    for _ in 0..track_count {
        let event_count = cursor.read_u32()? as usize;
        let mut events = Vec::with_capacity(event_count);
        for _ in 0..event_count {
            events.push(read_event(&mut cursor, has_self)?);
        }
        tracks.push(events);
    }

    Ok(Some(assemble(tracks, data, unit_index, has_self)))
}

fn read_event(cursor: &mut ByteCursor<'_>, has_self: bool) -> io::Result<RawEvent> {
    let start = cursor.read_u32()?;
    let duration = cursor.read_u32()?;
    let self_duration = if has_self { cursor.read_u32()? } else { 0 };
    let event_id = cursor.read_u32()?;
    let raw_category = cursor.read_u8()?;
    let category = match Category::from_u8(raw_category) {
        Some(category) => category,
        None => return invalid_data_error!("unknown timeline category tag {}", raw_category),
    };
    Ok(RawEvent {
        start,
        duration,
        self_duration,
        event_id,
        category,
    })
}

fn skip_record(cursor: &mut ByteCursor<'_>, event_size: usize) -> io::Result<()> {
    let track_count = cursor.read_u32()?;
    for _ in 0..track_count {
        let event_count = cursor.read_u32()? as usize;
        cursor.skip(event_count * event_size)?;
    }
    Ok(())
}

fn label_for(data: &ScoreData, category: Category, event_id: u32) -> String {
    if let Some(value) = data.value(category, event_id) {
        return value.name.clone();
    }
    if category == Category::ExecuteCompiler {
        if let Some(unit) = data.unit(event_id) {
            return unit.name.clone();
        }
    }
    category.label().to_string()
}

/// Rebuilds one track's nesting from its start-sorted event stream.
///
/// A cursor of open nodes tracks the current parent chain: an event starting
/// at or after the top's end pops it, the event then attaches to the
/// surviving top, and non-instantaneous events become the new parent.
/// Zero-duration events are instantaneous markers and never hold children.
///
/// The stream is trusted: sortedness and proper nesting are the writer's
/// contract and are not validated here, so malformed input produces a
/// structurally wrong tree rather than an error.
fn rebuild_track(events: Vec<RawEvent>, data: &ScoreData) -> Vec<TimelineNode> {
    // Synthetic anchor; never compared against thanks to the len() > 1 guard.
    let mut open = vec![TimelineNode {
        label: String::new(),
        start: 0,
        duration: 0,
        self_duration: 0,
        category: Category::Timeline,
        event_id: u32::MAX,
        depth: 0,
        max_depth: 0,
        children: Vec::new(),
    }];

    for event in events {
        while open.len() > 1 && event.start >= open.last().expect("anchor").end() {
            let finished = open.pop().expect("anchor");
            open.last_mut().expect("anchor").children.push(finished);
        }
        let node = TimelineNode {
            label: label_for(data, event.category, event.event_id),
            start: event.start,
            duration: event.duration,
            self_duration: event.self_duration,
            category: event.category,
            event_id: event.event_id,
            depth: 0,
            max_depth: 0,
            children: Vec::new(),
        };
        if node.duration > 0 {
            open.push(node);
        } else {
            open.last_mut().expect("anchor").children.push(node);
        }
    }
    while open.len() > 1 {
        let finished = open.pop().expect("anchor");
        open.last_mut().expect("anchor").children.push(finished);
    }
    open.pop().expect("anchor").children
}

// Bottom-up interval correction: a parent snaps to its first child's start
// and to the furthest child end, absorbing rounding slack from the source
// instrumentation.
fn tighten(node: &mut TimelineNode) {
    for child in &mut node.children {
        tighten(child);
    }
    if let Some(first) = node.children.first() {
        let start = first.start;
        let end = node
            .children
            .iter()
            .map(TimelineNode::end)
            .max()
            .unwrap_or(start);
        node.start = start;
        node.duration = end - start;
    }
}

// Pre-version-7 writers did not record self durations; reconstruct them as
// the inclusive duration minus the children's.
fn fill_self_durations(node: &mut TimelineNode) {
    let child_total: u64 = node.children.iter().map(|c| u64::from(c.duration)).sum();
    node.self_duration = u64::from(node.duration).saturating_sub(child_total) as u32;
    for child in &mut node.children {
        fill_self_durations(child);
    }
}

fn assign_depths(node: &mut TimelineNode, depth: u32) -> u32 {
    node.depth = depth;
    let mut deepest = depth;
    for child in &mut node.children {
        deepest = deepest.max(assign_depths(child, depth + 1));
    }
    node.max_depth = deepest;
    deepest
}

struct TrackSpan {
    start: u32,
    end: u32,
    max_depth: u32,
}

fn assemble(
    tracks: Vec<Vec<RawEvent>>,
    data: &ScoreData,
    unit_index: u32,
    has_self: bool,
) -> Timeline {
    let mut spans: Vec<TrackSpan> = Vec::new();
    let mut children = Vec::new();

    for events in tracks {
        let mut top = rebuild_track(events, data);
        if top.is_empty() {
            continue;
        }
        for node in &mut top {
            tighten(node);
            if !has_self {
                fill_self_durations(node);
            }
        }

        let start = top.first().map(|n| n.start).unwrap_or(0);
        let end = top.iter().map(TimelineNode::end).max().unwrap_or(start);

        // Concurrently-active tracks must not share depth rows: start below
        // everything already occupying this time window.
        let base = spans
            .iter()
            .filter(|span| span.start < end && start < span.end)
            .map(|span| span.max_depth + 1)
            .max()
            .unwrap_or(0);

        let mut track_max = base;
        for node in &mut top {
            track_max = track_max.max(assign_depths(node, base));
        }
        spans.push(TrackSpan {
            start,
            end,
            max_depth: track_max,
        });
        children.append(&mut top);
    }

    let start = children.iter().map(|n| n.start).min().unwrap_or(0);
    let end = children.iter().map(TimelineNode::end).max().unwrap_or(start);
    let max_depth = spans.iter().map(|s| s.max_depth).max().unwrap_or(0);
    let label = data
        .unit(unit_index)
        .map(|u| u.name.clone())
        .unwrap_or_else(|| format!("unit {}", unit_index));

    Timeline {
        unit_index,
        root: TimelineNode {
            label,
            start,
            duration: end - start,
            self_duration: 0,
            category: Category::Timeline,
            event_id: unit_index,
            depth: 0,
            max_depth,
            children,
        },
    }
}
