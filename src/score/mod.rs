//! The score data model and everything that feeds it.
//!
//! A "score" is one exported snapshot of a full build: per-unit phase
//! breakdowns, per-symbol aggregates partitioned by [`Category`], totals, a
//! folder hierarchy and an includer graph. [`decode`] turns the on-disk
//! format into a [`data::ScoreData`], [`load::Loader`] manages when and on
//! which thread that happens, and [`timeline`] reconstructs per-unit
//! execution timelines on demand.

pub mod cursor;
pub mod data;
pub mod decode;
pub mod folders;
pub mod includers;
pub mod load;
pub mod report;
pub mod severity;
pub mod timeline;

use std::fmt;
use std::str::FromStr;

use ahash::AHashMap;
use once_cell::sync::Lazy;

/// Newest score format version this crate understands.
pub const VERSION: u32 = 9;

/// Oldest score format version this crate still accepts. Writers older than
/// this used a layout we no longer carry decode paths for.
pub const VERSION_MIN: u32 = 5;

/// Timeline event records carry an explicit self-duration field starting with
/// this format version; older writers only recorded inclusive durations.
pub const VERSION_SELF_DURATION: u32 = 7;

/// Number of decimal digits in a timeline file suffix (`.t0000`).
pub const TIMELINE_SUFFIX_DIGITS: usize = 4;

/// Compile-phase classification, the primary partition key for aggregated
/// values and totals.
///
/// The discriminants are layered. The first [`Category::SEVERITY`] categories
/// have per-symbol value tables in the main score file and participate in
/// severity classification. Categories up to [`Category::GATHER`] can have
/// value tables at all (the tail of that range lives in the lazily-read
/// globals file). Categories up to [`Category::DISPLAY`] have a per-unit
/// column and a session total. `Thread` and `Timeline` exist only as event
/// markers inside timelines and are never populated from value tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Category {
    Include = 0,
    ParseClass,
    ParseTemplate,
    InstantiateClass,
    InstantiateFunction,
    InstantiateVariable,
    InstantiateConcept,
    CodeGeneration,
    OptimizeFunction,
    OptimizeModule,
    PendingInstantiations,
    FrontEnd,
    BackEnd,
    ExecuteCompiler,
    Other,
    RunPass,
    CodeGenPasses,
    PerFunctionPasses,
    PerModulePasses,
    DebugType,
    DebugGlobalVariable,
    Thread,
    Timeline,
}

impl Category {
    /// Categories with per-symbol value tables in the main score file.
    pub const SEVERITY: usize = 10;

    /// Categories that can have a value table at all; the range
    /// `SEVERITY..GATHER` is stored in the globals file.
    pub const GATHER: usize = 21;

    /// Categories with a per-unit column and a session total.
    pub const DISPLAY: usize = 21;

    /// Total number of categories, including the timeline-only markers.
    pub const FULL: usize = 23;

    const ALL: [Category; Category::FULL] = [
        Category::Include,
        Category::ParseClass,
        Category::ParseTemplate,
        Category::InstantiateClass,
        Category::InstantiateFunction,
        Category::InstantiateVariable,
        Category::InstantiateConcept,
        Category::CodeGeneration,
        Category::OptimizeFunction,
        Category::OptimizeModule,
        Category::PendingInstantiations,
        Category::FrontEnd,
        Category::BackEnd,
        Category::ExecuteCompiler,
        Category::Other,
        Category::RunPass,
        Category::CodeGenPasses,
        Category::PerFunctionPasses,
        Category::PerModulePasses,
        Category::DebugType,
        Category::DebugGlobalVariable,
        Category::Thread,
        Category::Timeline,
    ];

    /// All categories in stored order.
    pub fn all() -> impl Iterator<Item = Category> {
        Self::ALL.into_iter()
    }

    /// The category's position in stored order.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Decodes a raw category tag from a timeline event record.
    pub fn from_u8(raw: u8) -> Option<Category> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Human-readable label, matching the names the compiler tracer uses.
    pub fn label(self) -> &'static str {
        match self {
            Category::Include => "Include",
            Category::ParseClass => "ParseClass",
            Category::ParseTemplate => "ParseTemplate",
            Category::InstantiateClass => "InstantiateClass",
            Category::InstantiateFunction => "InstantiateFunction",
            Category::InstantiateVariable => "InstantiateVariable",
            Category::InstantiateConcept => "InstantiateConcept",
            Category::CodeGeneration => "CodeGeneration",
            Category::OptimizeFunction => "OptimizeFunction",
            Category::OptimizeModule => "OptimizeModule",
            Category::PendingInstantiations => "PendingInstantiations",
            Category::FrontEnd => "FrontEnd",
            Category::BackEnd => "BackEnd",
            Category::ExecuteCompiler => "ExecuteCompiler",
            Category::Other => "Other",
            Category::RunPass => "RunPass",
            Category::CodeGenPasses => "CodeGenPasses",
            Category::PerFunctionPasses => "PerFunctionPasses",
            Category::PerModulePasses => "PerModulePasses",
            Category::DebugType => "DebugType",
            Category::DebugGlobalVariable => "DebugGlobalVariable",
            Category::Thread => "Thread",
            Category::Timeline => "Timeline",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

static CATEGORY_BY_LABEL: Lazy<AHashMap<&'static str, Category>> = Lazy::new(|| {
    Category::all().map(|c| (c.label(), c)).collect()
});

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATEGORY_BY_LABEL
            .get(s)
            .copied()
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Global metadata for one loaded score file. Created once per successful
/// load and immutable until the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Format version the file was written with.
    pub version: u32,
    /// How many per-unit timelines are packed into each `.tNNNN` file.
    pub timeline_packing: u32,
    /// Wall-clock duration of the whole build, in microseconds.
    pub total_duration: u64,
    /// Number of compiler threads/processes observed.
    pub num_threads: u32,
}

/// Whether `version` is a score format version this crate can decode.
#[inline]
pub fn version_supported(version: u32) -> bool {
    (VERSION_MIN..=VERSION).contains(&version)
}
