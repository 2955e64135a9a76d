//! The normalized in-memory model for one loaded score, and the query
//! engine every consumer goes through.
//!
//! A [`ScoreData`] is rebuilt from scratch on every successful load; nothing
//! is patched field-by-field across reloads. The only post-replacement
//! mutation is severity re-classification, which is a pure function of the
//! current values and the current [`SeveritySettings`].

use ahash::AHashMap;

use crate::score::folders::FolderTree;
use crate::score::includers::IncludersGraph;
use crate::score::load::CancellationToken;
use crate::score::severity::{self, SeveritySettings, ThresholdSource};
use crate::score::{Category, Session};

/// One compiled translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitValue {
    /// Lowercased file name, as written by the exporter.
    pub name: String,
    /// Position in the load's unit list; the foreign key other structures
    /// use. Stable only within one load generation.
    pub index: u32,
    /// Aggregate duration per display category, in microseconds.
    pub values: [u32; Category::DISPLAY],
}

impl UnitValue {
    /// The unit's aggregate duration for `category`, 0 for the
    /// timeline-only categories.
    pub fn value(&self, category: Category) -> u32 {
        self.values.get(category.index()).copied().unwrap_or(0)
    }
}

/// One aggregated symbol, header or entity within a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileValue {
    /// Lowercased symbol or file name.
    pub name: String,
    /// Total time across all occurrences, in microseconds.
    pub accumulated: u64,
    /// Total self time across all occurrences.
    pub self_accumulated: u64,
    /// Cheapest single occurrence.
    pub min: u32,
    /// Most expensive single occurrence.
    pub max: u32,
    /// Most expensive single occurrence, self time only.
    pub self_max: u32,
    /// Number of occurrences.
    pub count: u32,
    /// Unit exhibiting `max`, if the file recorded a valid one.
    pub max_unit: Option<u32>,
    /// Unit exhibiting `self_max`, if the file recorded a valid one.
    pub self_max_unit: Option<u32>,
    /// Severity bucket; 0 until classified, then ascending with cost.
    pub severity: u32,
}

impl CompileValue {
    /// Mean duration of one occurrence; 0 when there are none.
    pub fn average(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.accumulated / u64::from(self.count)
        }
    }
}

/// One category's value collection plus its derived indices.
#[derive(Debug, Clone, Default)]
pub struct CompileDataset {
    /// Values in stored order; positions are the indices the includer graph
    /// and timelines reference.
    pub values: Vec<CompileValue>,
    pub(crate) name_index: AHashMap<String, u32>,
    /// Percentile cut points for the configured criteria field, rebuilt by
    /// [`ScoreData::recompute_severities`].
    pub normalized_thresholds: Vec<u64>,
}

impl CompileDataset {
    /// Number of values in the collection.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the collection holds no values (never decoded, or empty).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`.
    pub fn get(&self, index: u32) -> Option<&CompileValue> {
        self.values.get(index as usize)
    }

    /// Hash lookup by name. Duplicate names across different files are a
    /// known ambiguity; the first-decoded value wins.
    pub fn by_name(&self, name: &str) -> Option<&CompileValue> {
        self.name_index
            .get(name)
            .and_then(|&i| self.values.get(i as usize))
    }

    pub(crate) fn rebuild_name_index(&mut self) {
        self.name_index.clear();
        self.name_index.reserve(self.values.len());
        for (i, value) in self.values.iter().enumerate() {
            // first insert wins
            self.name_index
                .entry(value.name.clone())
                .or_insert(i as u32);
        }
    }

    fn reclassify(&mut self, settings: &SeveritySettings) {
        let mut sorted: Vec<u64> = self
            .values
            .iter()
            .map(|v| settings.criteria.value_of(v))
            .collect();
        sorted.sort_unstable();
        self.normalized_thresholds =
            severity::normalized_thresholds(&sorted, &settings.percentiles);

        let thresholds: &[u64] = match settings.source {
            ThresholdSource::Normalized => &self.normalized_thresholds,
            ThresholdSource::Absolute => &settings.absolute,
        };
        for value in &mut self.values {
            value.severity = severity::classify(thresholds, settings.criteria.value_of(value));
        }
    }

    pub(crate) fn post_process(&mut self, settings: &SeveritySettings) {
        self.rebuild_name_index();
        self.reclassify(settings);
    }
}

/// One category's summed duration across all units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UnitTotal {
    /// Sum over all units, in microseconds.
    pub total: u64,
    /// Fraction of the `ExecuteCompiler` total; 0 when that total is 0.
    pub ratio: f64,
}

/// Everything decoded from one score, plus the derived indices.
#[derive(Debug, Clone)]
pub struct ScoreData {
    /// Global metadata for the load.
    pub session: Session,
    units: Vec<UnitValue>,
    unit_index: AHashMap<String, u32>,
    datasets: Vec<CompileDataset>,
    totals: Vec<UnitTotal>,
    /// Folder hierarchy for path construction and resolution.
    pub folders: FolderTree,
    /// Pre-aggregated includee → includers adjacency.
    pub includers: IncludersGraph,
}

impl Default for ScoreData {
    fn default() -> Self {
        ScoreData {
            session: Session::default(),
            units: Vec::new(),
            unit_index: AHashMap::new(),
            datasets: (0..Category::GATHER).map(|_| CompileDataset::default()).collect(),
            totals: vec![UnitTotal::default(); Category::DISPLAY],
            folders: FolderTree::default(),
            includers: IncludersGraph::default(),
        }
    }
}

impl ScoreData {
    /// All units in stored order.
    pub fn units(&self) -> &[UnitValue] {
        &self.units
    }

    /// Unit at `index`.
    pub fn unit(&self, index: u32) -> Option<&UnitValue> {
        self.units.get(index as usize)
    }

    /// Hash lookup of a unit by its lowercased name; first-decoded wins on
    /// duplicates.
    pub fn unit_by_name(&self, name: &str) -> Option<&UnitValue> {
        self.unit_index
            .get(name)
            .and_then(|&i| self.units.get(i as usize))
    }

    /// The value collection for `category`, if that category can carry one.
    pub fn dataset(&self, category: Category) -> Option<&CompileDataset> {
        self.datasets.get(category.index())
    }

    /// Value lookup by category and index.
    pub fn value(&self, category: Category, index: u32) -> Option<&CompileValue> {
        self.dataset(category)?.get(index)
    }

    /// Value lookup by category and name.
    pub fn value_by_name(&self, category: Category, name: &str) -> Option<&CompileValue> {
        self.dataset(category)?.by_name(name)
    }

    /// Position of `value` within its category's collection, by reference
    /// identity. Used to cross into the includer and timeline tables.
    pub fn index_of(&self, category: Category, value: &CompileValue) -> Option<u32> {
        let dataset = self.dataset(category)?;
        dataset
            .values
            .iter()
            .position(|v| std::ptr::eq(v, value))
            .map(|i| i as u32)
    }

    /// The session total for `category`.
    pub fn total(&self, category: Category) -> Option<&UnitTotal> {
        self.totals.get(category.index())
    }

    /// Relative path of `unit` through the folder tree, or `""` when the
    /// unit is not reachable from the root.
    pub fn unit_path(&self, unit: &UnitValue) -> String {
        self.folders.unit_path(unit.index, &unit.name)
    }

    /// Relative path of an Include-category `value`, or `""`.
    pub fn include_path(&self, value: &CompileValue) -> String {
        match self.index_of(Category::Include, value) {
            Some(index) => self.folders.include_path(index, &value.name),
            None => String::new(),
        }
    }

    /// Resolves a folder path back to the unit it names.
    pub fn unit_by_path(&self, path: &str) -> Option<&UnitValue> {
        let index = self.folders.resolve_unit(path, &self.units)?;
        self.unit(index)
    }

    /// Resolves a folder path back to the Include-category value it names.
    pub fn include_by_path(&self, path: &str) -> Option<&CompileValue> {
        let dataset = self.dataset(Category::Include)?;
        let index = self.folders.resolve_include(path, &dataset.values)?;
        dataset.get(index)
    }

    /// Re-runs severity classification over every populated dataset without
    /// touching the file. Idempotent; cheap enough to call on every settings
    /// change.
    pub fn recompute_severities(&mut self, settings: &SeveritySettings) {
        for dataset in &mut self.datasets {
            if !dataset.is_empty() {
                dataset.reclassify(settings);
            }
        }
    }

    /// Indices of values in `category` whose name contains `needle`.
    ///
    /// Checks `token` as it goes and returns `None` if the pass was
    /// cancelled, so a newer filter can supersede a stale one mid-scan.
    pub fn filter_values(
        &self,
        category: Category,
        needle: &str,
        token: &CancellationToken,
    ) -> Option<Vec<u32>> {
        let dataset = self.dataset(category)?;
        let mut hits = Vec::new();
        for (i, value) in dataset.values.iter().enumerate() {
            if i % 256 == 0 && token.is_cancelled() {
                return None;
            }
            if value.name.contains(needle) {
                hits.push(i as u32);
            }
        }
        Some(hits)
    }

    /// Replaces this dataset's contents with a freshly decoded main chunk.
    ///
    /// This is the "apply" half of the two-phase load: decoding happened on
    /// a worker, this runs on the owning thread.
    pub fn apply_main(&mut self, chunk: crate::score::decode::MainChunk) {
        self.session = chunk.session;
        self.set_units(chunk.units);
        for (category, dataset) in chunk.datasets.into_iter().enumerate() {
            self.set_dataset(category, dataset);
        }
        self.set_totals(&chunk.totals);
        self.folders = chunk.folders;
    }

    /// Installs the lazily decoded extension value tables
    /// (`Category::SEVERITY..Category::GATHER`).
    pub fn apply_globals(&mut self, datasets: Vec<CompileDataset>) {
        for (offset, dataset) in datasets.into_iter().enumerate() {
            let category = Category::SEVERITY + offset;
            if category < Category::GATHER {
                self.set_dataset(category, dataset);
            }
        }
    }

    /// Installs the includer graph decoded alongside the main chunk.
    pub fn apply_includers(&mut self, graph: IncludersGraph) {
        self.includers = graph;
    }

    pub(crate) fn set_units(&mut self, units: Vec<UnitValue>) {
        self.unit_index.clear();
        self.unit_index.reserve(units.len());
        for unit in &units {
            self.unit_index
                .entry(unit.name.clone())
                .or_insert(unit.index);
        }
        self.units = units;
    }

    pub(crate) fn set_dataset(&mut self, category: usize, dataset: CompileDataset) {
        self.datasets[category] = dataset;
    }

    pub(crate) fn set_totals(&mut self, raw: &[u64]) {
        let reference = raw
            .get(Category::ExecuteCompiler.index())
            .copied()
            .unwrap_or(0);
        self.totals = raw
            .iter()
            .map(|&total| UnitTotal {
                total,
                ratio: if reference == 0 {
                    0.0
                } else {
                    total as f64 / reference as f64
                },
            })
            .collect();
    }
}
