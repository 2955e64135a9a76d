//! Generation-stamped load orchestration.
//!
//! Exactly one thread (whoever owns the [`Loader`]) mutates the live
//! dataset. File decoding runs on detached workers that only produce
//! immutable chunks; every dispatched chunk carries the generation counter
//! it was requested under, and is silently discarded at apply time if a
//! newer request superseded it. Last-requested wins, never last-completed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::score::data::{CompileDataset, ScoreData};
use crate::score::decode::{self, MainChunk};
use crate::score::includers::{self, IncludersGraph};
use crate::score::severity::SeveritySettings;

/// Cooperative cancellation flag for long scans (filtering large includer
/// or value lists while the user is still typing).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; checked by in-flight scans at their leisure.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of the most recent load request, for informational display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No load requested yet, or one is still in flight.
    Unloaded,
    /// The score file does not exist; an empty dataset is in place.
    NotFound,
    /// Main data decoded and applied.
    Loaded,
    /// The decode failed (version mismatch or malformed stream); the
    /// dataset is empty. Details went to the log.
    Failed,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Part {
    Main,
    Globals,
}

enum Payload {
    Main(Option<Box<(MainChunk, IncludersGraph)>>),
    Globals(Option<Vec<CompileDataset>>),
    Failed,
}

struct Completion {
    generation: u64,
    part: Part,
    payload: Payload,
}

/// Owns the live [`ScoreData`] and coordinates reloads.
///
/// All methods must be called from the owning thread; the loader itself is
/// what makes the *decoding* concurrent, not the queries.
pub struct Loader {
    data: ScoreData,
    settings: SeveritySettings,
    generation: u64,
    path: Option<PathBuf>,
    state: LoadState,
    main_hydrated: bool,
    globals_hydrated: bool,
    globals_requested: bool,
    in_flight: usize,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Creates an empty loader with default severity settings.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Loader {
            data: ScoreData::default(),
            settings: SeveritySettings::default(),
            generation: 0,
            path: None,
            state: LoadState::Unloaded,
            main_hydrated: false,
            globals_hydrated: false,
            globals_requested: false,
            in_flight: 0,
            tx,
            rx,
        }
    }

    /// The live dataset. Read-only: external consumers never mutate it.
    pub fn data(&self) -> &ScoreData {
        &self.data
    }

    /// Outcome of the most recent load.
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// The current load generation; bumped by every request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The severity settings applied to the live dataset.
    pub fn severity_settings(&self) -> &SeveritySettings {
        &self.settings
    }

    /// Replaces the severity settings and reclassifies in place, without
    /// re-reading any file.
    pub fn set_severity_settings(&mut self, settings: SeveritySettings) {
        self.settings = settings;
        self.data.recompute_severities(&self.settings);
    }

    /// Whether the extension value tables have been hydrated for the
    /// current generation.
    pub fn globals_hydrated(&self) -> bool {
        self.globals_hydrated
    }

    /// Starts loading `path`.
    ///
    /// The visible dataset is cleared synchronously, before any I/O, and
    /// the generation counter is bumped so any still-running decode from an
    /// earlier request is discarded when it eventually completes.
    pub fn request_load(&mut self, path: impl Into<PathBuf>) {
        self.data = ScoreData::default();
        self.generation += 1;
        self.state = LoadState::Unloaded;
        self.main_hydrated = false;
        self.globals_hydrated = false;
        self.globals_requested = false;
        self.in_flight = 0;
        self.path = Some(path.into());
        self.spawn_main();
    }

    fn spawn_main(&mut self) {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => return,
        };
        let generation = self.generation;
        let settings = self.settings.clone();
        let tx = self.tx.clone();
        self.in_flight += 1;

        thread::spawn(move || {
            let payload = match decode::load_main(&path, &settings) {
                Ok(Some(chunk)) => {
                    let graph = match includers::load(
                        &includers::includers_path(&path),
                        &chunk.session,
                        chunk.units.len(),
                    ) {
                        Ok(Some(graph)) => graph,
                        Ok(None) => IncludersGraph::default(),
                        Err(e) => {
                            error!("includers decode failed: {}", e);
                            IncludersGraph::default()
                        }
                    };
                    Payload::Main(Some(Box::new((chunk, graph))))
                }
                Ok(None) => Payload::Main(None),
                Err(e) => {
                    error!("score decode failed: {}", e);
                    Payload::Failed
                }
            };
            // The loader may be gone by now; that's fine.
            let _ = tx.send(Completion {
                generation,
                part: Part::Main,
                payload,
            });
        });
    }

    fn spawn_globals(&mut self) {
        let path = match &self.path {
            Some(path) => decode::globals_path(path),
            None => return,
        };
        let generation = self.generation;
        let session = self.data.session.clone();
        let unit_count = self.data.units().len();
        let settings = self.settings.clone();
        let tx = self.tx.clone();
        self.in_flight += 1;

        thread::spawn(move || {
            let payload = match decode::load_globals(&path, &session, unit_count, &settings) {
                Ok(result) => Payload::Globals(result),
                Err(e) => {
                    error!("globals decode failed: {}", e);
                    Payload::Failed
                }
            };
            let _ = tx.send(Completion {
                generation,
                part: Part::Globals,
                payload,
            });
        });
    }

    /// Drains finished decodes and applies the ones that still belong to
    /// the current generation.
    ///
    /// Returns `true` when the dataset visibly changed, which happens
    /// exactly once per settled hydration batch: intermediate applies are
    /// suppressed while more work for the same generation is in flight, so
    /// consumers never observe a half-applied dataset.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Ok(completion) = self.rx.try_recv() {
            changed |= self.apply(completion);
        }
        changed
    }

    /// Blocks until nothing is in flight for the current generation,
    /// applying completions as they arrive. Returns `true` if the dataset
    /// changed.
    pub fn wait_idle(&mut self) -> bool {
        let mut changed = false;
        while self.in_flight > 0 {
            match self.rx.recv() {
                Ok(completion) => changed |= self.apply(completion),
                Err(_) => break,
            }
        }
        changed
    }

    /// Ensures the extension value tables are (being) hydrated.
    ///
    /// Globals depend on Main: if Main has not applied yet for the current
    /// generation this blocks on the completion channel until it has, then
    /// dispatches the globals decode asynchronously. Returns `true` if the
    /// dataset changed while waiting.
    pub fn hydrate_globals(&mut self) -> bool {
        if self.globals_hydrated || self.globals_requested || self.path.is_none() {
            return false;
        }
        let mut changed = false;
        if !self.main_hydrated {
            if self.in_flight == 0 {
                self.spawn_main();
            }
            while !self.main_hydrated && self.in_flight > 0 {
                match self.rx.recv() {
                    Ok(completion) => changed |= self.apply(completion),
                    Err(_) => break,
                }
            }
        }
        if self.state == LoadState::Loaded && !self.globals_hydrated {
            self.globals_requested = true;
            self.spawn_globals();
        } else {
            // Nothing to extend (missing or failed main); settle the flag
            // so callers don't re-trigger on every probe.
            self.globals_hydrated = true;
        }
        changed
    }

    fn apply(&mut self, completion: Completion) -> bool {
        if completion.generation != self.generation {
            debug!(
                "discarding superseded decode result (generation {} < {})",
                completion.generation, self.generation
            );
            return false;
        }
        self.in_flight -= 1;

        match completion.payload {
            Payload::Main(Some(decoded)) => {
                let (chunk, graph) = *decoded;
                self.data.apply_main(chunk);
                self.data.apply_includers(graph);
                self.main_hydrated = true;
                self.state = LoadState::Loaded;
            }
            Payload::Main(None) => {
                info!("score data not found; dataset left empty");
                self.main_hydrated = true;
                self.state = LoadState::NotFound;
            }
            Payload::Globals(Some(datasets)) => {
                self.data.apply_globals(datasets);
                self.globals_hydrated = true;
            }
            Payload::Globals(None) => {
                self.globals_hydrated = true;
            }
            Payload::Failed => {
                match completion.part {
                    Part::Main => {
                        self.main_hydrated = true;
                        self.state = LoadState::Failed;
                    }
                    Part::Globals => self.globals_hydrated = true,
                }
            }
        }

        // Change notifications only fire once the generation settles.
        self.in_flight == 0
    }
}
