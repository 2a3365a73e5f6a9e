//! Core extraction logic.
//!
//! DWARF type resolution is the slow part of reading a kernel, so the work is
//! split into four stages connected by channels:
//! 1. Unit splitting: one worker walks the unit headers and emits byte ranges.
//! 2. Offset scanning: N workers list struct/typedef offsets and base types per unit.
//! 3. Resolution: N/8 workers install the capability cache, then resolve offsets.
//! 4. Collection: one worker merges the per-batch maps.
//!
//! Every stage reports exactly one completion on a shared channel. Channels
//! close when the last sender clone held by a stage's workers is dropped.

use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::dwarf::{DieOffset, DwarfData};
use crate::error::{Error, Result};
use crate::loader::ObjectFile;
use crate::types::StructMap;
use crate::utils;

mod collect;
mod resolve;
mod scan;
mod split;

pub use resolve::resolve_batch;
pub use scan::{scan_unit, UnitScan};
pub use split::split_units;

/// Number of stages reporting on the completion channel.
const STAGES: usize = 4;

/// Messages buffered per channel for every scanner worker.
const BUFFER_PER_WORKER: usize = 100;

/// Half-open byte range of one unit in `.debug_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitRange {
    pub start: DieOffset,
    pub end: DieOffset,
}

impl UnitRange {
    /// Marks a range running to the end of `.debug_info`.
    pub const END: DieOffset = gimli::DebugInfoOffset(usize::MAX);
}

/// Tuning knobs for [`parse_kernel_object_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Scanner workers; zero means one per available CPU.
    pub jobs: usize,
    /// Drop `.debug_line` and `.rela.*` before opening DWARF.
    pub prune_sections: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            jobs: 0,
            prune_sections: true,
        }
    }
}

impl Options {
    /// Scanner worker count after resolving the automatic default.
    pub fn jobs(&self) -> usize {
        if self.jobs == 0 {
            utils::available_jobs()
        } else {
            self.jobs
        }
    }
}

/// Extracts every named struct and typedef-of-struct from the ELF at `path`.
pub fn parse_kernel_object(path: impl AsRef<Path>) -> Result<StructMap> {
    parse_kernel_object_with(path, &Options::default())
}

/// Like [`parse_kernel_object`] with explicit [`Options`].
pub fn parse_kernel_object_with(path: impl AsRef<Path>, options: &Options) -> Result<StructMap> {
    let mut file = ObjectFile::open(path)?;
    if options.prune_sections {
        file.prune_sections();
    }
    let data = file.dwarf()?;
    extract_structs(&data, options.jobs())
}

/// Runs the pipeline over an opened DWARF view with `jobs` scanners.
pub fn extract_structs(data: &DwarfData<'_>, jobs: usize) -> Result<StructMap> {
    let scanners = jobs.max(1);
    let resolvers = utils::resolver_workers(scanners);
    let buffer = BUFFER_PER_WORKER * scanners;
    tracing::debug!(scanners, resolvers, buffer, "starting struct extraction");

    let (unit_tx, unit_rx) = mpsc::sync_channel(buffer);
    // Resolvers drain every base-type batch before reading offsets, so the
    // offsets channel must never block the scanners.
    let (offset_tx, offset_rx) = mpsc::channel();
    let (base_tx, base_rx) = mpsc::sync_channel(buffer);
    let (struct_tx, struct_rx) = mpsc::sync_channel(buffer);
    let (done_tx, done_rx) = mpsc::channel();

    let installer = resolve::Installer::new(data, resolvers);
    let result = Mutex::new(StructMap::new());

    let failure = thread::scope(|scope| {
        spawn_group(scope, "unit splitter", 1, done_tx.clone(), move |_| {
            split::split_units(data, &unit_tx)
        });

        let units = SharedReceiver::new(unit_rx);
        spawn_group(scope, "offset scanner", scanners, done_tx.clone(), move |_| {
            scan::scan_units(data, &units, &offset_tx, &base_tx)
        });

        let base_types = SharedReceiver::new(base_rx);
        let offsets = SharedReceiver::new(offset_rx);
        let installer = &installer;
        spawn_group(scope, "struct resolver", resolvers, done_tx.clone(), move |worker| {
            resolve::resolve_structs(worker, installer, &base_types, &offsets, &struct_tx)
        });

        let structs = SharedReceiver::new(struct_rx);
        let result = &result;
        spawn_group(scope, "collector", 1, done_tx, move |_| collect::collect(&structs, result));

        let mut failure = None;
        for _ in 0..STAGES {
            match done_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(_) => break,
            }
        }
        failure
    });

    if let Some(err) = failure {
        tracing::debug!(error = %err, "struct extraction failed");
        return Err(err);
    }
    let structs = result.into_inner().unwrap_or_else(PoisonError::into_inner);
    tracing::info!(structs = structs.len(), "extracted structs");
    Ok(structs)
}

/// A receiver any number of workers can pull from.
pub(crate) struct SharedReceiver<T>(Mutex<Receiver<T>>);

impl<T> SharedReceiver<T> {
    pub(crate) fn new(receiver: Receiver<T>) -> Self {
        Self(Mutex::new(receiver))
    }

    /// Next message, or `None` once every sender is gone.
    pub(crate) fn recv(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).recv().ok()
    }
}

/// Spawns `workers` threads running `work` and a terminator that joins them
/// and reports the first error (or a panic) on `done`.
///
/// `work` is dropped, together with every channel end it owns, as soon as
/// the last worker returns.
fn spawn_group<'scope, 'env, F>(
    scope: &'scope thread::Scope<'scope, 'env>,
    stage: &'static str,
    workers: usize,
    done: Sender<Result<()>>,
    work: F,
) where
    F: Fn(usize) -> Result<()> + Send + Sync + 'scope,
{
    let work = Arc::new(work);
    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let work = Arc::clone(&work);
            scope.spawn(move || {
                let _span = tracing::debug_span!("worker", stage, worker).entered();
                work(worker)
            })
        })
        .collect();
    drop(work);

    scope.spawn(move || {
        let mut outcome = Ok(());
        for handle in handles {
            let result = handle.join().unwrap_or_else(|_| Err(Error::WorkerPanicked(stage)));
            if outcome.is_ok() {
                outcome = result;
            }
        }
        if let Err(err) = &outcome {
            tracing::debug!(stage, error = %err, "stage failed");
        }
        // The caller may already have returned on another stage's error.
        let _ = done.send(outcome);
    });
}
