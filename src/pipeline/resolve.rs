//! Capability cache installation and struct resolution.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Barrier, Mutex, PoisonError};

use super::SharedReceiver;
use crate::capability::{self, BaseTypeEntry};
use crate::dwarf::{DieOffset, DwarfData, TypeCache};
use crate::error::{Error, Result};
use crate::resolver::TypeResolver;
use crate::types::{StructMap, StructType, Type};

/// Worker that installs the merged capability cache.
const INSTALLING_WORKER: usize = 0;

/// Rendezvous between resolver workers for the one-time cache install.
///
/// Every worker passes through both barriers exactly once, even after an
/// error, so nobody is left waiting.
pub(super) struct Installer<'a, 'data> {
    data: &'a DwarfData<'data>,
    staged: Mutex<TypeCache>,
    failed: AtomicBool,
    barrier: Barrier,
}

impl<'a, 'data> Installer<'a, 'data> {
    pub(super) fn new(data: &'a DwarfData<'data>, workers: usize) -> Self {
        Self {
            data,
            staged: Mutex::new(TypeCache::new()),
            failed: AtomicBool::new(false),
            barrier: Barrier::new(workers),
        }
    }

    /// Stages this worker's capability types and waits until the merged
    /// cache is installed. Returns `Ok(false)` if another worker failed.
    fn install(&self, worker: usize, local: Result<TypeCache>) -> Result<bool> {
        let mut outcome = match local {
            Ok(cache) => {
                self.staged.lock().unwrap_or_else(PoisonError::into_inner).extend(cache);
                Ok(())
            }
            Err(err) => {
                self.failed.store(true, Ordering::SeqCst);
                Err(err)
            }
        };

        self.barrier.wait();
        if worker == INSTALLING_WORKER && !self.failed.load(Ordering::SeqCst) {
            let merged = mem::take(&mut *self.staged.lock().unwrap_or_else(PoisonError::into_inner));
            if let Err(err) = self.data.install_type_cache(merged) {
                self.failed.store(true, Ordering::SeqCst);
                outcome = Err(err);
            }
        }
        self.barrier.wait();

        outcome?;
        Ok(!self.failed.load(Ordering::SeqCst))
    }
}

/// Drains every base-type batch into capability descriptors.
fn drain_base_types(base_types: &SharedReceiver<Vec<BaseTypeEntry>>) -> Result<TypeCache> {
    let mut cache = TypeCache::new();
    while let Some(batch) = base_types.recv() {
        capability::collect_into(&mut cache, &batch)?;
    }
    Ok(cache)
}

/// Resolver worker.
pub(super) fn resolve_structs(
    worker: usize,
    installer: &Installer<'_, '_>,
    base_types: &SharedReceiver<Vec<BaseTypeEntry>>,
    offsets: &SharedReceiver<Vec<DieOffset>>,
    structs: &SyncSender<StructMap>,
) -> Result<()> {
    let local = drain_base_types(base_types);
    if !installer.install(worker, local)? {
        return Ok(());
    }

    let mut resolver = TypeResolver::new(installer.data);
    while let Some(batch) = offsets.recv() {
        let found = resolve_batch(&mut resolver, &batch)?;
        tracing::debug!(offsets = batch.len(), structs = found.len(), "resolved batch");
        if !found.is_empty() && structs.send(found).is_err() {
            return Ok(());
        }
    }
    tracing::debug!(types = resolver.cached(), "resolver finished");
    Ok(())
}

/// Resolves one batch of struct/typedef offsets into named structs.
///
/// Typedef chains that do not end at a struct, class or union are skipped
/// without being resolved. Anonymous or zero-sized structs are skipped too;
/// any other resolved type means the offset was not what the scanner took
/// it for.
pub fn resolve_batch(resolver: &mut TypeResolver<'_, '_>, batch: &[DieOffset]) -> Result<StructMap> {
    let mut structs = StructMap::new();
    for &offset in batch {
        if resolver.tag(offset)? == gimli::DW_TAG_typedef
            && !matches!(
                resolver.typedef_target(offset)?,
                Some(gimli::DW_TAG_structure_type | gimli::DW_TAG_class_type | gimli::DW_TAG_union_type)
            )
        {
            continue;
        }
        match resolver.resolve(offset)? {
            Type::Struct(st) => record(&mut structs, &st.name, &st),
            Type::Typedef(td) => {
                if let Type::Struct(st) = &td.ty {
                    record(&mut structs, &td.name, st);
                }
            }
            other => {
                return Err(Error::unexpected(
                    offset.0,
                    format!("got {other} instead of a struct or typedef"),
                ))
            }
        }
    }
    Ok(structs)
}

fn record(structs: &mut StructMap, name: &str, st: &Arc<StructType>) {
    if name.is_empty() || st.byte_size == 0 {
        return;
    }
    structs.insert(name.to_string(), Arc::clone(st));
}
