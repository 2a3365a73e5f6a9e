//! Result collection.

use std::sync::{Mutex, PoisonError};

use super::SharedReceiver;
use crate::error::Result;
use crate::types::StructMap;

/// Merges struct maps until the resolvers are done; later batches overwrite
/// earlier ones on name collisions.
pub(super) fn collect(structs: &SharedReceiver<StructMap>, result: &Mutex<StructMap>) -> Result<()> {
    let mut merged = StructMap::new();
    let mut batches = 0usize;
    while let Some(batch) = structs.recv() {
        merged.extend(batch);
        batches += 1;
    }
    tracing::debug!(batches, structs = merged.len(), "collected structs");
    *result.lock().unwrap_or_else(PoisonError::into_inner) = merged;
    Ok(())
}
