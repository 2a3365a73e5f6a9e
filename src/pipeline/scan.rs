//! Offset scanning.

use std::sync::mpsc::{Sender, SyncSender};

use super::{SharedReceiver, UnitRange};
use crate::capability::BaseTypeEntry;
use crate::dwarf::{self, DieOffset, DwarfData};
use crate::error::Result;

/// What one unit contributes to the resolver stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnitScan {
    /// Struct and typedef entries directly below the unit root.
    pub offsets: Vec<DieOffset>,
    /// Base-type entries directly below the unit root.
    pub base_types: Vec<BaseTypeEntry>,
}

/// Lists the direct children of the unit at `range.start` that the resolver
/// stage needs. Children of those entries are never visited: struct members
/// are resolved later, when their struct is.
pub fn scan_unit(data: &DwarfData<'_>, range: UnitRange) -> Result<UnitScan> {
    let dwarf = data.gimli();
    let unit = data.unit_at(range.start)?;
    let mut scan = UnitScan::default();

    let mut tree = unit.entries_tree(None)?;
    let root = tree.root()?;
    let mut children = root.children();
    while let Some(child) = children.next()? {
        let entry = child.entry();
        let offset = dwarf::die_offset(&unit, entry.offset())?;
        if offset >= range.end {
            break;
        }
        match entry.tag() {
            gimli::DW_TAG_structure_type | gimli::DW_TAG_typedef => scan.offsets.push(offset),
            gimli::DW_TAG_base_type => scan.base_types.push(BaseTypeEntry::read(dwarf, &unit, entry)?),
            _ => {}
        }
    }
    Ok(scan)
}

/// Scanner worker: takes units until the splitter is done.
pub(super) fn scan_units(
    data: &DwarfData<'_>,
    units: &SharedReceiver<UnitRange>,
    offsets: &Sender<Vec<DieOffset>>,
    base_types: &SyncSender<Vec<BaseTypeEntry>>,
) -> Result<()> {
    while let Some(range) = units.recv() {
        let scan = scan_unit(data, range)?;
        tracing::debug!(
            unit = range.start.0,
            offsets = scan.offsets.len(),
            base_types = scan.base_types.len(),
            "scanned unit"
        );
        if offsets.send(scan.offsets).is_err() || base_types.send(scan.base_types).is_err() {
            return Ok(());
        }
    }
    Ok(())
}
