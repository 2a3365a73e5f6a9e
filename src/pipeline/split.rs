//! Unit splitting.

use std::sync::mpsc::SyncSender;

use super::UnitRange;
use crate::dwarf::{DieOffset, DwarfData};
use crate::error::{Error, Result};

/// Walks the unit headers of `.debug_info` and sends one range per unit.
///
/// Every unit root must be a `DW_TAG_compile_unit`. Only the root entry of
/// each unit is read. Returns quietly if the receiving side went away, since
/// that only happens after a downstream stage has already failed.
pub fn split_units(data: &DwarfData<'_>, units: &SyncSender<UnitRange>) -> Result<()> {
    let dwarf = data.gimli();
    let mut prev: Option<DieOffset> = None;
    let mut emitted = 0usize;

    let mut headers = dwarf.units();
    while let Some(header) = headers.next()? {
        let start = header
            .offset()
            .as_debug_info_offset()
            .ok_or_else(|| Error::Unsupported("unit outside .debug_info".into()))?;

        let abbrevs = dwarf.abbreviations(&header)?;
        let mut cursor = header.entries(&abbrevs);
        let tag = match cursor.next_dfs()? {
            Some((_, root)) => root.tag(),
            None => return Err(Error::unexpected(start.0, "unit has no root entry")),
        };
        if tag != gimli::DW_TAG_compile_unit {
            return Err(Error::unexpected(start.0, format!("found unexpected tag {tag} on top level")));
        }

        if let Some(prev) = prev {
            if units.send(UnitRange { start: prev, end: start }).is_err() {
                return Ok(());
            }
            emitted += 1;
        }
        prev = Some(start);
    }

    if let Some(prev) = prev {
        if units
            .send(UnitRange {
                start: prev,
                end: UnitRange::END,
            })
            .is_err()
        {
            return Ok(());
        }
        emitted += 1;
    }
    tracing::debug!(units = emitted, "split compilation units");
    Ok(())
}
