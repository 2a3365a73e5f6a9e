//! Capability integer base types.
//!
//! CHERI toolchains describe `intcap_t` and `uintcap_t` with vendor
//! `DW_AT_encoding` values that no general-purpose resolver understands.
//! Base-type DIEs are snapshotted while scanning units, and the ones carrying
//! these encodings are turned into [`BasicType`]s keyed by DIE offset so the
//! resolver can hand them out instead of rejecting the encoding.

use gimli::{AttributeValue, DwAte};

use crate::dwarf::{self, DieOffset, Reader, TypeCache};
use crate::error::{Error, Result};
use crate::types::{BasicKind, BasicType, Type};

/// Signed capability integer encoding.
pub const DW_ATE_CHERI_INTCAP: DwAte = DwAte(0xa0);
/// Unsigned capability integer encoding.
pub const DW_ATE_CHERI_UINTCAP: DwAte = DwAte(0xa1);

/// Owned snapshot of a `DW_TAG_base_type` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTypeEntry {
    pub offset: DieOffset,
    pub encoding: Option<DwAte>,
    pub name: String,
    pub byte_size: u64,
    pub bit_size: u64,
    pub bit_offset: u64,
    pub data_bit_offset: u64,
}

impl BaseTypeEntry {
    /// Reads the attributes of `entry`. Missing sizes and offsets are zero.
    pub(crate) fn read<'data>(
        dwarf: &gimli::Dwarf<Reader<'data>>,
        unit: &gimli::Unit<Reader<'data>>,
        entry: &gimli::DebuggingInformationEntry<'_, '_, Reader<'data>>,
    ) -> Result<Self> {
        let encoding = match entry.attr_value(gimli::DW_AT_encoding)? {
            Some(AttributeValue::Encoding(ate)) => Some(ate),
            Some(other) => other.udata_value().and_then(|v| u8::try_from(v).ok()).map(DwAte),
            None => None,
        };
        Ok(Self {
            offset: dwarf::die_offset(unit, entry.offset())?,
            encoding,
            name: dwarf::attr_name(dwarf, unit, entry)?,
            byte_size: dwarf::attr_udata(entry, gimli::DW_AT_byte_size)?.unwrap_or(0),
            bit_size: dwarf::attr_udata(entry, gimli::DW_AT_bit_size)?.unwrap_or(0),
            bit_offset: dwarf::attr_udata(entry, gimli::DW_AT_bit_offset)?.unwrap_or(0),
            data_bit_offset: dwarf::attr_udata(entry, gimli::DW_AT_data_bit_offset)?.unwrap_or(0),
        })
    }
}

/// Capability kind for `encoding`, `None` for every standard encoding.
pub fn capability_kind(encoding: DwAte) -> Option<BasicKind> {
    match encoding {
        DW_ATE_CHERI_INTCAP => Some(BasicKind::IntCap),
        DW_ATE_CHERI_UINTCAP => Some(BasicKind::UintCap),
        _ => None,
    }
}

/// Builds the capability descriptor for `entry`.
///
/// Returns `Ok(None)` for standard encodings and an error when the entry has
/// no encoding at all.
pub fn capability_type(entry: &BaseTypeEntry) -> Result<Option<BasicType>> {
    let encoding = entry
        .encoding
        .ok_or_else(|| Error::unexpected(entry.offset.0, "missing encoding attr"))?;
    Ok(capability_kind(encoding).map(|kind| BasicType {
        kind,
        name: entry.name.clone(),
        byte_size: entry.byte_size,
        bit_size: entry.bit_size,
        bit_offset: entry.bit_offset,
        data_bit_offset: entry.data_bit_offset,
    }))
}

/// Adds a descriptor for every capability entry in `entries` to `cache`.
pub fn collect_into<'a>(cache: &mut TypeCache, entries: impl IntoIterator<Item = &'a BaseTypeEntry>) -> Result<()> {
    for entry in entries {
        if let Some(basic) = capability_type(entry)? {
            tracing::trace!(offset = entry.offset.0, name = %basic.name, "capability base type");
            cache.insert(entry.offset, Type::Basic(basic));
        }
    }
    Ok(())
}
