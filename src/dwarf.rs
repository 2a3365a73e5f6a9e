//! Shared DWARF view.
//!
//! [`DwarfData`] wraps a gimli [`gimli::Dwarf`] borrowing the mapped object
//! file, an index of unit start offsets, and the write-once capability type
//! cache that resolvers consult before parsing a DIE themselves.

use gimli::{
    AttributeValue, DebugAddrBase, DebugInfoOffset, DebugLocListsBase, DebugRngListsBase, DebugStrOffsetsBase,
    EndianSlice, RunTimeEndian, SectionId, UnitHeader, UnitType,
};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::loader::ObjectFile;
use crate::types::Type;

/// Reader type for every DWARF section we touch.
pub type Reader<'data> = EndianSlice<'data, RunTimeEndian>;

/// Global `.debug_info` offset of a DIE.
pub type DieOffset = DebugInfoOffset<usize>;

/// Pre-built types keyed by the offset of the DIE they replace.
pub type TypeCache = HashMap<DieOffset, Type>;

/// DWARF debug information of one object file.
pub struct DwarfData<'data> {
    dwarf: gimli::Dwarf<Reader<'data>>,
    unit_starts: Vec<DieOffset>,
    type_cache: OnceLock<TypeCache>,
}

impl<'data> DwarfData<'data> {
    pub(crate) fn load(file: &'data ObjectFile) -> Result<Self> {
        if file.section_data(SectionId::DebugInfo.name()).is_none() {
            return Err(Error::Unsupported(format!(
                "{} has no .debug_info section",
                file.path().display()
            )));
        }

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let dwarf = gimli::Dwarf::load(|id: SectionId| -> Result<Reader<'data>> {
            let data = file.section_data(id.name()).unwrap_or(&[]);
            Ok(EndianSlice::new(data, endian))
        })?;

        let mut unit_starts = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers.next()? {
            if let Some(offset) = header.offset().as_debug_info_offset() {
                unit_starts.push(offset);
            }
        }
        tracing::debug!(units = unit_starts.len(), "opened DWARF");

        Ok(Self {
            dwarf,
            unit_starts,
            type_cache: OnceLock::new(),
        })
    }

    /// The underlying gimli view.
    pub fn gimli(&self) -> &gimli::Dwarf<Reader<'data>> {
        &self.dwarf
    }

    /// Start offsets of every unit in `.debug_info`, ascending.
    pub fn unit_starts(&self) -> &[DieOffset] {
        &self.unit_starts
    }

    /// Header of the unit starting at `start`.
    pub fn header_at(&self, start: DieOffset) -> Result<UnitHeader<Reader<'data>>> {
        Ok(self.dwarf.debug_info.header_from_offset(start)?)
    }

    /// Parses the unit starting at `start` without its line program.
    ///
    /// `gimli::Dwarf::unit` parses the program `DW_AT_stmt_list` points at,
    /// which fails once `.debug_line` has been pruned. Only the root
    /// attributes needed to decode type entries are read here.
    pub fn unit_at(&self, start: DieOffset) -> Result<gimli::Unit<Reader<'data>>> {
        let header = self.header_at(start)?;
        let abbreviations = self.dwarf.abbreviations(&header)?;
        let encoding = header.encoding();
        let file_type = self.dwarf.file_type;
        let dwo_id = match header.type_() {
            UnitType::Skeleton(id) | UnitType::SplitCompilation(id) => Some(id),
            _ => None,
        };
        let mut unit = gimli::Unit {
            header,
            abbreviations,
            name: None,
            comp_dir: None,
            low_pc: 0,
            str_offsets_base: DebugStrOffsetsBase::default_for_encoding_and_file(encoding, file_type),
            addr_base: DebugAddrBase(0),
            loclists_base: DebugLocListsBase::default_for_encoding_and_file(encoding, file_type),
            rnglists_base: DebugRngListsBase::default_for_encoding_and_file(encoding, file_type),
            line_program: None,
            dwo_id,
        };

        {
            let mut cursor = unit.header.entries(&unit.abbreviations);
            let Some((_, root)) = cursor.next_dfs()? else {
                return Err(Error::unexpected(start.0, "unit has no root entry"));
            };
            let mut attrs = root.attrs();
            while let Some(attr) = attrs.next()? {
                match attr.value() {
                    AttributeValue::DebugStrOffsetsBase(base) => unit.str_offsets_base = base,
                    AttributeValue::DebugAddrBase(base) => unit.addr_base = base,
                    AttributeValue::DebugLocListsBase(base) => unit.loclists_base = base,
                    AttributeValue::DebugRngListsBase(base) => unit.rnglists_base = base,
                    _ => {}
                }
            }
        }
        Ok(unit)
    }

    /// Start of the last unit beginning at or before `offset`.
    ///
    /// The caller still has to check that `offset` lies within that unit.
    pub fn unit_start_for(&self, offset: DieOffset) -> Result<DieOffset> {
        match self.unit_starts.binary_search(&offset) {
            Ok(index) => Ok(self.unit_starts[index]),
            Err(0) => Err(Error::unexpected(offset.0, "offset precedes the first unit")),
            Err(index) => Ok(self.unit_starts[index - 1]),
        }
    }

    /// Installs the capability type cache. Only the first call succeeds.
    pub fn install_type_cache(&self, cache: TypeCache) -> Result<()> {
        let installed = cache.len();
        self.type_cache
            .set(cache)
            .map_err(|_| Error::Unsupported("type cache installed twice".into()))?;
        tracing::debug!(installed, "installed capability type cache");
        Ok(())
    }

    /// The installed type cache, if any.
    pub fn type_cache(&self) -> Option<&TypeCache> {
        self.type_cache.get()
    }
}

/// Unsigned constant value of attribute `name`, if present.
pub(crate) fn attr_udata(
    entry: &gimli::DebuggingInformationEntry<'_, '_, Reader<'_>>,
    name: gimli::DwAt,
) -> Result<Option<u64>> {
    Ok(entry.attr(name)?.and_then(|attr| attr.udata_value()))
}

/// String value of attribute `name`, or an empty string.
pub(crate) fn attr_name<'data>(
    dwarf: &gimli::Dwarf<Reader<'data>>,
    unit: &gimli::Unit<Reader<'data>>,
    entry: &gimli::DebuggingInformationEntry<'_, '_, Reader<'data>>,
) -> Result<String> {
    match entry.attr_value(gimli::DW_AT_name)? {
        Some(value) => Ok(dwarf.attr_string(unit, value)?.to_string_lossy().into_owned()),
        None => Ok(String::new()),
    }
}

/// Global offset of an entry within `unit`.
pub(crate) fn die_offset(unit: &gimli::Unit<Reader<'_>>, offset: gimli::UnitOffset<usize>) -> Result<DieOffset> {
    offset
        .to_debug_info_offset(&unit.header)
        .ok_or_else(|| Error::unexpected(offset.0, "entry is not in .debug_info"))
}
