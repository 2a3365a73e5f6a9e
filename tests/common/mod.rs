//! Synthetic kernel objects for integration tests.
//!
//! DWARF is produced with `gimli::write` and wrapped into a 64-bit ELF with
//! `object::write`, so tests never depend on a real kernel build.

#![allow(dead_code)]

use gimli::write::{
    Address, AttributeValue, Dwarf, EndianVec, LineProgram, LineString, Sections, Unit, UnitEntryId, UnitId,
};
use gimli::{DwAte, DwTag, Encoding, Format, LineEncoding, LittleEndian};
use object::write::Object;
use object::{Architecture, BinaryFormat, Endianness, SectionKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DW_ATE_CHERI_INTCAP: DwAte = DwAte(0xa0);
pub const DW_ATE_CHERI_UINTCAP: DwAte = DwAte(0xa1);

static NEXT_FIXTURE: AtomicUsize = AtomicUsize::new(0);

/// A kernel object under construction.
pub struct Fixture {
    dwarf: Dwarf,
    encoding: Encoding,
    extra_sections: Vec<(String, Vec<u8>)>,
    root_tag: Option<DwTag>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dwarf: Dwarf::default(),
            encoding: Encoding {
                format: Format::Dwarf32,
                version: 4,
                address_size: 8,
            },
            extra_sections: Vec::new(),
            root_tag: None,
        }
    }

    /// Adds an empty compile unit.
    pub fn add_unit(&mut self) -> UnitId {
        self.dwarf.units.add(Unit::new(self.encoding, LineProgram::none()))
    }

    /// Adds a compile unit with a one-row line program, so its root carries
    /// `DW_AT_stmt_list` like compiler output does.
    pub fn add_unit_with_lines(&mut self, source: &str) -> UnitId {
        let mut program = LineProgram::new(
            self.encoding,
            LineEncoding::default(),
            LineString::String(b"/usr/src/sys".to_vec()),
            None,
            LineString::String(source.as_bytes().to_vec()),
            None,
        );
        let dir = program.default_directory();
        let file = program.add_file(LineString::String(source.as_bytes().to_vec()), dir, None);
        program.begin_sequence(Some(Address::Constant(0x1000)));
        program.row().file = file;
        program.row().line = 42;
        program.generate_row();
        program.row().address_offset = 8;
        program.row().line = 43;
        program.generate_row();
        program.end_sequence(16);
        self.dwarf.units.add(Unit::new(self.encoding, program))
    }

    pub fn unit(&mut self, id: UnitId) -> UnitBuilder<'_> {
        UnitBuilder {
            unit: self.dwarf.units.get_mut(id),
        }
    }

    /// Adds a non-DWARF section holding `data`.
    pub fn with_section(&mut self, name: &str, data: &[u8]) -> &mut Self {
        self.extra_sections.push((name.to_string(), data.to_vec()));
        self
    }

    /// Rewrites the tag of the first unit's root entry. Only tags that
    /// encode in a single ULEB128 byte are supported.
    pub fn with_root_tag(&mut self, tag: DwTag) -> &mut Self {
        assert!(tag.0 < 0x80);
        self.root_tag = Some(tag);
        self
    }

    /// Writes the ELF to a fresh temporary file.
    pub fn write(&mut self, name: &str) -> PathBuf {
        let mut sections = Sections::new(EndianVec::new(LittleEndian));
        self.dwarf.write(&mut sections).unwrap();

        let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        sections
            .for_each(|id, data| -> gimli::write::Result<()> {
                let mut bytes = data.slice().to_vec();
                if bytes.is_empty() {
                    return Ok(());
                }
                if let (gimli::SectionId::DebugAbbrev, Some(tag)) = (id, self.root_tag) {
                    // Abbreviation code 1 belongs to the first root entry.
                    assert_eq!(bytes[0], 1);
                    bytes[1] = tag.0 as u8;
                }
                let section = obj.add_section(Vec::new(), id.name().as_bytes().to_vec(), SectionKind::Debug);
                obj.set_section_data(section, bytes, 1);
                Ok(())
            })
            .unwrap();
        for (name, data) in &self.extra_sections {
            let section = obj.add_section(Vec::new(), name.as_bytes().to_vec(), SectionKind::Debug);
            obj.set_section_data(section, data.clone(), 1);
        }

        let path = std::env::temp_dir().join(format!(
            "kstructs-{name}-{}-{}.elf",
            std::process::id(),
            NEXT_FIXTURE.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&path, obj.write().unwrap()).unwrap();
        path
    }
}

/// DIE construction helpers for one unit.
pub struct UnitBuilder<'a> {
    unit: &'a mut Unit,
}

impl UnitBuilder<'_> {
    pub fn root(&self) -> UnitEntryId {
        self.unit.root()
    }

    fn entry(&mut self, parent: UnitEntryId, tag: DwTag, name: Option<&str>) -> UnitEntryId {
        let id = self.unit.add(parent, tag);
        if let Some(name) = name {
            self.unit
                .get_mut(id)
                .set(gimli::DW_AT_name, AttributeValue::String(name.as_bytes().to_vec()));
        }
        id
    }

    fn set_udata(&mut self, id: UnitEntryId, attr: gimli::DwAt, value: u64) {
        self.unit.get_mut(id).set(attr, AttributeValue::Udata(value));
    }

    fn set_type(&mut self, id: UnitEntryId, ty: UnitEntryId) {
        self.unit.get_mut(id).set(gimli::DW_AT_type, AttributeValue::UnitRef(ty));
    }

    /// A top-level base type. `None` leaves out the attribute.
    pub fn base_type(
        &mut self,
        name: Option<&str>,
        encoding: Option<DwAte>,
        byte_size: u64,
        bit_size: Option<u64>,
    ) -> UnitEntryId {
        let root = self.root();
        let id = self.entry(root, gimli::DW_TAG_base_type, name);
        if let Some(encoding) = encoding {
            self.unit
                .get_mut(id)
                .set(gimli::DW_AT_encoding, AttributeValue::Encoding(encoding));
        }
        self.set_udata(id, gimli::DW_AT_byte_size, byte_size);
        if let Some(bits) = bit_size {
            self.set_udata(id, gimli::DW_AT_bit_size, bits);
        }
        id
    }

    pub fn int(&mut self) -> UnitEntryId {
        self.base_type(Some("int"), Some(gimli::DW_ATE_signed), 4, None)
    }

    /// A top-level struct with no members yet.
    pub fn structure(&mut self, name: Option<&str>, byte_size: u64) -> UnitEntryId {
        let root = self.root();
        let id = self.entry(root, gimli::DW_TAG_structure_type, name);
        self.set_udata(id, gimli::DW_AT_byte_size, byte_size);
        id
    }

    pub fn member(&mut self, parent: UnitEntryId, name: &str, ty: UnitEntryId, offset: u64) -> UnitEntryId {
        let id = self.entry(parent, gimli::DW_TAG_member, Some(name));
        self.set_type(id, ty);
        self.set_udata(id, gimli::DW_AT_data_member_location, offset);
        id
    }

    /// A bit field member placed with `DW_AT_data_bit_offset`.
    pub fn bit_member(&mut self, parent: UnitEntryId, name: &str, ty: UnitEntryId, bit_offset: u64, bits: u64) {
        let id = self.entry(parent, gimli::DW_TAG_member, Some(name));
        self.set_type(id, ty);
        self.set_udata(id, gimli::DW_AT_data_bit_offset, bit_offset);
        self.set_udata(id, gimli::DW_AT_bit_size, bits);
    }

    pub fn typedef(&mut self, name: &str, ty: UnitEntryId) -> UnitEntryId {
        let root = self.root();
        let id = self.entry(root, gimli::DW_TAG_typedef, Some(name));
        self.set_type(id, ty);
        id
    }

    pub fn pointer(&mut self, ty: UnitEntryId) -> UnitEntryId {
        let root = self.root();
        let id = self.entry(root, gimli::DW_TAG_pointer_type, None);
        self.set_udata(id, gimli::DW_AT_byte_size, 8);
        self.set_type(id, ty);
        id
    }

    /// A one-dimensional array of `count` elements.
    pub fn array(&mut self, element: UnitEntryId, count: u64) -> UnitEntryId {
        let root = self.root();
        let id = self.entry(root, gimli::DW_TAG_array_type, None);
        self.set_type(id, element);
        let range = self.entry(id, gimli::DW_TAG_subrange_type, None);
        self.set_udata(range, gimli::DW_AT_count, count);
        id
    }

    /// A one-dimensional array bounded by `DW_AT_upper_bound`, written as
    /// `DW_FORM_data8` the way GCC emits `-1` for zero-length arrays.
    pub fn array_to(&mut self, element: UnitEntryId, upper_bound: u64) -> UnitEntryId {
        let root = self.root();
        let id = self.entry(root, gimli::DW_TAG_array_type, None);
        self.set_type(id, element);
        let range = self.entry(id, gimli::DW_TAG_subrange_type, None);
        self.unit
            .get_mut(range)
            .set(gimli::DW_AT_upper_bound, AttributeValue::Data8(upper_bound));
        id
    }

    /// An arbitrary top-level entry, for tags the resolver does not handle.
    pub fn other(&mut self, tag: DwTag, name: &str) -> UnitEntryId {
        let root = self.root();
        self.entry(root, tag, Some(name))
    }
}

/// A unit with a line program and `count` distinct `int`-only structs
/// named `{prefix}{i}`.
pub fn add_int_structs(fixture: &mut Fixture, prefix: &str, count: usize) {
    let unit = fixture.add_unit_with_lines(&format!("{prefix}.c"));
    let mut unit = fixture.unit(unit);
    let int = unit.int();
    for i in 0..count {
        let st = unit.structure(Some(&format!("{prefix}{i}")), 8);
        unit.member(st, "a", int, 0);
        unit.member(st, "b", int, 4);
    }
}
