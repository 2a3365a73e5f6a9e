//! DWARF type resolution.
//!
//! [`TypeResolver`] turns a DIE offset into a [`Type`], recursing through
//! member, element and typedef references. Lookups go through three layers:
//! the capability cache installed on [`DwarfData`], then this resolver's
//! private cache, then the DIE itself. A resolver is owned by one worker; its
//! caches are never shared, so workers never race on first-time resolution.

use gimli::{AttributeValue, DwAte, DwTag, Operation, UnitOffset};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use crate::capability::BaseTypeEntry;
use crate::dwarf::{self, DieOffset, DwarfData, Reader};
use crate::error::{Error, Result};
use crate::types::{
    ArrayType, BasicKind, BasicType, EnumType, EnumValue, FuncType, PointerType, QualifiedType, Qualifier,
    StructField, StructKind, StructType, Type, TypedefType,
};

type Unit<'data> = gimli::Unit<Reader<'data>>;
type Entry<'abbrev, 'unit, 'data> = gimli::DebuggingInformationEntry<'abbrev, 'unit, Reader<'data>>;

/// Resolves DIE offsets to types.
pub struct TypeResolver<'a, 'data> {
    data: &'a DwarfData<'data>,
    units: HashMap<DieOffset, Rc<Unit<'data>>>,
    cache: HashMap<DieOffset, Type>,
    in_progress: HashSet<DieOffset>,
}

impl<'a, 'data> TypeResolver<'a, 'data> {
    pub fn new(data: &'a DwarfData<'data>) -> Self {
        Self {
            data,
            units: HashMap::new(),
            cache: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Resolves the type described by the DIE at `offset`.
    pub fn resolve(&mut self, offset: DieOffset) -> Result<Type> {
        if let Some(ty) = self.data.type_cache().and_then(|cache| cache.get(&offset)) {
            return Ok(ty.clone());
        }
        if let Some(ty) = self.cache.get(&offset) {
            return Ok(ty.clone());
        }
        if !self.in_progress.insert(offset) {
            return Err(Error::unexpected(offset.0, "type refers to itself by value"));
        }
        let parsed = self.parse(offset);
        self.in_progress.remove(&offset);

        let ty = parsed?;
        tracing::trace!(offset = offset.0, ty = %ty, "resolved type");
        self.cache.insert(offset, ty.clone());
        Ok(ty)
    }

    /// Number of types resolved from DIEs so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn unit_for(&mut self, offset: DieOffset) -> Result<Rc<Unit<'data>>> {
        let start = self.data.unit_start_for(offset)?;
        if let Some(unit) = self.units.get(&start) {
            return Ok(Rc::clone(unit));
        }
        let unit = Rc::new(self.data.unit_at(start)?);
        self.units.insert(start, Rc::clone(&unit));
        Ok(unit)
    }

    fn unit_offset(unit: &Unit<'data>, offset: DieOffset) -> Result<UnitOffset<usize>> {
        offset
            .to_unit_offset(&unit.header)
            .ok_or_else(|| Error::unexpected(offset.0, "offset lies outside every unit"))
    }

    /// Tag of the entry at `offset`.
    pub fn tag(&mut self, offset: DieOffset) -> Result<DwTag> {
        let unit = self.unit_for(offset)?;
        let entry = unit.entry(Self::unit_offset(&unit, offset)?)?;
        Ok(entry.tag())
    }

    /// Tag of the entry a chain of typedefs starting at `offset` ends at,
    /// without resolving anything. `None` for a typedef of `void`. An offset
    /// that is not a typedef yields its own tag.
    pub fn typedef_target(&mut self, offset: DieOffset) -> Result<Option<DwTag>> {
        let mut seen = HashSet::new();
        let mut current = offset;
        loop {
            if !seen.insert(current) {
                return Err(Error::unexpected(offset.0, "typedef refers to itself"));
            }
            let unit = self.unit_for(current)?;
            let entry = unit.entry(Self::unit_offset(&unit, current)?)?;
            if entry.tag() != gimli::DW_TAG_typedef {
                return Ok(Some(entry.tag()));
            }
            match self.type_ref_offset(&unit, &entry)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
    }

    fn parse(&mut self, offset: DieOffset) -> Result<Type> {
        let unit = self.unit_for(offset)?;
        let entry = unit.entry(Self::unit_offset(&unit, offset)?)?;

        match entry.tag() {
            gimli::DW_TAG_base_type => self.base_type(&unit, &entry),
            gimli::DW_TAG_structure_type => self.struct_type(&unit, &entry, StructKind::Struct),
            gimli::DW_TAG_class_type => self.struct_type(&unit, &entry, StructKind::Class),
            gimli::DW_TAG_union_type => self.struct_type(&unit, &entry, StructKind::Union),
            gimli::DW_TAG_enumeration_type => self.enum_type(&unit, &entry),
            gimli::DW_TAG_array_type => self.array_type(&unit, &entry),
            gimli::DW_TAG_pointer_type
            | gimli::DW_TAG_reference_type
            | gimli::DW_TAG_rvalue_reference_type => self.pointer_type(&unit, &entry),
            gimli::DW_TAG_typedef => {
                let name = dwarf::attr_name(self.data.gimli(), &unit, &entry)?;
                let ty = self.type_ref(&unit, &entry)?;
                Ok(Type::Typedef(Arc::new(TypedefType { name, ty })))
            }
            gimli::DW_TAG_const_type => self.qualified(&unit, &entry, Qualifier::Const),
            gimli::DW_TAG_volatile_type => self.qualified(&unit, &entry, Qualifier::Volatile),
            gimli::DW_TAG_restrict_type => self.qualified(&unit, &entry, Qualifier::Restrict),
            gimli::DW_TAG_atomic_type => self.qualified(&unit, &entry, Qualifier::Atomic),
            gimli::DW_TAG_subroutine_type => self.func_type(&unit, &entry),
            gimli::DW_TAG_unspecified_type => {
                Ok(Type::Unspecified(dwarf::attr_name(self.data.gimli(), &unit, &entry)?))
            }
            tag => Err(Error::unexpected(offset.0, format!("unsupported type tag {}", tag_name(tag)))),
        }
    }

    /// The type `DW_AT_type` points at, or `void` when absent.
    fn type_ref(&mut self, unit: &Unit<'data>, entry: &Entry<'_, '_, 'data>) -> Result<Type> {
        match self.type_ref_offset(unit, entry)? {
            Some(offset) => self.resolve(offset),
            None => Ok(Type::Void),
        }
    }

    fn type_ref_offset(&self, unit: &Unit<'data>, entry: &Entry<'_, '_, 'data>) -> Result<Option<DieOffset>> {
        match entry.attr_value(gimli::DW_AT_type)? {
            None => Ok(None),
            Some(AttributeValue::UnitRef(offset)) => Ok(Some(dwarf::die_offset(unit, offset)?)),
            Some(AttributeValue::DebugInfoRef(offset)) => Ok(Some(offset)),
            Some(_) => Err(Error::unexpected(
                global_offset(unit, entry.offset()),
                "unsupported DW_AT_type form",
            )),
        }
    }

    fn base_type(&mut self, unit: &Unit<'data>, entry: &Entry<'_, '_, 'data>) -> Result<Type> {
        let raw = BaseTypeEntry::read(self.data.gimli(), unit, entry)?;
        let encoding = raw
            .encoding
            .ok_or_else(|| Error::unexpected(raw.offset.0, format!("missing encoding attribute for {}", raw.name)))?;
        let kind = standard_kind(encoding).ok_or_else(|| {
            Error::unexpected(raw.offset.0, format!("unrecognized encoding {encoding} for {}", raw.name))
        })?;
        Ok(Type::Basic(BasicType {
            kind,
            name: raw.name,
            byte_size: raw.byte_size,
            bit_size: raw.bit_size,
            bit_offset: raw.bit_offset,
            data_bit_offset: raw.data_bit_offset,
        }))
    }

    fn struct_type(&mut self, unit: &Unit<'data>, entry: &Entry<'_, '_, 'data>, kind: StructKind) -> Result<Type> {
        let name = dwarf::attr_name(self.data.gimli(), unit, entry)?;
        let byte_size = dwarf::attr_udata(entry, gimli::DW_AT_byte_size)?.unwrap_or(0);
        let incomplete = entry.attr(gimli::DW_AT_declaration)?.is_some();

        let mut fields = Vec::new();
        let mut tree = unit.entries_tree(Some(entry.offset()))?;
        let root = tree.root()?;
        let mut children = root.children();
        while let Some(child) = children.next()? {
            let member = child.entry();
            if member.tag() != gimli::DW_TAG_member {
                continue;
            }
            let bit_size = dwarf::attr_udata(member, gimli::DW_AT_bit_size)?.unwrap_or(0);
            let data_bit_offset = dwarf::attr_udata(member, gimli::DW_AT_data_bit_offset)?;
            let byte_offset = match data_bit_offset {
                Some(bits) if member.attr(gimli::DW_AT_data_member_location)?.is_none() => bits / 8,
                _ => member_location(unit, member)?,
            };
            fields.push(StructField {
                name: dwarf::attr_name(self.data.gimli(), unit, member)?,
                ty: self.type_ref(unit, member)?,
                byte_offset,
                byte_size: dwarf::attr_udata(member, gimli::DW_AT_byte_size)?.unwrap_or(0),
                bit_offset: dwarf::attr_udata(member, gimli::DW_AT_bit_offset)?.unwrap_or(0),
                data_bit_offset: data_bit_offset.unwrap_or(0),
                bit_size,
            });
        }

        Ok(Type::Struct(Arc::new(StructType {
            kind,
            name,
            byte_size,
            incomplete,
            fields,
        })))
    }

    fn enum_type(&mut self, unit: &Unit<'data>, entry: &Entry<'_, '_, 'data>) -> Result<Type> {
        let mut values = Vec::new();
        let mut tree = unit.entries_tree(Some(entry.offset()))?;
        let root = tree.root()?;
        let mut children = root.children();
        while let Some(child) = children.next()? {
            let enumerator = child.entry();
            if enumerator.tag() != gimli::DW_TAG_enumerator {
                continue;
            }
            let value = enumerator
                .attr(gimli::DW_AT_const_value)?
                .and_then(|attr| attr.sdata_value().or_else(|| attr.udata_value().map(|v| v as i64)))
                .unwrap_or(0);
            values.push(EnumValue {
                name: dwarf::attr_name(self.data.gimli(), unit, enumerator)?,
                value,
            });
        }
        Ok(Type::Enum(Arc::new(EnumType {
            name: dwarf::attr_name(self.data.gimli(), unit, entry)?,
            byte_size: dwarf::attr_udata(entry, gimli::DW_AT_byte_size)?.unwrap_or(0),
            values,
        })))
    }

    fn array_type(&mut self, unit: &Unit<'data>, entry: &Entry<'_, '_, 'data>) -> Result<Type> {
        let element = self.type_ref(unit, entry)?;

        let mut dims = Vec::new();
        let mut tree = unit.entries_tree(Some(entry.offset()))?;
        let root = tree.root()?;
        let mut children = root.children();
        while let Some(child) = children.next()? {
            let subrange = child.entry();
            if subrange.tag() != gimli::DW_TAG_subrange_type {
                continue;
            }
            dims.push(subrange_count(subrange)?);
        }
        if dims.is_empty() {
            dims.push(None);
        }

        // int a[2][3] nests as array(2) of array(3) of int.
        let declared_size = dwarf::attr_udata(entry, gimli::DW_AT_byte_size)?;
        let mut ty = element;
        for (level, count) in dims.into_iter().enumerate().rev() {
            let byte_size = match (level, declared_size) {
                (0, Some(size)) => size,
                _ => count.unwrap_or(0).saturating_mul(ty.byte_size()),
            };
            ty = Type::Array(Arc::new(ArrayType {
                element: ty,
                count,
                byte_size,
            }));
        }
        Ok(ty)
    }

    fn pointer_type(&mut self, unit: &Unit<'data>, entry: &Entry<'_, '_, 'data>) -> Result<Type> {
        let byte_size = dwarf::attr_udata(entry, gimli::DW_AT_byte_size)?
            .unwrap_or_else(|| u64::from(unit.encoding().address_size));
        Ok(Type::Pointer(PointerType {
            name: dwarf::attr_name(self.data.gimli(), unit, entry)?,
            byte_size,
            pointee: self.type_ref_offset(unit, entry)?,
        }))
    }

    fn qualified(&mut self, unit: &Unit<'data>, entry: &Entry<'_, '_, 'data>, qualifier: Qualifier) -> Result<Type> {
        let ty = self.type_ref(unit, entry)?;
        Ok(Type::Qualified(Arc::new(QualifiedType { qualifier, ty })))
    }

    fn func_type(&mut self, unit: &Unit<'data>, entry: &Entry<'_, '_, 'data>) -> Result<Type> {
        let return_type = self.type_ref(unit, entry)?;
        let mut params = Vec::new();
        let mut variadic = false;

        let mut tree = unit.entries_tree(Some(entry.offset()))?;
        let root = tree.root()?;
        let mut children = root.children();
        while let Some(child) = children.next()? {
            let param = child.entry();
            match param.tag() {
                gimli::DW_TAG_formal_parameter => params.push(self.type_ref(unit, param)?),
                gimli::DW_TAG_unspecified_parameters => variadic = true,
                _ => {}
            }
        }
        Ok(Type::Func(Arc::new(FuncType {
            return_type,
            params,
            variadic,
        })))
    }
}

fn global_offset(unit: &Unit<'_>, offset: UnitOffset<usize>) -> usize {
    offset
        .to_debug_info_offset(&unit.header)
        .map_or(offset.0, |offset| offset.0)
}

fn tag_name(tag: DwTag) -> String {
    tag.static_string()
        .map_or_else(|| format!("{:#x}", tag.0), str::to_string)
}

/// Kind for the encodings DWARF itself defines.
fn standard_kind(encoding: DwAte) -> Option<BasicKind> {
    Some(match encoding {
        gimli::DW_ATE_address => BasicKind::Address,
        gimli::DW_ATE_boolean => BasicKind::Bool,
        gimli::DW_ATE_complex_float => BasicKind::Complex,
        gimli::DW_ATE_float => BasicKind::Float,
        gimli::DW_ATE_signed => BasicKind::Int,
        gimli::DW_ATE_signed_char => BasicKind::Char,
        gimli::DW_ATE_unsigned => BasicKind::Uint,
        gimli::DW_ATE_unsigned_char => BasicKind::UnsignedChar,
        gimli::DW_ATE_imaginary_float => BasicKind::Imaginary,
        gimli::DW_ATE_UTF => BasicKind::Utf,
        _ => return None,
    })
}

/// Byte offset of a member from `DW_AT_data_member_location`.
fn member_location(unit: &Unit<'_>, member: &Entry<'_, '_, '_>) -> Result<u64> {
    match member.attr_value(gimli::DW_AT_data_member_location)? {
        None => Ok(0),
        Some(AttributeValue::Exprloc(expr)) => {
            let mut ops = expr.operations(unit.encoding());
            match ops.next()? {
                Some(Operation::PlusConstant { value }) => Ok(value),
                _ => Err(Error::unexpected(
                    global_offset(unit, member.offset()),
                    "unsupported member location expression",
                )),
            }
        }
        Some(value) => value.udata_value().ok_or_else(|| {
            Error::unexpected(global_offset(unit, member.offset()), "unsupported member location form")
        }),
    }
}

/// Element count of a `DW_TAG_subrange_type`, `None` when unbounded.
///
/// GCC describes zero-length arrays (`char data[0]`) with an upper bound of
/// -1, stored either as a negative `sdata` or as all-ones; both count zero.
fn subrange_count(subrange: &Entry<'_, '_, '_>) -> Result<Option<u64>> {
    if let Some(count) = dwarf::attr_udata(subrange, gimli::DW_AT_count)? {
        return Ok(Some(count));
    }
    let lower = dwarf::attr_udata(subrange, gimli::DW_AT_lower_bound)?.unwrap_or(0);
    Ok(match subrange.attr_value(gimli::DW_AT_upper_bound)? {
        None => None,
        Some(AttributeValue::Sdata(upper)) if upper < 0 => Some(0),
        Some(value) => value.udata_value().map(|upper| bound_count(lower, upper)),
    })
}

/// Elements in the inclusive range `lower..=upper`.
fn bound_count(lower: u64, upper: u64) -> u64 {
    upper.checked_add(1).map_or(0, |end| end.saturating_sub(lower))
}
