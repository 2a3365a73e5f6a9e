//! Resolved type model.
//!
//! These mirror the shapes of C types as DWARF describes them. Aggregates are
//! reference counted so a resolved struct can be shared between the resolver
//! cache, enclosing types and the final result map. Pointers are shallow:
//! they record the offset of the pointee DIE rather than the resolved pointee,
//! which keeps self-referential structs finite.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dwarf::DieOffset;

/// Map of struct or typedef name to the struct it names.
pub type StructMap = HashMap<String, Arc<StructType>>;

/// Kind of a [`BasicType`], derived from `DW_AT_encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Address,
    Bool,
    Char,
    UnsignedChar,
    Int,
    Uint,
    Float,
    Complex,
    Imaginary,
    Utf,
    /// Signed capability integer (`intcap_t`).
    IntCap,
    /// Unsigned capability integer (`uintcap_t`).
    UintCap,
}

impl BasicKind {
    pub fn is_capability(self) -> bool {
        matches!(self, Self::IntCap | Self::UintCap)
    }
}

/// A base type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicType {
    pub kind: BasicKind,
    pub name: String,
    pub byte_size: u64,
    pub bit_size: u64,
    pub bit_offset: u64,
    pub data_bit_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructKind {
    Struct,
    Class,
    Union,
}

impl StructKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Struct => "struct",
            Self::Class => "class",
            Self::Union => "union",
        }
    }
}

/// A struct, class or union.
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub kind: StructKind,
    /// Tag name, empty for anonymous aggregates.
    pub name: String,
    pub byte_size: u64,
    /// Set for forward declarations (`DW_AT_declaration`).
    pub incomplete: bool,
    pub fields: Vec<StructField>,
}

/// One member of a [`StructType`].
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
    pub byte_offset: u64,
    /// Size of the storage unit for bit fields, zero otherwise.
    pub byte_size: u64,
    pub bit_offset: u64,
    pub data_bit_offset: u64,
    /// Width of a bit field, zero for ordinary members.
    pub bit_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub byte_size: u64,
    pub values: Vec<EnumValue>,
}

/// A one-dimensional array; multi-dimensional arrays nest.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub element: Type,
    /// Element count, `None` for flexible or unknown bounds.
    pub count: Option<u64>,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerType {
    pub name: String,
    pub byte_size: u64,
    /// DIE of the pointee, `None` for `void *`.
    pub pointee: Option<DieOffset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedefType {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Const,
    Volatile,
    Restrict,
    Atomic,
}

impl Qualifier {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Const => "const",
            Self::Volatile => "volatile",
            Self::Restrict => "restrict",
            Self::Atomic => "_Atomic",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedType {
    pub qualifier: Qualifier,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub return_type: Type,
    pub params: Vec<Type>,
    pub variadic: bool,
}

/// Any resolved type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Basic(BasicType),
    Struct(Arc<StructType>),
    Enum(Arc<EnumType>),
    Array(Arc<ArrayType>),
    Pointer(PointerType),
    Typedef(Arc<TypedefType>),
    Qualified(Arc<QualifiedType>),
    Func(Arc<FuncType>),
    Unspecified(String),
}

impl Type {
    /// Storage size in bytes, following typedefs and qualifiers.
    pub fn byte_size(&self) -> u64 {
        match self {
            Self::Void | Self::Func(_) | Self::Unspecified(_) => 0,
            Self::Basic(basic) => {
                if basic.byte_size != 0 {
                    basic.byte_size
                } else {
                    basic.bit_size.div_ceil(8)
                }
            }
            Self::Struct(st) => st.byte_size,
            Self::Enum(en) => en.byte_size,
            Self::Array(array) => array.byte_size,
            Self::Pointer(ptr) => ptr.byte_size,
            Self::Typedef(td) => td.ty.byte_size(),
            Self::Qualified(q) => q.ty.byte_size(),
        }
    }

    /// The basic type, if this is one.
    pub fn as_basic(&self) -> Option<&BasicType> {
        match self {
            Self::Basic(basic) => Some(basic),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Arc<StructType>> {
        match self {
            Self::Struct(st) => Some(st),
            _ => None,
        }
    }
}

impl StructType {
    /// Looks up a member by name.
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Basic(basic) => f.write_str(&basic.name),
            Self::Struct(st) if st.name.is_empty() => write!(f, "{} <anonymous>", st.kind.keyword()),
            Self::Struct(st) => write!(f, "{} {}", st.kind.keyword(), st.name),
            Self::Enum(en) if en.name.is_empty() => f.write_str("enum <anonymous>"),
            Self::Enum(en) => write!(f, "enum {}", en.name),
            Self::Array(array) => match array.count {
                Some(count) => write!(f, "{}[{count}]", array.element),
                None => write!(f, "{}[]", array.element),
            },
            Self::Pointer(ptr) if !ptr.name.is_empty() => f.write_str(&ptr.name),
            Self::Pointer(ptr) => match ptr.pointee {
                Some(offset) => write!(f, "<{:#x}> *", offset.0),
                None => f.write_str("void *"),
            },
            Self::Typedef(td) => f.write_str(&td.name),
            Self::Qualified(q) => write!(f, "{} {}", q.qualifier.keyword(), q.ty),
            Self::Func(func) => {
                write!(f, "{} (", func.return_type)?;
                for (i, param) in func.params.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                if func.variadic {
                    f.write_str(if func.params.is_empty() { "..." } else { ", ..." })?;
                }
                f.write_str(")")
            }
            Self::Unspecified(name) => f.write_str(name),
        }
    }
}
