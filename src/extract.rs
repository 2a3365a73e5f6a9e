//! Constant extraction backends.
//!
//! This module defines the `Extractor` trait, which encapsulates everything
//! OS-specific about pulling constant values out of kernel headers: how the
//! build tree is prepared and which preprocessor flags a file is compiled
//! with. Compiling and reading back the values is delegated to a
//! [`ConstExtract`] implementation so backends stay a thin layer of flags.

use object::Endianness;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub mod cheribsd;

/// Compiler settings of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// C compiler to invoke.
    pub c_compiler: String,
    /// Architecture-specific compiler flags, appended last.
    pub cflags: Vec<String>,
    /// Byte order of the machine running the extractor.
    pub host_endian: Endianness,
}

/// One architecture to extract constants for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arch {
    pub name: String,
    /// Kernel source checkout.
    pub source_dir: PathBuf,
    /// Per-architecture scratch directory.
    pub build_dir: PathBuf,
    /// Extra include directories, comma separated.
    pub include_dirs: String,
    pub target: Target,
}

/// Constants requested by one description file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstInfo {
    pub file: String,
    pub consts: Vec<String>,
    pub includes: Vec<String>,
    /// Include directories relative to the source checkout.
    pub incdirs: Vec<String>,
}

/// How the generic extractor should build its probe program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractParams {
    /// Source text prepended to the probe.
    pub add_source: String,
    pub declare_printf: bool,
    /// Read values from the compiled object instead of running it.
    pub extract_from_elf: bool,
    pub target_endian: Endianness,
}

/// Constant name to value.
pub type Consts = HashMap<String, u64>;

/// Names the compiler could not resolve.
pub type Undeclared = HashSet<String>;

/// The generic compile-and-read step shared by every backend.
pub trait ConstExtract {
    fn extract(
        &self,
        info: &ConstInfo,
        cc: &str,
        args: &[String],
        params: &ExtractParams,
    ) -> Result<(Consts, Undeclared)>;
}

/// An OS backend (e.g. CheriBSD).
pub trait Extractor {
    /// Validates global settings before any architecture is processed.
    fn prepare(&self, source_dir: &Path, build: bool, arches: &[Arch]) -> Result<()>;

    /// Prepares the build directory of `arch`.
    fn prepare_arch(&self, arch: &Arch) -> Result<()>;

    /// Extracts the constants `info` asks for on `arch`.
    fn process_file(&self, arch: &Arch, info: &ConstInfo) -> Result<(Consts, Undeclared)>;
}
