//! Kernel Struct Extraction Library.
//!
//! This library provides the core components for the `kstructs` tool.
//! It is organized into several modules:
//! - `config`: CLI configuration.
//! - `loader`: Memory-mapped ELF objects and section pruning.
//! - `dwarf`: Shared DWARF views and the one-time capability type cache.
//! - `capability`: CHERI capability base types.
//! - `resolver`: DWARF type resolution.
//! - `pipeline`: The parallel split, scan, resolve and collect stages.
//! - `types`: The resolved type model.
//! - `extract`: OS backends for constant extraction.
//! - `constfix`: Const file normalization.

pub mod capability;
pub mod config;
pub mod constfix;
pub mod dwarf;
pub mod error;
pub mod extract;
pub mod loader;
pub mod pipeline;
pub mod resolver;
pub mod types;
pub mod utils;

pub use error::{Error, ErrorKind, Result};
pub use pipeline::{extract_structs, parse_kernel_object, parse_kernel_object_with, Options};
pub use types::{StructField, StructMap, StructType, Type};
