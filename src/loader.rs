//! Object file loading.
//!
//! Maps an ELF file into memory, records its sections and hands out a
//! [`DwarfData`] view over them. The section list can be pruned before the
//! DWARF view is opened; sections that never contribute to struct layouts
//! are dropped by default because gimli would otherwise have to carry them.

use memmap2::Mmap;
use object::read::{Object, ObjectSection};
use object::{BinaryFormat, CompressionFormat};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::dwarf::DwarfData;
use crate::error::{Error, Result};

/// A section of the mapped file: its name and byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

/// Returns true for sections that carry nothing needed to lay out structs.
pub fn is_prunable(name: &str) -> bool {
    name == ".debug_line" || name.starts_with(".rela.")
}

/// A memory-mapped 64-bit ELF object.
pub struct ObjectFile {
    path: PathBuf,
    mmap: Mmap,
    little_endian: bool,
    sections: Vec<Section>,
}

impl ObjectFile {
    /// Opens and maps `path`, keeping every section.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| Error::Open {
            path: path.clone(),
            source,
        })?;
        // SAFETY: the mapping is read-only and lives as long as `ObjectFile`.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|source| Error::Open {
            path: path.clone(),
            source,
        })?;

        let (little_endian, sections) = {
            let obj = object::File::parse(&*mmap)?;
            if obj.format() != BinaryFormat::Elf {
                return Err(Error::Unsupported(format!(
                    "{} is {:?}, not ELF",
                    path.display(),
                    obj.format()
                )));
            }
            if !obj.is_64() {
                return Err(Error::Unsupported(format!("{} is not a 64-bit ELF", path.display())));
            }

            let mut sections = Vec::new();
            for section in obj.sections() {
                let name = section.name()?;
                // NOBITS and similar have no file contents.
                let Some((offset, size)) = section.file_range() else {
                    continue;
                };
                let compressed = section.compressed_file_range()?;
                if compressed.format != CompressionFormat::None && name.starts_with(".debug_") {
                    return Err(Error::Unsupported(format!("compressed debug section {name}")));
                }
                sections.push(Section {
                    name: name.to_string(),
                    offset: offset as usize,
                    size: size as usize,
                });
            }
            (obj.is_little_endian(), sections)
        };

        tracing::debug!(path = %path.display(), sections = sections.len(), "mapped object file");
        Ok(Self {
            path,
            mmap,
            little_endian,
            sections,
        })
    }

    /// Opens `path` and drops `.debug_line` and `.rela.*` sections.
    pub fn open_pruned(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = Self::open(path)?;
        file.prune_sections();
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Removes the sections [`is_prunable`] selects. Returns how many went.
    pub fn prune_sections(&mut self) -> usize {
        let before = self.sections.len();
        self.sections.retain(|section| !is_prunable(&section.name));
        let pruned = before - self.sections.len();
        tracing::debug!(pruned, "pruned sections irrelevant to struct layout");
        pruned
    }

    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// Contents of the first retained section called `name`.
    pub fn section_data(&self, name: &str) -> Option<&[u8]> {
        self.sections
            .iter()
            .find(|section| section.name == name)
            .and_then(|section| self.mmap.get(section.offset..section.offset + section.size))
    }

    /// Opens the DWARF view over the retained sections.
    pub fn dwarf(&self) -> Result<DwarfData<'_>> {
        DwarfData::load(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prunes_line_tables_and_rela_sections_only() {
        assert!(is_prunable(".debug_line"));
        assert!(is_prunable(".rela.debug_info"));
        assert!(is_prunable(".rela.text"));
        assert!(!is_prunable(".debug_line_str"));
        assert!(!is_prunable(".rel.text"));
        assert!(!is_prunable(".rela"));
        assert!(!is_prunable(".debug_info"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ObjectFile::open("/nonexistent/kernel.full").err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
    }
}
