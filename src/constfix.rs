//! Const file normalization.
//!
//! Extracted `.txt.const` files list the architectures they were generated
//! for on their second line and may carry per-architecture values
//! (`NAME = arm64:5`). Description checking on CheriBSD wants every file to
//! also claim the architectures it shares with FreeBSD and to hold plain
//! `NAME = VALUE` lines. [`ConstFixer`] rewrites files into that shape; files
//! that already list the extra architectures are left alone.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Suffix identifying const files.
pub const CONST_SUFFIX: &str = ".txt.const";

/// Architectures appended to the arch line by default.
pub const DEFAULT_ARCHES: &[&str] = &["386", "amd64", "riscv64"];

/// Rewrites const files to claim extra architectures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstFixer {
    arches: Vec<String>,
}

impl Default for ConstFixer {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHES.iter().map(|arch| arch.to_string()).collect())
    }
}

impl ConstFixer {
    pub fn new(arches: Vec<String>) -> Self {
        Self { arches }
    }

    /// Fixes every const file directly inside `dir`; returns how many changed.
    pub fn fix_dir(&self, dir: &Path) -> Result<usize> {
        if self.arches.is_empty() {
            return Err(Error::Config("no architectures to add".into()));
        }
        let entries = fs::read_dir(dir).map_err(|source| Error::Open {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_const = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(CONST_SUFFIX));
            if is_const {
                files.push(path);
            }
        }
        files.sort();

        let mut fixed = 0;
        for path in files {
            let contents = fs::read_to_string(&path)?;
            if let Some(rewritten) = self.fix(&contents) {
                fs::write(&path, rewritten)?;
                tracing::debug!(path = %path.display(), "fixed const file");
                fixed += 1;
            }
        }
        Ok(fixed)
    }

    /// Rewritten contents of one const file, `None` if already fixed.
    pub fn fix(&self, contents: &str) -> Option<String> {
        let marker = self.arches.first()?;
        let mut out = String::with_capacity(contents.len());
        for (i, line) in contents.lines().enumerate() {
            match i {
                // The "do not edit" header.
                0 => {
                    out.push_str(line);
                    out.push('\n');
                }
                1 => {
                    if line.contains(marker.as_str()) {
                        return None;
                    }
                    out.push_str(line.trim_end());
                    for arch in &self.arches {
                        out.push_str(", ");
                        out.push_str(arch);
                    }
                    out.push('\n');
                }
                _ => {
                    if let Some(line) = normalize_value(line) {
                        out.push_str(&line);
                        out.push('\n');
                    }
                }
            }
        }
        Some(out)
    }
}

/// `NAME = arch:VALUE` or `NAME = VALUE` as `NAME = VALUE`. Anything that is
/// not a single assignment is dropped.
fn normalize_value(line: &str) -> Option<String> {
    let mut parts = line.split('=');
    let (name, value) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let value = match value.split(':').nth(1) {
        Some(value) => value,
        None => value,
    };
    Some(format!("{} = {}", name.trim(), value.trim()))
}
