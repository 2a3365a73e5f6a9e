//! Entry point for kstructs.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Set up logging from `--log-level` (or `RUST_LOG`).
//! 3. Run the subcommand: list structs from a kernel object, or fix const files.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufWriter, Write};
use tracing_subscriber::EnvFilter;

use kstructs::config::{Command, Config};
use kstructs::constfix::ConstFixer;
use kstructs::{parse_kernel_object_with, StructType};

fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid log level {:?}", config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let options = config.command.options();
    let arches = config.command.arches();
    match config.command {
        Command::Structs { object, fields, names, .. } => {
            let options = options.unwrap_or_default();
            let structs = parse_kernel_object_with(&object, &options)
                .with_context(|| format!("failed to read structs from {}", object.display()))?;

            let mut selected: Vec<&StructType> = if names.is_empty() {
                structs.values().map(|st| st.as_ref()).collect()
            } else {
                let mut selected = Vec::with_capacity(names.len());
                for name in &names {
                    let st = structs
                        .get(name)
                        .with_context(|| format!("struct {name} not found in {}", object.display()))?;
                    selected.push(st.as_ref());
                }
                selected
            };
            selected.sort_by(|a, b| a.name.cmp(&b.name));

            let mut out = BufWriter::new(io::stdout().lock());
            for st in selected {
                print_struct(&mut out, st, fields)?;
            }
            out.flush()?;
        }
        Command::FixConsts { dir, .. } => {
            let fixer = ConstFixer::new(arches.unwrap_or_default());
            let fixed = fixer
                .fix_dir(&dir)
                .with_context(|| format!("failed to fix const files in {}", dir.display()))?;
            println!("Fixed {fixed} files.");
        }
    }
    Ok(())
}

fn print_struct(out: &mut impl Write, st: &StructType, fields: bool) -> io::Result<()> {
    writeln!(out, "{} {} ({} bytes)", st.kind.keyword(), st.name, st.byte_size)?;
    if fields {
        for field in &st.fields {
            if field.bit_size != 0 {
                writeln!(
                    out,
                    "    {:>6}  {} {} : {}",
                    field.byte_offset, field.ty, field.name, field.bit_size
                )?;
            } else {
                writeln!(out, "    {:>6}  {} {}", field.byte_offset, field.ty, field.name)?;
            }
        }
    }
    Ok(())
}
