//! Configuration module.
//!
//! This module defines the command-line interface (CLI) for `kstructs` using `clap`.
//! It handles the subcommands and the options that map onto [`Options`](crate::pipeline::Options).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::constfix::DEFAULT_ARCHES;
use crate::pipeline::Options;
use crate::utils::split_list;

/// Struct layouts and const files for CHERI kernels.
///
/// Reads the DWARF debug information of a kernel object and lists the
/// structures it declares, or normalizes extracted const files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the structures declared in a kernel object
    Structs {
        /// Kernel ELF object with DWARF debug information
        object: PathBuf,

        /// Worker threads per stage (0 = number of CPUs)
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,

        /// Keep .debug_line and .rela.* sections in the section list
        #[arg(long)]
        no_prune: bool,

        /// Print the fields of every struct
        #[arg(long)]
        fields: bool,

        /// Only print these structs
        names: Vec<String>,
    },

    /// Add the shared architectures to every .txt.const file in a directory
    FixConsts {
        /// Directory holding the .txt.const files
        dir: PathBuf,

        /// Architectures to add, comma separated
        #[arg(long, default_value_t = DEFAULT_ARCHES.join(", "))]
        arches: String,
    },
}

impl Command {
    /// Pipeline options of the `structs` subcommand.
    pub fn options(&self) -> Option<Options> {
        match self {
            Command::Structs { jobs, no_prune, .. } => Some(Options {
                jobs: *jobs,
                prune_sections: !no_prune,
            }),
            Command::FixConsts { .. } => None,
        }
    }

    /// Architectures of the `fix-consts` subcommand.
    pub fn arches(&self) -> Option<Vec<String>> {
        match self {
            Command::FixConsts { arches, .. } => Some(split_list(arches).map(str::to_string).collect()),
            Command::Structs { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structs_defaults() {
        let config = Config::try_parse_from(["kstructs", "structs", "kernel.full"]).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.command.options(), Some(Options::default()));
        assert_eq!(config.command.arches(), None);
    }

    #[test]
    fn structs_flags() {
        let config = Config::try_parse_from([
            "kstructs", "structs", "--jobs", "4", "--no-prune", "--fields", "kernel.full", "proc", "thread",
            "--log-level", "debug",
        ])
        .unwrap();
        assert_eq!(config.log_level, "debug");
        let options = config.command.options().unwrap();
        assert_eq!(options.jobs, 4);
        assert!(!options.prune_sections);
        match config.command {
            Command::Structs { fields, names, .. } => {
                assert!(fields);
                assert_eq!(names, vec!["proc", "thread"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn fix_consts_arches() {
        let config = Config::try_parse_from(["kstructs", "fix-consts", "sys/cheribsd"]).unwrap();
        assert_eq!(config.command.arches().unwrap(), vec!["386", "amd64", "riscv64"]);

        let config = Config::try_parse_from(["kstructs", "fix-consts", "d", "--arches", "amd64,arm"]).unwrap();
        assert_eq!(config.command.arches().unwrap(), vec!["amd64", "arm"]);
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        assert!(Config::try_parse_from(["kstructs"]).is_err());
    }
}
