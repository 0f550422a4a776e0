//  CLI.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 18:21:06
//  Last edited:
//    02 Jul 2024, 18:10:27
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the command-line arguments of the `peictl` executable.
//

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub(crate) fn parse() -> Arguments { Arguments::parse() }

/***** ARGUMENTS *****/
/// Defines the toplevel arguments for the `peictl` tool.
#[derive(Debug, Parser)]
#[clap(name = "peictl", about = "The PeiDocker command-line interface: turns a declarative user_config.yml into a reproducible two-stage Docker build project.")]
pub(crate) struct Arguments {
    /// If given, prints `info` and `debug` prints.
    #[clap(long, global = true, help = "If given, prints additional information during execution.")]
    pub(crate) debug: bool,
    /// If given, prints `info`, `debug` and `trace` prints.
    #[clap(long, global = true, conflicts_with = "debug", help = "If given, prints the largest amount of debug information as possible.")]
    pub(crate) trace: bool,

    /// The subcommand that can be run.
    #[clap(subcommand)]
    pub(crate) subcommand: CtlSubcommand,
}

/// Defines subcommands for the `peictl` tool.
#[derive(Debug, Subcommand)]
pub(crate) enum CtlSubcommand {
    #[clap(name = "create", about = "Seeds a new project directory with the packaged installation tree and a starter user_config.yml.")]
    Create {
        /// The project directory to seed.
        #[clap(
            short = 'p',
            long,
            env = "PEI_PROJECT_DIR",
            help = "The project directory to seed. Created if it does not exist; must be empty otherwise (see '--force')."
        )]
        project_dir: PathBuf,
        /// The quick-start config to start from.
        #[clap(
            long,
            default_value = "minimal",
            help = "The quick-start config to write as the starter user_config.yml. Use 'full' for a config showing every available option."
        )]
        quick: String,
        /// Whether to seed non-empty directories.
        #[clap(long, help = "If given, seeds the project even if the directory is not empty. Existing files with packaged names are overwritten.")]
        force: bool,
    },

    #[clap(name = "configure", about = "Turns the project's user_config.yml into docker-compose.yml plus the generated installation artifacts.")]
    Configure {
        /// The project directory to configure.
        #[clap(
            short = 'p',
            long,
            env = "PEI_PROJECT_DIR",
            help = "The project directory to configure. Must contain a user_config.yml (see 'peictl create')."
        )]
        project_dir: PathBuf,
        /// Whether to keep empty compose sections.
        #[clap(long, help = "If given, does not strip sections without resolved content from the emitted compose file.")]
        full_compose: bool,
        /// Whether to additionally emit merged build artifacts.
        #[clap(
            long,
            help = "If given, additionally emits a merged multi-stage Dockerfile plus per-stage env files. Incompatible with '{{...}}' passthrough \
                    markers anywhere in the config."
        )]
        with_merged: bool,
    },
}
