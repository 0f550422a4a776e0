//  MAIN.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 18:17:50
//  Last edited:
//    02 Jul 2024, 18:15:44
//  Auto updated?
//    Yes
//
//  Description:
//!   Entrypoint to the `peictl` executable.
//


use dotenvy::dotenv;
use error_trace::ErrorTrace as _;
use humanlog::{DebugMode, HumanLogger};
use log::error;
use pei_ctl::{configure, create};

pub mod cli;
use cli::*;

/***** ENTRYPOINT *****/
fn main() {
    // Load the .env file
    dotenv().ok();

    // Parse the arguments
    let args = cli::parse();

    // Initialize the logger
    if let Err(err) = HumanLogger::terminal(if args.trace {
        DebugMode::Full
    } else if args.debug {
        DebugMode::Debug
    } else {
        DebugMode::HumanFriendly
    })
    .init()
    {
        eprintln!("WARNING: Failed to setup logger: {err} (no logging for this session)");
    }

    // Setup the friendlier version of panic
    if !args.trace && !args.debug {
        human_panic::setup_panic!(Metadata {
            name:     "PeiDocker CTL".into(),
            version:  env!("CARGO_PKG_VERSION").into(),
            authors:  env!("CARGO_PKG_AUTHORS").replace(':', ", ").into(),
            homepage: env!("CARGO_PKG_REPOSITORY").into(),
        });
    }

    // Now match on the command
    match args.subcommand {
        CtlSubcommand::Create { project_dir, quick, force } => {
            if let Err(err) = create::run(project_dir, &quick, force) {
                error!("{}", err.trace());
                std::process::exit(err.exit_code());
            }
        },

        CtlSubcommand::Configure { project_dir, full_compose, with_merged } => {
            if let Err(err) = configure::run(project_dir, configure::Options { full_compose, with_merged }) {
                error!("{}", err.trace());
                std::process::exit(err.exit_code());
            }
        },
    }
}
