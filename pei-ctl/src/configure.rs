//  CONFIGURE.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 17:55:14
//  Last edited:
//    02 Jul 2024, 18:03:41
//  Auto updated?
//    Yes
//
//  Description:
//!   Handles the `peictl configure` subcommand: the single forward pass
//!   from `user_config.yml` to `docker-compose.yml` plus the generated
//!   installation artifacts.
//!
//!   The order of the pipeline is load-bearing: substitution happens
//!   on the raw tree before typing, validation before any derivation,
//!   and the passthrough rewrite on the fully assembled compose tree
//!   right before it is written.
//

use std::collections::HashMap;
use std::path::PathBuf;

use console::style;
use log::{debug, info};
use pei_cfg::user::{UserConfig, ValidateOpts};
use pei_shr::substitution;
use serde_yaml::Value;

pub use crate::errors::ConfigureError as Error;
use crate::spec::CompiledConfig;
use crate::{resolve, scripts, synthesize, writer};


/***** HELPER FUNCTIONS *****/
/// Reads one of the `PEI_BAKE_ENV_STAGE_*` booleans from the environment snapshot.
fn env_flag(env: &HashMap<String, String>, name: &'static str) -> Result<bool, Error> {
    match env.get(name).map(|value| value.as_str()) {
        None | Some("") => Ok(false),
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(Error::EnvFlagParse { name, value: raw.into() }),
        },
    }
}





/***** LIBRARY *****/
/// Options for a configure run, mirroring the command-line flags.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Keep sections of the compose file that have no resolved content.
    pub full_compose: bool,
    /// Additionally emit the merged Dockerfile and env files. Incompatible with passthrough
    /// markers anywhere in the config.
    pub with_merged: bool,
}

/// Handles configuring a project.
///
/// Reads `<project_dir>/user_config.yml` and (re)writes `docker-compose.yml` plus the
/// `installation/stage-*/generated/` artifacts. Re-running on unchanged input produces
/// byte-identical output.
///
/// The process environment is snapshotted once at entry; see [`run_with_env()`] for the
/// actual pipeline.
///
/// # Errors
/// This function may error for any reason described in [`Error`].
pub fn run(project_dir: impl Into<PathBuf>, opts: Options) -> Result<(), Error> {
    let env: HashMap<String, String> = std::env::vars().collect();
    run_with_env(project_dir, opts, &env)
}

/// Handles configuring a project against an explicit environment snapshot.
///
/// # Arguments
/// - `project_dir`: The project directory to configure.
/// - `opts`: The configure options.
/// - `env`: The environment snapshot used for `${...}` substitution and the
///   `PEI_BAKE_ENV_STAGE_*` flags.
///
/// # Errors
/// This function may error for any reason described in [`Error`].
pub fn run_with_env(project_dir: impl Into<PathBuf>, opts: Options, env: &HashMap<String, String>) -> Result<(), Error> {
    let project_dir: PathBuf = project_dir.into();
    info!("Configuring PeiDocker project in '{}'...", project_dir.display());

    // Load the raw tree, then substitute configure-time variables on it
    let config_path: PathBuf = project_dir.join("user_config.yml");
    let mut tree: Value = pei_cfg::tree::load_tree(&config_path).map_err(|err| Error::Tree { err })?;
    substitution::substitute_tree(&mut tree, env).map_err(|err| Error::Substitution { err })?;

    // Merged artifacts are resolved at build time; they cannot carry compose-time markers
    if opts.with_merged {
        if let Some(path) = find_passthrough(&tree) {
            return Err(Error::PassthroughWithMerged { path });
        }
    }

    // Type and validate
    let config: UserConfig = match serde_yaml::from_value(tree) {
        Ok(config) => config,
        Err(err) => {
            return Err(Error::Schema { path: config_path, err });
        },
    };
    let bake_env_stage_1: bool = env_flag(env, "PEI_BAKE_ENV_STAGE_1")?;
    let bake_env_stage_2: bool = env_flag(env, "PEI_BAKE_ENV_STAGE_2")?;
    config.validate(&ValidateOpts { bake_env_stage_1, bake_env_stage_2 }).map_err(|err| Error::Validate { err })?;

    // Derive everything, then emit
    let compiled: CompiledConfig = resolve::compile(&config, &project_dir, (bake_env_stage_1, bake_env_stage_2))?;
    let generated = scripts::generate(&compiled)?;
    let compose = synthesize::synthesize(&compiled, opts.full_compose)?;

    // Lower to a plain tree and rewrite the passthrough markers in-place
    debug!("Rewriting passthrough markers...");
    let mut compose_tree: Value = match compose.into_tree() {
        Ok(tree) => tree,
        Err(err) => {
            return Err(Error::ComposeSerialize { err });
        },
    };
    substitution::rewrite_tree(&mut compose_tree).map_err(|err| Error::Substitution { err })?;

    writer::write_project(&compiled, &generated, &compose_tree, opts.with_merged)?;

    // Done
    println!("Successfully configured {}", style(project_dir.display().to_string()).bold().green());
    Ok(())
}

/// Returns the dotted path of the first string leaf carrying a passthrough marker, if any.
fn find_passthrough(tree: &Value) -> Option<String> {
    fn visit(value: &Value, path: &str) -> Option<String> {
        match value {
            Value::String(s) if substitution::contains_passthrough(s) => Some(if path.is_empty() { "<root>".into() } else { path.into() }),
            Value::Sequence(seq) => seq.iter().enumerate().find_map(|(i, elem)| visit(elem, &format!("{path}[{i}]"))),
            Value::Mapping(map) => map.iter().find_map(|(key, elem)| {
                let label: String = key.as_str().map(String::from).unwrap_or_else(|| "<non-scalar key>".into());
                let child: String = if path.is_empty() { label } else { format!("{path}.{label}") };
                visit(elem, &child)
            }),
            Value::Tagged(tagged) => visit(&tagged.value, path),
            _ => None,
        }
    }
    visit(tree, "")
}
