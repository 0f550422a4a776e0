//  WRITER.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 17:08:22
//  Last edited:
//    02 Jul 2024, 17:40:55
//  Auto updated?
//    Yes
//
//  Description:
//!   Writes the configure artifacts into the project directory.
//!
//!   Every artifact is staged first and only renamed into place once
//!   all content exists, so a failing configure leaves the previous
//!   project state intact. The `generated/` directories are replaced
//!   wholesale; everything else in the installation tree belongs to
//!   the packaged files or the user.
//

use std::path::PathBuf;

use log::debug;
use pei_shr::fs::{ensure_dir, normalize_line_endings, StagedDir};
use serde_yaml::Value;

pub use crate::errors::ConfigureError as Error;
use crate::scripts::GeneratedFile;
use crate::spec::{CompiledConfig, CompiledStage};


/***** HELPER FUNCTIONS *****/
/// Writes the generated-by header of the compose file.
fn compose_header() -> String {
    let mut header: String = String::new();
    header.push_str("# DOCKER-COMPOSE.yml\n");
    header.push_str(&format!("#   generated by peictl v{}\n", env!("CARGO_PKG_VERSION")));
    header.push_str("# \n");
    header.push_str("# This file wires the two build stages of this project together. It is\n");
    header.push_str("# regenerated by every `peictl configure`; edit `user_config.yml` instead\n");
    header.push_str("# of this file.\n");
    header.push_str("# \n");
    header.push('\n');
    header
}

/// Renders the merged multi-stage Dockerfile for `--with-merged`.
fn render_merged_dockerfile(compiled: &CompiledConfig) -> String {
    let mut out: String = String::new();
    out.push_str("# MERGED.Dockerfile\n");
    out.push_str(&format!("#   generated by peictl v{}\n", env!("CARGO_PKG_VERSION")));
    out.push_str("# \n");
    out.push_str("# Single-file variant of the two-stage build, for workflows that want one\n");
    out.push_str("# `docker build` instead of compose. Build arguments are listed in the\n");
    out.push_str("# stage-N.env files next to this one.\n");
    out.push('\n');

    out.push_str(&format!("FROM {} AS stage-1\n", compiled.stage_1.base_image));
    out.push_str("COPY installation/stage-1 /pei-from-host/stage-1\n");
    out.push_str("RUN bash /pei-from-host/stage-1/internals/on-build.sh\n");

    if let Some(stage_2) = &compiled.stage_2 {
        out.push('\n');
        if stage_2.base_image == compiled.stage_1.image {
            out.push_str("FROM stage-1 AS stage-2\n");
        } else {
            out.push_str(&format!("FROM {} AS stage-2\n", stage_2.base_image));
        }
        out.push_str("COPY installation/stage-2 /pei-from-host/stage-2\n");
        out.push_str("RUN bash /pei-from-host/stage-2/internals/on-build.sh\n");
    }
    out
}

/// Renders the build-argument env file of a stage for `--with-merged`.
fn render_env_file(stage: &CompiledStage) -> String {
    let mut out: String = String::new();
    for (name, value) in &stage.build_args {
        out.push_str(&format!("{name}={value}\n"));
    }
    out
}





/***** LIBRARY *****/
/// Writes every configure artifact into the project directory.
///
/// # Arguments
/// - `compiled`: The compiled config, for the key files and the installation skeleton.
/// - `generated`: The generated scripts, per stage.
/// - `compose_tree`: The final compose tree (passthrough markers already rewritten).
/// - `with_merged`: Whether to additionally write the merged Dockerfile and env files.
///
/// # Errors
/// This function errors if any artifact could not be staged or the final commit failed.
pub fn write_project(compiled: &CompiledConfig, generated: &[GeneratedFile], compose_tree: &Value, with_merged: bool) -> Result<(), Error> {
    let project_dir: &PathBuf = &compiled.project_dir;
    debug!("Writing artifacts to '{}'...", project_dir.display());

    // The installation skeleton must exist regardless of what the config populates
    for stage in ["stage-1", "stage-2"] {
        for dir in ["internals", "system", "custom", "generated"] {
            ensure_dir(project_dir.join("installation").join(stage).join(dir)).map_err(|err| Error::Write { err })?;
        }
    }

    let mut stage: StagedDir = StagedDir::new(project_dir).map_err(|err| Error::Write { err })?;

    // The generated directories are owned by configure: replaced wholesale on every run
    stage.replace_dir(project_dir.join("installation/stage-1/generated"));
    stage.replace_dir(project_dir.join("installation/stage-2/generated"));

    // Generated scripts: LF line endings, executable
    for file in generated {
        let target: PathBuf = project_dir.join("installation").join(file.stage.name()).join("generated").join(&file.filename);
        stage.stage_file(target, normalize_line_endings(&file.contents).as_bytes(), Some(0o755)).map_err(|err| Error::Write { err })?;
    }

    // Materialized SSH keys, with their exact mode bits
    for key in &compiled.key_files {
        let target: PathBuf = project_dir.join("installation/stage-1/generated").join(&key.filename);
        stage.stage_file(target, key.contents.as_bytes(), Some(key.mode)).map_err(|err| Error::Write { err })?;
    }

    // The compose file itself
    let body: String = match serde_yaml::to_string(compose_tree) {
        Ok(body) => body,
        Err(err) => {
            return Err(Error::ComposeSerialize { err });
        },
    };
    stage.stage_file(project_dir.join("docker-compose.yml"), format!("{}{}", compose_header(), body).as_bytes(), None).map_err(|err| Error::Write { err })?;

    // The merged artifacts, if requested (the passthrough gate already ran)
    if with_merged {
        stage
            .stage_file(project_dir.join("merged.Dockerfile"), render_merged_dockerfile(compiled).as_bytes(), None)
            .map_err(|err| Error::Write { err })?;
        for compiled_stage in compiled.stages() {
            let target: PathBuf = project_dir.join(format!("{}.env", compiled_stage.stage.name()));
            stage.stage_file(target, render_env_file(compiled_stage).as_bytes(), None).map_err(|err| Error::Write { err })?;
        }
    }

    // Everything staged without error: move it into place
    stage.commit().map_err(|err| Error::Write { err })
}
