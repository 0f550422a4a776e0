//  SCRIPTS.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 15:31:47
//  Last edited:
//    02 Jul 2024, 17:05:09
//  Auto updated?
//    Yes
//
//  Description:
//!   Renders the generated lifecycle wrapper scripts.
//!
//!   For every stage and lifecycle there is one wrapper
//!   `_custom-on-<lifecycle>.sh` that the shipped hook runners invoke;
//!   it calls the user's configured scripts in declaration order. The
//!   wrappers are pure string generation from the compiled config;
//!   anything that needs to happen at container runtime lives in the
//!   shipped `internals/` scripts instead.
//

use log::debug;
use pei_cfg::user::{Lifecycle, Stage};

pub use crate::errors::ConfigureError as Error;
use crate::spec::{CompiledConfig, CompiledStage, ScriptCall};


/***** HELPER FUNCTIONS *****/
/// Quotes a single argument for use in a generated shell script.
///
/// Plain arguments (including `--key=value` forms) stay verbatim; anything shell-special gets
/// single-quoted.
fn quote_arg(stage: Stage, call: &ScriptCall, arg: &str) -> Result<String, Error> {
    match shlex::try_quote(arg) {
        Ok(quoted) => Ok(quoted.into_owned()),
        Err(_) => Err(Error::ScriptQuote { stage, entry: call.script.clone() }),
    }
}

/// Writes the generated-by header shared by all wrapper scripts.
fn push_header(out: &mut String, filename: &str, stage: Stage, purpose: &str) {
    out.push_str("#!/bin/bash\n");
    out.push_str(&format!("# {filename}\n"));
    out.push_str(&format!("#   generated by peictl v{} for {stage}; do not edit.\n", env!("CARGO_PKG_VERSION")));
    out.push_str("#\n");
    out.push_str(&format!("# {purpose}\n"));
    out.push_str("set -e\n");
}





/***** LIBRARY *****/
/// A generated file destined for a stage's `generated/` directory.
#[derive(Clone, Debug)]
pub struct GeneratedFile {
    /// The stage whose `generated/` directory receives the file.
    pub stage: Stage,
    /// The file name within that directory.
    pub filename: String,
    /// The file contents.
    pub contents: String,
}

/// Renders one lifecycle wrapper for the given stage.
///
/// The wrapper runs every configured entry in order and fails as soon as one of them does
/// (including when a referenced script is missing in the container). Only the `on_entry`
/// wrapper forwards `"$@"`, so runtime arguments reach the entry script and nothing else.
///
/// # Errors
/// This function errors if an argument cannot be quoted into a shell script.
pub fn render_wrapper(stage: &CompiledStage, lifecycle: Lifecycle) -> Result<String, Error> {
    let calls: &[ScriptCall] = stage.scripts.calls(lifecycle);

    let mut out: String = String::new();
    push_header(&mut out, lifecycle.wrapper_filename(), stage.stage, &format!("Runs the configured '{lifecycle}' scripts in declaration order."));
    out.push('\n');

    for call in calls {
        out.push_str(&format!("bash \"{}\"", call.container_path()));
        for arg in &call.args {
            out.push(' ');
            out.push_str(&quote_arg(stage.stage, call, arg)?);
        }
        if lifecycle == Lifecycle::OnEntry {
            out.push_str(" \"$@\"");
        }
        out.push('\n');
    }
    Ok(out)
}

/// Renders the script that bakes a stage's environment entries into `/etc/environment`.
///
/// Only generated when the corresponding `PEI_BAKE_ENV_STAGE_<N>` flag is set; the shipped
/// build hook runs it when present.
///
/// # Errors
/// This function errors if an entry cannot be quoted into a shell script.
pub fn render_bake_env(stage: &CompiledStage) -> Result<String, Error> {
    let mut out: String = String::new();
    push_header(&mut out, "_bake-environment.sh", stage.stage, "Appends this stage's environment entries to /etc/environment at build time.");
    out.push('\n');

    for entry in &stage.environment {
        let quoted: String = match shlex::try_quote(entry) {
            Ok(quoted) => quoted.into_owned(),
            Err(_) => {
                return Err(Error::ScriptQuote { stage: stage.stage, entry: entry.clone() });
            },
        };
        out.push_str(&format!("printf '%s\\n' {quoted} >> /etc/environment\n"));
    }
    Ok(out)
}

/// Renders every generated script of the given compiled config.
///
/// Every stage gets the four list-shaped wrappers, empty ones included: writing an
/// empty-but-valid script deterministically replaces whatever an earlier run put there. The
/// `on_entry` wrapper is the exception: it is only written when an entry script is configured,
/// so the entrypoint can select between the stages' wrappers by file existence.
///
/// # Errors
/// This function errors if any wrapper fails to render.
pub fn generate(compiled: &CompiledConfig) -> Result<Vec<GeneratedFile>, Error> {
    let mut files: Vec<GeneratedFile> = vec![];
    for stage in compiled.stages() {
        debug!("Rendering lifecycle wrappers for {}...", stage.stage);
        for lifecycle in Lifecycle::ALL {
            if lifecycle == Lifecycle::OnEntry && stage.scripts.on_entry.is_none() {
                continue;
            }
            files.push(GeneratedFile {
                stage: stage.stage,
                filename: lifecycle.wrapper_filename().into(),
                contents: render_wrapper(stage, lifecycle)?,
            });
        }
        if stage.bake_env {
            files.push(GeneratedFile { stage: stage.stage, filename: "_bake-environment.sh".into(), contents: render_bake_env(stage)? });
        }
    }
    Ok(files)
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pei_cfg::user::Stage;

    use super::*;
    use crate::spec::ScriptTable;

    /// Builds a minimal compiled stage around the given script table.
    fn stage(scripts: ScriptTable) -> CompiledStage {
        CompiledStage {
            stage: Stage::One,
            base_image: "ubuntu:24.04".into(),
            image: "pei-image:stage-1".into(),
            build_args: IndexMap::new(),
            environment: vec![],
            ports: vec![],
            volumes: vec![],
            gpu: false,
            bake_env: false,
            scripts,
        }
    }


    #[test]
    fn wrapper_preserves_argument_form() {
        let stage = stage(ScriptTable {
            on_build: vec![ScriptCall {
                script: "stage-1/custom/install.sh".into(),
                args: vec!["--cache-dir=/tmp/cache".into(), "two words".into()],
            }],
            ..Default::default()
        });
        let wrapper = render_wrapper(&stage, Lifecycle::OnBuild).unwrap();

        assert!(wrapper.starts_with("#!/bin/bash\n"));
        assert!(wrapper.contains("bash \"/pei-from-host/stage-1/custom/install.sh\" --cache-dir=/tmp/cache 'two words'\n"));
        // Only on_entry forwards runtime arguments
        assert!(!wrapper.contains("\"$@\""));
    }

    #[test]
    fn entry_wrapper_forwards_runtime_args() {
        let stage = stage(ScriptTable {
            on_entry: Some(ScriptCall { script: "stage-1/custom/entry.sh".into(), args: vec!["--verbose".into()] }),
            ..Default::default()
        });
        let wrapper = render_wrapper(&stage, Lifecycle::OnEntry).unwrap();
        assert!(wrapper.contains("bash \"/pei-from-host/stage-1/custom/entry.sh\" --verbose \"$@\"\n"));
    }

    #[test]
    fn empty_lifecycle_renders_empty_but_valid_script() {
        let stage = stage(ScriptTable::default());
        let wrapper = render_wrapper(&stage, Lifecycle::OnFirstRun).unwrap();
        assert!(wrapper.starts_with("#!/bin/bash\n"));
        assert!(!wrapper.contains("bash \""));
    }

    #[test]
    fn bake_env_quotes_entries() {
        let mut stage = stage(ScriptTable::default());
        stage.environment = vec!["NAME=plain".into(), "GREETING=hello world".into()];
        let script = render_bake_env(&stage).unwrap();
        assert!(script.contains("printf '%s\\n' NAME=plain >> /etc/environment\n"));
        assert!(script.contains("printf '%s\\n' 'GREETING=hello world' >> /etc/environment\n"));
    }

    #[test]
    fn entry_wrapper_only_exists_when_configured() {
        let compiled = CompiledConfig {
            project_dir: "/tmp/x".into(),
            stage_1: stage(ScriptTable::default()),
            stage_2: None,
            key_files: vec![],
        };
        let files = generate(&compiled).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["_custom-on-build.sh", "_custom-on-first-run.sh", "_custom-on-every-run.sh", "_custom-on-user-login.sh"]);

        let compiled = CompiledConfig {
            project_dir: "/tmp/x".into(),
            stage_1: stage(ScriptTable {
                on_entry: Some(ScriptCall { script: "stage-1/custom/entry.sh".into(), args: vec![] }),
                ..Default::default()
            }),
            stage_2: None,
            key_files: vec![],
        };
        let files = generate(&compiled).unwrap();
        assert!(files.iter().any(|f| f.filename == "_custom-on-entry.sh"));
    }
}
