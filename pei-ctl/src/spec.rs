//  SPEC.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 10:44:55
//  Last edited:
//    02 Jul 2024, 15:20:03
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines specifications and interfaces used across modules.
//!
//!   Most prominently, this is where [`CompiledConfig`] lives: the
//!   fully resolved, value-semantic record that the emission stages
//!   (compose synthesis, script generation, project writing) consume.
//

use std::path::PathBuf;

use indexmap::IndexMap;
use pei_cfg::compose::ComposeVolume;
use pei_cfg::user::{Lifecycle, Stage};


/***** STATICS *****/
/// Where the project's `installation/` tree lives inside the containers.
pub const CONTAINER_INSTALL_ROOT: &str = "/pei-from-host";





/***** LIBRARY *****/
/// The fully resolved configuration, as derived from a validated user config.
///
/// Everything downstream of the resolver works exclusively off this record; the user config
/// itself is not consulted again.
#[derive(Clone, Debug)]
pub struct CompiledConfig {
    /// The project directory this config was resolved for.
    pub project_dir: PathBuf,
    /// The resolved stage-1.
    pub stage_1: CompiledStage,
    /// The resolved stage-2, if the user config declares one.
    pub stage_2: Option<CompiledStage>,
    /// SSH key files to materialize into `installation/stage-1/generated/`.
    pub key_files: Vec<KeyFile>,
}
impl CompiledConfig {
    /// Returns the resolved stages, in build order.
    #[inline]
    pub fn stages(&self) -> impl Iterator<Item = &CompiledStage> { std::iter::once(&self.stage_1).chain(self.stage_2.as_ref()) }
}

/// The resolved quantities of a single stage.
#[derive(Clone, Debug)]
pub struct CompiledStage {
    /// Which stage this is.
    pub stage: Stage,
    /// The image this stage builds on.
    pub base_image: String,
    /// The image tag this stage's build produces.
    pub image: String,
    /// The Docker build arguments, in insertion order.
    pub build_args: IndexMap<String, String>,
    /// The `NAME=VALUE` environment entries for the running container.
    pub environment: Vec<String>,
    /// The effective port mappings, in the order required by the mapping policy.
    pub ports: Vec<String>,
    /// The resolved storage and mount bindings.
    pub volumes: Vec<VolumeBinding>,
    /// Whether the service reserves the host's NVIDIA GPUs.
    pub gpu: bool,
    /// Whether this stage's environment entries are baked into `/etc/environment` at build
    /// time.
    pub bake_env: bool,
    /// The tokenized user scripts, per lifecycle.
    pub scripts: ScriptTable,
}

/// A single resolved storage or mount binding of a stage.
#[derive(Clone, Debug)]
pub struct VolumeBinding {
    /// The toplevel compose volume declaration backing this binding, if any. Host bind mounts
    /// need none.
    pub volume: Option<(String, ComposeVolume)>,
    /// The source as it appears in the service's volume list: the volume key, or the host
    /// path.
    pub source: String,
    /// The in-container destination path.
    pub dst: String,
}
impl VolumeBinding {
    /// Renders this binding in compose short syntax (`source:dst`).
    #[inline]
    pub fn service_entry(&self) -> String { format!("{}:{}", self.source, self.dst) }
}

/// The tokenized user scripts of a stage, per lifecycle.
#[derive(Clone, Debug, Default)]
pub struct ScriptTable {
    /// Scripts run during the image build.
    pub on_build: Vec<ScriptCall>,
    /// Scripts run the first time a container starts.
    pub on_first_run: Vec<ScriptCall>,
    /// Scripts run every time a container starts.
    pub on_every_run: Vec<ScriptCall>,
    /// Scripts run when a user logs in over SSH.
    pub on_user_login: Vec<ScriptCall>,
    /// The entrypoint script, if any.
    pub on_entry: Option<ScriptCall>,
}
impl ScriptTable {
    /// Returns the calls for the given lifecycle, in declaration order.
    pub fn calls(&self, lifecycle: Lifecycle) -> &[ScriptCall] {
        use Lifecycle::*;
        match lifecycle {
            OnBuild => &self.on_build,
            OnFirstRun => &self.on_first_run,
            OnEveryRun => &self.on_every_run,
            OnUserLogin => &self.on_user_login,
            OnEntry => self.on_entry.as_slice(),
        }
    }
}

/// A single tokenized script entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptCall {
    /// The script path, as declared (relative to the `installation/` tree).
    pub script: String,
    /// The arguments, exactly as the user wrote them.
    pub args: Vec<String>,
}
impl ScriptCall {
    /// Returns the absolute in-container path of the script.
    #[inline]
    pub fn container_path(&self) -> String { format!("{CONTAINER_INSTALL_ROOT}/{}", self.script) }
}

/// An SSH key file to write into the generated area of stage-1.
#[derive(Clone, Debug)]
pub struct KeyFile {
    /// The canonical file name (derived from the user name).
    pub filename: String,
    /// The key material.
    pub contents: String,
    /// The exact mode bits for the file.
    pub mode: u32,
}
