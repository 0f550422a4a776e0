//  RESOLVE.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 14:02:13
//  Last edited:
//    02 Jul 2024, 16:41:28
//  Auto updated?
//    Yes
//
//  Description:
//!   Derives a [`CompiledConfig`] from a validated user config.
//!
//!   This is where every implicit rule of the format becomes explicit:
//!   the stage-2 image chain, proxy and device inheritance, the
//!   `mount_` namespace that keeps free-form mounts away from the
//!   storage keywords, effective port ordering, and the tokenization
//!   of user script entries.
//

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, warn};
use pei_cfg::compose::ComposeVolume;
use pei_cfg::errors::ValidateError;
use pei_cfg::user::{AptConfig, CustomScriptConfig, DeviceKind, ProxyConfig, Stage, StageConfig, StorageKind, UserConfig};

pub use crate::errors::ConfigureError as Error;
use crate::keys::{self, SshArtifacts};
use crate::spec::{CompiledConfig, CompiledStage, ScriptCall, ScriptTable, VolumeBinding};


/***** STATICS *****/
/// The APT source keywords translated by the in-container setup script; anything else is
/// treated as a repository-relative sources file.
const APT_KEYWORDS: [&str; 5] = ["tuna", "aliyun", "163", "ustc", "cn"];

/// The default output image tags, per stage.
#[inline]
fn default_output_tag(stage: Stage) -> String { format!("pei-image:{}", stage.name()) }





/***** HELPER FUNCTIONS *****/
/// Adds the proxy-related build arguments of the given stage.
fn push_proxy_args(args: &mut IndexMap<String, String>, stage: Stage, proxy: &ProxyConfig) {
    if let Some(url) = proxy.url() {
        args.insert(format!("PEI_HTTP_PROXY_{}", stage.number()), url.clone());
        args.insert(format!("PEI_HTTPS_PROXY_{}", stage.number()), url);
        args.insert("ENABLE_GLOBAL_PROXY".into(), proxy.enable_globally.to_string());
        args.insert("REMOVE_GLOBAL_PROXY_AFTER_BUILD".into(), proxy.remove_after_build.to_string());
    }
}

/// Adds the APT-related build arguments (stage-1 only).
fn push_apt_args(args: &mut IndexMap<String, String>, apt: &AptConfig, project_dir: &Path) {
    if let Some(source) = &apt.repo_source {
        if !APT_KEYWORDS.contains(&source.as_str()) {
            // A path-like source must exist in the build context for the Dockerfile COPY to work
            let local: PathBuf = project_dir.join("installation").join(source);
            if !local.exists() {
                warn!("APT source file '{source}' not found under the installation tree ('{}' is missing)", local.display());
            }
        }
        args.insert("APT_SOURCE_FILE".into(), source.clone());
    }
    args.insert("KEEP_APT_SOURCE_FILE".into(), apt.keep_repo_after_build.to_string());
    args.insert("APT_USE_PROXY".into(), apt.use_proxy.to_string());
    args.insert("APT_KEEP_PROXY".into(), apt.keep_proxy_after_build.to_string());
    if let Some(retries) = apt.num_retries {
        args.insert("APT_NUM_RETRY".into(), retries.to_string());
    }
}

/// Resolves the storage and mount maps of a stage into volume bindings.
///
/// Storage entries keep their keyword as compose volume key; mounts are namespaced
/// `mount_<name>`, so a mount named after a storage keyword never collides with it.
fn resolve_volumes(config: &StageConfig) -> Vec<VolumeBinding> {
    let mut bindings: Vec<VolumeBinding> = Vec::with_capacity(config.storage.len() + config.mount.len());

    for (keyword, entry) in &config.storage {
        let dst: String = entry.dst_path(keyword);
        match entry.kind {
            // Image-backed storage lives in the image; nothing to mount
            StorageKind::Image => {},
            StorageKind::AutoVolume => {
                bindings.push(VolumeBinding { volume: Some((keyword.clone(), ComposeVolume::automatic())), source: keyword.clone(), dst });
            },
            StorageKind::ManualVolume => {
                let name: String = entry.volume_name.clone().unwrap_or_else(|| keyword.clone());
                bindings.push(VolumeBinding { volume: Some((keyword.clone(), ComposeVolume::external(name))), source: keyword.clone(), dst });
            },
            StorageKind::Host => {
                let host_path: String = entry.host_path.clone().unwrap_or_default();
                bindings.push(VolumeBinding { volume: None, source: host_path, dst });
            },
        }
    }

    for (name, entry) in &config.mount {
        let key: String = format!("mount_{name}");
        let dst: String = entry.dst_path.clone();
        match entry.kind {
            // Rejected by validation; listed so the match stays exhaustive
            StorageKind::Image => {},
            StorageKind::AutoVolume => {
                bindings.push(VolumeBinding { volume: Some((key.clone(), ComposeVolume::automatic())), source: key, dst });
            },
            StorageKind::ManualVolume => {
                let volume_name: String = entry.volume_name.clone().unwrap_or_else(|| name.clone());
                bindings.push(VolumeBinding { volume: Some((key.clone(), ComposeVolume::external(volume_name))), source: key, dst });
            },
            StorageKind::Host => {
                let host_path: String = entry.host_path.clone().unwrap_or_default();
                bindings.push(VolumeBinding { volume: None, source: host_path, dst });
            },
        }
    }

    bindings
}

/// Warns about bindings of a stage that share the same destination.
///
/// Plain string equality only; nobody is served by us trying to out-guess path semantics.
fn warn_dst_collisions(stage: Stage, bindings: &[VolumeBinding]) {
    let mut by_dst: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for binding in bindings {
        by_dst.entry(binding.dst.as_str()).or_default().push(binding.source.as_str());
    }
    for (dst, sources) in by_dst {
        if sources.len() > 1 {
            warn!("Multiple {stage} mounts share destination '{dst}': {}", sources.join(", "));
        }
    }
}

/// Warns about duplicate host ports, best-effort.
///
/// Only entries whose host side is fully numeric participate; placeholder-carrying entries are
/// opaque strings by design.
fn warn_duplicate_ports(stage: Stage, ports: &[String]) {
    let mut seen: HashMap<u32, usize> = HashMap::new();
    for port in ports {
        let host_side: &str = port.split(':').next().unwrap_or(port);
        if let Ok(numeric) = host_side.parse::<u32>() {
            *seen.entry(numeric).or_default() += 1;
        }
    }
    for (port, count) in seen {
        if count > 1 {
            warn!("Host port {port} is mapped {count} times on {stage}");
        }
    }
}

/// Tokenizes the custom script entries of a stage with POSIX shell rules.
fn tokenize_scripts(stage: Stage, custom: Option<&CustomScriptConfig>) -> Result<ScriptTable, Error> {
    let custom: &CustomScriptConfig = match custom {
        Some(custom) => custom,
        None => return Ok(ScriptTable::default()),
    };

    let mut tokenize = |entry: &String| -> Result<ScriptCall, Error> {
        let mut tokens: Vec<String> = match shlex::split(entry) {
            Some(tokens) if !tokens.is_empty() => tokens,
            _ => {
                return Err(Error::ScriptTokenize { stage, entry: entry.clone() });
            },
        };
        let script: String = tokens.remove(0);
        Ok(ScriptCall { script, args: tokens })
    };

    Ok(ScriptTable {
        on_build: custom.on_build.iter().map(&mut tokenize).collect::<Result<_, _>>()?,
        on_first_run: custom.on_first_run.iter().map(&mut tokenize).collect::<Result<_, _>>()?,
        on_every_run: custom.on_every_run.iter().map(&mut tokenize).collect::<Result<_, _>>()?,
        on_user_login: custom.on_user_login.iter().map(&mut tokenize).collect::<Result<_, _>>()?,
        on_entry: custom.on_entry.as_ref().map(&mut tokenize).transpose()?,
    })
}

/// Returns whether the given stage reserves GPUs, with stage-2 falling back to stage-1.
fn resolve_gpu(config: &StageConfig, inherited: Option<&StageConfig>) -> bool {
    let device = config.device.or_else(|| inherited.and_then(|config| config.device));
    match device {
        Some(device) if device.kind == DeviceKind::Gpu => {
            warn!("GPU device reservation is emitted unconditionally; 'docker compose up' will fail on hosts without the NVIDIA runtime");
            true
        },
        _ => false,
    }
}





/***** LIBRARY *****/
/// Derives the [`CompiledConfig`] for the given (validated) user config.
///
/// # Arguments
/// - `config`: The user config. Must have passed [`UserConfig::validate()`].
/// - `project_dir`: The project directory, for resolving repository-relative inputs.
/// - `bake_env`: Whether stage-1 resp. stage-2 bake their environment into the image.
///
/// # Errors
/// This function may error if SSH key material cannot be resolved or a script entry cannot be
/// tokenized.
pub fn compile(config: &UserConfig, project_dir: &Path, bake_env: (bool, bool)) -> Result<CompiledConfig, Error> {
    debug!("Deriving compiled configuration...");

    // The base image is the one thing without which nothing below makes sense
    let stage_1_base: String = match config.stage_1.image.as_ref().and_then(|image| image.base.clone()) {
        Some(base) => base,
        None => {
            return Err(Error::Validate { err: ValidateError::MissingBaseImage });
        },
    };
    let stage_1_output: String =
        config.stage_1.image.as_ref().and_then(|image| image.output.clone()).unwrap_or_else(|| default_output_tag(Stage::One));

    // SSH hands its users to the key materializer; the resulting args land on stage-1
    let (ssh_artifacts, ssh_mapping): (SshArtifacts, Option<String>) = match &config.stage_1.ssh {
        Some(ssh) if ssh.enable => {
            let artifacts: SshArtifacts = keys::materialize(ssh, project_dir)?;
            let mapping: Option<String> = ssh.host_port.map(|host_port| format!("{host_port}:{}", ssh.port));
            (artifacts, mapping)
        },
        _ => (SshArtifacts::default(), None),
    };

    // Stage-1 build args: image chain, then proxy, then APT, then SSH
    let mut stage_1_args: IndexMap<String, String> = IndexMap::new();
    stage_1_args.insert("BASE_IMAGE".into(), stage_1_base.clone());
    if let Some(proxy) = &config.stage_1.proxy {
        push_proxy_args(&mut stage_1_args, Stage::One, proxy);
    }
    if let Some(apt) = &config.stage_1.apt {
        push_apt_args(&mut stage_1_args, apt, project_dir);
    }
    stage_1_args.extend(ssh_artifacts.build_args);

    // Stage-1 effective ports: its own, plus the SSH mapping
    let mut stage_1_ports: Vec<String> = config.stage_1.ports.clone();
    stage_1_ports.extend(ssh_mapping.iter().cloned());
    warn_duplicate_ports(Stage::One, &stage_1_ports);

    let stage_1_volumes: Vec<VolumeBinding> = resolve_volumes(&config.stage_1);
    warn_dst_collisions(Stage::One, &stage_1_volumes);

    let stage_1 = CompiledStage {
        stage: Stage::One,
        base_image: stage_1_base,
        image: stage_1_output.clone(),
        build_args: stage_1_args,
        environment: config.stage_1.environment.clone(),
        ports: stage_1_ports,
        volumes: stage_1_volumes,
        gpu: resolve_gpu(&config.stage_1, None),
        bake_env: bake_env.0,
        scripts: tokenize_scripts(Stage::One, config.stage_1.custom.as_ref())?,
    };

    // Stage-2, if declared
    let stage_2: Option<CompiledStage> = match &config.stage_2 {
        Some(stage_2_config) => {
            // The image chain: stage-2 builds on stage-1's output unless overridden
            let base_image: String =
                stage_2_config.image.as_ref().and_then(|image| image.base.clone()).unwrap_or_else(|| stage_1_output.clone());
            let image: String =
                stage_2_config.image.as_ref().and_then(|image| image.output.clone()).unwrap_or_else(|| default_output_tag(Stage::Two));

            let mut args: IndexMap<String, String> = IndexMap::new();
            args.insert("BASE_IMAGE".into(), base_image.clone());
            // Proxy settings inherit from stage-1 when stage-2 has none of its own
            if let Some(proxy) = stage_2_config.proxy.as_ref().or(config.stage_1.proxy.as_ref()) {
                push_proxy_args(&mut args, Stage::Two, proxy);
            }

            // Effective ports: stage-1's, then stage-2's own, then the SSH mapping
            let mut ports: Vec<String> = config.stage_1.ports.clone();
            ports.extend(stage_2_config.ports.iter().cloned());
            ports.extend(ssh_mapping.iter().cloned());
            warn_duplicate_ports(Stage::Two, &ports);

            let volumes: Vec<VolumeBinding> = resolve_volumes(stage_2_config);
            warn_dst_collisions(Stage::Two, &volumes);

            Some(CompiledStage {
                stage: Stage::Two,
                base_image,
                image,
                build_args: args,
                environment: stage_2_config.environment.clone(),
                ports,
                volumes,
                gpu: resolve_gpu(stage_2_config, Some(&config.stage_1)),
                bake_env: bake_env.1,
                scripts: tokenize_scripts(Stage::Two, stage_2_config.custom.as_ref())?,
            })
        },
        None => None,
    };

    Ok(CompiledConfig { project_dir: project_dir.into(), stage_1, stage_2, key_files: ssh_artifacts.files })
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    /// Parses and compiles the given YAML with no baking.
    #[track_caller]
    fn compile_str(raw: &str) -> CompiledConfig {
        let config: UserConfig = serde_yaml::from_str(raw).unwrap();
        config.validate(&Default::default()).unwrap();
        compile(&config, &PathBuf::from("/tmp/does-not-matter"), (false, false)).unwrap()
    }


    #[test]
    fn image_chain_defaults() {
        let compiled = compile_str("stage_1:\n  image:\n    base: ubuntu:24.04\n    output: t:stage-1\nstage_2: {}\n");
        assert_eq!(compiled.stage_1.build_args["BASE_IMAGE"], "ubuntu:24.04");
        assert_eq!(compiled.stage_1.image, "t:stage-1");

        let stage_2 = compiled.stage_2.unwrap();
        assert_eq!(stage_2.base_image, "t:stage-1");
        assert_eq!(stage_2.build_args["BASE_IMAGE"], "t:stage-1");
        assert_eq!(stage_2.image, "pei-image:stage-2");
    }

    #[test]
    fn port_ordering_is_stage1_stage2_ssh() {
        let compiled = compile_str(
            "stage_1:\n  image:\n    base: a\n  ports:\n  - '9000:9000'\n  ssh:\n    port: 22\n    host_port: 2222\nstage_2:\n  ports:\n  - '{{WEB_PORT:-8080}}:80'\n",
        );
        let stage_2 = compiled.stage_2.unwrap();
        assert_eq!(stage_2.ports, vec!["9000:9000", "{{WEB_PORT:-8080}}:80", "2222:22"]);
        // Stage-1 exposes its own ports plus the SSH mapping
        assert_eq!(compiled.stage_1.ports, vec!["9000:9000", "2222:22"]);
    }

    #[test]
    fn proxy_urls_and_flags() {
        let compiled = compile_str(
            "stage_1:\n  image:\n    base: a\n  proxy:\n    address: proxy.lan\n    port: 3128\n    enable_globally: true\nstage_2: {}\n",
        );
        assert_eq!(compiled.stage_1.build_args["PEI_HTTP_PROXY_1"], "http://proxy.lan:3128");
        assert_eq!(compiled.stage_1.build_args["PEI_HTTPS_PROXY_1"], "http://proxy.lan:3128");
        assert_eq!(compiled.stage_1.build_args["ENABLE_GLOBAL_PROXY"], "true");
        assert_eq!(compiled.stage_1.build_args["REMOVE_GLOBAL_PROXY_AFTER_BUILD"], "false");

        // Stage-2 inherits the proxy, under its own argument names
        let stage_2 = compiled.stage_2.unwrap();
        assert_eq!(stage_2.build_args["PEI_HTTP_PROXY_2"], "http://proxy.lan:3128");
    }

    #[test]
    fn https_proxy_scheme() {
        let compiled = compile_str("stage_1:\n  image:\n    base: a\n  proxy:\n    address: proxy.lan\n    port: 443\n    use_https: true\n");
        assert_eq!(compiled.stage_1.build_args["PEI_HTTP_PROXY_1"], "https://proxy.lan:443");
    }

    #[test]
    fn storage_and_mount_namespaces_are_independent() {
        let compiled = compile_str(
            "stage_1:\n  image:\n    base: a\n  storage:\n    data:\n      type: auto-volume\n  mount:\n    data:\n      type: auto-volume\n      dst_path: /custom/data\n",
        );
        let bindings = &compiled.stage_1.volumes;
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].service_entry(), "data:/hard/volume/data");
        assert_eq!(bindings[1].service_entry(), "mount_data:/custom/data");
        assert_eq!(bindings[1].volume.as_ref().unwrap().0, "mount_data");
    }

    #[test]
    fn storage_kinds_resolve() {
        let compiled = compile_str(
            "stage_1:\n  image:\n    base: a\n  storage:\n    app:\n      type: image\n    data:\n      type: manual-volume\n      volume_name: precious\n    workspace:\n      type: host\n      host_path: /home/me/ws\n",
        );
        let bindings = &compiled.stage_1.volumes;
        // Image-backed storage contributes nothing to compose
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].volume.as_ref().unwrap().1.name.as_deref(), Some("precious"));
        assert_eq!(bindings[0].volume.as_ref().unwrap().1.external, Some(true));
        assert_eq!(bindings[1].volume, None);
        assert_eq!(bindings[1].service_entry(), "/home/me/ws:/hard/volume/workspace");
    }

    #[test]
    fn scripts_are_tokenized_with_shell_rules() {
        let compiled = compile_str(
            "stage_1:\n  image:\n    base: a\n  custom:\n    on_build:\n    - 'stage-1/custom/install.sh --flag=value \"quoted arg\"'\n    on_entry: stage-1/custom/entry.sh\n",
        );
        let call = &compiled.stage_1.scripts.on_build[0];
        assert_eq!(call.script, "stage-1/custom/install.sh");
        assert_eq!(call.args, vec!["--flag=value", "quoted arg"]);
        assert_eq!(call.container_path(), "/pei-from-host/stage-1/custom/install.sh");
        assert_eq!(compiled.stage_1.scripts.on_entry.as_ref().unwrap().script, "stage-1/custom/entry.sh");
    }

    #[test]
    fn unbalanced_quotes_are_an_error() {
        let config: UserConfig =
            serde_yaml::from_str("stage_1:\n  image:\n    base: a\n  custom:\n    on_build:\n    - 'foo.sh \"unterminated'\n").unwrap();
        match compile(&config, &PathBuf::from("/tmp/x"), (false, false)) {
            Err(Error::ScriptTokenize { .. }) => {},
            other => panic!("expected a tokenize error, got {other:?}"),
        }
    }

    #[test]
    fn disabled_ssh_contributes_nothing() {
        let compiled = compile_str("stage_1:\n  image:\n    base: a\n  ssh:\n    enable: false\n    host_port: 2222\n");
        assert!(!compiled.stage_1.build_args.contains_key("SSH_USER_NAME"));
        assert!(compiled.stage_1.ports.is_empty());
    }

    #[test]
    fn gpu_inherits_to_stage_2() {
        let compiled = compile_str("stage_1:\n  image:\n    base: a\n  device:\n    type: gpu\nstage_2: {}\n");
        assert!(compiled.stage_1.gpu);
        assert!(compiled.stage_2.unwrap().gpu);
    }
}
