//  USER.rs
//    by Lut99
//
//  Created:
//    11 Mar 2024, 13:02:17
//  Last edited:
//    02 Jul 2024, 14:31:09
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the `user_config.yml` layout.
//!
//!   The schema is strictly typed (unknown fields are rejected), but
//!   typing alone cannot express the cross-field invariants of the
//!   format; those live in [`UserConfig::validate()`] and must be
//!   checked before anything is derived from the config.
//

use std::fmt::{Display, Formatter, Result as FResult};
use std::path::PathBuf;
use std::str::FromStr;

use enum_debug::EnumDebug;
use indexmap::IndexMap;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

pub use crate::errors::ValidateError;
use crate::info::YamlInfo;


/***** CONSTANTS *****/
/// The only keys permitted in a `storage` map.
pub const STORAGE_KEYWORDS: [&str; 3] = ["app", "data", "workspace"];

/// Substrings that may not occur in stage-2 `on_build` entries.
///
/// The `/soft/` tree and its `PEI_SOFT_*` / `PEI_PATH_SOFT` environment variables are resolved
/// by the entrypoint at container runtime; during an image build they do not exist yet.
pub const BUILD_TIME_FORBIDDEN: [&str; 6] = ["/soft/", "/hard/volume/", "$PEI_SOFT_", "${PEI_SOFT_", "$PEI_PATH_SOFT", "${PEI_PATH_SOFT"];

/// The default container-side SSH port.
#[inline]
fn default_ssh_port() -> u16 { 22 }
/// Serde default for booleans that default to true.
#[inline]
fn default_true() -> bool { true }





/***** HELPERS *****/
/// A scalar that is accepted as either a YAML string or a YAML number, normalized to a string.
#[derive(Clone, Debug)]
struct ScalarString(String);
impl<'de> Deserialize<'de> for ScalarString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Visitor for the ScalarString.
        struct ScalarStringVisitor;
        impl Visitor<'_> for ScalarStringVisitor {
            type Value = ScalarString;

            fn expecting(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "a string or a number") }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> { Ok(ScalarString(v.into())) }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> { Ok(ScalarString(v.to_string())) }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> { Ok(ScalarString(v.to_string())) }
        }

        deserializer.deserialize_any(ScalarStringVisitor)
    }
}

/// Deserializes a list of port mappings, accepting bare numbers alongside strings.
fn deserialize_port_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    /// Visitor for the port list.
    struct PortListVisitor;
    impl<'de> Visitor<'de> for PortListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "a list of port mappings (strings or numbers)") }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut ports: Vec<String> = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(elem) = seq.next_element::<ScalarString>()? {
                ports.push(elem.0);
            }
            Ok(ports)
        }
    }

    deserializer.deserialize_seq(PortListVisitor)
}

/// Deserializes an optional scalar as a string, accepting numbers (think `password: 123456`).
fn deserialize_opt_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ScalarString>::deserialize(deserializer)?.map(|s| s.0))
}

/// Deserializes the `on_entry` field, which accepts a single string or a one-element list.
fn deserialize_entry_point<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    /// Visitor for the entry point.
    struct EntryPointVisitor;
    impl<'de> Visitor<'de> for EntryPointVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "a script entry, or a list with at most one script entry") }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> { Ok(Some(v.into())) }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> { Ok(None) }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let first: Option<String> = seq.next_element()?;
            if seq.next_element::<String>()?.is_some() {
                return Err(de::Error::custom("'on_entry' takes at most one script entry"));
            }
            Ok(first)
        }
    }

    deserializer.deserialize_any(EntryPointVisitor)
}

/// Returns whether the given environment entry is a legal `NAME=VALUE` pair.
fn is_legal_env_entry(entry: &str) -> bool {
    match entry.split_once('=') {
        Some((name, _)) => pei_shr::substitution::is_valid_var_name(name),
        None => false,
    }
}





/***** AUXILLARY *****/
/// Identifies one of the two build stages.
#[derive(Clone, Copy, Debug, EnumDebug, Eq, Hash, PartialEq)]
pub enum Stage {
    /// The system-level stage, built directly on the user's base image.
    One,
    /// The application-level stage, built on top of stage-1's output.
    Two,
}
impl Stage {
    /// All stages, in build order.
    pub const ALL: [Self; 2] = [Self::One, Self::Two];

    /// Returns the key of this stage in `user_config.yml` (e.g., `stage_1`).
    #[inline]
    pub fn config_key(&self) -> &'static str {
        use Stage::*;
        match self {
            One => "stage_1",
            Two => "stage_2",
        }
    }

    /// Returns the name of this stage as used for compose services and directories (e.g., `stage-1`).
    #[inline]
    pub fn name(&self) -> &'static str {
        use Stage::*;
        match self {
            One => "stage-1",
            Two => "stage-2",
        }
    }

    /// Returns the number of this stage (1 or 2).
    #[inline]
    pub fn number(&self) -> u8 {
        use Stage::*;
        match self {
            One => 1,
            Two => 2,
        }
    }
}
impl Display for Stage {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "{}", self.name()) }
}



/// The points during image build or container startup at which user scripts are wired in.
#[derive(Clone, Copy, Debug, EnumDebug, Eq, Hash, PartialEq)]
pub enum Lifecycle {
    /// During the image build.
    OnBuild,
    /// The first time a container starts.
    OnFirstRun,
    /// Every time a container starts.
    OnEveryRun,
    /// When a user logs in over SSH.
    OnUserLogin,
    /// As the container entrypoint command.
    OnEntry,
}
impl Lifecycle {
    /// All lifecycles, in the order they are documented.
    pub const ALL: [Self; 5] = [Self::OnBuild, Self::OnFirstRun, Self::OnEveryRun, Self::OnUserLogin, Self::OnEntry];

    /// Returns the key of this lifecycle in the `custom` section (e.g., `on_build`).
    #[inline]
    pub fn config_key(&self) -> &'static str {
        use Lifecycle::*;
        match self {
            OnBuild => "on_build",
            OnFirstRun => "on_first_run",
            OnEveryRun => "on_every_run",
            OnUserLogin => "on_user_login",
            OnEntry => "on_entry",
        }
    }

    /// Returns the file name of the generated wrapper script for this lifecycle.
    #[inline]
    pub fn wrapper_filename(&self) -> &'static str {
        use Lifecycle::*;
        match self {
            OnBuild => "_custom-on-build.sh",
            OnFirstRun => "_custom-on-first-run.sh",
            OnEveryRun => "_custom-on-every-run.sh",
            OnUserLogin => "_custom-on-user-login.sh",
            OnEntry => "_custom-on-entry.sh",
        }
    }
}
impl Display for Lifecycle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "{}", self.config_key()) }
}



/// Defines the possible backing kinds of storage and mount entries.
#[derive(Clone, Copy, Debug, Deserialize, EnumDebug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// A compose volume with a generated name.
    AutoVolume,
    /// A pre-existing (external) compose volume, named by the user.
    ManualVolume,
    /// A bind mount from a host directory.
    Host,
    /// Storage baked into the image itself; no compose entry at all.
    Image,
}
impl Display for StorageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use StorageKind::*;
        match self {
            AutoVolume => write!(f, "auto-volume"),
            ManualVolume => write!(f, "manual-volume"),
            Host => write!(f, "host"),
            Image => write!(f, "image"),
        }
    }
}

/// Defines the device modes a stage can request.
#[derive(Clone, Copy, Debug, Deserialize, EnumDebug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// No special devices.
    Cpu,
    /// Reserve the host's NVIDIA GPUs.
    Gpu,
}
impl Display for DeviceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use DeviceKind::*;
        match self {
            Cpu => write!(f, "cpu"),
            Gpu => write!(f, "gpu"),
        }
    }
}
impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            raw => Err(format!("Unknown device type '{raw}'")),
        }
    }
}



/// Describes where the material for one SSH key comes from.
#[derive(Clone, Debug, EnumDebug, Eq, PartialEq)]
pub enum KeySource {
    /// The key text is given inline in the config.
    Inline(String),
    /// A path rooted at the project's `installation/` tree.
    RepositoryRelative(PathBuf),
    /// An absolute path on the configuring host.
    AbsoluteHostPath(PathBuf),
    /// The literal `~`: discover a key in the invoking user's `$HOME/.ssh`.
    SystemAuto,
}

/// Classifies a `*_file` value into a [`KeySource`].
fn classify_key_path(raw: &str) -> KeySource {
    if raw == "~" {
        KeySource::SystemAuto
    } else if raw.starts_with('/') || raw.starts_with("~/") {
        KeySource::AbsoluteHostPath(raw.into())
    } else {
        KeySource::RepositoryRelative(raw.into())
    }
}





/***** LIBRARY *****/
/// Defines the toplevel `user_config.yml` layout.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// The system-level stage. Always present.
    pub stage_1: StageConfig,
    /// The application-level stage, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_2: Option<StageConfig>,
}
impl<'de> YamlInfo<'de> for UserConfig {}
impl UserConfig {
    /// Checks every cross-field invariant of this config.
    ///
    /// Structural typing has already happened by the time a [`UserConfig`] exists; this covers
    /// everything the type system cannot express. Nothing may be derived from a config that has
    /// not passed this check.
    ///
    /// # Arguments
    /// - `opts`: Context from the configure invocation that changes what is legal (environment
    ///   baking makes `{{...}}` markers illegal in the baked entries).
    ///
    /// # Errors
    /// This function errors with the first violated invariant.
    pub fn validate(&self, opts: &ValidateOpts) -> Result<(), ValidateError> {
        // Every build needs a source image
        if self.stage_1.image.as_ref().and_then(|image| image.base.as_ref()).is_none() {
            return Err(ValidateError::MissingBaseImage);
        }

        validate_stage(Stage::One, &self.stage_1, opts.bake_env_stage_1)?;
        if let Some(stage_2) = &self.stage_2 {
            // SSH and APT are stage-1 concerns; accepting them here would silently do nothing
            if stage_2.ssh.is_some() {
                return Err(ValidateError::SshOnStage2);
            }
            if stage_2.apt.is_some() {
                return Err(ValidateError::AptOnStage2);
            }
            validate_stage(Stage::Two, stage_2, opts.bake_env_stage_2)?;

            // Stage-2 build scripts run before any runtime storage exists
            if let Some(custom) = &stage_2.custom {
                for entry in &custom.on_build {
                    for token in BUILD_TIME_FORBIDDEN {
                        if entry.contains(token) {
                            return Err(ValidateError::BuildTimeRuntimePath { entry: entry.clone(), token });
                        }
                    }
                }
            }
        }

        // SSH constraints (stage-1 only, per the check above)
        if let Some(ssh) = &self.stage_1.ssh {
            if ssh.port == 0 {
                return Err(ValidateError::PortOutOfRange { what: "stage_1.ssh.port" });
            }
            if ssh.host_port == Some(0) {
                return Err(ValidateError::PortOutOfRange { what: "stage_1.ssh.host_port" });
            }
            for (name, user) in &ssh.users {
                if user.pubkey_file.is_some() && user.pubkey_text.is_some() {
                    return Err(ValidateError::MultiplePublicKeySources { user: name.clone() });
                }
                if user.privkey_file.is_some() && user.privkey_text.is_some() {
                    return Err(ValidateError::MultiplePrivateKeySources { user: name.clone() });
                }
                // Passwords and UIDs are baked into the SSH setup script, so they never reach
                // compose
                if let Some(password) = &user.password {
                    if pei_shr::substitution::contains_passthrough(password) {
                        return Err(ValidateError::PassthroughInBakedField { path: format!("stage_1.ssh.users.{name}.password") });
                    }
                }
                if let Some(uid) = &user.uid {
                    if pei_shr::substitution::contains_passthrough(uid) {
                        return Err(ValidateError::PassthroughInBakedField { path: format!("stage_1.ssh.users.{name}.uid") });
                    }
                    if uid.parse::<u32>().is_err() {
                        return Err(ValidateError::IllegalUid { user: name.clone(), raw: uid.clone() });
                    }
                }
            }
        }

        Ok(())
    }
}

/// Checks the invariants of a single stage section.
fn validate_stage(stage: Stage, config: &StageConfig, bake_env: bool) -> Result<(), ValidateError> {
    // Storage uses a fixed keyword set; a typo here used to silently create dead mounts
    for (key, entry) in &config.storage {
        if !STORAGE_KEYWORDS.contains(&key.as_str()) {
            return Err(ValidateError::UnknownStorageKey { stage, key: key.clone() });
        }
        match entry.kind {
            StorageKind::Host if entry.host_path.is_none() => {
                return Err(ValidateError::HostPathMissing { stage, what: "storage", key: key.clone() });
            },
            StorageKind::ManualVolume if entry.volume_name.is_none() => {
                return Err(ValidateError::VolumeNameMissing { stage, what: "storage", key: key.clone() });
            },
            _ => {},
        }
    }

    // Mounts are free-form, but always need an absolute in-container destination
    for (name, entry) in &config.mount {
        match entry.kind {
            StorageKind::Image => {
                return Err(ValidateError::MountKindImage { stage, name: name.clone() });
            },
            StorageKind::Host if entry.host_path.is_none() => {
                return Err(ValidateError::HostPathMissing { stage, what: "mount", key: name.clone() });
            },
            StorageKind::ManualVolume if entry.volume_name.is_none() => {
                return Err(ValidateError::VolumeNameMissing { stage, what: "mount", key: name.clone() });
            },
            _ => {},
        }
        if !entry.dst_path.starts_with('/') {
            return Err(ValidateError::MountDstNotAbsolute { stage, name: name.clone(), dst: entry.dst_path.clone() });
        }
    }

    // Environment entries must be well-shaped, and marker-free when they get baked
    for (i, entry) in config.environment.iter().enumerate() {
        if !is_legal_env_entry(entry) {
            return Err(ValidateError::IllegalEnvEntry { stage, entry: entry.clone() });
        }
        if bake_env && pei_shr::substitution::contains_passthrough(entry) {
            return Err(ValidateError::PassthroughInBakedField { path: format!("{}.environment[{i}]", stage.config_key()) });
        }
    }

    // The proxy settings are written into the image environment by the setup scripts
    if let Some(proxy) = &config.proxy {
        if let Some(address) = &proxy.address {
            if pei_shr::substitution::contains_passthrough(address) {
                return Err(ValidateError::PassthroughInBakedField { path: format!("{}.proxy.address", stage.config_key()) });
            }
        }
    }

    // Script entries must be non-empty so tokenization always yields a script path
    if let Some(custom) = &config.custom {
        for lifecycle in Lifecycle::ALL {
            for entry in custom.entries(lifecycle) {
                if entry.trim().is_empty() {
                    return Err(ValidateError::EmptyScriptEntry { stage, lifecycle });
                }
            }
        }
    }

    Ok(())
}

/// Context from the configure invocation that changes what [`UserConfig::validate()`] accepts.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidateOpts {
    /// Whether stage-1's environment entries are baked into `/etc/environment` at build time.
    pub bake_env_stage_1: bool,
    /// Whether stage-2's environment entries are baked into `/etc/environment` at build time.
    pub bake_env_stage_2: bool,
}



/// Defines the per-stage section of the config.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// The source and output image names for this stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageConfig>,
    /// SSH server settings (stage-1 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshConfig>,
    /// Proxy settings used during build and, optionally, at runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    /// APT repository settings (stage-1 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apt: Option<AptConfig>,
    /// Device reservations for the resulting container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceConfig>,
    /// `NAME=VALUE` environment entries for the resulting container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
    /// Port mappings in Docker Compose string syntax. Kept as strings on purpose: passthrough
    /// markers must survive to the compose file.
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "deserialize_port_list")]
    pub ports: Vec<String>,
    /// The fixed-keyword storage map.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub storage: IndexMap<String, StorageConfig>,
    /// Freely-named extra mounts.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub mount: IndexMap<String, MountConfig>,
    /// User-provided lifecycle scripts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomScriptConfig>,
}

/// Defines the image names of a stage.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    /// The image this stage builds on. Optional for stage-2, which defaults to stage-1's
    /// output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base:   Option<String>,
    /// The tag this stage's build produces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Defines the SSH section of a stage.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    /// Whether the SSH server is installed and started at all.
    #[serde(default = "default_true")]
    pub enable: bool,
    /// The container-side SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// The host-side port mapping for the SSH port, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    /// The users to create, in declaration order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub users: IndexMap<String, SshUserConfig>,
}

/// Defines a single SSH user.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SshUserConfig {
    /// The user's password, if any.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_opt_scalar")]
    pub password: Option<String>,
    /// The user's numeric ID, if pinned.
    ///
    /// Carried as a raw scalar so validation sees stray `{{...}}` markers before any integer
    /// coercion runs; the integer shape is enforced by [`UserConfig::validate()`].
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_opt_scalar")]
    pub uid: Option<String>,
    /// Where to find the user's public key (`~` for auto-discovery).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey_file: Option<String>,
    /// The user's public key, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey_text: Option<String>,
    /// Where to find the user's private key (`~` for auto-discovery).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privkey_file: Option<String>,
    /// The user's private key, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privkey_text: Option<String>,
}
impl SshUserConfig {
    /// Returns where this user's public key comes from, if a public key was given at all.
    ///
    /// Assumes [`UserConfig::validate()`] has passed (i.e., at most one source is set); inline
    /// text wins if it has not.
    pub fn public_key_source(&self) -> Option<KeySource> {
        if let Some(text) = &self.pubkey_text {
            return Some(KeySource::Inline(text.clone()));
        }
        self.pubkey_file.as_deref().map(classify_key_path)
    }

    /// Returns where this user's private key comes from, if a private key was given at all.
    ///
    /// Assumes [`UserConfig::validate()`] has passed (i.e., at most one source is set); inline
    /// text wins if it has not.
    pub fn private_key_source(&self) -> Option<KeySource> {
        if let Some(text) = &self.privkey_text {
            return Some(KeySource::Inline(text.clone()));
        }
        self.privkey_file.as_deref().map(classify_key_path)
    }

    /// Returns whether this user has no way of logging in at all.
    ///
    /// Such users are permitted (they may be provisioned by other means), but the SSH setup
    /// must skip them.
    #[inline]
    pub fn is_inaccessible(&self) -> bool { self.password.is_none() && self.public_key_source().is_none() && self.private_key_source().is_none() }
}

/// Defines the proxy section of a stage.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// The proxy host, without scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// The proxy port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Whether the proxy is written to the image environment for all processes.
    #[serde(default)]
    pub enable_globally: bool,
    /// Whether the global proxy setting is removed again after the build.
    #[serde(default)]
    pub remove_after_build: bool,
    /// Whether to talk to the proxy over https instead of http.
    #[serde(default)]
    pub use_https: bool,
}
impl ProxyConfig {
    /// Returns the full proxy URL, if both address and port are configured.
    pub fn url(&self) -> Option<String> {
        match (&self.address, self.port) {
            (Some(address), Some(port)) => {
                let scheme: &str = if self.use_https { "https" } else { "http" };
                Some(format!("{scheme}://{address}:{port}"))
            },
            _ => None,
        }
    }
}

/// Defines the APT section of a stage.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AptConfig {
    /// The repository source: a well-known keyword (`tuna`, `aliyun`, `163`, `ustc`, `cn`) or a
    /// repository-relative path to a sources file. Translated by the in-container setup script.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_opt_scalar")]
    pub repo_source: Option<String>,
    /// Whether the configured source survives into the final image.
    #[serde(default = "default_true")]
    pub keep_repo_after_build: bool,
    /// Whether APT itself uses the stage proxy during build.
    #[serde(default)]
    pub use_proxy: bool,
    /// Whether the APT proxy configuration survives into the final image.
    #[serde(default)]
    pub keep_proxy_after_build: bool,
    /// How often APT retries a failed fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_retries: Option<u32>,
}

/// Defines the device section of a stage.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// The device mode for this stage's container.
    #[serde(rename = "type")]
    pub kind: DeviceKind,
}

/// Defines one entry in the fixed-keyword storage map.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// How the storage is backed.
    #[serde(rename = "type")]
    pub kind: StorageKind,
    /// The host directory backing a `host` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    /// The external volume backing a `manual-volume` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
}
impl StorageConfig {
    /// Returns the in-container destination for the given storage keyword.
    ///
    /// Image-backed storage lives under `/hard/image`, everything else under `/hard/volume`;
    /// the entrypoint links the `/soft` tree to whichever exists.
    #[inline]
    pub fn dst_path(&self, keyword: &str) -> String {
        match self.kind {
            StorageKind::Image => format!("/hard/image/{keyword}"),
            _ => format!("/hard/volume/{keyword}"),
        }
    }
}

/// Defines one entry in the free-form mount map.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    /// How the mount is backed. `image` is not permitted here.
    #[serde(rename = "type")]
    pub kind: StorageKind,
    /// The host directory backing a `host` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    /// The external volume backing a `manual-volume` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    /// The in-container destination. Must be absolute.
    pub dst_path: String,
}

/// Defines the user-provided lifecycle scripts of a stage.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CustomScriptConfig {
    /// Scripts run during the image build.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_build: Vec<String>,
    /// Scripts run the first time a container starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_first_run: Vec<String>,
    /// Scripts run every time a container starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_every_run: Vec<String>,
    /// Scripts run when a user logs in over SSH.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_user_login: Vec<String>,
    /// The entrypoint script. Accepts a plain string or a one-element list.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_entry_point")]
    pub on_entry: Option<String>,
}
impl CustomScriptConfig {
    /// Returns the entries configured for the given lifecycle, in declaration order.
    pub fn entries(&self, lifecycle: Lifecycle) -> &[String] {
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





/***** TESTS *****/
