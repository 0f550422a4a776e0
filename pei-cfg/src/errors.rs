//  ERRORS.rs
//    by Lut99
//
//  Created:
//    11 Mar 2024, 11:16:40
//  Last edited:
//    02 Jul 2024, 13:10:34
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the errors that may occur in the `pei-cfg` crate.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::path::PathBuf;

use crate::user::{Lifecycle, Stage, STORAGE_KEYWORDS};


/***** LIBRARY *****/
/// Errors that relate to loading the raw YAML tree.
#[derive(Debug)]
pub enum TreeError {
    /// Failed to read the input file.
    FileReadError { path: PathBuf, err: std::io::Error },
    /// The document contains the same mapping key twice.
    DuplicateKey { path: PathBuf, err: serde_yaml::Error },
    /// The document is not valid YAML.
    ParseError { path: PathBuf, err: serde_yaml::Error },
}
impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use TreeError::*;
        match self {
            FileReadError { path, err } => write!(f, "Failed to read '{}': {}", path.display(), err),
            DuplicateKey { path, err } => write!(f, "Duplicate mapping key in '{}': {}", path.display(), err),
            ParseError { path, err } => write!(f, "Failed to parse '{}' as YAML: {}", path.display(), err),
        }
    }
}
impl Error for TreeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use TreeError::*;
        match self {
            FileReadError { err, .. } => Some(err),
            DuplicateKey { err, .. } => Some(err),
            ParseError { err, .. } => Some(err),
        }
    }
}



/// Errors that relate to the cross-field invariants of a user config.
#[derive(Debug)]
pub enum ValidateError {
    /// `stage_1.image.base` is missing.
    MissingBaseImage,
    /// SSH settings were given on stage-2, which only stage-1 supports.
    SshOnStage2,
    /// APT settings were given on stage-2, which only stage-1 supports.
    AptOnStage2,

    /// A storage entry uses a key outside the fixed keyword set.
    UnknownStorageKey { stage: Stage, key: String },
    /// A storage or mount entry of type `host` lacks its `host_path`.
    HostPathMissing { stage: Stage, what: &'static str, key: String },
    /// A storage or mount entry of type `manual-volume` lacks its `volume_name`.
    VolumeNameMissing { stage: Stage, what: &'static str, key: String },
    /// A mount entry uses the `image` type, which only storage supports.
    MountKindImage { stage: Stage, name: String },
    /// A mount entry's `dst_path` does not start with `/`.
    MountDstNotAbsolute { stage: Stage, name: String, dst: String },

    /// An SSH port is outside `[1, 65535]`.
    PortOutOfRange { what: &'static str },
    /// An SSH user declares both a public key file and inline public key text.
    MultiplePublicKeySources { user: String },
    /// An SSH user declares both a private key file and inline private key text.
    MultiplePrivateKeySources { user: String },
    /// An SSH user's UID is not a plain non-negative integer.
    IllegalUid { user: String, raw: String },

    /// A custom script entry is empty.
    EmptyScriptEntry { stage: Stage, lifecycle: Lifecycle },
    /// A stage-2 `on_build` entry references a runtime-only path.
    BuildTimeRuntimePath { entry: String, token: &'static str },
    /// An environment entry is not of the shape `NAME=VALUE`.
    IllegalEnvEntry { stage: Stage, entry: String },
    /// A `{{...}}` marker occurs in a field that is baked into generated scripts instead of
    /// travelling through Docker Compose.
    PassthroughInBakedField { path: String },
}
impl Display for ValidateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ValidateError::*;
        match self {
            MissingBaseImage => write!(f, "Missing 'stage_1.image.base'; every build needs a source image to start from"),
            SshOnStage2 => write!(f, "SSH is configured on stage-1 only; move the 'ssh' section to 'stage_1'"),
            AptOnStage2 => write!(f, "APT is configured on stage-1 only; move the 'apt' section to 'stage_1'"),

            UnknownStorageKey { stage, key } => {
                write!(f, "Unknown storage key '{key}' in '{}.storage' (expected one of: {})", stage.config_key(), STORAGE_KEYWORDS.join(", "))
            },
            HostPathMissing { stage, what, key } => {
                write!(f, "{what} entry '{key}' in '{}' has type 'host' but no 'host_path'", stage.config_key())
            },
            VolumeNameMissing { stage, what, key } => {
                write!(f, "{what} entry '{key}' in '{}' has type 'manual-volume' but no 'volume_name'", stage.config_key())
            },
            MountKindImage { stage, name } => {
                write!(f, "Mount '{name}' in '{}.mount' has type 'image', which is only valid for storage entries", stage.config_key())
            },
            MountDstNotAbsolute { stage, name, dst } => {
                write!(f, "Mount '{name}' in '{}.mount' has a 'dst_path' that is not absolute ('{dst}' does not start with '/')", stage.config_key())
            },

            PortOutOfRange { what } => write!(f, "Illegal value for '{what}': ports must be in the range [1, 65535]"),
            MultiplePublicKeySources { user } => {
                write!(f, "SSH user '{user}' declares both 'pubkey_file' and 'pubkey_text'; give at most one public key source")
            },
            MultiplePrivateKeySources { user } => {
                write!(f, "SSH user '{user}' declares both 'privkey_file' and 'privkey_text'; give at most one private key source")
            },
            IllegalUid { user, raw } => write!(f, "Illegal UID '{raw}' for SSH user '{user}' (expected a non-negative integer)"),

            EmptyScriptEntry { stage, lifecycle } => {
                write!(f, "Empty script entry in '{}.custom.{lifecycle}'", stage.config_key())
            },
            BuildTimeRuntimePath { entry, token } => {
                write!(
                    f,
                    "Build-time script entry \"{entry}\" references '{token}', which only exists at container runtime; stage-2 'on_build' scripts \
                     cannot use runtime storage paths"
                )
            },
            IllegalEnvEntry { stage, entry } => {
                write!(f, "Illegal environment entry \"{entry}\" in '{}.environment' (expected NAME=VALUE)", stage.config_key())
            },
            PassthroughInBakedField { path } => {
                write!(
                    f,
                    "Passthrough marker in '{path}', which is baked into generated scripts and never reaches Docker Compose; resolve it at \
                     configure time with '${{...}}' instead"
                )
            },
        }
    }
}
impl Error for ValidateError {}
