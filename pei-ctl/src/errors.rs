//  ERRORS.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 10:49:33
//  Last edited:
//    02 Jul 2024, 15:31:27
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the errors that may occur in the `peictl` executable.
//!
//!   Every toplevel error knows its process exit code: `2` for
//!   everything traceable to user input (broken config, missing files,
//!   illegal flags), `1` for internal failures.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::path::PathBuf;

use pei_cfg::user::Stage;


/***** LIBRARY *****/
/// Errors that relate to creating a new project.
#[derive(Debug)]
pub enum CreateError {
    /// The requested quick-start config does not exist.
    UnknownQuickStart { name: String, available: Vec<&'static str> },
    /// The project directory exists but is not a directory.
    ProjectDirNotADir { path: PathBuf },
    /// The project directory exists and is not empty.
    ProjectDirNotEmpty { path: PathBuf },
    /// Failed to list the contents of the project directory.
    ProjectDirReadError { path: PathBuf, err: std::io::Error },
    /// Failed to create a directory.
    DirCreateError { path: PathBuf, err: std::io::Error },
    /// Failed to write one of the packaged files.
    FileWriteError { path: PathBuf, err: std::io::Error },
    /// Failed to mark a packaged script as executable.
    ExecutableError { err: pei_shr::fs::Error },
}
impl CreateError {
    /// Returns the process exit code for this error.
    #[inline]
    pub fn exit_code(&self) -> i32 {
        use CreateError::*;
        match self {
            UnknownQuickStart { .. } | ProjectDirNotADir { .. } | ProjectDirNotEmpty { .. } => 2,
            ProjectDirReadError { .. } | DirCreateError { .. } | FileWriteError { .. } | ExecutableError { .. } => 1,
        }
    }
}
impl Display for CreateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use CreateError::*;
        match self {
            UnknownQuickStart { name, available } => {
                write!(f, "Unknown quick-start config '{name}' (available: {})", available.join(", "))
            },
            ProjectDirNotADir { path } => write!(f, "Project path '{}' exists but is not a directory", path.display()),
            ProjectDirNotEmpty { path } => {
                write!(f, "Project directory '{}' is not empty; re-run with '--force' to seed it anyway", path.display())
            },
            ProjectDirReadError { path, err } => write!(f, "Failed to list project directory '{}': {}", path.display(), err),
            DirCreateError { path, err } => write!(f, "Failed to create directory '{}': {}", path.display(), err),
            FileWriteError { path, err } => write!(f, "Failed to write packaged file '{}': {}", path.display(), err),
            ExecutableError { err } => write!(f, "Failed to mark packaged script as executable: {err}"),
        }
    }
}
impl Error for CreateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use CreateError::*;
        match self {
            UnknownQuickStart { .. } | ProjectDirNotADir { .. } | ProjectDirNotEmpty { .. } => None,
            ProjectDirReadError { err, .. } => Some(err),
            DirCreateError { err, .. } => Some(err),
            FileWriteError { err, .. } => Some(err),
            ExecutableError { err } => Some(err),
        }
    }
}



/// Errors that relate to resolving SSH key material.
#[derive(Debug)]
pub enum KeyError {
    /// A user declares two sources for the same key.
    AmbiguousSource { public: bool },
    /// We needed the invoking user's home directory but could not find it.
    NoHomeDirectory,
    /// Auto-discovery found no usable key in `$HOME/.ssh`.
    AutoKeyNotFound { dir: PathBuf, public: bool },
    /// The given key file does not exist.
    FileNotFound { path: PathBuf },
    /// Failed to read the given key file.
    FileReadError { path: PathBuf, err: std::io::Error },
    /// The public key does not start with a recognized key type.
    InvalidPublicKey { token: String },
}
impl Display for KeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use KeyError::*;
        match self {
            AmbiguousSource { public } => {
                let what: &str = if *public { "public" } else { "private" };
                write!(f, "Both a {what} key file and inline {what} key text are given; give at most one source")
            },
            NoHomeDirectory => write!(f, "Cannot auto-discover SSH keys without a home directory"),
            AutoKeyNotFound { dir, public } => {
                write!(f, "No {} key found in '{}' (tried id_rsa, id_dsa, id_ecdsa, id_ed25519)", if *public { "public" } else { "private" }, dir.display())
            },
            FileNotFound { path } => write!(f, "Key file '{}' not found", path.display()),
            FileReadError { path, err } => write!(f, "Failed to read key file '{}': {}", path.display(), err),
            InvalidPublicKey { token } => write!(f, "'{token}' is not a recognized public key type (expected ssh-rsa, ssh-ed25519, ssh-ecdsa or ecdsa-sha2-nistp256/384/521)"),
        }
    }
}
impl Error for KeyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use KeyError::*;
        match self {
            FileReadError { err, .. } => Some(err),
            _ => None,
        }
    }
}



/// Errors that relate to configuring a project.
#[derive(Debug)]
pub enum ConfigureError {
    /// Failed to load the raw config tree.
    Tree { err: pei_cfg::errors::TreeError },
    /// Configure-time substitution failed, or a malformed marker was found.
    Substitution { err: pei_shr::substitution::Error },
    /// The substituted tree does not fit the schema.
    Schema { path: PathBuf, err: serde_yaml::Error },
    /// A cross-field invariant of the config is violated.
    Validate { err: pei_cfg::errors::ValidateError },
    /// `--with-merged` was requested, but the config carries passthrough markers.
    PassthroughWithMerged { path: String },
    /// One of the `PEI_BAKE_ENV_STAGE_*` variables holds something non-boolean.
    EnvFlagParse { name: &'static str, value: String },

    /// Failed to resolve the key material of an SSH user.
    KeyResolve { user: String, err: KeyError },
    /// A custom script entry could not be tokenized.
    ScriptTokenize { stage: Stage, entry: String },
    /// A custom script argument cannot be quoted into a shell script.
    ScriptQuote { stage: Stage, entry: String },

    /// The embedded compose template is broken.
    TemplateParse { err: pei_cfg::info::YamlError },
    /// Failed to lower or serialize the compose document.
    ComposeSerialize { err: serde_yaml::Error },
    /// Failed to write the project artifacts.
    Write { err: pei_shr::fs::Error },
}
impl ConfigureError {
    /// Returns the process exit code for this error.
    #[inline]
    pub fn exit_code(&self) -> i32 {
        use ConfigureError::*;
        match self {
            Tree { .. }
            | Substitution { .. }
            | Schema { .. }
            | Validate { .. }
            | PassthroughWithMerged { .. }
            | EnvFlagParse { .. }
            | KeyResolve { .. }
            | ScriptTokenize { .. }
            | ScriptQuote { .. } => 2,
            TemplateParse { .. } | ComposeSerialize { .. } | Write { .. } => 1,
        }
    }
}
impl Display for ConfigureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ConfigureError::*;
        match self {
            Tree { err } => write!(f, "{err}"),
            Substitution { err } => write!(f, "{err}"),
            Schema { path, err } => write!(f, "'{}' does not fit the config schema: {}", path.display(), err),
            Validate { err } => write!(f, "{err}"),
            PassthroughWithMerged { path } => {
                write!(
                    f,
                    "'--with-merged' cannot be used while the config carries passthrough markers (first one at '{path}'); merged artifacts are \
                     resolved at build time, not by Docker Compose"
                )
            },
            EnvFlagParse { name, value } => write!(f, "Illegal value '{value}' for '{name}' (expected a boolean)"),

            KeyResolve { user, err } => write!(f, "Failed to resolve key material for SSH user '{user}': {err}"),
            ScriptTokenize { stage, entry } => {
                write!(f, "Cannot tokenize script entry \"{entry}\" of {stage} (unbalanced quotes?)")
            },
            ScriptQuote { stage, entry, .. } => {
                write!(f, "Cannot quote script entry \"{entry}\" of {stage} into a generated shell script")
            },

            TemplateParse { err } => write!(f, "Embedded compose template is broken: {err}"),
            ComposeSerialize { err } => write!(f, "Failed to serialize the compose document: {err}"),
            Write { err } => write!(f, "Failed to write project artifacts: {err}"),
        }
    }
}
impl Error for ConfigureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use ConfigureError::*;
        match self {
            Tree { err } => Some(err),
            Substitution { err } => Some(err),
            Schema { err, .. } => Some(err),
            Validate { err } => Some(err),
            PassthroughWithMerged { .. } | EnvFlagParse { .. } => None,

            KeyResolve { err, .. } => Some(err),
            ScriptTokenize { .. } | ScriptQuote { .. } => None,

            TemplateParse { err } => Some(err),
            ComposeSerialize { err } => Some(err),
            Write { err } => Some(err),
        }
    }
}
