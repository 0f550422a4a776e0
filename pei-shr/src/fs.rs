//  FS.rs
//    by Lut99
//
//  Created:
//    11 Mar 2024, 10:31:02
//  Last edited:
//    02 Jul 2024, 11:40:18
//  Auto updated?
//    Yes
//
//  Description:
//!   Filesystem helpers for writing project artifacts.
//!
//!   The centrepiece is [`StagedDir`], which collects a whole set of
//!   output files in a temporary directory next to their final location
//!   and only then moves them into place. Anything that fails while
//!   content is still being produced therefore leaves the previous
//!   project state fully intact.
//

use std::borrow::Cow;
use std::fmt::{Display, Formatter, Result as FResult};
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use tempfile::TempDir;


/***** ERRORS *****/
/// Errors that may occur while writing project artifacts.
#[derive(Debug)]
pub enum Error {
    /// Failed to create a temporary staging directory.
    TempDirCreate { parent: PathBuf, err: std::io::Error },
    /// Failed to create a directory.
    DirCreate { path: PathBuf, err: std::io::Error },
    /// Failed to write a staged file.
    FileWrite { path: PathBuf, err: std::io::Error },
    /// Failed to read the metadata of a file.
    FileMetadata { path: PathBuf, err: std::io::Error },
    /// Failed to update the permissions of a file.
    FilePermissions { path: PathBuf, err: std::io::Error },
    /// Failed to move a file or directory into place.
    Rename { from: PathBuf, to: PathBuf, err: std::io::Error },
}
impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use Error::*;
        match self {
            TempDirCreate { parent, err } => write!(f, "Failed to create staging directory in '{}': {}", parent.display(), err),
            DirCreate { path, err } => write!(f, "Failed to create directory '{}': {}", path.display(), err),
            FileWrite { path, err } => write!(f, "Failed to write file '{}': {}", path.display(), err),
            FileMetadata { path, err } => write!(f, "Failed to read metadata of '{}': {}", path.display(), err),
            FilePermissions { path, err } => write!(f, "Failed to set permissions of '{}': {}", path.display(), err),
            Rename { from, to, err } => write!(f, "Failed to move '{}' to '{}': {}", from.display(), to.display(), err),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use Error::*;
        match self {
            TempDirCreate { err, .. } => Some(err),
            DirCreate { err, .. } => Some(err),
            FileWrite { err, .. } => Some(err),
            FileMetadata { err, .. } => Some(err),
            FilePermissions { err, .. } => Some(err),
            Rename { err, .. } => Some(err),
        }
    }
}





/***** LIBRARY FUNCTIONS *****/
/// Normalizes the line endings of the given text to LF.
///
/// # Returns
/// The input unchanged if it carries no carriage returns, or a freshly allocated copy with
/// every `\r\n` (and stray `\r`) replaced by `\n`.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Sets the mode bits of the given file.
///
/// # Arguments
/// - `path`: The file to change.
/// - `mode`: The mode bits to set (e.g., `0o644`).
///
/// # Errors
/// This function errors if we failed to read or update the file's permissions.
#[cfg(unix)]
pub fn set_mode(path: impl AsRef<Path>, mode: u32) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt as _;

    let path: &Path = path.as_ref();
    let mut permissions = match fs::metadata(path) {
        Ok(metadata) => metadata.permissions(),
        Err(err) => {
            return Err(Error::FileMetadata { path: path.into(), err });
        },
    };
    permissions.set_mode(mode);
    match fs::set_permissions(path, permissions) {
        Ok(_) => Ok(()),
        Err(err) => Err(Error::FilePermissions { path: path.into(), err }),
    }
}
/// Sets the mode bits of the given file.
///
/// On non-Unix platforms there are no POSIX mode bits to set, so this is a no-op.
#[cfg(not(unix))]
pub fn set_mode(_path: impl AsRef<Path>, _mode: u32) -> Result<(), Error> { Ok(()) }

/// Marks the given file as executable (mode `0o755`).
///
/// # Errors
/// This function errors if we failed to update the file's permissions.
#[inline]
pub fn set_executable(path: impl AsRef<Path>) -> Result<(), Error> { set_mode(path, 0o755) }

/// Ensures that the given directory (and any missing parents) exists.
///
/// # Errors
/// This function errors if the directory could not be created.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<(), Error> {
    let path: &Path = path.as_ref();
    if let Err(err) = fs::create_dir_all(path) {
        return Err(Error::DirCreate { path: path.into(), err });
    }
    Ok(())
}





/***** LIBRARY *****/
/// Collects a set of output files in a temporary directory, then moves them into place in one
/// go.
///
/// Content is written while staging; [`StagedDir::commit()`] only renames. Dropping the stage
/// without committing leaves the target completely untouched. Directories registered with
/// [`StagedDir::replace_dir()`] are emptied at commit time, so their final contents are exactly
/// the staged files and nothing stale survives from a previous run.
#[derive(Debug)]
pub struct StagedDir {
    /// The temporary directory holding the staged files.
    root:  TempDir,
    /// The staged files, in staging order.
    files: Vec<(PathBuf, PathBuf)>,
    /// Directories whose previous contents are replaced wholesale at commit time.
    purge: Vec<PathBuf>,
}
impl StagedDir {
    /// Creates a new stage in a temporary directory under the given parent.
    ///
    /// Keeping the stage on the same filesystem as the target makes the commit renames cheap
    /// and reliable.
    ///
    /// # Errors
    /// This function errors if the temporary directory could not be created.
    pub fn new(parent: impl AsRef<Path>) -> Result<Self, Error> {
        let parent: &Path = parent.as_ref();
        let root: TempDir = match tempfile::Builder::new().prefix(".pei-stage-").tempdir_in(parent) {
            Ok(root) => root,
            Err(err) => {
                return Err(Error::TempDirCreate { parent: parent.into(), err });
            },
        };
        Ok(Self { root, files: vec![], purge: vec![] })
    }

    /// Stages a file for the given target path.
    ///
    /// # Arguments
    /// - `target`: The final path of the file, overwritten at commit time.
    /// - `contents`: The file contents.
    /// - `mode`: Mode bits to set on the file, if any (the bits survive the commit rename).
    ///
    /// # Errors
    /// This function errors if the staged copy could not be written.
    pub fn stage_file(&mut self, target: impl Into<PathBuf>, contents: impl AsRef<[u8]>, mode: Option<u32>) -> Result<(), Error> {
        let target: PathBuf = target.into();
        let staged: PathBuf = self.root.path().join(format!("file-{:04}", self.files.len()));
        if let Err(err) = fs::write(&staged, contents.as_ref()) {
            return Err(Error::FileWrite { path: staged, err });
        }
        if let Some(mode) = mode {
            set_mode(&staged, mode)?;
        }
        self.files.push((staged, target));
        Ok(())
    }

    /// Registers a directory whose contents are replaced wholesale at commit time.
    ///
    /// The directory itself is recreated empty before the staged files are moved in; files from
    /// a previous run that are no longer staged disappear with it.
    #[inline]
    pub fn replace_dir(&mut self, target: impl Into<PathBuf>) { self.purge.push(target.into()); }

    /// Moves every staged file into place.
    ///
    /// Directories registered with [`StagedDir::replace_dir()`] are moved aside first and only
    /// deleted once every rename succeeded; if a rename fails halfway, the moved-aside contents
    /// are restored.
    ///
    /// # Errors
    /// This function errors if a directory could not be prepared or a rename failed.
    pub fn commit(self) -> Result<(), Error> {
        // Move the to-be-replaced directories aside so we can restore them on failure
        let mut backups: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(self.purge.len());
        let result: Result<(), Error> = (|| {
            for (i, dir) in self.purge.iter().enumerate() {
                if dir.exists() {
                    let backup: PathBuf = self.root.path().join(format!("old-{i:04}"));
                    if let Err(err) = fs::rename(dir, &backup) {
                        return Err(Error::Rename { from: dir.clone(), to: backup, err });
                    }
                    backups.push((dir.clone(), backup));
                }
                ensure_dir(dir)?;
            }

            // Now move every staged file into place
            for (staged, target) in &self.files {
                if let Some(parent) = target.parent() {
                    ensure_dir(parent)?;
                }
                if let Err(err) = fs::rename(staged, target) {
                    return Err(Error::Rename { from: staged.clone(), to: target.clone(), err });
                }
            }
            Ok(())
        })();

        // Restore the moved-aside directories if anything failed
        if result.is_err() {
            for (original, backup) in backups {
                if let Err(err) = fs::remove_dir_all(&original).and_then(|_| fs::rename(&backup, &original)) {
                    warn!("Failed to restore '{}' after aborted commit: {} (backup left at '{}')", original.display(), err, backup.display());
                }
            }
        }
        result
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings_are_normalized() {
        assert!(matches!(normalize_line_endings("already\nfine\n"), Cow::Borrowed(_)));
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn staged_commit_moves_files_into_place() {
        let project = TempDir::new().unwrap();
        let target = project.path().join("out").join("hello.txt");

        let mut stage = StagedDir::new(project.path()).unwrap();
        stage.stage_file(&target, "hello", None).unwrap();
        stage.commit().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
    }

    #[test]
    fn dropped_stage_leaves_target_untouched() {
        let project = TempDir::new().unwrap();
        let target = project.path().join("artifact.yml");
        fs::write(&target, "previous").unwrap();

        {
            let mut stage = StagedDir::new(project.path()).unwrap();
            stage.stage_file(&target, "next", None).unwrap();
            // No commit: simulates a failure later in the pipeline
        }

        assert_eq!(fs::read_to_string(&target).unwrap(), "previous");
    }

    #[test]
    fn replaced_dir_loses_stale_files() {
        let project = TempDir::new().unwrap();
        let generated = project.path().join("generated");
        fs::create_dir_all(&generated).unwrap();
        fs::write(generated.join("stale.sh"), "old").unwrap();

        let mut stage = StagedDir::new(project.path()).unwrap();
        stage.replace_dir(&generated);
        stage.stage_file(generated.join("fresh.sh"), "new", Some(0o755)).unwrap();
        stage.commit().unwrap();

        assert!(!generated.join("stale.sh").exists());
        assert_eq!(fs::read_to_string(generated.join("fresh.sh")).unwrap(), "new");
    }

    #[cfg(unix)]
    #[test]
    fn mode_bits_survive_commit() {
        use std::os::unix::fs::PermissionsExt as _;

        let project = TempDir::new().unwrap();
        let target = project.path().join("key");

        let mut stage = StagedDir::new(project.path()).unwrap();
        stage.stage_file(&target, "secret", Some(0o600)).unwrap();
        stage.commit().unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
