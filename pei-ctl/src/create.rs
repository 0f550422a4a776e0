//  CREATE.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 11:21:37
//  Last edited:
//    02 Jul 2024, 15:50:41
//  Auto updated?
//    Yes
//
//  Description:
//!   Handles the `peictl create` subcommand, which seeds a new project
//!   directory with the packaged installation tree and a starter
//!   `user_config.yml`.
//

use std::fs;
use std::path::{Path, PathBuf};

use console::style;
use log::{debug, info};

use crate::assets::{self, PackagedFile};
pub use crate::errors::CreateError as Error;


/***** HELPER FUNCTIONS *****/
/// Writes a single packaged file into the project directory.
fn write_packaged_file(project_dir: &Path, file: &PackagedFile) -> Result<(), Error> {
    let target: PathBuf = project_dir.join(file.path);
    debug!("Writing '{}'...", target.display());

    // Make sure its directory exists
    if let Some(dir) = target.parent() {
        if let Err(err) = fs::create_dir_all(dir) {
            return Err(Error::DirCreateError { path: dir.into(), err });
        }
    }

    // Write it with LF endings, and give scripts their executable bit
    let contents = pei_shr::fs::normalize_line_endings(file.contents);
    if let Err(err) = fs::write(&target, contents.as_bytes()) {
        return Err(Error::FileWriteError { path: target, err });
    }
    if file.executable {
        if let Err(err) = pei_shr::fs::set_executable(&target) {
            return Err(Error::ExecutableError { err });
        }
    }
    Ok(())
}





/***** LIBRARY *****/
/// Handles seeding a new project directory.
///
/// # Arguments
/// - `project_dir`: The directory to seed. Created if it does not exist.
/// - `quick`: The name of the quick-start config to write as the starter `user_config.yml`.
/// - `force`: If true, seeds the directory even if it is not empty.
///
/// # Returns
/// Nothing, but does write the packaged installation tree plus a starter config to the given
/// directory and updates the user on stdout on success.
///
/// # Errors
/// This function may error if the quick-start name is unknown, if the directory is unusable,
/// or if I/O errors occur while writing the files.
pub fn run(project_dir: impl Into<PathBuf>, quick: &str, force: bool) -> Result<(), Error> {
    let project_dir: PathBuf = project_dir.into();
    info!("Creating new PeiDocker project in '{}'...", project_dir.display());

    // Resolve the starter config first, so a typo'd name fails before we touch the disk
    let seed: &str = match assets::quickstart(quick) {
        Some(seed) => seed,
        None => {
            return Err(Error::UnknownQuickStart { name: quick.into(), available: assets::quickstart_names() });
        },
    };

    // Assert the target is a (sufficiently empty) directory, or create it
    if project_dir.exists() {
        if !project_dir.is_dir() {
            return Err(Error::ProjectDirNotADir { path: project_dir });
        }
        let mut entries = match fs::read_dir(&project_dir) {
            Ok(entries) => entries,
            Err(err) => {
                return Err(Error::ProjectDirReadError { path: project_dir, err });
            },
        };
        if entries.next().is_some() && !force {
            return Err(Error::ProjectDirNotEmpty { path: project_dir });
        }
    } else if let Err(err) = fs::create_dir_all(&project_dir) {
        return Err(Error::DirCreateError { path: project_dir, err });
    }

    // Materialize the packaged installation tree
    debug!("Materializing packaged installation tree ({} files)...", assets::INSTALLATION_FILES.len());
    for file in assets::INSTALLATION_FILES {
        write_packaged_file(&project_dir, file)?;
    }
    // Also create the directories that only get content later
    for dir in ["installation/stage-1/custom", "installation/stage-1/generated", "installation/stage-2/custom", "installation/stage-2/generated"] {
        let path: PathBuf = project_dir.join(dir);
        if let Err(err) = fs::create_dir_all(&path) {
            return Err(Error::DirCreateError { path, err });
        }
    }

    // Finally, the starter config
    let config_path: PathBuf = project_dir.join("user_config.yml");
    debug!("Writing starter config ('{quick}') to '{}'...", config_path.display());
    if let Err(err) = fs::write(&config_path, seed) {
        return Err(Error::FileWriteError { path: config_path, err });
    }

    // Done
    println!("Successfully created {}", style(project_dir.display().to_string()).bold().green());
    println!("Edit {} and run 'peictl configure -p {}' to generate the compose file.", style("user_config.yml").bold(), project_dir.display());
    Ok(())
}
