//  ASSETS.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 11:02:46
//  Last edited:
//    02 Jul 2024, 15:44:19
//  Auto updated?
//    Yes
//
//  Description:
//!   The files baked into the `peictl` binary.
//!
//!   This covers the packaged installation tree that `create` seeds
//!   into a fresh project (Dockerfiles, hook runners, system setup
//!   scripts), the compose template that `configure` fills in, and the
//!   quick-start configs selectable with `create --quick`.
//


/***** STATICS *****/
/// The compose template that the synthesizer fills in.
pub const COMPOSE_TEMPLATE: &str = include_str!("../resources/templates/docker-compose.yml");

/// The quick-start configs, by name. The first entry is the default seed.
pub const QUICKSTART_CONFIGS: &[(&str, &str)] = &[
    ("minimal", include_str!("../resources/templates/config-minimal.yml")),
    ("full", include_str!("../resources/templates/config-full.yml")),
];

/// The packaged installation tree, seeded into every new project.
///
/// Paths are relative to the project directory. The shell payloads are collaborators of the
/// generator, not part of it: the generated wrappers only rely on the contracts they implement
/// (hook dispatch, `_custom-*` lookup, entry selection).
pub const INSTALLATION_FILES: &[PackagedFile] = &[
    PackagedFile { path: "installation/stage-1/Dockerfile", contents: include_str!("../resources/installation/stage-1/Dockerfile"), executable: false },
    PackagedFile {
        path: "installation/stage-1/internals/entrypoint.sh",
        contents: include_str!("../resources/installation/stage-1/internals/entrypoint.sh"),
        executable: true,
    },
    PackagedFile {
        path: "installation/stage-1/internals/on-build.sh",
        contents: include_str!("../resources/installation/stage-1/internals/on-build.sh"),
        executable: true,
    },
    PackagedFile {
        path: "installation/stage-1/internals/setup-profile-d.sh",
        contents: include_str!("../resources/installation/stage-1/internals/setup-profile-d.sh"),
        executable: true,
    },
    PackagedFile {
        path: "installation/stage-1/system/apt/setup-apt.sh",
        contents: include_str!("../resources/installation/stage-1/system/apt/setup-apt.sh"),
        executable: true,
    },
    PackagedFile {
        path: "installation/stage-1/system/proxy/setup-proxy.sh",
        contents: include_str!("../resources/installation/stage-1/system/proxy/setup-proxy.sh"),
        executable: true,
    },
    PackagedFile {
        path: "installation/stage-1/system/ssh/setup-ssh.sh",
        contents: include_str!("../resources/installation/stage-1/system/ssh/setup-ssh.sh"),
        executable: true,
    },
    PackagedFile { path: "installation/stage-2/Dockerfile", contents: include_str!("../resources/installation/stage-2/Dockerfile"), executable: false },
    PackagedFile {
        path: "installation/stage-2/internals/entrypoint.sh",
        contents: include_str!("../resources/installation/stage-2/internals/entrypoint.sh"),
        executable: true,
    },
    PackagedFile {
        path: "installation/stage-2/internals/on-build.sh",
        contents: include_str!("../resources/installation/stage-2/internals/on-build.sh"),
        executable: true,
    },
    PackagedFile {
        path: "installation/stage-2/system/storage/setup-storage.sh",
        contents: include_str!("../resources/installation/stage-2/system/storage/setup-storage.sh"),
        executable: true,
    },
];





/***** AUXILLARY *****/
/// A single file in the packaged installation tree.
#[derive(Clone, Copy, Debug)]
pub struct PackagedFile {
    /// The path of the file, relative to the project directory.
    pub path: &'static str,
    /// The file contents.
    pub contents: &'static str,
    /// Whether the file must carry the executable bit.
    pub executable: bool,
}





/***** LIBRARY *****/
/// Returns the quick-start config with the given name, if it exists.
#[inline]
pub fn quickstart(name: &str) -> Option<&'static str> { QUICKSTART_CONFIGS.iter().find(|(n, _)| *n == name).map(|(_, raw)| *raw) }

/// Returns the names of all quick-start configs.
#[inline]
pub fn quickstart_names() -> Vec<&'static str> { QUICKSTART_CONFIGS.iter().map(|(n, _)| *n).collect() }
