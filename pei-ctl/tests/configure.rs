//  CONFIGURE.rs
//    by Lut99
//
//  Created:
//    13 Mar 2024, 09:34:19
//  Last edited:
//    02 Jul 2024, 18:44:31
//  Auto updated?
//    Yes
//
//  Description:
//!   End-to-end tests for the configure pipeline: seed a project, write
//!   a config, configure it, inspect the emitted artifacts.
//

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use pei_ctl::configure::{self, Options};
use pei_ctl::create;
use pei_ctl::errors::ConfigureError;
use serde_yaml::Value;
use tempfile::TempDir;


/***** HELPERS *****/
/// Seeds a fresh project directory.
fn fresh_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    create::run(dir.path(), "minimal", true).unwrap();
    dir
}

/// Writes the given config into the project and configures it with the given environment.
fn configure_with(project: &Path, config: &str, env: &[(&str, &str)], opts: Options) -> Result<(), ConfigureError> {
    fs::write(project.join("user_config.yml"), config).unwrap();
    let env: HashMap<String, String> = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    configure::run_with_env(project, opts, &env)
}

/// Reads and parses the emitted compose file.
fn read_compose(project: &Path) -> Value {
    let raw = fs::read_to_string(project.join("docker-compose.yml")).unwrap();
    serde_yaml::from_str(&raw).unwrap()
}

/// Indexes into a YAML tree with a dotted path, panicking when a step is missing.
#[track_caller]
fn lookup<'v>(tree: &'v Value, path: &str) -> &'v Value {
    let mut current = tree;
    for step in path.split('.') {
        current = current.get(step).unwrap_or_else(|| panic!("no '{step}' while looking up '{path}'"));
    }
    current
}


/***** TESTS *****/
#[test]
fn minimal_config_emits_stage_1_only() {
    let project = fresh_project();
    configure_with(project.path(), "stage_1:\n  image:\n    base: ubuntu:24.04\n    output: t:stage-1\n", &[], Options::default()).unwrap();

    let compose = read_compose(project.path());
    assert_eq!(lookup(&compose, "services.stage-1.build.args.BASE_IMAGE").as_str(), Some("ubuntu:24.04"));
    assert_eq!(lookup(&compose, "services.stage-1.image").as_str(), Some("t:stage-1"));
    assert!(lookup(&compose, "services").get("stage-2").is_none());
}

#[test]
fn passthrough_markers_become_compose_substitutions() {
    let project = fresh_project();
    configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: ubuntu:24.04\nstage_2:\n  image:\n    output: 't:{{TAG:-dev}}'\n",
        &[],
        Options::default(),
    )
    .unwrap();

    let compose = read_compose(project.path());
    assert_eq!(lookup(&compose, "services.stage-2.image").as_str(), Some("t:${TAG:-dev}"));
}

#[test]
fn unresolved_config_time_variable_is_fatal_and_named() {
    let project = fresh_project();
    let err = configure_with(project.path(), "stage_1:\n  image:\n    base: '${PEI_TEST_UNSET_VAR}'\n", &[], Options::default()).unwrap_err();

    assert_eq!(err.exit_code(), 2);
    let message = err.to_string();
    assert!(message.contains("PEI_TEST_UNSET_VAR"), "message does not name the variable: {message}");
    assert!(message.contains("${PEI_TEST_UNSET_VAR}"), "message does not quote the token: {message}");
    // Nothing was written
    assert!(!project.path().join("docker-compose.yml").exists());
}

#[test]
fn config_time_variables_are_substituted() {
    let project = fresh_project();
    configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: '${PEI_TEST_BASE}'\n    output: 'img:${PEI_TEST_TAG:-latest}'\n",
        &[("PEI_TEST_BASE", "ubuntu:22.04")],
        Options::default(),
    )
    .unwrap();

    let compose = read_compose(project.path());
    assert_eq!(lookup(&compose, "services.stage-1.build.args.BASE_IMAGE").as_str(), Some("ubuntu:22.04"));
    assert_eq!(lookup(&compose, "services.stage-1.image").as_str(), Some("img:latest"));
}

#[test]
fn duplicate_yaml_keys_are_rejected() {
    let project = fresh_project();
    let err = configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: a\n  mount:\n    x:\n      type: auto-volume\n      dst_path: /x\n    x:\n      type: auto-volume\n      dst_path: /y\n",
        &[],
        Options::default(),
    )
    .unwrap_err();

    assert!(matches!(err, ConfigureError::Tree { .. }), "unexpected error: {err:?}");
    assert_eq!(err.exit_code(), 2);
    assert!(!project.path().join("docker-compose.yml").exists());
}

#[test]
fn storage_and_mount_share_names_without_collision() {
    let project = fresh_project();
    configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: a\nstage_2:\n  storage:\n    data:\n      type: auto-volume\n  mount:\n    data:\n      type: auto-volume\n      dst_path: /custom/data\n",
        &[],
        Options::default(),
    )
    .unwrap();

    let compose = read_compose(project.path());
    let volumes = lookup(&compose, "volumes");
    assert!(volumes.get("data").is_some());
    assert!(volumes.get("mount_data").is_some());

    let service_volumes: Vec<&str> =
        lookup(&compose, "services.stage-2.volumes").as_sequence().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
    assert_eq!(service_volumes, vec!["data:/hard/volume/data", "mount_data:/custom/data"]);
}

#[test]
fn passthrough_uid_is_a_baked_field_error() {
    let project = fresh_project();
    let err = configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: a\n  ssh:\n    users:\n      alice:\n        uid: '{{HOST_UID:-1000}}'\n",
        &[],
        Options::default(),
    )
    .unwrap_err();

    // A marker in a baked field must be reported as exactly that, not as a type mismatch
    assert!(matches!(err, ConfigureError::Validate { .. }), "unexpected error: {err:?}");
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("stage_1.ssh.users.alice.uid"), "offending field not named: {err}");
}

#[test]
fn build_time_runtime_path_is_rejected() {
    let project = fresh_project();
    let err = configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: a\nstage_2:\n  custom:\n    on_build:\n    - 'stage-2/system/foo.sh --cache-dir=/soft/data/cache'\n",
        &[],
        Options::default(),
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("stage-2/system/foo.sh --cache-dir=/soft/data/cache"), "offending entry not quoted: {err}");
}

#[test]
fn effective_ports_preserve_order_and_placeholders() {
    let project = fresh_project();
    configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: a\n  ports:\n  - '2222:22'\nstage_2:\n  ports:\n  - '{{WEB_PORT:-8080}}:80'\n",
        &[],
        Options::default(),
    )
    .unwrap();

    let compose = read_compose(project.path());
    let ports: Vec<&str> = lookup(&compose, "services.stage-2.ports").as_sequence().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
    assert_eq!(ports, vec!["2222:22", "${WEB_PORT:-8080}:80"]);
}

#[test]
fn configure_is_idempotent() {
    let project = fresh_project();
    let config = "stage_1:\n  image:\n    base: ubuntu:24.04\n  ssh:\n    host_port: 2222\n    users:\n      me:\n        password: '123456'\n  custom:\n    on_build:\n    - stage-1/custom/tools.sh\nstage_2:\n  storage:\n    data:\n      type: auto-volume\n";

    configure_with(project.path(), config, &[], Options::default()).unwrap();
    let compose_1 = fs::read(project.path().join("docker-compose.yml")).unwrap();
    let wrapper_1 = fs::read(project.path().join("installation/stage-1/generated/_custom-on-build.sh")).unwrap();

    configure_with(project.path(), config, &[], Options::default()).unwrap();
    let compose_2 = fs::read(project.path().join("docker-compose.yml")).unwrap();
    let wrapper_2 = fs::read(project.path().join("installation/stage-1/generated/_custom-on-build.sh")).unwrap();

    assert_eq!(compose_1, compose_2);
    assert_eq!(wrapper_1, wrapper_2);
}

#[test]
fn failed_configure_leaves_previous_artifacts() {
    let project = fresh_project();
    configure_with(project.path(), "stage_1:\n  image:\n    base: ubuntu:24.04\n    output: t:stage-1\n", &[], Options::default()).unwrap();
    let before = fs::read(project.path().join("docker-compose.yml")).unwrap();

    // A config that fails validation must not touch anything
    let err = configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: a\n  storage:\n    scratch:\n      type: auto-volume\n",
        &[],
        Options::default(),
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);

    let after = fs::read(project.path().join("docker-compose.yml")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn generated_wrappers_and_keys_are_written() {
    let project = fresh_project();
    configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: a\n  ssh:\n    users:\n      alice:\n        pubkey_text: 'ssh-ed25519 AAAAC3Nza alice@host'\n  custom:\n    on_entry: stage-1/custom/entry.sh\nstage_2: {}\n",
        &[],
        Options::default(),
    )
    .unwrap();

    let generated = project.path().join("installation/stage-1/generated");
    assert!(generated.join("_custom-on-build.sh").exists());
    assert!(generated.join("_custom-on-entry.sh").exists());
    // Stage-2 has no entry configured, so its wrapper must be absent
    assert!(!project.path().join("installation/stage-2/generated/_custom-on-entry.sh").exists());

    let entry = fs::read_to_string(generated.join("_custom-on-entry.sh")).unwrap();
    assert!(entry.contains("bash \"/pei-from-host/stage-1/custom/entry.sh\" \"$@\""));

    let pubkey = generated.join("alice-pubkey.pub");
    assert_eq!(fs::read_to_string(&pubkey).unwrap(), "ssh-ed25519 AAAAC3Nza alice@host\n");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        assert_eq!(fs::metadata(&pubkey).unwrap().permissions().mode() & 0o777, 0o644);
        let wrapper_mode = fs::metadata(generated.join("_custom-on-build.sh")).unwrap().permissions().mode();
        assert_eq!(wrapper_mode & 0o111, 0o111, "wrapper is not executable");
    }

    // SSH settings surface as stage-1 build args, with the host mapping absent (none given)
    let compose = read_compose(project.path());
    assert_eq!(lookup(&compose, "services.stage-1.build.args.SSH_USER_NAME").as_str(), Some("alice"));
    assert_eq!(
        lookup(&compose, "services.stage-1.build.args.SSH_PUBKEY_FILE").as_str(),
        Some("/pei-from-host/stage-1/generated/alice-pubkey.pub")
    );
}

#[test]
fn stale_generated_files_disappear() {
    let project = fresh_project();
    let with_entry = "stage_1:\n  image:\n    base: a\n  custom:\n    on_entry: stage-1/custom/entry.sh\n";
    configure_with(project.path(), with_entry, &[], Options::default()).unwrap();
    assert!(project.path().join("installation/stage-1/generated/_custom-on-entry.sh").exists());

    // Dropping the entry from the config must drop the wrapper from disk
    configure_with(project.path(), "stage_1:\n  image:\n    base: a\n", &[], Options::default()).unwrap();
    assert!(!project.path().join("installation/stage-1/generated/_custom-on-entry.sh").exists());
}

#[test]
fn with_merged_refuses_passthrough_markers() {
    let project = fresh_project();
    let err = configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: a\nstage_2:\n  image:\n    output: 't:{{TAG:-dev}}'\n",
        &[],
        Options { full_compose: false, with_merged: true },
    )
    .unwrap_err();
    assert!(matches!(err, ConfigureError::PassthroughWithMerged { .. }), "unexpected error: {err:?}");
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn with_merged_emits_dockerfile_and_env_files() {
    let project = fresh_project();
    configure_with(
        project.path(),
        "stage_1:\n  image:\n    base: ubuntu:24.04\n    output: t:stage-1\nstage_2: {}\n",
        &[],
        Options { full_compose: false, with_merged: true },
    )
    .unwrap();

    let dockerfile = fs::read_to_string(project.path().join("merged.Dockerfile")).unwrap();
    assert!(dockerfile.contains("FROM ubuntu:24.04 AS stage-1"));
    assert!(dockerfile.contains("FROM stage-1 AS stage-2"));

    let env_1 = fs::read_to_string(project.path().join("stage-1.env")).unwrap();
    assert!(env_1.contains("BASE_IMAGE=ubuntu:24.04"));
    assert!(project.path().join("stage-2.env").exists());
}

#[test]
fn baked_environment_generates_script_and_gates_markers() {
    let project = fresh_project();
    let config = "stage_1:\n  image:\n    base: a\n  environment:\n  - 'FLAG=on'\n";
    configure_with(project.path(), config, &[("PEI_BAKE_ENV_STAGE_1", "true")], Options::default()).unwrap();

    let bake = project.path().join("installation/stage-1/generated/_bake-environment.sh");
    assert!(fs::read_to_string(&bake).unwrap().contains("FLAG=on"));

    // The same entry with a marker is rejected once baking is requested
    let config = "stage_1:\n  image:\n    base: a\n  environment:\n  - 'FLAG={{RUNTIME:-on}}'\n";
    assert!(configure_with(project.path(), config, &[], Options::default()).is_ok());
    let err = configure_with(project.path(), config, &[("PEI_BAKE_ENV_STAGE_1", "true")], Options::default()).unwrap_err();
    assert!(matches!(err, ConfigureError::Validate { .. }), "unexpected error: {err:?}");
}

#[test]
fn full_compose_keeps_empty_sections() {
    let project = fresh_project();
    let config = "stage_1:\n  image:\n    base: a\n";

    configure_with(project.path(), config, &[], Options::default()).unwrap();
    let compose = read_compose(project.path());
    assert!(lookup(&compose, "services.stage-1").get("environment").is_none());

    configure_with(project.path(), config, &[], Options { full_compose: true, with_merged: false }).unwrap();
    let compose = read_compose(project.path());
    assert!(lookup(&compose, "services.stage-1").get("environment").is_some());
}

#[test]
fn create_seeds_a_working_project() {
    let project = TempDir::new().unwrap();
    create::run(project.path(), "full", false).unwrap();

    assert!(project.path().join("installation/stage-1/Dockerfile").exists());
    assert!(project.path().join("installation/stage-1/internals/entrypoint.sh").exists());
    assert!(project.path().join("installation/stage-2/internals/on-build.sh").exists());
    assert!(project.path().join("user_config.yml").exists());

    // The seeded quick-start config must configure cleanly as-is
    let env: HashMap<String, String> = HashMap::new();
    configure::run_with_env(project.path(), Options::default(), &env).unwrap();
    assert!(project.path().join("docker-compose.yml").exists());
}

#[test]
fn create_refuses_non_empty_directories() {
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("keep-me.txt"), "precious").unwrap();

    let err = create::run(project.path(), "minimal", false).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(project.path().join("keep-me.txt").exists());
    assert!(!project.path().join("user_config.yml").exists());
}
