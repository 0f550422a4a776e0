//  SYNTHESIZE.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 16:20:38
//  Last edited:
//    02 Jul 2024, 17:22:13
//  Auto updated?
//    Yes
//
//  Description:
//!   Merges a compiled config into the shipped compose template.
//!
//!   The template fixes everything static about the two services
//!   (build context, dockerfiles, interactivity flags); this module
//!   fills in everything the user config determines. The result is a
//!   typed [`ComposeFile`], which the caller lowers to a plain tree
//!   for the passthrough rewrite before it is written.
//

use indexmap::IndexMap;
use log::debug;
use pei_cfg::compose::{BuildSection, ComposeFile, ComposeService, ComposeVolume, DeployReservations, DeployResources, DeploySection, DeviceReservation};
use pei_cfg::info::Info as _;
use pei_cfg::user::Stage;

use crate::assets;
pub use crate::errors::ConfigureError as Error;
use crate::spec::{CompiledConfig, CompiledStage};


/***** HELPER FUNCTIONS *****/
/// Fills one service of the compose file from the given compiled stage.
fn fill_service(service: &mut ComposeService, stage: &CompiledStage, volumes: &mut IndexMap<String, ComposeVolume>) {
    service.image = Some(stage.image.clone());

    // The template fixes context and dockerfile; only the args are config-driven
    match &mut service.build {
        Some(build) => build.args = Some(stage.build_args.clone()),
        None => {
            service.build = Some(BuildSection {
                context: ".".into(),
                dockerfile: format!("installation/{}/Dockerfile", stage.stage.name()),
                args: Some(stage.build_args.clone()),
            });
        },
    }

    service.environment = Some(stage.environment.clone());
    service.ports = Some(stage.ports.clone());
    service.volumes = Some(stage.volumes.iter().map(|binding| binding.service_entry()).collect());

    // Register the toplevel declarations backing the bindings
    for binding in &stage.volumes {
        if let Some((key, declaration)) = &binding.volume {
            volumes.insert(key.clone(), declaration.clone());
        }
    }

    if stage.gpu {
        service.deploy = Some(DeploySection {
            resources: DeployResources { reservations: DeployReservations { devices: vec![DeviceReservation::all_nvidia_gpus()] } },
        });
    }
}





/***** LIBRARY *****/
/// Synthesizes the compose document for the given compiled config.
///
/// # Arguments
/// - `compiled`: The compiled config to merge into the template.
/// - `full_compose`: If true, keeps sections that ended up empty instead of stripping them.
///
/// # Returns
/// The filled [`ComposeFile`]. Passthrough markers are still in their `{{...}}` form; the
/// rewrite happens on the lowered tree.
///
/// # Errors
/// This function errors if the embedded template fails to parse, which is a packaging bug
/// rather than a user mistake.
pub fn synthesize(compiled: &CompiledConfig, full_compose: bool) -> Result<ComposeFile, Error> {
    debug!("Synthesizing compose document...");
    let mut file: ComposeFile = match ComposeFile::from_string(assets::COMPOSE_TEMPLATE) {
        Ok(file) => file,
        Err(err) => {
            return Err(Error::TemplateParse { err });
        },
    };

    // Stage-1 is always there
    fill_service(file.services.entry(Stage::One.name().into()).or_default(), &compiled.stage_1, &mut file.volumes);

    // Stage-2 only exists when the user config declares it
    match &compiled.stage_2 {
        Some(stage_2) => {
            let service: &mut ComposeService = file.services.entry(Stage::Two.name().into()).or_default();
            fill_service(service, stage_2, &mut file.volumes);

            // The build-order dependency only applies when stage-2 actually builds on the
            // locally-built stage-1 image
            if stage_2.base_image != compiled.stage_1.image {
                service.depends_on = Some(vec![]);
            }
        },
        None => {
            file.services.shift_remove(Stage::Two.name());
        },
    }

    if !full_compose {
        file.prune_empty();
    }
    Ok(file)
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pei_cfg::user::UserConfig;

    use super::*;
    use crate::resolve;

    /// Compiles the given YAML and synthesizes its compose file.
    #[track_caller]
    fn synthesize_str(raw: &str, full_compose: bool) -> ComposeFile {
        let config: UserConfig = serde_yaml::from_str(raw).unwrap();
        config.validate(&Default::default()).unwrap();
        let compiled = resolve::compile(&config, &PathBuf::from("/tmp/x"), (false, false)).unwrap();
        synthesize(&compiled, full_compose).unwrap()
    }


    #[test]
    fn minimal_config_drops_stage_2() {
        let file = synthesize_str("stage_1:\n  image:\n    base: ubuntu:24.04\n    output: t:stage-1\n", false);
        assert!(file.services.contains_key("stage-1"));
        assert!(!file.services.contains_key("stage-2"));

        let stage_1 = &file.services["stage-1"];
        assert_eq!(stage_1.image.as_deref(), Some("t:stage-1"));
        assert_eq!(stage_1.build.as_ref().unwrap().args.as_ref().unwrap()["BASE_IMAGE"], "ubuntu:24.04");
        // Empty sections are stripped by default
        assert!(stage_1.environment.is_none());
        assert!(stage_1.ports.is_none());
    }

    #[test]
    fn full_compose_keeps_empty_sections() {
        let file = synthesize_str("stage_1:\n  image:\n    base: ubuntu:24.04\n", true);
        let stage_1 = &file.services["stage-1"];
        assert_eq!(stage_1.environment.as_deref(), Some(&[] as &[String]));
        assert_eq!(stage_1.ports.as_deref(), Some(&[] as &[String]));
    }

    #[test]
    fn chained_stage_2_depends_on_stage_1() {
        let file = synthesize_str("stage_1:\n  image:\n    base: a\n    output: t:stage-1\nstage_2: {}\n", false);
        let stage_2 = &file.services["stage-2"];
        assert_eq!(stage_2.image.as_deref(), Some("pei-image:stage-2"));
        assert_eq!(stage_2.depends_on.as_deref(), Some(&["stage-1".to_string()] as &[String]));
    }

    #[test]
    fn external_base_breaks_the_dependency() {
        let file = synthesize_str("stage_1:\n  image:\n    base: a\nstage_2:\n  image:\n    base: debian:12\n", false);
        let stage_2 = &file.services["stage-2"];
        assert!(stage_2.depends_on.is_none());
    }

    #[test]
    fn volumes_land_in_service_and_toplevel() {
        let file = synthesize_str(
            "stage_1:\n  image:\n    base: a\n  storage:\n    data:\n      type: auto-volume\n  mount:\n    data:\n      type: manual-volume\n      volume_name: shared\n      dst_path: /custom/data\n",
            false,
        );
        let stage_1 = &file.services["stage-1"];
        assert_eq!(stage_1.volumes.as_ref().unwrap(), &["data:/hard/volume/data", "mount_data:/custom/data"]);
        assert!(file.volumes.contains_key("data"));
        assert_eq!(file.volumes["mount_data"].external, Some(true));
        assert_eq!(file.volumes["mount_data"].name.as_deref(), Some("shared"));
    }

    #[test]
    fn gpu_reservation_is_emitted() {
        let file = synthesize_str("stage_1:\n  image:\n    base: a\n  device:\n    type: gpu\n", false);
        let deploy = file.services["stage-1"].deploy.as_ref().unwrap();
        let device = &deploy.resources.reservations.devices[0];
        assert_eq!(device.driver, "nvidia");
        assert_eq!(device.count, "all");
        assert_eq!(device.capabilities, vec!["gpu"]);
    }
}
