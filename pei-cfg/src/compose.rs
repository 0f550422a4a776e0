//  COMPOSE.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 09:11:40
//  Last edited:
//    02 Jul 2024, 14:58:23
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the docker-compose document model the synthesizer fills
//!   in.
//!
//!   The model is deliberately partial: it covers exactly the nodes the
//!   shipped template and the synthesizer produce. Once filled, the
//!   document is lowered to a plain YAML tree (see
//!   [`ComposeFile::into_tree()`]) so the passthrough rewriter can walk
//!   it without knowing any of these types.
//

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::info::YamlInfo;


/***** HELPER FUNCTIONS *****/
/// Drops the given optional list when it is present but empty.
#[inline]
fn prune<T>(list: &mut Option<Vec<T>>) {
    if list.as_ref().is_some_and(Vec::is_empty) {
        *list = None;
    }
}





/***** LIBRARY *****/
/// Defines the toplevel layout of a `docker-compose.yml` file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ComposeFile {
    /// The compose project name, if pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The services, keyed by service name, in declaration order.
    pub services: IndexMap<String, ComposeService>,
    /// The toplevel volume declarations, keyed by volume key.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub volumes: IndexMap<String, ComposeVolume>,
}
impl<'de> YamlInfo<'de> for ComposeFile {}
impl ComposeFile {
    /// Drops every section that ended up without content.
    ///
    /// The synthesizer fills sections unconditionally so that `--full-compose` can show the
    /// complete shape; this is the default path that strips the noise again.
    pub fn prune_empty(&mut self) {
        for service in self.services.values_mut() {
            service.prune_empty();
        }
    }

    /// Lowers this document to a plain YAML tree.
    ///
    /// # Errors
    /// This function errors if any value in the document fails to serialize, which would be a
    /// bug rather than a user mistake.
    #[inline]
    pub fn into_tree(self) -> Result<Value, serde_yaml::Error> { serde_yaml::to_value(self) }
}



/// Defines a single service in a compose file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ComposeService {
    /// The image tag this service runs (and, with a build section, produces).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// A fixed container name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// How to build the service's image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSection>,
    /// `NAME=VALUE` environment entries, in declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Vec<String>>,
    /// Port mappings, as compose-syntax strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
    /// Volume mappings, as compose short-syntax strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<String>>,
    /// Services that must be up before this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    /// Whether to keep stdin open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin_open: Option<bool>,
    /// Whether to allocate a tty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<bool>,
    /// Deployment settings (used for device reservations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeploySection>,
}
impl ComposeService {
    /// Drops every section of this service that ended up without content.
    pub fn prune_empty(&mut self) {
        prune(&mut self.environment);
        prune(&mut self.ports);
        prune(&mut self.volumes);
        prune(&mut self.depends_on);
        if let Some(build) = &mut self.build {
            if build.args.as_ref().is_some_and(IndexMap::is_empty) {
                build.args = None;
            }
        }
    }
}

/// Defines the build section of a service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BuildSection {
    /// The build context, relative to the compose file.
    pub context: String,
    /// The dockerfile to build, relative to the context.
    pub dockerfile: String,
    /// The build arguments, in insertion order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<IndexMap<String, String>>,
}

/// Defines the deploy section of a service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeploySection {
    /// Resource-related deployment settings.
    pub resources: DeployResources,
}
/// Defines the resources in a deploy section.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeployResources {
    /// Resources reserved for the service.
    pub reservations: DeployReservations,
}
/// Defines the reservations in a deploy section.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeployReservations {
    /// The devices handed to the service.
    pub devices: Vec<DeviceReservation>,
}
/// Defines a single device reservation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeviceReservation {
    /// The device driver (e.g., `nvidia`).
    pub driver: String,
    /// How many devices to reserve (a number, or `all`).
    pub count: String,
    /// The capabilities the devices must have (e.g., `gpu`).
    pub capabilities: Vec<String>,
}
impl DeviceReservation {
    /// Returns the reservation for all of the host's NVIDIA GPUs.
    #[inline]
    pub fn all_nvidia_gpus() -> Self { Self { driver: "nvidia".into(), count: "all".into(), capabilities: vec!["gpu".into()] } }
}

/// Defines a toplevel volume declaration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ComposeVolume {
    /// Whether the volume is managed outside this compose file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<bool>,
    /// The real volume name, when it differs from the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
impl ComposeVolume {
    /// Returns the declaration for a compose-managed volume with a generated name.
    #[inline]
    pub fn automatic() -> Self { Self { external: None, name: None } }

    /// Returns the declaration for a pre-existing volume with the given name.
    #[inline]
    pub fn external(name: impl Into<String>) -> Self { Self { external: Some(true), name: Some(name.into()) } }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use crate::info::Info as _;

    use super::*;

    #[test]
    fn template_roundtrip() {
        let raw: &str = "services:\n  stage-1:\n    image: t:stage-1\n    build:\n      context: .\n      dockerfile: installation/stage-1/Dockerfile\n      args: {}\nvolumes: {}\n";
        let file: ComposeFile = ComposeFile::from_string(raw).unwrap();
        assert_eq!(file.services.len(), 1);
        let stage_1: &ComposeService = &file.services["stage-1"];
        assert_eq!(stage_1.image.as_deref(), Some("t:stage-1"));
        assert_eq!(stage_1.build.as_ref().unwrap().dockerfile, "installation/stage-1/Dockerfile");
    }

    #[test]
    fn prune_drops_empty_sections() {
        let mut service = ComposeService {
            environment: Some(vec![]),
            ports: Some(vec!["2222:22".into()]),
            ..Default::default()
        };
        service.prune_empty();
        assert!(service.environment.is_none());
        assert_eq!(service.ports.as_ref().unwrap(), &["2222:22"]);
    }

    #[test]
    fn into_tree_preserves_service_order() {
        let mut services: IndexMap<String, ComposeService> = IndexMap::new();
        services.insert("stage-1".into(), ComposeService::default());
        services.insert("stage-2".into(), ComposeService::default());
        let file = ComposeFile { name: None, services, volumes: IndexMap::new() };

        let tree: Value = file.into_tree().unwrap();
        let keys: Vec<&str> = tree.get("services").unwrap().as_mapping().unwrap().iter().map(|(k, _)| k.as_str().unwrap()).collect();
        assert_eq!(keys, vec!["stage-1", "stage-2"]);
    }
}
