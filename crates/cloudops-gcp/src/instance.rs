//! GCP instance verbs

use crate::gateway::{GCP_PERSISTENT, GCP_SCRATCH};
use async_trait::async_trait;
use cloudops_core::{
    CommandError, CommandSpec, DiskSpec, FlagDefinition, GatewayError, ImageRef,
    InstanceDescriptor, InstanceSpec, Invocation, MAX_IDENTIFIER_LEN, MountDisk, Phases,
    ProviderGateway, Result, RootVolumeHooks, SpecError, Target, VolumeDescriptor, VolumeLayout,
    clamp_identifier, clamp_with_suffix, target_instance,
};
use serde_json::json;

/// Server types that route traffic and need IP forwarding
const FORWARDING_SERVER_TYPES: [&str; 2] = ["openvpn-server", "ipsec-gateway"];

fn volume_type_flag() -> FlagDefinition {
    FlagDefinition::string("volume_type")
        .choices([GCP_SCRATCH, GCP_PERSISTENT])
        .default_str(GCP_SCRATCH)
        .help("Storage type for GCP instances")
}

fn node_ip_flag(action: &str) -> FlagDefinition {
    FlagDefinition::string("node_ip").help(format!("The ip of the instance to {}", action))
}

/// Whether instances of `server_type` must be allowed to forward packets
pub fn can_ip_forward(server_type: &str) -> bool {
    FORWARDING_SERVER_TYPES
        .iter()
        .any(|prefix| server_type.starts_with(prefix))
}

/// Format a public key file as a GCE `ssh-keys` metadata entry
pub fn ssh_key_entry(user: &str, public_key: &str) -> String {
    let key: Vec<&str> = public_key.split_whitespace().take(2).collect();
    format!("{}:{} {}", user, key.join(" "), user)
}

async fn image_for(invocation: &Invocation<'_>) -> Result<ImageRef> {
    match invocation.args.str("machine_image") {
        Some(image) => Ok(ImageRef::from_link(image)),
        None => Ok(invocation
            .gateway
            .get_image(invocation.args.str("region"))
            .await?),
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| GatewayError::from(e).into())
}

/// `instance create`
pub struct GcpCreateInstances {
    ssh_user: String,
}

impl GcpCreateInstances {
    pub fn new(ssh_user: impl Into<String>) -> Self {
        Self {
            ssh_user: ssh_user.into(),
        }
    }

    async fn ssh_keys(&self, private_key_file: &str) -> Result<String> {
        let public_key_file = format!("{}.pub", private_key_file);
        let public_key = tokio::fs::read_to_string(&public_key_file)
            .await
            .map_err(|e| {
                CommandError::operational(format!(
                    "Cannot read public key {}: {}",
                    public_key_file, e
                ))
            })?;
        if public_key.trim().is_empty() {
            return Err(CommandError::operational(format!(
                "Public key {} is empty",
                public_key_file
            )));
        }
        Ok(ssh_key_entry(&self.ssh_user, &public_key))
    }
}

#[async_trait]
impl Phases for GcpCreateInstances {
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        spec.with_flags([
            FlagDefinition::switch("use_preemptible").help("If to use preemptible instances"),
            volume_type_flag(),
        ])
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let args = invocation.args;
        let server_type = args.str("type").unwrap_or("cluster-server");
        let forward = can_ip_forward(server_type);
        let image = image_for(invocation).await?;

        let ssh_keys = match args.str("private_key_file") {
            Some(file) => Some(self.ssh_keys(file).await?),
            None => None,
        };

        let spec = InstanceSpec {
            name: args.require_str("search_pattern")?.to_string(),
            server_type: server_type.to_string(),
            instance_type: args.require_str("instance_type")?.to_string(),
            region: args.str("region").map(str::to_string),
            zone: args.str("zone").map(str::to_string),
            subnet: args.str("cloud_subnet").map(str::to_string),
            assign_public_ip: args.flag("assign_public_ip"),
            assign_static_public_ip: args.flag("assign_static_public_ip"),
            boot_disk_size_gb: args.int("boot_disk_size_gb"),
            num_volumes: args.int("num_volumes").unwrap_or(1),
            volume_size_gb: args.int("volume_size"),
            volume_type: args.str("volume_type").map(str::to_string),
            preemptible: args.flag("use_preemptible"),
            tags: args.list("instance_tags").to_vec(),
        };

        let instance = invocation
            .gateway
            .create_instance(&spec, forward, &image, ssh_keys.as_deref())
            .await?;
        to_payload(&instance)
    }
}

/// `instance provision`: computes the provisioning variables for an
/// existing host and hands them back to the caller
pub struct GcpProvisionInstances;

#[async_trait]
impl Phases for GcpProvisionInstances {
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        spec.with_flags([
            FlagDefinition::switch("use_chrony").help("Whether to use chrony instead of NTP"),
            volume_type_flag(),
        ])
    }

    async fn resolve_target(&self, invocation: &Invocation<'_>) -> Result<Option<Target>> {
        Ok(Some(Target::Instance(invocation.resolve_host().await?)))
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let host = target_instance(target)?;
        let args = invocation.args;
        let layout = VolumeLayout {
            instance_type: args
                .str("instance_type")
                .map(str::to_string)
                .or_else(|| host.instance_type.clone()),
            num_volumes: args.int("num_volumes").unwrap_or(1),
            volume_type: args.str("volume_type").map(str::to_string),
        };

        let device_names = invocation.gateway.get_device_names(&layout).await?;
        let mount_points = invocation.gateway.get_mount_points_csv(&layout).await?;

        Ok(json!({
            "host": to_payload(&host)?,
            "extra_vars": {
                "use_chrony": args.flag("use_chrony"),
                "device_names": device_names,
                "mount_points": mount_points,
            },
        }))
    }
}

/// `instance create_root_volumes`
pub struct GcpCreateRootVolumes;

impl GcpCreateRootVolumes {
    /// Disk names for `count` volumes; the first keeps the bare pattern
    pub fn disk_names(search_pattern: &str, count: i64) -> Vec<String> {
        (0..count.max(1))
            .map(|i| match i {
                0 => clamp_identifier(search_pattern, MAX_IDENTIFIER_LEN),
                i => clamp_with_suffix(search_pattern, &format!("-{}", i), MAX_IDENTIFIER_LEN),
            })
            .collect()
    }
}

#[async_trait]
impl Phases for GcpCreateRootVolumes {
    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let args = invocation.args;
        let zone = args
            .str("zone")
            .ok_or_else(|| CommandError::operational("Must specify a zone to create root volumes"))?;
        let image = image_for(invocation).await?;
        let pattern = args.require_str("search_pattern")?;
        let tags = args.list("instance_tags");

        let mut sources = Vec::new();
        for name in Self::disk_names(pattern, args.int("num_disks").unwrap_or(1)) {
            let disk = DiskSpec {
                name,
                size_gb: args.int("boot_disk_size_gb"),
                source_image: Some(image.self_link.clone()),
            };
            let volume = invocation.gateway.create_disk(zone, tags, &disk).await?;
            sources.push(volume.source);
        }

        Ok(json!(sources))
    }
}

/// Root volume lookup and attach for GCE instances
pub struct GcpRootVolume;

#[async_trait]
impl RootVolumeHooks for GcpRootVolume {
    fn current_root_volume(&self, host: &InstanceDescriptor) -> Result<VolumeDescriptor> {
        let device_name: String = host
            .get_attribute("root_volume_device_name")
            .ok_or_else(|| {
                CommandError::operational(format!("Host {} has no root volume", host.name))
            })?;
        Ok(VolumeDescriptor {
            device_name: Some(device_name),
            source: host.get_attribute("root_volume").unwrap_or_default(),
            size_gb: None,
            boot: true,
        })
    }

    async fn mount_root_volume(
        &self,
        gateway: &dyn ProviderGateway,
        host: &InstanceDescriptor,
        source: &str,
    ) -> Result<()> {
        let disk = MountDisk {
            boot: true,
            source: source.to_string(),
        };
        gateway.mount_disk(host, &disk).await?;
        Ok(())
    }
}

/// `instance pause`
pub struct GcpPauseInstances;

#[async_trait]
impl Phases for GcpPauseInstances {
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        spec.with_flags([node_ip_flag("pause")])
    }

    async fn resolve_target(&self, invocation: &Invocation<'_>) -> Result<Option<Target>> {
        Ok(Some(Target::Instance(invocation.resolve_host().await?)))
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let host = target_instance(target)?;
        tracing::info!("Pausing {}", host.name);
        invocation.gateway.stop_instance(&host).await?;
        Ok(json!({ "instance": host.name, "paused": true }))
    }
}

/// `instance resume`
pub struct GcpResumeInstances;

#[async_trait]
impl Phases for GcpResumeInstances {
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        spec.with_flags([node_ip_flag("resume")])
    }

    async fn resolve_target(&self, invocation: &Invocation<'_>) -> Result<Option<Target>> {
        Ok(Some(Target::Instance(invocation.resolve_host().await?)))
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let host = target_instance(target)?;
        let ssh_port = invocation.args.port("custom_ssh_port")?.unwrap_or(22);
        tracing::info!("Resuming {}", host.name);
        invocation.gateway.start_instance(&host, ssh_port).await?;
        Ok(json!({ "instance": host.name, "resumed": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudops_core::testing::{GatewayCall, RecordingGateway};
    use cloudops_core::{LifecycleCommand, RawArgs, verbs};

    fn raw(pairs: &[(&str, &str)]) -> RawArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn create_command() -> LifecycleCommand {
        LifecycleCommand::new(verbs::create_instance().unwrap(), GcpCreateInstances::new("centos"))
            .unwrap()
    }

    fn created(gateway: &RecordingGateway) -> (InstanceSpec, bool, ImageRef, Option<String>) {
        gateway
            .calls()
            .into_iter()
            .find_map(|c| match c {
                GatewayCall::CreateInstance {
                    spec,
                    can_ip_forward,
                    image,
                    ssh_keys,
                } => Some((spec, can_ip_forward, image, ssh_keys)),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_forwarding_server_types() {
        assert!(can_ip_forward("openvpn-server-1"));
        assert!(can_ip_forward("ipsec-gateway"));
        assert!(!can_ip_forward("cluster-server"));
    }

    #[test]
    fn test_ssh_key_entry_drops_comment() {
        assert_eq!(
            ssh_key_entry("centos", "ssh-rsa AAAAB3Nza yb@laptop\n"),
            "centos:ssh-rsa AAAAB3Nza centos"
        );
    }

    #[test]
    fn test_create_adds_gcp_flags() {
        let command = create_command();
        assert!(command.spec().flag("use_preemptible").is_some());
        let volume_type = command.spec().flag("volume_type").unwrap();
        assert_eq!(volume_type.choices, vec!["scratch", "persistent"]);
    }

    #[tokio::test]
    async fn test_openvpn_server_forwards_ip() {
        let gateway = RecordingGateway::new();
        let result = create_command()
            .run(
                &gateway,
                &raw(&[
                    ("search_pattern", "yb-vpn"),
                    ("instance_type", "n1-standard-1"),
                    ("zone", "us-west1-b"),
                    ("type", "openvpn-server-1"),
                ]),
            )
            .await
            .unwrap();

        assert!(result.is_success());
        let (spec, forward, image, ssh_keys) = created(&gateway);
        assert!(forward);
        assert_eq!(spec.volume_type.as_deref(), Some("scratch"));
        assert_eq!(
            image.self_link,
            "projects/test-images/global/images/test-image"
        );
        assert!(ssh_keys.is_none());
        assert_eq!(gateway.count("get_image"), 1);
    }

    #[tokio::test]
    async fn test_explicit_image_skips_lookup() {
        let gateway = RecordingGateway::new();
        create_command()
            .run(
                &gateway,
                &raw(&[
                    ("search_pattern", "yb-n1"),
                    ("instance_type", "n1-standard-4"),
                    ("machine_image", "projects/custom/global/images/yb"),
                    ("use_preemptible", "true"),
                ]),
            )
            .await
            .unwrap();

        let (spec, forward, image, _) = created(&gateway);
        assert!(!forward);
        assert!(spec.preemptible);
        assert_eq!(spec.server_type, "cluster-server");
        assert_eq!(image.self_link, "projects/custom/global/images/yb");
        assert_eq!(gateway.count("get_image"), 0);
    }

    #[tokio::test]
    async fn test_ssh_key_from_public_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let private_key = dir.path().join("yb-key.pem");
        std::fs::write(dir.path().join("yb-key.pem.pub"), "ssh-rsa AAAAkey yb@host\n").unwrap();

        let gateway = RecordingGateway::new();
        create_command()
            .run(
                &gateway,
                &raw(&[
                    ("search_pattern", "yb-n1"),
                    ("instance_type", "n1-standard-4"),
                    ("private_key_file", private_key.to_str().unwrap()),
                ]),
            )
            .await
            .unwrap();

        let (_, _, _, ssh_keys) = created(&gateway);
        assert_eq!(ssh_keys.as_deref(), Some("centos:ssh-rsa AAAAkey centos"));
    }

    #[tokio::test]
    async fn test_missing_public_key_is_operational() {
        let gateway = RecordingGateway::new();
        let result = create_command()
            .run(
                &gateway,
                &raw(&[
                    ("search_pattern", "yb-n1"),
                    ("instance_type", "n1-standard-4"),
                    ("private_key_file", "/nonexistent/key.pem"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(result.exit_code(), 0);
        let message = result.to_json()["error"].as_str().unwrap().to_string();
        assert!(message.starts_with("Cannot read public key /nonexistent/key.pem.pub"));
        assert_eq!(gateway.count("create_instance"), 0);
    }

    #[tokio::test]
    async fn test_long_pattern_disk_name_is_clamped() {
        let pattern = "r".repeat(70);
        let gateway = RecordingGateway::new();
        let command =
            LifecycleCommand::new(verbs::create_root_volumes().unwrap(), GcpCreateRootVolumes)
                .unwrap();

        let result = command
            .run(
                &gateway,
                &raw(&[("search_pattern", pattern.as_str()), ("zone", "us-west1-b")]),
            )
            .await
            .unwrap();

        assert!(result.is_success());
        let names: Vec<String> = gateway
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::CreateDisk { disk, .. } => Some(disk.name),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["r".repeat(63)]);
    }

    #[tokio::test]
    async fn test_multiple_root_volumes() {
        let gateway = RecordingGateway::new();
        let command =
            LifecycleCommand::new(verbs::create_root_volumes().unwrap(), GcpCreateRootVolumes)
                .unwrap();

        let result = command
            .run(
                &gateway,
                &raw(&[
                    ("search_pattern", "yb-root"),
                    ("zone", "us-west1-b"),
                    ("num_disks", "3"),
                    ("instance_tags", "team=db,env=dev"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(
            result.payload(),
            Some(&json!([
                "zones/us-west1-b/disks/yb-root",
                "zones/us-west1-b/disks/yb-root-1",
                "zones/us-west1-b/disks/yb-root-2"
            ]))
        );
        let tags = gateway.calls().into_iter().find_map(|c| match c {
            GatewayCall::CreateDisk { tags, .. } => Some(tags),
            _ => None,
        });
        assert_eq!(tags, Some(vec!["team=db".to_string(), "env=dev".to_string()]));
    }

    #[tokio::test]
    async fn test_root_volumes_need_zone() {
        let gateway = RecordingGateway::new();
        let command =
            LifecycleCommand::new(verbs::create_root_volumes().unwrap(), GcpCreateRootVolumes)
                .unwrap();

        let result = command
            .run(&gateway, &raw(&[("search_pattern", "yb-root")]))
            .await
            .unwrap();

        assert_eq!(
            result.to_json(),
            json!({ "error": "Must specify a zone to create root volumes" })
        );
        assert_eq!(gateway.count("create_disk"), 0);
    }

    #[test]
    fn test_disk_name_suffix_survives_clamping() {
        let names = GcpCreateRootVolumes::disk_names(&"d".repeat(70), 2);
        assert_eq!(names[0].len(), 63);
        assert_eq!(names[1].len(), 63);
        assert!(names[1].ends_with("-1"));
    }

    #[tokio::test]
    async fn test_provision_extra_vars() {
        let gateway = RecordingGateway::new().with_instance(RecordingGateway::running("yb-n1"));
        let command =
            LifecycleCommand::new(verbs::provision_instance().unwrap(), GcpProvisionInstances)
                .unwrap();

        let result = command
            .run(
                &gateway,
                &raw(&[
                    ("search_pattern", "yb-n1"),
                    ("num_volumes", "2"),
                    ("use_chrony", "true"),
                    ("volume_type", "persistent"),
                ]),
            )
            .await
            .unwrap();

        let payload = result.payload().unwrap();
        assert_eq!(payload["host"]["name"], json!("yb-n1"));
        assert_eq!(
            payload["extra_vars"],
            json!({
                "use_chrony": true,
                "device_names": ["vd0", "vd1"],
                "mount_points": "/mnt/d0,/mnt/d1",
            })
        );
        assert!(gateway.calls().contains(&GatewayCall::GetDeviceNames(VolumeLayout {
            instance_type: None,
            num_volumes: 2,
            volume_type: Some("persistent".into()),
        })));
    }

    #[test]
    fn test_root_volume_from_host_attributes() {
        let host = RecordingGateway::running("yb-n1")
            .with_attribute("root_volume_device_name", json!("persistent-disk-0"))
            .with_attribute("root_volume", json!("disks/yb-n1"));
        let volume = GcpRootVolume.current_root_volume(&host).unwrap();

        assert_eq!(volume.device_name.as_deref(), Some("persistent-disk-0"));
        assert_eq!(volume.source, "disks/yb-n1");
        assert!(GcpRootVolume
            .current_root_volume(&RecordingGateway::running("bare"))
            .is_err());
    }

    #[tokio::test]
    async fn test_pause_matches_node_ip() {
        let gateway = RecordingGateway::new().with_instance(RecordingGateway::running("yb-n1"));
        let command =
            LifecycleCommand::new(verbs::pause_instance().unwrap(), GcpPauseInstances).unwrap();

        let wrong_ip = command
            .run(
                &gateway,
                &raw(&[("search_pattern", "yb-n1"), ("node_ip", "10.9.9.9")]),
            )
            .await
            .unwrap();
        assert_eq!(
            wrong_ip.to_json(),
            json!({ "error": "Host yb-n1 does not exist" })
        );

        let paused = command
            .run(
                &gateway,
                &raw(&[("search_pattern", "yb-n1"), ("node_ip", "10.0.0.1")]),
            )
            .await
            .unwrap();
        assert!(paused.is_success());
        assert_eq!(gateway.count("stop_instance"), 1);
    }

    #[tokio::test]
    async fn test_resume_uses_custom_ssh_port() {
        let gateway = RecordingGateway::new().with_instance(RecordingGateway::running("yb-n1"));
        let command =
            LifecycleCommand::new(verbs::resume_instance().unwrap(), GcpResumeInstances).unwrap();

        command
            .run(
                &gateway,
                &raw(&[("search_pattern", "yb-n1"), ("custom_ssh_port", "54422")]),
            )
            .await
            .unwrap();

        assert!(gateway.calls().contains(&GatewayCall::StartInstance {
            name: "yb-n1".into(),
            ssh_port: 54422
        }));
    }
}
