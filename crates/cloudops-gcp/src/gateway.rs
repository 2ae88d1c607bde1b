//! GCP implementation of [`ProviderGateway`]

use crate::billing::{self, BillingCatalog};
use crate::error::{GcpError, Result};
use crate::gcloud::{
    CreateDiskRequest, CreateInstanceRequest, GceInstance, GceSubnet, Gcloud, last_segment,
    zone_region,
};
use crate::metadata::{CustomPayload, GcpMetadata};
use crate::metadata_server::MetadataServer;
use async_trait::async_trait;
use cloudops_config::GcpConfig;
use cloudops_core::{
    AuthStatus, DiskSpec, GatewayResult, ImageRef, InstanceDescriptor, InstanceQuery,
    InstanceSpec, InstanceTypeQuery, MAX_IDENTIFIER_LEN, MountDisk, ProviderGateway,
    SpotPriceQuery, VolumeDescriptor, VolumeLayout, VpcQuery, ZoneQuery, clamp_with_suffix,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Local NVMe SSDs, lost on stop
pub const GCP_SCRATCH: &str = "scratch";
/// Persistent SSD data disks
pub const GCP_PERSISTENT: &str = "persistent";

/// Machine families listed unless internal types are requested
const PUBLIC_FAMILIES: [&str; 7] = [
    "n1-standard",
    "n1-highmem",
    "n1-highcpu",
    "n2-standard",
    "n2-highmem",
    "n2-highcpu",
    "c2-standard",
];

const SSH_WAIT_ATTEMPTS: u32 = 30;
const SSH_WAIT_INTERVAL: Duration = Duration::from_secs(10);

/// Name of the static address reserved for an instance
pub fn static_ip_name(instance: &str) -> String {
    clamp_with_suffix(instance, "-ip", MAX_IDENTIFIER_LEN)
}

/// Most disks GCE attaches to one instance
pub const MAX_DATA_VOLUMES: i64 = 128;

/// Validated data volume count; negatives mean none
fn volume_count(num_volumes: i64) -> Result<usize> {
    if num_volumes > MAX_DATA_VOLUMES {
        return Err(GcpError::Runtime(format!(
            "Cannot attach {} volumes, GCE allows at most {}",
            num_volumes, MAX_DATA_VOLUMES
        )));
    }
    Ok(num_volumes.max(0) as usize)
}

/// Kernel name of the `index`-th SCSI disk: `sda`..`sdz`, `sdaa`..`sdzz`, ...
fn scsi_disk_name(index: usize) -> String {
    let mut suffix = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        suffix.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    format!("sd{}", suffix.iter().rev().collect::<String>())
}

/// Block device names the data volumes will get inside the guest
pub fn device_names(layout: &VolumeLayout) -> Result<Vec<String>> {
    let count = volume_count(layout.num_volumes)?;
    match layout.volume_type.as_deref().unwrap_or(GCP_SCRATCH) {
        GCP_SCRATCH => Ok((0..count).map(|i| format!("nvme0n{}", i + 1)).collect()),
        // sda is the boot disk
        GCP_PERSISTENT => Ok((1..=count).map(scsi_disk_name).collect()),
        other => Err(GcpError::Runtime(format!("Unsupported volume type: {}", other))),
    }
}

/// Comma separated mount points of the data volumes
pub fn mount_points_csv(layout: &VolumeLayout) -> Result<String> {
    let count = volume_count(layout.num_volumes)?;
    Ok((0..count)
        .map(|i| format!("/mnt/d{}", i))
        .collect::<Vec<_>>()
        .join(","))
}

fn zone_of(instance: &InstanceDescriptor) -> Result<&str> {
    instance
        .zone
        .as_deref()
        .ok_or_else(|| GcpError::ZoneRequired(instance.name.clone()))
}

/// Google Cloud gateway backed by the gcloud CLI
pub struct GcpGateway {
    gcloud: Gcloud,
    metadata_server: MetadataServer,
    billing: BillingCatalog,
    config: GcpConfig,
    metadata: Mutex<GcpMetadata>,
}

impl GcpGateway {
    pub fn new(config: GcpConfig) -> Self {
        Self {
            gcloud: Gcloud::from_config(&config),
            metadata_server: MetadataServer::new(&config.metadata_url),
            billing: BillingCatalog::new(),
            metadata: Mutex::new(GcpMetadata::with_network(config.network.clone())),
            config,
        }
    }

    /// Snapshot of the current provider metadata
    pub fn metadata(&self) -> GcpMetadata {
        self.metadata
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn network(&self, payload: &CustomPayload) -> String {
        let metadata = self.metadata();
        let fallback = metadata.network.unwrap_or_else(|| "default".to_string());
        payload.network(&fallback).to_string()
    }

    /// Exact-name filter, narrowed by zone or region
    fn instance_filter(query: &InstanceQuery) -> String {
        let mut filter = format!("name={}", query.search_pattern);
        if let Some(zone) = &query.zone {
            filter.push_str(&format!(" AND zone:{}", zone));
        } else if let Some(region) = &query.region {
            filter.push_str(&format!(" AND zone~{}", region));
        }
        filter
    }

    async fn list_instances(&self, query: &InstanceQuery) -> Result<Vec<GceInstance>> {
        let found = self
            .gcloud
            .list_instances(&Self::instance_filter(query))
            .await?;
        Ok(found
            .into_iter()
            .filter(|i| {
                query
                    .node_ip
                    .as_deref()
                    .is_none_or(|ip| i.private_ip() == Some(ip))
            })
            .collect())
    }

    async fn regions(&self, requested: &[String]) -> Result<Vec<String>> {
        if !requested.is_empty() {
            return Ok(requested.to_vec());
        }
        let known: Vec<String> = self.metadata().regions.keys().cloned().collect();
        if !known.is_empty() {
            return Ok(known);
        }
        Ok(self
            .gcloud
            .list_regions()
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect())
    }

    async fn vpc_payload(&self, network: &str, regions: &[String]) -> Result<serde_json::Value> {
        let subnets = self.gcloud.list_subnets(None, Some(network)).await?;
        let mut by_region: BTreeMap<String, Vec<&GceSubnet>> = BTreeMap::new();
        for subnet in &subnets {
            let region = last_segment(&subnet.region).to_string();
            if regions.is_empty() || regions.contains(&region) {
                by_region.entry(region).or_default().push(subnet);
            }
        }

        let payload: serde_json::Map<String, serde_json::Value> = by_region
            .into_iter()
            .map(|(region, subnets)| {
                let subnets: serde_json::Map<String, serde_json::Value> = subnets
                    .iter()
                    .map(|s| (s.name.clone(), json!(s.ip_cidr_range)))
                    .collect();
                (region, json!({ "vpc_id": network, "subnets": subnets }))
            })
            .collect();
        Ok(serde_json::Value::Object(payload))
    }

    async fn wait_for_ssh(&self, host: &str, port: u16) -> Result<()> {
        for attempt in 1..=SSH_WAIT_ATTEMPTS {
            match tokio::net::TcpStream::connect((host, port)).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::debug!("SSH on {}:{} not ready ({}): {}", host, port, attempt, e);
                    tokio::time::sleep(SSH_WAIT_INTERVAL).await;
                }
            }
        }
        Err(GcpError::Runtime(format!(
            "Timed out waiting for SSH on {}:{}",
            host, port
        )))
    }

    async fn create_instance_inner(
        &self,
        spec: &InstanceSpec,
        can_ip_forward: bool,
        image: &ImageRef,
        ssh_keys: Option<&str>,
    ) -> Result<InstanceDescriptor> {
        let zone = spec
            .zone
            .clone()
            .ok_or_else(|| GcpError::ZoneRequired(spec.name.clone()))?;
        let region = spec
            .region
            .clone()
            .unwrap_or_else(|| zone_region(&zone).to_string());
        let volumes = volume_count(spec.num_volumes)?;

        let address = if spec.assign_static_public_ip {
            let name = static_ip_name(&spec.name);
            tracing::info!("Reserving static address {} in {}", name, region);
            self.gcloud.create_address(&name, &region).await?;
            Some(name)
        } else {
            None
        };

        let persistent = spec.volume_type.as_deref() == Some(GCP_PERSISTENT);
        let request = CreateInstanceRequest {
            name: spec.name.clone(),
            zone,
            machine_type: spec.instance_type.clone(),
            image: image.self_link.clone(),
            boot_disk_size_gb: spec.boot_disk_size_gb,
            subnet: spec.subnet.clone(),
            can_ip_forward,
            preemptible: spec.preemptible,
            public_ip: spec.assign_public_ip,
            address,
            ssh_keys: ssh_keys.map(str::to_string),
            local_ssds: if persistent { 0 } else { volumes as i64 },
            data_disks_gb: if persistent {
                vec![spec.volume_size_gb.unwrap_or(250); volumes]
            } else {
                Vec::new()
            },
            server_type: spec.server_type.clone(),
            labels: spec.tags.clone(),
        };

        tracing::info!("Creating instance {} ({})", spec.name, spec.instance_type);
        Ok(self.gcloud.create_instance(&request).await?.into_descriptor())
    }

    async fn spot_price(&self, query: &SpotPriceQuery) -> Result<f64> {
        let zone = match &query.zone {
            Some(zone) => zone.clone(),
            None => self
                .gcloud
                .list_zones(Some(&query.region))
                .await?
                .into_iter()
                .next()
                .map(|z| z.name)
                .ok_or_else(|| GcpError::Runtime(format!("No zones in {}", query.region)))?,
        };
        let machine = self
            .gcloud
            .describe_machine_type(&query.instance_type, &zone)
            .await?;
        let token = self.gcloud.access_token().await?;
        let skus = self.billing.compute_skus(&token).await?;

        billing::preemptible_price(
            &skus,
            &query.region,
            &query.instance_type,
            machine.guest_cpus,
            machine.memory_mb as f64 / 1024.0,
        )
        .ok_or_else(|| GcpError::PricingNotFound {
            region: query.region.clone(),
            instance_type: query.instance_type.clone(),
        })
    }
}

#[async_trait]
impl ProviderGateway for GcpGateway {
    fn name(&self) -> &str {
        crate::PROVIDER
    }

    async fn check_auth(&self) -> GatewayResult<AuthStatus> {
        match self.gcloud.active_account().await {
            Ok(Some(account)) => Ok(AuthStatus::ok(account)),
            Ok(None) => Ok(AuthStatus::failed(
                "No active gcloud account. Run: gcloud auth login",
            )),
            Err(e @ GcpError::GcloudNotFound(_)) => Ok(AuthStatus::failed(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_host_info(
        &self,
        query: &InstanceQuery,
    ) -> GatewayResult<Option<InstanceDescriptor>> {
        let found = self.list_instances(query).await?;
        Ok(found.into_iter().next().map(GceInstance::into_descriptor))
    }

    async fn create_instance(
        &self,
        spec: &InstanceSpec,
        can_ip_forward: bool,
        image: &ImageRef,
        ssh_keys: Option<&str>,
    ) -> GatewayResult<InstanceDescriptor> {
        Ok(self
            .create_instance_inner(spec, can_ip_forward, image, ssh_keys)
            .await?)
    }

    async fn delete_instance(
        &self,
        instance: &InstanceDescriptor,
        has_static_ip: bool,
    ) -> GatewayResult<()> {
        let zone = zone_of(instance)?;
        self.gcloud.delete_instance(&instance.name, zone).await?;

        if has_static_ip {
            let region = instance
                .region
                .clone()
                .unwrap_or_else(|| zone_region(zone).to_string());
            let address = static_ip_name(&instance.name);
            tracing::info!("Releasing static address {}", address);
            self.gcloud.delete_address(&address, &region).await?;
        }
        Ok(())
    }

    async fn start_instance(&self, instance: &InstanceDescriptor, ssh_port: u16)
    -> GatewayResult<()> {
        let zone = zone_of(instance)?;
        self.gcloud.start_instance(&instance.name, zone).await?;

        if let Some(ip) = &instance.private_ip {
            self.wait_for_ssh(ip, ssh_port).await?;
        }
        Ok(())
    }

    async fn stop_instance(&self, instance: &InstanceDescriptor) -> GatewayResult<()> {
        let zone = zone_of(instance)?;
        self.gcloud.stop_instance(&instance.name, zone).await?;
        Ok(())
    }

    async fn change_instance_type(
        &self,
        instance: &InstanceDescriptor,
        instance_type: &str,
    ) -> GatewayResult<()> {
        let zone = zone_of(instance)?;
        self.gcloud
            .set_machine_type(&instance.name, zone, instance_type)
            .await?;
        Ok(())
    }

    async fn mount_disk(&self, instance: &InstanceDescriptor, disk: &MountDisk)
    -> GatewayResult<()> {
        let zone = zone_of(instance)?;
        self.gcloud
            .attach_disk(&instance.name, zone, &disk.source, disk.boot)
            .await?;
        Ok(())
    }

    async fn unmount_disk(&self, instance: &InstanceDescriptor, device_name: &str)
    -> GatewayResult<()> {
        let zone = zone_of(instance)?;
        self.gcloud
            .detach_disk(&instance.name, zone, device_name)
            .await?;
        Ok(())
    }

    async fn create_disk(
        &self,
        zone: &str,
        tags: &[String],
        disk: &DiskSpec,
    ) -> GatewayResult<VolumeDescriptor> {
        let request = CreateDiskRequest {
            name: disk.name.clone(),
            zone: zone.to_string(),
            size_gb: disk.size_gb,
            image: disk.source_image.clone(),
            labels: tags.to_vec(),
        };
        tracing::info!("Creating disk {} in {}", disk.name, zone);
        let created = self.gcloud.create_disk(&request).await?;

        Ok(VolumeDescriptor {
            device_name: None,
            source: created.self_link,
            size_gb: disk.size_gb,
            boot: disk.source_image.is_some(),
        })
    }

    /// Image families are global on GCE, so the region plays no part.
    async fn get_image(&self, _region: Option<&str>) -> GatewayResult<ImageRef> {
        tracing::debug!(
            "Resolving image family {}/{}",
            self.config.image_project,
            self.config.image_family
        );
        let image = self
            .gcloud
            .describe_image_family(&self.config.image_family, &self.config.image_project)
            .await?;
        Ok(ImageRef {
            name: Some(image.name),
            self_link: image.self_link,
        })
    }

    async fn get_regions(&self) -> GatewayResult<serde_json::Value> {
        Ok(json!(self.regions(&[]).await?))
    }

    async fn get_zones(&self, query: &ZoneQuery) -> GatewayResult<serde_json::Value> {
        let payload = CustomPayload::from_value(query.custom_payload.as_ref());
        let network = query
            .dest_vpc_id
            .clone()
            .unwrap_or_else(|| self.network(&payload));

        let zones = self.gcloud.list_zones(query.region.as_deref()).await?;
        let subnets = self
            .gcloud
            .list_subnets(query.region.as_deref(), Some(&network))
            .await?;

        let mut result: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        for zone in zones {
            let region = last_segment(&zone.region).to_string();
            if !payload.per_region_metadata.is_empty()
                && !payload.per_region_metadata.contains_key(&region)
            {
                continue;
            }
            let entry = result.entry(region.clone()).or_insert_with(|| {
                let subnetworks: Vec<&str> = subnets
                    .iter()
                    .filter(|s| last_segment(&s.region) == region)
                    .map(|s| s.name.as_str())
                    .collect();
                json!({ "zones": [], "subnetworks": subnetworks })
            });
            if let Some(list) = entry["zones"].as_array_mut() {
                list.push(json!(zone.name));
            }
        }
        Ok(json!(result))
    }

    async fn get_instance_types(&self, query: &InstanceTypeQuery)
    -> GatewayResult<serde_json::Value> {
        let payload = CustomPayload::from_value(query.custom_payload.as_ref());
        let requested = if query.regions.is_empty() {
            payload.regions()
        } else {
            query.regions.clone()
        };
        let regions = self.regions(&requested).await?;

        let mut result = serde_json::Map::new();
        for region in regions {
            let zones: Vec<String> = self
                .gcloud
                .list_zones(Some(&region))
                .await?
                .into_iter()
                .map(|z| z.name)
                .collect();
            let types = self.gcloud.list_machine_types(&zones).await?;

            let mut by_name = serde_json::Map::new();
            for machine in types {
                let public = PUBLIC_FAMILIES.iter().any(|f| machine.name.starts_with(f));
                if !query.internal && !public {
                    continue;
                }
                by_name.entry(machine.name.clone()).or_insert_with(|| {
                    json!({
                        "numCores": machine.guest_cpus,
                        "memSizeGb": machine.memory_mb as f64 / 1024.0,
                        "isShared": machine.is_shared_cpu,
                    })
                });
            }
            result.insert(region, serde_json::Value::Object(by_name));
        }
        Ok(serde_json::Value::Object(result))
    }

    async fn query_vpc(&self, query: &VpcQuery) -> GatewayResult<serde_json::Value> {
        let payload = CustomPayload::from_value(query.custom_payload.as_ref());
        let network = self.network(&payload);
        let regions = match &query.region {
            Some(region) => vec![region.clone()],
            None => payload.regions(),
        };
        Ok(self.vpc_payload(&network, &regions).await?)
    }

    async fn get_current_host_info(&self) -> GatewayResult<serde_json::Value> {
        Ok(self.metadata_server.current_host().await?)
    }

    async fn get_spot_pricing(&self, query: &SpotPriceQuery) -> GatewayResult<serde_json::Value> {
        Ok(json!(self.spot_price(query).await?))
    }

    async fn get_device_names(&self, layout: &VolumeLayout) -> GatewayResult<Vec<String>> {
        Ok(device_names(layout)?)
    }

    async fn get_mount_points_csv(&self, layout: &VolumeLayout) -> GatewayResult<String> {
        Ok(mount_points_csv(layout)?)
    }

    async fn update_metadata(&self, override_file: &Path) -> GatewayResult<()> {
        let mut metadata = self.metadata();
        metadata
            .apply_override(override_file)
            .await
            .map_err(cloudops_core::GatewayError::from)?;
        tracing::debug!("Applied metadata override {}", override_file.display());

        match self.metadata.lock() {
            Ok(mut current) => *current = metadata,
            Err(poisoned) => *poisoned.into_inner() = metadata,
        }
        Ok(())
    }

    async fn network_bootstrap(&self, query: &VpcQuery) -> GatewayResult<serde_json::Value> {
        let payload = CustomPayload::from_value(query.custom_payload.as_ref());
        let network = self.network(&payload);

        let networks = self.gcloud.list_networks().await?;
        if !networks.iter().any(|n| n.name == network) {
            tracing::info!("Creating network {}", network);
            self.gcloud.create_network(&network).await?;
        }

        let rule = format!("{}-allow-internal", network);
        let rules = self.gcloud.list_firewall_rules(&network).await?;
        if !rules.iter().any(|r| r.name == rule) {
            let ranges = self.metadata().internal_ranges.join(",");
            tracing::info!("Creating firewall rule {} for {}", rule, ranges);
            self.gcloud
                .create_firewall_rule(&rule, &network, &ranges)
                .await?;
        }

        let regions = match &query.region {
            Some(region) => vec![region.clone()],
            None => payload.regions(),
        };
        Ok(self.vpc_payload(&network, &regions).await?)
    }

    async fn network_cleanup(&self, query: &VpcQuery) -> GatewayResult<serde_json::Value> {
        let payload = CustomPayload::from_value(query.custom_payload.as_ref());
        let network = self.network(&payload);

        let networks = self.gcloud.list_networks().await?;
        if !networks.iter().any(|n| n.name == network) {
            return Err(GcpError::Runtime(format!("Network {} does not exist", network)).into());
        }

        for rule in self.gcloud.list_firewall_rules(&network).await? {
            tracing::info!("Deleting firewall rule {}", rule.name);
            self.gcloud.delete_firewall_rule(&rule.name).await?;
        }
        tracing::info!("Deleting network {}", network);
        self.gcloud.delete_network(&network).await?;

        Ok(json!({ "success": format!("Removed network {}", network) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(num_volumes: i64, volume_type: &str) -> VolumeLayout {
        VolumeLayout {
            instance_type: Some("n1-standard-4".into()),
            num_volumes,
            volume_type: Some(volume_type.into()),
        }
    }

    #[test]
    fn test_scratch_device_names() {
        assert_eq!(
            device_names(&layout(2, GCP_SCRATCH)).unwrap(),
            vec!["nvme0n1", "nvme0n2"]
        );
    }

    #[test]
    fn test_persistent_device_names() {
        assert_eq!(
            device_names(&layout(3, GCP_PERSISTENT)).unwrap(),
            vec!["sdb", "sdc", "sdd"]
        );
    }

    #[test]
    fn test_persistent_device_names_past_sdz() {
        let names = device_names(&layout(25, GCP_PERSISTENT)).unwrap();
        assert_eq!(names.last().unwrap(), "sdz");

        let names = device_names(&layout(26, GCP_PERSISTENT)).unwrap();
        assert_eq!(names.last().unwrap(), "sdaa");

        let names = device_names(&layout(30, GCP_PERSISTENT)).unwrap();
        assert_eq!(&names[24..], ["sdz", "sdaa", "sdab", "sdac", "sdad", "sdae"]);
        assert!(names.iter().all(|n| n[2..].chars().all(|c| c.is_ascii_lowercase())));

        let names = device_names(&layout(MAX_DATA_VOLUMES, GCP_PERSISTENT)).unwrap();
        assert_eq!(names.len(), MAX_DATA_VOLUMES as usize);
    }

    #[test]
    fn test_too_many_volumes() {
        for volume_type in [GCP_PERSISTENT, GCP_SCRATCH] {
            let err = device_names(&layout(200, volume_type)).unwrap_err();
            assert!(matches!(err, GcpError::Runtime(_)));
        }
        assert!(device_names(&layout(i64::MAX, GCP_PERSISTENT)).is_err());
        assert!(device_names(&layout(-3, GCP_PERSISTENT)).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_volume_type() {
        assert!(device_names(&layout(1, "magnetic")).is_err());
    }

    #[test]
    fn test_mount_points() {
        assert_eq!(
            mount_points_csv(&layout(3, GCP_SCRATCH)).unwrap(),
            "/mnt/d0,/mnt/d1,/mnt/d2"
        );
        assert_eq!(mount_points_csv(&layout(0, GCP_SCRATCH)).unwrap(), "");
        assert!(mount_points_csv(&layout(MAX_DATA_VOLUMES + 1, GCP_SCRATCH)).is_err());
    }

    #[test]
    fn test_static_ip_name_is_clamped() {
        let name = static_ip_name(&"y".repeat(70));
        assert_eq!(name.len(), MAX_IDENTIFIER_LEN);
        assert!(name.ends_with("-ip"));
    }

    #[test]
    fn test_instance_filters() {
        let mut query = InstanceQuery::new("yb-dev-n1");
        assert_eq!(GcpGateway::instance_filter(&query), "name=yb-dev-n1");

        query.region = Some("us-west1".into());
        assert_eq!(
            GcpGateway::instance_filter(&query),
            "name=yb-dev-n1 AND zone~us-west1"
        );

        query.zone = Some("us-west1-b".into());
        assert_eq!(
            GcpGateway::instance_filter(&query),
            "name=yb-dev-n1 AND zone:us-west1-b"
        );
    }

    #[test]
    fn test_network_precedence() {
        let gateway = GcpGateway::new(GcpConfig {
            network: Some("configured".into()),
            ..Default::default()
        });
        assert_eq!(gateway.network(&CustomPayload::default()), "configured");

        let payload = CustomPayload {
            dest_vpc_id: Some("dest".into()),
            ..Default::default()
        };
        assert_eq!(gateway.network(&payload), "dest");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_image_lookup_ignores_region() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let gcloud = dir.path().join("gcloud");
        std::fs::write(
            &gcloud,
            format!(
                "#!/bin/sh\necho \"$@\" >> {}\necho '{{\"name\": \"centos-7-v1\", \"selfLink\": \"images/centos-7-v1\"}}'\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&gcloud, std::fs::Permissions::from_mode(0o755)).unwrap();

        let gateway = GcpGateway::new(GcpConfig {
            gcloud_path: gcloud.display().to_string(),
            ..Default::default()
        });
        let west = gateway.get_image(Some("us-west1")).await.unwrap();
        let anywhere = gateway.get_image(None).await.unwrap();

        assert_eq!(west.self_link, "images/centos-7-v1");
        assert_eq!(west.self_link, anywhere.self_link);
        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert!(!calls[0].contains("us-west1"));
    }

    #[tokio::test]
    async fn test_update_metadata_is_visible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.yml");
        std::fs::write(&path, "network: overridden\n").unwrap();

        let gateway = GcpGateway::new(GcpConfig::default());
        gateway.update_metadata(&path).await.unwrap();
        assert_eq!(gateway.metadata().network.as_deref(), Some("overridden"));
    }
}
