//! gcloud CLI wrapper
//!
//! Wraps the `gcloud compute` commands used by the GCP gateway. Every call
//! asks for JSON output and deserializes into the types below.

use crate::error::{GcpError, Result};
use cloudops_config::GcpConfig;
use cloudops_core::{InstanceDescriptor, InstanceState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// Last path segment of a GCE resource URL
pub fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Region of a zone name (`us-west1-b` -> `us-west1`)
pub fn zone_region(zone: &str) -> &str {
    zone.rsplit_once('-').map(|(region, _)| region).unwrap_or(zone)
}

/// gcloud CLI wrapper
pub struct Gcloud {
    binary: String,
    project: Option<String>,
}

impl Gcloud {
    pub fn new(binary: impl Into<String>, project: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            project,
        }
    }

    pub fn from_config(config: &GcpConfig) -> Self {
        Self::new(&config.gcloud_path, config.project.clone())
    }

    /// Active gcloud account, `None` when nobody is logged in
    pub async fn active_account(&self) -> Result<Option<String>> {
        let accounts: Vec<GcloudAccount> = self
            .run_json(&["auth", "list", "--filter=status:ACTIVE"])
            .await?;
        Ok(accounts.into_iter().next().map(|a| a.account))
    }

    /// Run a gcloud command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        if let Some(project) = &self.project {
            cmd.arg("--project").arg(project);
        }
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.binary, args.join(" "));

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GcpError::GcloudNotFound(self.binary.clone()),
            _ => GcpError::IoError(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GcpError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let mut args = args.to_vec();
        args.push("--format=json");
        let output = self.run_command(&args).await?;
        let output = if output.trim().is_empty() {
            "[]"
        } else {
            output.trim()
        };
        Ok(serde_json::from_str(output)?)
    }

    /// Instances matching a gcloud `--filter` expression
    pub async fn list_instances(&self, filter: &str) -> Result<Vec<GceInstance>> {
        let filter = format!("--filter={}", filter);
        self.run_json(&["compute", "instances", "list", &filter])
            .await
    }

    pub async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<GceInstance> {
        let args = request.to_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let created: Vec<GceInstance> = self.run_json(&args).await?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| GcpError::InstanceNotFound(request.name.clone()))
    }

    pub async fn delete_instance(&self, name: &str, zone: &str) -> Result<()> {
        self.run_command(&[
            "compute", "instances", "delete", name, "--zone", zone, "--quiet",
        ])
        .await?;
        Ok(())
    }

    pub async fn create_address(&self, name: &str, region: &str) -> Result<()> {
        self.run_command(&["compute", "addresses", "create", name, "--region", region])
            .await?;
        Ok(())
    }

    pub async fn delete_address(&self, name: &str, region: &str) -> Result<()> {
        self.run_command(&[
            "compute", "addresses", "delete", name, "--region", region, "--quiet",
        ])
        .await?;
        Ok(())
    }

    pub async fn start_instance(&self, name: &str, zone: &str) -> Result<()> {
        self.run_command(&["compute", "instances", "start", name, "--zone", zone])
            .await?;
        Ok(())
    }

    pub async fn stop_instance(&self, name: &str, zone: &str) -> Result<()> {
        self.run_command(&["compute", "instances", "stop", name, "--zone", zone])
            .await?;
        Ok(())
    }

    pub async fn set_machine_type(&self, name: &str, zone: &str, machine_type: &str) -> Result<()> {
        self.run_command(&[
            "compute",
            "instances",
            "set-machine-type",
            name,
            "--zone",
            zone,
            "--machine-type",
            machine_type,
        ])
        .await?;
        Ok(())
    }

    pub async fn attach_disk(&self, name: &str, zone: &str, disk: &str, boot: bool) -> Result<()> {
        let disk = format!("--disk={}", disk);
        let mut args = vec!["compute", "instances", "attach-disk", name, "--zone", zone, &disk];
        if boot {
            args.push("--boot");
        }
        self.run_command(&args).await?;
        Ok(())
    }

    pub async fn detach_disk(&self, name: &str, zone: &str, device_name: &str) -> Result<()> {
        let device = format!("--device-name={}", device_name);
        self.run_command(&[
            "compute", "instances", "detach-disk", name, "--zone", zone, &device,
        ])
        .await?;
        Ok(())
    }

    pub async fn create_disk(&self, request: &CreateDiskRequest) -> Result<GceDisk> {
        let args = request.to_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let created: Vec<GceDisk> = self.run_json(&args).await?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| GcpError::CommandFailed(format!("disk {} was not created", request.name)))
    }

    /// Newest image of an image family
    pub async fn describe_image_family(&self, family: &str, project: &str) -> Result<GceImage> {
        let family = format!("--image-family={}", family);
        let project = format!("--image-project={}", project);
        self.run_json(&["compute", "images", "describe-from-family", &family, &project])
            .await
    }

    pub async fn list_regions(&self) -> Result<Vec<GceRegion>> {
        self.run_json(&["compute", "regions", "list"]).await
    }

    pub async fn list_zones(&self, region: Option<&str>) -> Result<Vec<GceZone>> {
        match region {
            Some(region) => {
                let filter = format!("--filter=region:{}", region);
                self.run_json(&["compute", "zones", "list", &filter]).await
            }
            None => self.run_json(&["compute", "zones", "list"]).await,
        }
    }

    pub async fn list_networks(&self) -> Result<Vec<GceNetwork>> {
        self.run_json(&["compute", "networks", "list"]).await
    }

    pub async fn list_subnets(
        &self,
        region: Option<&str>,
        network: Option<&str>,
    ) -> Result<Vec<GceSubnet>> {
        let mut args = vec![
            "compute".to_string(),
            "networks".to_string(),
            "subnets".to_string(),
            "list".to_string(),
        ];
        if let Some(region) = region {
            args.push(format!("--regions={}", region));
        }
        if let Some(network) = network {
            args.push(format!("--network={}", network));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_json(&args).await
    }

    pub async fn create_network(&self, name: &str) -> Result<()> {
        self.run_command(&[
            "compute",
            "networks",
            "create",
            name,
            "--subnet-mode=auto",
        ])
        .await?;
        Ok(())
    }

    pub async fn delete_network(&self, name: &str) -> Result<()> {
        self.run_command(&["compute", "networks", "delete", name, "--quiet"])
            .await?;
        Ok(())
    }

    pub async fn list_firewall_rules(&self, network: &str) -> Result<Vec<GceFirewallRule>> {
        let filter = format!("--filter=network~{}$", network);
        self.run_json(&["compute", "firewall-rules", "list", &filter])
            .await
    }

    pub async fn create_firewall_rule(
        &self,
        name: &str,
        network: &str,
        source_ranges: &str,
    ) -> Result<()> {
        let network = format!("--network={}", network);
        let ranges = format!("--source-ranges={}", source_ranges);
        self.run_command(&[
            "compute",
            "firewall-rules",
            "create",
            name,
            &network,
            "--allow=tcp,udp,icmp",
            &ranges,
        ])
        .await?;
        Ok(())
    }

    pub async fn delete_firewall_rule(&self, name: &str) -> Result<()> {
        self.run_command(&["compute", "firewall-rules", "delete", name, "--quiet"])
            .await?;
        Ok(())
    }

    /// Machine types available in any of `zones`
    pub async fn list_machine_types(&self, zones: &[String]) -> Result<Vec<GceMachineType>> {
        if zones.is_empty() {
            return self.run_json(&["compute", "machine-types", "list"]).await;
        }
        let zones = format!("--zones={}", zones.join(","));
        self.run_json(&["compute", "machine-types", "list", &zones])
            .await
    }

    pub async fn describe_machine_type(&self, name: &str, zone: &str) -> Result<GceMachineType> {
        self.run_json(&["compute", "machine-types", "describe", name, "--zone", zone])
            .await
    }

    /// OAuth token for direct REST calls
    pub async fn access_token(&self) -> Result<String> {
        let token = self.run_command(&["auth", "print-access-token"]).await?;
        Ok(token.trim().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcloudAccount {
    pub account: String,
    pub status: Option<String>,
}

/// `gcloud compute instances` JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GceInstance {
    pub id: String,
    pub name: String,
    /// Zone URL
    pub zone: String,
    pub status: String,
    /// Machine type URL
    pub machine_type: String,
    pub network_interfaces: Vec<NetworkInterface>,
    pub disks: Vec<AttachedDisk>,
    pub labels: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInterface {
    #[serde(rename = "networkIP")]
    pub network_ip: Option<String>,
    pub subnetwork: Option<String>,
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessConfig {
    #[serde(rename = "natIP")]
    pub nat_ip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachedDisk {
    pub device_name: String,
    pub boot: bool,
    pub source: Option<String>,
    pub disk_size_gb: Option<String>,
}

impl GceInstance {
    pub fn state(&self) -> InstanceState {
        match self.status.as_str() {
            "PROVISIONING" | "STAGING" => InstanceState::Provisioning,
            "RUNNING" => InstanceState::Running,
            "STOPPING" | "STOPPED" | "SUSPENDING" | "SUSPENDED" => InstanceState::Stopped,
            "TERMINATED" => InstanceState::Terminated,
            _ => InstanceState::Unknown,
        }
    }

    pub fn private_ip(&self) -> Option<&str> {
        self.network_interfaces
            .first()
            .and_then(|n| n.network_ip.as_deref())
    }

    pub fn public_ip(&self) -> Option<&str> {
        self.network_interfaces
            .first()
            .and_then(|n| n.access_configs.first())
            .and_then(|a| a.nat_ip.as_deref())
    }

    pub fn boot_disk(&self) -> Option<&AttachedDisk> {
        self.disks.iter().find(|d| d.boot)
    }

    pub fn into_descriptor(self) -> InstanceDescriptor {
        let zone = last_segment(&self.zone).to_string();
        let mut descriptor = InstanceDescriptor::new(&self.id, &self.name)
            .with_state(self.state())
            .with_location(zone_region(&zone), &zone);
        descriptor.private_ip = self.private_ip().map(str::to_string);
        descriptor.public_ip = self.public_ip().map(str::to_string);
        if !self.machine_type.is_empty() {
            descriptor.instance_type = Some(last_segment(&self.machine_type).to_string());
        }
        if let Some(boot) = self.boot_disk() {
            descriptor = descriptor
                .with_attribute(
                    "root_volume_device_name",
                    serde_json::json!(boot.device_name),
                )
                .with_attribute("root_volume", serde_json::json!(boot.source));
        }
        if !self.labels.is_empty() {
            descriptor = descriptor.with_attribute("labels", serde_json::json!(self.labels));
        }
        descriptor
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GceDisk {
    pub name: String,
    pub self_link: String,
    pub size_gb: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GceImage {
    pub name: String,
    pub self_link: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GceRegion {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GceZone {
    pub name: String,
    /// Region URL
    pub region: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GceNetwork {
    pub name: String,
    pub self_link: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GceSubnet {
    pub name: String,
    pub region: String,
    pub network: String,
    pub ip_cidr_range: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GceFirewallRule {
    pub name: String,
    pub network: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GceMachineType {
    pub name: String,
    pub zone: String,
    pub guest_cpus: i64,
    pub memory_mb: i64,
    pub is_shared_cpu: bool,
}

/// Arguments of `gcloud compute instances create`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub zone: String,
    pub machine_type: String,
    pub image: String,
    pub boot_disk_size_gb: Option<i64>,
    pub subnet: Option<String>,
    pub can_ip_forward: bool,
    pub preemptible: bool,
    pub public_ip: bool,
    /// Named static address to bind as external IP
    pub address: Option<String>,
    pub ssh_keys: Option<String>,
    /// Local NVMe SSD count
    pub local_ssds: i64,
    /// Persistent data disk sizes
    pub data_disks_gb: Vec<i64>,
    pub server_type: String,
    pub labels: Vec<String>,
}

impl CreateInstanceRequest {
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["compute", "instances", "create"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(self.name.clone());
        args.push(format!("--zone={}", self.zone));
        args.push(format!("--machine-type={}", self.machine_type));
        args.push(format!("--image={}", self.image));
        if let Some(size) = self.boot_disk_size_gb {
            args.push(format!("--boot-disk-size={}GB", size));
        }
        if let Some(subnet) = &self.subnet {
            args.push(format!("--subnet={}", subnet));
        }
        if self.can_ip_forward {
            args.push("--can-ip-forward".to_string());
        }
        if self.preemptible {
            args.push("--preemptible".to_string());
        }
        match (&self.address, self.public_ip) {
            (Some(address), _) => args.push(format!("--address={}", address)),
            (None, false) => args.push("--no-address".to_string()),
            (None, true) => {}
        }
        if let Some(keys) = &self.ssh_keys {
            args.push(format!("--metadata=ssh-keys={}", keys));
        }
        for _ in 0..self.local_ssds {
            args.push("--local-ssd=interface=NVME".to_string());
        }
        for size in &self.data_disks_gb {
            args.push(format!("--create-disk=size={}GB,type=pd-ssd,auto-delete=yes", size));
        }
        args.push(format!("--tags={}", self.server_type));
        if !self.labels.is_empty() {
            args.push(format!("--labels={}", self.labels.join(",")));
        }
        args
    }
}

/// Arguments of `gcloud compute disks create`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateDiskRequest {
    pub name: String,
    pub zone: String,
    pub size_gb: Option<i64>,
    pub image: Option<String>,
    pub labels: Vec<String>,
}

impl CreateDiskRequest {
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["compute", "disks", "create"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(self.name.clone());
        args.push(format!("--zone={}", self.zone));
        if let Some(size) = self.size_gb {
            args.push(format!("--size={}GB", size));
        }
        if let Some(image) = &self.image {
            args.push(format!("--image={}", image));
        }
        if !self.labels.is_empty() {
            args.push(format!("--labels={}", self.labels.join(",")));
        }
        args
    }
}
