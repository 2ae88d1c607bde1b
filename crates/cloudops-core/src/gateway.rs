//! Provider gateway trait definition
//!
//! The lifecycle engine never talks to a cloud directly. Every provider
//! implements [`ProviderGateway`], and lifecycle hooks only reach the cloud
//! through it.

use crate::error::GatewayResult;
use crate::spec::InvocationArgs;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Provider gateway abstraction trait
///
/// All calls are awaited one at a time by the engine. Retries and
/// timeouts, if any, belong to the implementation.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Returns the provider name (e.g., "gcp")
    fn name(&self) -> &str;

    /// Check whether the provider credentials are usable
    async fn check_auth(&self) -> GatewayResult<AuthStatus>;

    /// Look up a single host, `None` when nothing matches
    async fn get_host_info(&self, query: &InstanceQuery)
    -> GatewayResult<Option<InstanceDescriptor>>;

    async fn create_instance(
        &self,
        spec: &InstanceSpec,
        can_ip_forward: bool,
        image: &ImageRef,
        ssh_keys: Option<&str>,
    ) -> GatewayResult<InstanceDescriptor>;

    async fn delete_instance(
        &self,
        instance: &InstanceDescriptor,
        has_static_ip: bool,
    ) -> GatewayResult<()>;

    async fn start_instance(&self, instance: &InstanceDescriptor, ssh_port: u16)
    -> GatewayResult<()>;

    async fn stop_instance(&self, instance: &InstanceDescriptor) -> GatewayResult<()>;

    async fn change_instance_type(
        &self,
        instance: &InstanceDescriptor,
        instance_type: &str,
    ) -> GatewayResult<()>;

    async fn mount_disk(&self, instance: &InstanceDescriptor, disk: &MountDisk)
    -> GatewayResult<()>;

    async fn unmount_disk(&self, instance: &InstanceDescriptor, device_name: &str)
    -> GatewayResult<()>;

    async fn create_disk(
        &self,
        zone: &str,
        tags: &[String],
        disk: &DiskSpec,
    ) -> GatewayResult<VolumeDescriptor>;

    /// Latest provider image for the region (or the provider default)
    async fn get_image(&self, region: Option<&str>) -> GatewayResult<ImageRef>;

    async fn get_regions(&self) -> GatewayResult<serde_json::Value>;

    async fn get_zones(&self, query: &ZoneQuery) -> GatewayResult<serde_json::Value>;

    async fn get_instance_types(&self, query: &InstanceTypeQuery)
    -> GatewayResult<serde_json::Value>;

    async fn query_vpc(&self, query: &VpcQuery) -> GatewayResult<serde_json::Value>;

    /// Metadata of the machine this process runs on. Must not need
    /// credentials.
    async fn get_current_host_info(&self) -> GatewayResult<serde_json::Value>;

    async fn get_spot_pricing(&self, query: &SpotPriceQuery) -> GatewayResult<serde_json::Value>;

    async fn get_device_names(&self, layout: &VolumeLayout) -> GatewayResult<Vec<String>>;

    async fn get_mount_points_csv(&self, layout: &VolumeLayout) -> GatewayResult<String>;

    /// Apply a YAML metadata override file to the provider's metadata
    async fn update_metadata(&self, override_file: &Path) -> GatewayResult<()>;

    async fn network_bootstrap(&self, query: &VpcQuery) -> GatewayResult<serde_json::Value>;

    async fn network_cleanup(&self, query: &VpcQuery) -> GatewayResult<serde_json::Value>;
}

/// Authentication status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Lifecycle state of a compute instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Provisioning,
    Running,
    Stopped,
    Terminated,
    Unknown,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceState::Provisioning => write!(f, "provisioning"),
            InstanceState::Running => write!(f, "running"),
            InstanceState::Stopped => write!(f, "stopped"),
            InstanceState::Terminated => write!(f, "terminated"),
            InstanceState::Unknown => write!(f, "unknown"),
        }
    }
}

/// The engine's view of one compute instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Provider-assigned ID
    pub id: String,

    pub name: String,

    pub region: Option<String>,

    pub zone: Option<String>,

    pub private_ip: Option<String>,

    pub public_ip: Option<String>,

    pub state: InstanceState,

    pub instance_type: Option<String>,

    /// Provider-specific attributes (root volume device, tags, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl InstanceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            region: None,
            zone: None,
            private_ip: None,
            public_ip: None,
            state: InstanceState::Unknown,
            instance_type: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_state(mut self, state: InstanceState) -> Self {
        self.state = state;
        self
    }

    pub fn with_location(mut self, region: impl Into<String>, zone: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self.zone = Some(zone.into());
        self
    }

    pub fn with_private_ip(mut self, ip: impl Into<String>) -> Self {
        self.private_ip = Some(ip.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Identity of a root or data volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    pub device_name: Option<String>,

    /// Provider reference usable as a mount source (self link, volume id)
    pub source: String,

    pub size_gb: Option<i64>,

    pub boot: bool,
}

/// Image reference returned by [`ProviderGateway::get_image`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: Option<String>,
    pub self_link: String,
}

impl ImageRef {
    pub fn from_link(self_link: impl Into<String>) -> Self {
        Self {
            name: None,
            self_link: self_link.into(),
        }
    }
}

/// What to allocate in `create_instance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    pub server_type: String,
    pub instance_type: String,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub subnet: Option<String>,
    pub assign_public_ip: bool,
    pub assign_static_public_ip: bool,
    pub boot_disk_size_gb: Option<i64>,
    pub num_volumes: i64,
    pub volume_size_gb: Option<i64>,
    pub volume_type: Option<String>,
    pub preemptible: bool,
    pub tags: Vec<String>,
}

/// Body of a standalone disk creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub name: String,
    pub size_gb: Option<i64>,
    pub source_image: Option<String>,
}

/// Attach request for `mount_disk`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountDisk {
    pub boot: bool,
    pub source: String,
}

/// How to find the instance(s) a command targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceQuery {
    pub search_pattern: String,
    pub region: Option<String>,
    pub zone: Option<String>,
    /// Private IP the host must have, when several share a name
    pub node_ip: Option<String>,
}

impl InstanceQuery {
    pub fn new(search_pattern: impl Into<String>) -> Self {
        Self {
            search_pattern: search_pattern.into(),
            ..Default::default()
        }
    }

    /// Build the query from the standard instance flags
    pub fn from_args(args: &InvocationArgs) -> Self {
        Self {
            search_pattern: args.str("search_pattern").unwrap_or_default().to_string(),
            region: args.str("region").map(str::to_string),
            zone: args.str("zone").map(str::to_string),
            node_ip: args.str("node_ip").map(str::to_string),
        }
    }
}

/// Inputs of device naming and mount point computation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLayout {
    pub instance_type: Option<String>,
    pub num_volumes: i64,
    pub volume_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneQuery {
    pub region: Option<String>,
    pub dest_vpc_id: Option<String>,
    pub custom_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceTypeQuery {
    pub regions: Vec<String>,
    pub internal: bool,
    pub custom_payload: Option<serde_json::Value>,
}

/// Shared by VPC queries and network bootstrap/cleanup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpcQuery {
    pub region: Option<String>,
    pub custom_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotPriceQuery {
    pub region: String,
    pub zone: Option<String>,
    pub instance_type: String,
}
