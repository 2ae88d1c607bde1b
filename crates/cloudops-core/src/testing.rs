//! In-memory gateway for exercising lifecycle commands without a cloud
//!
//! Every call is recorded in order; lookups answer from a fixed instance
//! list and queries from canned responses.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    CheckAuth,
    GetHostInfo(InstanceQuery),
    CreateInstance {
        spec: InstanceSpec,
        can_ip_forward: bool,
        image: ImageRef,
        ssh_keys: Option<String>,
    },
    DeleteInstance {
        name: String,
        has_static_ip: bool,
    },
    StartInstance {
        name: String,
        ssh_port: u16,
    },
    StopInstance(String),
    ChangeInstanceType {
        name: String,
        instance_type: String,
    },
    MountDisk {
        name: String,
        disk: MountDisk,
    },
    UnmountDisk {
        name: String,
        device_name: String,
    },
    CreateDisk {
        zone: String,
        tags: Vec<String>,
        disk: DiskSpec,
    },
    GetImage(Option<String>),
    GetRegions,
    GetZones(ZoneQuery),
    GetInstanceTypes(InstanceTypeQuery),
    QueryVpc(VpcQuery),
    GetCurrentHostInfo,
    GetSpotPricing(SpotPriceQuery),
    GetDeviceNames(VolumeLayout),
    GetMountPointsCsv(VolumeLayout),
    UpdateMetadata(PathBuf),
    NetworkBootstrap(VpcQuery),
    NetworkCleanup(VpcQuery),
}

impl GatewayCall {
    /// Gateway method name of the call
    pub fn op(&self) -> &'static str {
        match self {
            GatewayCall::CheckAuth => "check_auth",
            GatewayCall::GetHostInfo(_) => "get_host_info",
            GatewayCall::CreateInstance { .. } => "create_instance",
            GatewayCall::DeleteInstance { .. } => "delete_instance",
            GatewayCall::StartInstance { .. } => "start_instance",
            GatewayCall::StopInstance(_) => "stop_instance",
            GatewayCall::ChangeInstanceType { .. } => "change_instance_type",
            GatewayCall::MountDisk { .. } => "mount_disk",
            GatewayCall::UnmountDisk { .. } => "unmount_disk",
            GatewayCall::CreateDisk { .. } => "create_disk",
            GatewayCall::GetImage(_) => "get_image",
            GatewayCall::GetRegions => "get_regions",
            GatewayCall::GetZones(_) => "get_zones",
            GatewayCall::GetInstanceTypes(_) => "get_instance_types",
            GatewayCall::QueryVpc(_) => "query_vpc",
            GatewayCall::GetCurrentHostInfo => "get_current_host_info",
            GatewayCall::GetSpotPricing(_) => "get_spot_pricing",
            GatewayCall::GetDeviceNames(_) => "get_device_names",
            GatewayCall::GetMountPointsCsv(_) => "get_mount_points_csv",
            GatewayCall::UpdateMetadata(_) => "update_metadata",
            GatewayCall::NetworkBootstrap(_) => "network_bootstrap",
            GatewayCall::NetworkCleanup(_) => "network_cleanup",
        }
    }
}

/// [`ProviderGateway`] that records calls instead of reaching a cloud
pub struct RecordingGateway {
    name: String,
    auth: AuthStatus,
    instances: Vec<InstanceDescriptor>,
    image: ImageRef,
    responses: HashMap<&'static str, serde_json::Value>,
    failures: HashMap<&'static str, GatewayError>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            name: "gcp".to_string(),
            auth: AuthStatus::ok("tester@example.com"),
            instances: Vec::new(),
            image: ImageRef::from_link("projects/test-images/global/images/test-image"),
            responses: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A running instance in us-west1-b with private IP 10.0.0.1
    pub fn running(name: &str) -> InstanceDescriptor {
        InstanceDescriptor::new(format!("id-{}", name), name)
            .with_state(InstanceState::Running)
            .with_location("us-west1", "us-west1-b")
            .with_private_ip("10.0.0.1")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_instance(mut self, instance: InstanceDescriptor) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = image;
        self
    }

    /// Canned value for a JSON-returning method
    pub fn with_response(mut self, op: &'static str, value: serde_json::Value) -> Self {
        self.responses.insert(op, value);
        self
    }

    pub fn unauthenticated(mut self, reason: &str) -> Self {
        self.auth = AuthStatus::failed(reason);
        self
    }

    /// Make every call of `op` fail with `error`
    pub fn fail_on(mut self, op: &'static str, error: GatewayError) -> Self {
        self.failures.insert(op, error);
        self
    }

    /// Recorded calls, oldest first
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls of `op`
    pub fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    fn record(&self, call: GatewayCall) -> GatewayResult<()> {
        let op = call.op();
        self.calls.lock().unwrap().push(call);
        match self.failures.get(op) {
            Some(error) => Err(replay(error)),
            None => Ok(()),
        }
    }

    fn response(&self, op: &str) -> serde_json::Value {
        self.responses
            .get(op)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}))
    }
}

/// `GatewayError` is not `Clone` because of the wrapped io/json errors
fn replay(error: &GatewayError) -> GatewayError {
    match error {
        GatewayError::AuthenticationFailed(m) => GatewayError::AuthenticationFailed(m.clone()),
        GatewayError::ResourceNotFound(m) => GatewayError::ResourceNotFound(m.clone()),
        GatewayError::ApiError(m) => GatewayError::ApiError(m.clone()),
        GatewayError::CommandFailed(m) => GatewayError::CommandFailed(m.clone()),
        GatewayError::InvalidConfig(m) => GatewayError::InvalidConfig(m.clone()),
        GatewayError::Runtime(m) => GatewayError::Runtime(m.clone()),
        GatewayError::Unsupported(m) => GatewayError::Unsupported(m.clone()),
        GatewayError::Io(e) => GatewayError::Io(std::io::Error::new(e.kind(), e.to_string())),
        GatewayError::Json(e) => GatewayError::ApiError(e.to_string()),
    }
}

#[async_trait]
impl ProviderGateway for RecordingGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_auth(&self) -> GatewayResult<AuthStatus> {
        self.record(GatewayCall::CheckAuth)?;
        Ok(self.auth.clone())
    }

    async fn get_host_info(
        &self,
        query: &InstanceQuery,
    ) -> GatewayResult<Option<InstanceDescriptor>> {
        self.record(GatewayCall::GetHostInfo(query.clone()))?;
        Ok(self
            .instances
            .iter()
            .find(|i| {
                i.name == query.search_pattern
                    && query
                        .node_ip
                        .as_ref()
                        .is_none_or(|ip| i.private_ip.as_ref() == Some(ip))
            })
            .cloned())
    }

    async fn create_instance(
        &self,
        spec: &InstanceSpec,
        can_ip_forward: bool,
        image: &ImageRef,
        ssh_keys: Option<&str>,
    ) -> GatewayResult<InstanceDescriptor> {
        self.record(GatewayCall::CreateInstance {
            spec: spec.clone(),
            can_ip_forward,
            image: image.clone(),
            ssh_keys: ssh_keys.map(str::to_string),
        })?;
        let mut instance = InstanceDescriptor::new(format!("id-{}", spec.name), &spec.name)
            .with_state(InstanceState::Running);
        instance.region = spec.region.clone();
        instance.zone = spec.zone.clone();
        instance.instance_type = Some(spec.instance_type.clone());
        Ok(instance)
    }

    async fn delete_instance(
        &self,
        instance: &InstanceDescriptor,
        has_static_ip: bool,
    ) -> GatewayResult<()> {
        self.record(GatewayCall::DeleteInstance {
            name: instance.name.clone(),
            has_static_ip,
        })
    }

    async fn start_instance(&self, instance: &InstanceDescriptor, ssh_port: u16)
    -> GatewayResult<()> {
        self.record(GatewayCall::StartInstance {
            name: instance.name.clone(),
            ssh_port,
        })
    }

    async fn stop_instance(&self, instance: &InstanceDescriptor) -> GatewayResult<()> {
        self.record(GatewayCall::StopInstance(instance.name.clone()))
    }

    async fn change_instance_type(
        &self,
        instance: &InstanceDescriptor,
        instance_type: &str,
    ) -> GatewayResult<()> {
        self.record(GatewayCall::ChangeInstanceType {
            name: instance.name.clone(),
            instance_type: instance_type.to_string(),
        })
    }

    async fn mount_disk(&self, instance: &InstanceDescriptor, disk: &MountDisk)
    -> GatewayResult<()> {
        self.record(GatewayCall::MountDisk {
            name: instance.name.clone(),
            disk: disk.clone(),
        })
    }

    async fn unmount_disk(&self, instance: &InstanceDescriptor, device_name: &str)
    -> GatewayResult<()> {
        self.record(GatewayCall::UnmountDisk {
            name: instance.name.clone(),
            device_name: device_name.to_string(),
        })
    }

    async fn create_disk(
        &self,
        zone: &str,
        tags: &[String],
        disk: &DiskSpec,
    ) -> GatewayResult<VolumeDescriptor> {
        self.record(GatewayCall::CreateDisk {
            zone: zone.to_string(),
            tags: tags.to_vec(),
            disk: disk.clone(),
        })?;
        Ok(VolumeDescriptor {
            device_name: None,
            source: format!("zones/{}/disks/{}", zone, disk.name),
            size_gb: disk.size_gb,
            boot: true,
        })
    }

    async fn get_image(&self, region: Option<&str>) -> GatewayResult<ImageRef> {
        self.record(GatewayCall::GetImage(region.map(str::to_string)))?;
        Ok(self.image.clone())
    }

    async fn get_regions(&self) -> GatewayResult<serde_json::Value> {
        self.record(GatewayCall::GetRegions)?;
        Ok(self.response("get_regions"))
    }

    async fn get_zones(&self, query: &ZoneQuery) -> GatewayResult<serde_json::Value> {
        self.record(GatewayCall::GetZones(query.clone()))?;
        Ok(self.response("get_zones"))
    }

    async fn get_instance_types(&self, query: &InstanceTypeQuery)
    -> GatewayResult<serde_json::Value> {
        self.record(GatewayCall::GetInstanceTypes(query.clone()))?;
        Ok(self.response("get_instance_types"))
    }

    async fn query_vpc(&self, query: &VpcQuery) -> GatewayResult<serde_json::Value> {
        self.record(GatewayCall::QueryVpc(query.clone()))?;
        Ok(self.response("query_vpc"))
    }

    async fn get_current_host_info(&self) -> GatewayResult<serde_json::Value> {
        self.record(GatewayCall::GetCurrentHostInfo)?;
        Ok(self.response("get_current_host_info"))
    }

    async fn get_spot_pricing(&self, query: &SpotPriceQuery) -> GatewayResult<serde_json::Value> {
        self.record(GatewayCall::GetSpotPricing(query.clone()))?;
        Ok(self.response("get_spot_pricing"))
    }

    async fn get_device_names(&self, layout: &VolumeLayout) -> GatewayResult<Vec<String>> {
        self.record(GatewayCall::GetDeviceNames(layout.clone()))?;
        Ok((0..layout.num_volumes).map(|i| format!("vd{}", i)).collect())
    }

    async fn get_mount_points_csv(&self, layout: &VolumeLayout) -> GatewayResult<String> {
        self.record(GatewayCall::GetMountPointsCsv(layout.clone()))?;
        Ok((0..layout.num_volumes)
            .map(|i| format!("/mnt/d{}", i))
            .collect::<Vec<_>>()
            .join(","))
    }

    async fn update_metadata(&self, override_file: &Path) -> GatewayResult<()> {
        self.record(GatewayCall::UpdateMetadata(override_file.to_path_buf()))
    }

    async fn network_bootstrap(&self, query: &VpcQuery) -> GatewayResult<serde_json::Value> {
        self.record(GatewayCall::NetworkBootstrap(query.clone()))?;
        Ok(self.response("network_bootstrap"))
    }

    async fn network_cleanup(&self, query: &VpcQuery) -> GatewayResult<serde_json::Value> {
        self.record(GatewayCall::NetworkCleanup(query.clone()))?;
        Ok(self.response("network_cleanup"))
    }
}
