//! Provider-independent lifecycle verbs
//!
//! These verbs run the same gateway calls on every provider. Where a step
//! is provider specific (finding and mounting a root volume) the verb takes
//! a small hook trait instead.

use crate::command::{Invocation, Phases, Target};
use crate::error::{CommandError, Result};
use crate::gateway::{
    InstanceDescriptor, InstanceQuery, InstanceState, ProviderGateway, VolumeDescriptor,
};
use async_trait::async_trait;
use serde_json::json;

/// Unwrap the single instance a `resolve_target` hook produced
pub fn target_instance(target: Option<Target>) -> Result<InstanceDescriptor> {
    match target {
        Some(Target::Instance(instance)) => Ok(instance),
        Some(Target::RootVolume { instance, .. }) => Ok(instance),
        _ => Err(CommandError::operational("No target instance was resolved")),
    }
}

/// Provider half of a root volume swap
#[async_trait]
pub trait RootVolumeHooks: Send + Sync {
    /// The boot volume currently attached to `host`
    fn current_root_volume(&self, host: &InstanceDescriptor) -> Result<VolumeDescriptor>;

    /// Attach `source` to `host` as its boot volume
    async fn mount_root_volume(
        &self,
        gateway: &dyn ProviderGateway,
        host: &InstanceDescriptor,
        source: &str,
    ) -> Result<()>;
}

/// `instance replace_root_volume`: stop, detach, attach, start.
///
/// Nothing is rolled back when a step fails; the instance is left in
/// whatever state the failed step reached.
pub struct ReplaceRootVolume<H> {
    hooks: H,
}

impl<H: RootVolumeHooks> ReplaceRootVolume<H> {
    pub fn new(hooks: H) -> Self {
        Self { hooks }
    }
}

#[async_trait]
impl<H: RootVolumeHooks> Phases for ReplaceRootVolume<H> {
    async fn resolve_target(&self, invocation: &Invocation<'_>) -> Result<Option<Target>> {
        let instance = invocation.resolve_host().await?;
        let current = self.hooks.current_root_volume(&instance)?;
        Ok(Some(Target::RootVolume { instance, current }))
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let (host, current) = match target {
            Some(Target::RootVolume { instance, current }) => (instance, current),
            _ => return Err(CommandError::operational("No root volume was resolved")),
        };
        let replacement = invocation.args.require_str("replacement_disk")?;
        let ssh_port = invocation.args.port("custom_ssh_port")?.unwrap_or(22);
        let device_name = current.device_name.as_deref().ok_or_else(|| {
            CommandError::operational(format!("Host {} has no root volume device", host.name))
        })?;

        tracing::info!("Stopping {} to replace its root volume", host.name);
        invocation.gateway.stop_instance(&host).await?;

        tracing::info!("Detaching {} from {}", device_name, host.name);
        invocation.gateway.unmount_disk(&host, device_name).await?;

        tracing::info!("Attaching {} to {} as boot volume", replacement, host.name);
        self.hooks
            .mount_root_volume(invocation.gateway, &host, replacement)
            .await?;

        invocation.gateway.start_instance(&host, ssh_port).await?;

        Ok(json!({
            "instance": host.name,
            "replaced": current.source,
            "root_volume": replacement,
        }))
    }
}

/// `instance destroy`: delete the named host when it is in one of `states`.
///
/// A host outside `states`, or no host at all, deletes nothing.
pub struct DestroyInstances {
    states: Vec<InstanceState>,
}

impl DestroyInstances {
    pub fn new(states: impl IntoIterator<Item = InstanceState>) -> Self {
        Self {
            states: states.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Phases for DestroyInstances {
    async fn resolve_target(&self, invocation: &Invocation<'_>) -> Result<Option<Target>> {
        let query = InstanceQuery::from_args(invocation.args);
        let targets = match invocation.gateway.get_host_info(&query).await? {
            Some(host) if self.states.contains(&host.state) => vec![host],
            Some(host) => {
                tracing::debug!("Skipping {} in state {}", host.name, host.state);
                Vec::new()
            }
            None => {
                tracing::debug!("Host {} does not exist", query.search_pattern);
                Vec::new()
            }
        };

        Ok(Some(Target::Instances(targets)))
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let instances = match target {
            Some(Target::Instances(instances)) => instances,
            _ => Vec::new(),
        };
        let release_ip = invocation.args.flag("delete_static_public_ip");

        let mut deleted = Vec::new();
        for instance in instances {
            tracing::info!("Deleting instance {}", instance.name);
            invocation
                .gateway
                .delete_instance(&instance, release_ip)
                .await?;
            deleted.push(instance.name);
        }

        Ok(json!({ "deleted": deleted }))
    }
}

/// `instance change_instance_type`.
///
/// The instance is expected to be stopped already; that is not checked.
pub struct ChangeInstanceType;

#[async_trait]
impl Phases for ChangeInstanceType {
    async fn resolve_target(&self, invocation: &Invocation<'_>) -> Result<Option<Target>> {
        Ok(Some(Target::Instance(invocation.resolve_host().await?)))
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let host = target_instance(target)?;
        let instance_type = invocation.args.require_str("instance_type")?;

        tracing::info!("Changing {} to {}", host.name, instance_type);
        invocation
            .gateway
            .change_instance_type(&host, instance_type)
            .await?;

        Ok(json!({ "instance": host.name, "instance_type": instance_type }))
    }
}
