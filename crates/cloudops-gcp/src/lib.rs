//! Google Cloud provider for cloudops
//!
//! Implements [`ProviderGateway`](cloudops_core::ProviderGateway) on top of
//! the `gcloud` CLI and registers the GCP flavour of every lifecycle verb.
//!
//! # Requirements
//!
//! - `gcloud` must be installed and logged in (`gcloud auth login`)
//! - `query current-host` and the metadata-derived fields need to run on a
//!   GCE instance
//!
//! # Example
//!
//! ```ignore
//! use cloudops_core::CommandRegistry;
//! use cloudops_gcp::GcpGateway;
//!
//! let config = cloudops_config::load(None)?;
//! let registry = cloudops_gcp::register(CommandRegistry::builder(), &config.gcp)?.build();
//! let gateway = GcpGateway::new(config.gcp);
//!
//! let result = registry.invoke(&gateway, "query regions", &[] as &[&str]).await?;
//! println!("{}", result.to_json());
//! ```

pub mod billing;
pub mod error;
pub mod gateway;
pub mod gcloud;
pub mod instance;
pub mod metadata;
pub mod metadata_server;
pub mod network;
pub mod query;

pub use error::{GcpError, Result};
pub use gateway::GcpGateway;
pub use instance::{
    GcpCreateInstances, GcpCreateRootVolumes, GcpPauseInstances, GcpProvisionInstances,
    GcpResumeInstances, GcpRootVolume,
};
pub use metadata::{CustomPayload, GcpMetadata};
pub use network::{GcpNetwork, NetworkAction};
pub use query::{
    GcpQueryCurrentHost, GcpQueryInstanceTypes, GcpQueryRegions, GcpQuerySpotPricing, GcpQueryVpc,
    GcpQueryZones,
};

use cloudops_config::GcpConfig;
use cloudops_core::{
    ChangeInstanceType, DestroyInstances, InstanceState, LifecycleCommand, RegistryBuilder,
    ReplaceRootVolume, SpecError, verbs,
};

/// Provider name used for registration and dispatch
pub const PROVIDER: &str = "gcp";

/// Register every GCP verb on `builder`
pub fn register(
    builder: RegistryBuilder,
    config: &GcpConfig,
) -> std::result::Result<RegistryBuilder, SpecError> {
    let commands = [
        (
            verbs::INSTANCE_CREATE,
            LifecycleCommand::new(
                verbs::create_instance()?,
                GcpCreateInstances::new(&config.ssh_user),
            )?,
        ),
        (
            verbs::INSTANCE_PROVISION,
            LifecycleCommand::new(verbs::provision_instance()?, GcpProvisionInstances)?,
        ),
        (
            verbs::INSTANCE_CREATE_ROOT_VOLUMES,
            LifecycleCommand::new(verbs::create_root_volumes()?, GcpCreateRootVolumes)?,
        ),
        (
            verbs::INSTANCE_REPLACE_ROOT_VOLUME,
            LifecycleCommand::new(
                verbs::replace_root_volume()?,
                ReplaceRootVolume::new(GcpRootVolume),
            )?,
        ),
        (
            verbs::INSTANCE_DESTROY,
            LifecycleCommand::new(
                verbs::destroy_instance()?,
                DestroyInstances::new([InstanceState::Running, InstanceState::Terminated]),
            )?,
        ),
        (
            verbs::INSTANCE_CHANGE_TYPE,
            LifecycleCommand::new(verbs::change_instance_type()?, ChangeInstanceType)?,
        ),
        (
            verbs::INSTANCE_PAUSE,
            LifecycleCommand::new(verbs::pause_instance()?, GcpPauseInstances)?,
        ),
        (
            verbs::INSTANCE_RESUME,
            LifecycleCommand::new(verbs::resume_instance()?, GcpResumeInstances)?,
        ),
        (
            verbs::QUERY_REGIONS,
            LifecycleCommand::new(verbs::query(verbs::QUERY_REGIONS)?, GcpQueryRegions)?,
        ),
        (
            verbs::QUERY_VPC,
            LifecycleCommand::new(verbs::query(verbs::QUERY_VPC)?, GcpQueryVpc)?,
        ),
        (
            verbs::QUERY_ZONES,
            LifecycleCommand::new(verbs::query(verbs::QUERY_ZONES)?, GcpQueryZones)?,
        ),
        (
            verbs::QUERY_INSTANCE_TYPES,
            LifecycleCommand::new(
                verbs::query(verbs::QUERY_INSTANCE_TYPES)?,
                GcpQueryInstanceTypes,
            )?,
        ),
        (
            verbs::QUERY_CURRENT_HOST,
            LifecycleCommand::new(verbs::current_host()?, GcpQueryCurrentHost)?,
        ),
        (
            verbs::QUERY_SPOT_PRICING,
            LifecycleCommand::new(verbs::query(verbs::QUERY_SPOT_PRICING)?, GcpQuerySpotPricing)?,
        ),
        (
            verbs::NETWORK_BOOTSTRAP,
            LifecycleCommand::new(
                verbs::query(verbs::NETWORK_BOOTSTRAP)?,
                GcpNetwork::new(NetworkAction::Bootstrap),
            )?,
        ),
        (
            verbs::NETWORK_CLEANUP,
            LifecycleCommand::new(
                verbs::query(verbs::NETWORK_CLEANUP)?,
                GcpNetwork::new(NetworkAction::Cleanup),
            )?,
        ),
        (
            verbs::NETWORK_QUERY,
            LifecycleCommand::new(
                verbs::query(verbs::NETWORK_QUERY)?,
                GcpNetwork::new(NetworkAction::Query),
            )?,
        ),
    ];

    commands
        .into_iter()
        .try_fold(builder, |builder, (verb, command)| {
            builder.register(PROVIDER, verb, command)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudops_core::testing::RecordingGateway;
    use cloudops_core::{CommandRegistry, FailureKind};
    use serde_json::json;

    fn registry() -> cloudops_core::CommandRegistry {
        register(CommandRegistry::builder(), &GcpConfig::default())
            .unwrap()
            .build()
    }

    #[test]
    fn test_registers_every_verb() {
        let registry = registry();
        assert_eq!(registry.len(), 17);
        assert_eq!(registry.providers(), vec![PROVIDER]);
        for verb in [
            verbs::INSTANCE_CREATE,
            verbs::INSTANCE_DESTROY,
            verbs::QUERY_CURRENT_HOST,
            verbs::NETWORK_QUERY,
        ] {
            assert!(registry.resolve(PROVIDER, verb).is_ok(), "{} missing", verb);
        }
    }

    #[test]
    fn test_double_registration_fails() {
        let builder = register(CommandRegistry::builder(), &GcpConfig::default()).unwrap();
        let err = register(builder, &GcpConfig::default()).unwrap_err();
        assert!(matches!(err, SpecError::DuplicateCommand { .. }));
    }

    #[test]
    fn test_only_current_host_skips_credentials() {
        let registry = registry();
        let exempt: Vec<&str> = registry
            .commands(PROVIDER)
            .filter(|c| !c.spec().requires_credentials())
            .map(|c| c.name())
            .collect();
        assert_eq!(exempt, vec![verbs::QUERY_CURRENT_HOST]);
    }

    #[tokio::test]
    async fn test_invoke_unknown_flag() {
        let registry = registry();
        let gateway = RecordingGateway::new();

        let result = registry
            .invoke(&gateway, verbs::QUERY_REGIONS, &["--bogus", "1"])
            .await
            .unwrap();

        assert_eq!(
            result.to_json(),
            json!({ "error": "argument --bogus: unrecognized argument" })
        );
        assert_eq!(result.exit_code(), 0);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_unknown_verb() {
        let registry = registry();
        let gateway = RecordingGateway::new();

        let result = registry
            .invoke(&gateway, "instance teleport", &[] as &[&str])
            .await
            .unwrap();

        assert_eq!(
            result.failure_details().map(|f| f.kind),
            Some(FailureKind::Lookup)
        );
        assert_eq!(result.exit_code(), 2);
    }
}
