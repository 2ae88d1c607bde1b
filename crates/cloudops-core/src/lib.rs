//! cloudops lifecycle command framework
//!
//! Provider-neutral half of cloudops: command specs and validation, the
//! phase engine that runs every lifecycle verb, the registry that maps
//! `(provider, verb)` to a command, and the gateway trait providers
//! implement.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                cloudops CLI                   │
//! │          (cloudops gcp instance ...)          │
//! └──────────────────┬───────────────────────────┘
//!                    │ (provider, verb, tokens)
//! ┌──────────────────▼───────────────────────────┐
//! │               cloudops-core                   │
//! │  CommandRegistry ─▶ LifecycleCommand          │
//! │                      │ validate / phases      │
//! │                      ▼                        │
//! │               trait ProviderGateway           │
//! └──────────────────┬───────────────────────────┘
//!                    │
//!            ┌───────▼───────┐
//!            │ cloudops-gcp  │
//!            └───────────────┘
//! ```

pub mod command;
pub mod error;
pub mod gateway;
pub mod identifier;
pub mod lifecycle;
pub mod registry;
pub mod result;
pub mod spec;
pub mod verbs;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use command::{Invocation, LifecycleCommand, Phase, Phases, Target};
pub use error::{
    CommandError, GatewayError, GatewayResult, LookupError, Result, SpecError, ValidationError,
};
pub use gateway::{
    AuthStatus, DiskSpec, ImageRef, InstanceDescriptor, InstanceQuery, InstanceSpec,
    InstanceState, InstanceTypeQuery, MountDisk, ProviderGateway, SpotPriceQuery, VolumeDescriptor,
    VolumeLayout, VpcQuery, ZoneQuery,
};
pub use identifier::{MAX_IDENTIFIER_LEN, clamp_identifier, clamp_with_suffix};
pub use lifecycle::{
    ChangeInstanceType, DestroyInstances, ReplaceRootVolume, RootVolumeHooks, target_instance,
};
pub use registry::{CommandRegistry, RegistryBuilder};
pub use result::{ExecutionResult, Failure, FailureKind};
pub use spec::{CommandSpec, FlagDefinition, FlagType, FlagValue, InvocationArgs, RawArgs};
