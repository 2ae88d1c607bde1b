//! Lifecycle command engine
//!
//! Every command runs the same fixed sequence:
//!
//! ```text
//! validate ─▶ authenticate ─▶ preprocess_args ─▶ resolve_target ─▶ execute ─▶ render
//! ```
//!
//! `add_extra_args` runs once when the command is built. Providers implement
//! [`Phases`] and override only the hooks where their API differs; `execute`
//! is the one hook without a usable default.

use crate::error::{CommandError, Result, SpecError};
use crate::gateway::{InstanceDescriptor, InstanceQuery, ProviderGateway, VolumeDescriptor};
use crate::result::ExecutionResult;
use crate::spec::{CommandSpec, InvocationArgs, RawArgs};
use async_trait::async_trait;
use serde::Serialize;

/// A step of the command sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validate,
    Authenticate,
    AddExtraArgs,
    PreprocessArgs,
    ResolveTarget,
    Execute,
    Render,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Validate => write!(f, "validate"),
            Phase::Authenticate => write!(f, "authenticate"),
            Phase::AddExtraArgs => write!(f, "add_extra_args"),
            Phase::PreprocessArgs => write!(f, "preprocess_args"),
            Phase::ResolveTarget => write!(f, "resolve_target"),
            Phase::Execute => write!(f, "execute"),
            Phase::Render => write!(f, "render"),
        }
    }
}

/// What a command acts on, produced by `resolve_target`
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Instance(InstanceDescriptor),
    Instances(Vec<InstanceDescriptor>),
    RootVolume {
        instance: InstanceDescriptor,
        current: VolumeDescriptor,
    },
}

/// Everything a hook can see during one invocation
pub struct Invocation<'a> {
    pub command: &'a str,
    pub args: &'a InvocationArgs,
    pub gateway: &'a dyn ProviderGateway,
}

impl Invocation<'_> {
    /// Fetch the host named by the standard instance flags.
    ///
    /// Always asks the gateway; descriptors are never reused across
    /// invocations.
    pub async fn resolve_host(&self) -> Result<InstanceDescriptor> {
        let query = InstanceQuery::from_args(self.args);
        self.gateway.get_host_info(&query).await?.ok_or_else(|| {
            CommandError::operational(format!("Host {} does not exist", query.search_pattern))
        })
    }
}

/// Hook set of one lifecycle verb
#[async_trait]
pub trait Phases: Send + Sync {
    /// Extend the base spec with provider flags
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        Ok(spec)
    }

    /// Side-effecting setup before the main action
    async fn preprocess_args(&self, _invocation: &Invocation<'_>) -> Result<()> {
        Ok(())
    }

    async fn resolve_target(&self, _invocation: &Invocation<'_>) -> Result<Option<Target>> {
        Ok(None)
    }

    async fn execute(
        &self,
        _invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        Err(CommandError::NotImplemented(Phase::Execute))
    }

    /// Turn the execute output into the success payload
    fn render(&self, output: serde_json::Value) -> Result<serde_json::Value> {
        Ok(output)
    }
}

/// A verb bound to its hooks and its final (extended) spec
pub struct LifecycleCommand {
    spec: CommandSpec,
    phases: Box<dyn Phases>,
}

impl std::fmt::Debug for LifecycleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCommand")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl LifecycleCommand {
    pub fn new(
        base: CommandSpec,
        phases: impl Phases + 'static,
    ) -> std::result::Result<Self, SpecError> {
        let spec = phases.add_extra_args(base)?;
        Ok(Self {
            spec,
            phases: Box::new(phases),
        })
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Parse CLI tokens against the spec, then [`LifecycleCommand::run`]
    pub async fn run_tokens<S: AsRef<str> + Sync>(
        &self,
        gateway: &dyn ProviderGateway,
        tokens: &[S],
    ) -> Result<ExecutionResult> {
        match self.spec.parse_tokens(tokens) {
            Ok(raw) => self.run(gateway, &raw).await,
            Err(e) => self.settle(Phase::Validate, e.into()),
        }
    }

    /// Run the full phase sequence.
    ///
    /// Returns `Err` only for fatal defects (an unimplemented hook); every
    /// other failure comes back as [`ExecutionResult::Failure`].
    pub async fn run(
        &self,
        gateway: &dyn ProviderGateway,
        raw: &RawArgs,
    ) -> Result<ExecutionResult> {
        let args = match self.spec.validate(raw) {
            Ok(args) => args,
            Err(e) => return self.settle(Phase::Validate, e.into()),
        };

        if self.spec.requires_credentials() {
            match gateway.check_auth().await {
                Ok(status) if status.authenticated => {
                    tracing::debug!(
                        "Authenticated with {} as {}",
                        gateway.name(),
                        status.account_info.as_deref().unwrap_or("unknown")
                    );
                }
                Ok(status) => {
                    let reason = status
                        .error
                        .unwrap_or_else(|| "credentials are not valid".to_string());
                    let error = crate::error::GatewayError::AuthenticationFailed(reason);
                    return self.settle(Phase::Authenticate, error.into());
                }
                Err(e) => return self.settle(Phase::Authenticate, e.into()),
            }
        }

        let invocation = Invocation {
            command: self.spec.name(),
            args: &args,
            gateway,
        };

        match self.run_phases(&invocation).await {
            Ok(payload) => Ok(ExecutionResult::success(payload)),
            Err((phase, e)) => self.settle(phase, e),
        }
    }

    async fn run_phases(
        &self,
        invocation: &Invocation<'_>,
    ) -> std::result::Result<serde_json::Value, (Phase, CommandError)> {
        tracing::debug!("{}: preprocess_args", self.name());
        self.phases
            .preprocess_args(invocation)
            .await
            .map_err(|e| (Phase::PreprocessArgs, e))?;

        tracing::debug!("{}: resolve_target", self.name());
        let target = self
            .phases
            .resolve_target(invocation)
            .await
            .map_err(|e| (Phase::ResolveTarget, e))?;

        tracing::debug!("{}: execute", self.name());
        let output = self
            .phases
            .execute(invocation, target)
            .await
            .map_err(|e| (Phase::Execute, e))?;

        self.phases.render(output).map_err(|e| (Phase::Render, e))
    }

    /// Decide between rendering a failure and propagating it
    fn settle(&self, phase: Phase, error: CommandError) -> Result<ExecutionResult> {
        if error.is_fatal() {
            tracing::error!("{} failed in {}: {}", self.name(), phase, error);
            return Err(error);
        }
        tracing::warn!("{} failed in {}: {}", self.name(), phase, error);
        Ok(ExecutionResult::from_error(Some(phase), &error))
    }
}
