//! GCP network verbs
//!
//! All three accept `--metadata_override`, applied to the gateway before
//! the network call runs.

use crate::query::{custom_payload_flag, vpc_query};
use async_trait::async_trait;
use cloudops_core::{
    CommandSpec, FlagDefinition, Invocation, Phases, Result, SpecError, Target,
};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAction {
    Bootstrap,
    Cleanup,
    Query,
}

/// `network bootstrap`, `network cleanup` and `network query`
pub struct GcpNetwork {
    action: NetworkAction,
}

impl GcpNetwork {
    pub fn new(action: NetworkAction) -> Self {
        Self { action }
    }
}

#[async_trait]
impl Phases for GcpNetwork {
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        spec.with_flags([
            FlagDefinition::string("metadata_override")
                .help("A custom YML metadata override file"),
            custom_payload_flag(),
        ])
    }

    async fn preprocess_args(&self, invocation: &Invocation<'_>) -> Result<()> {
        if let Some(file) = invocation.args.str("metadata_override") {
            invocation.gateway.update_metadata(Path::new(file)).await?;
        }
        Ok(())
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let query = vpc_query(invocation.args)?;
        let gateway = invocation.gateway;
        let output = match self.action {
            NetworkAction::Bootstrap => gateway.network_bootstrap(&query).await?,
            NetworkAction::Cleanup => gateway.network_cleanup(&query).await?,
            NetworkAction::Query => gateway.query_vpc(&query).await?,
        };
        Ok(output)
    }
}
