//! GCP query verbs

use async_trait::async_trait;
use cloudops_core::{
    CommandError, CommandSpec, FlagDefinition, InstanceTypeQuery, InvocationArgs, Invocation,
    Phases, Result, SpecError, SpotPriceQuery, Target, VpcQuery, ZoneQuery,
};
use serde_json::json;

pub(crate) fn custom_payload_flag() -> FlagDefinition {
    FlagDefinition::string("custom_payload").help("JSON payload of per-region data")
}

/// Parsed `--custom_payload`, `None` when absent
pub(crate) fn custom_payload(args: &InvocationArgs) -> Result<Option<serde_json::Value>> {
    args.str("custom_payload")
        .map(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| CommandError::operational(format!("Invalid custom payload: {}", e)))
        })
        .transpose()
}

pub(crate) fn vpc_query(args: &InvocationArgs) -> Result<VpcQuery> {
    Ok(VpcQuery {
        region: args.str("region").map(str::to_string),
        custom_payload: custom_payload(args)?,
    })
}

/// `query regions`
pub struct GcpQueryRegions;

#[async_trait]
impl Phases for GcpQueryRegions {
    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        Ok(invocation.gateway.get_regions().await?)
    }
}

/// `query vpc`
pub struct GcpQueryVpc;

#[async_trait]
impl Phases for GcpQueryVpc {
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        spec.with_flags([custom_payload_flag()])
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let query = vpc_query(invocation.args)?;
        Ok(invocation.gateway.query_vpc(&query).await?)
    }
}

/// `query zones`
pub struct GcpQueryZones;

#[async_trait]
impl Phases for GcpQueryZones {
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        spec.with_flags([
            FlagDefinition::string("dest_vpc_id")
                .help("Custom VPC to get zone and subnet info for"),
            custom_payload_flag(),
        ])
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let args = invocation.args;
        let query = ZoneQuery {
            region: args.str("region").map(str::to_string),
            dest_vpc_id: args.str("dest_vpc_id").map(str::to_string),
            custom_payload: custom_payload(args)?,
        };
        Ok(invocation.gateway.get_zones(&query).await?)
    }
}

/// `query instance_types`
pub struct GcpQueryInstanceTypes;

#[async_trait]
impl Phases for GcpQueryInstanceTypes {
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        spec.with_flags([
            FlagDefinition::list("regions"),
            custom_payload_flag(),
            FlagDefinition::switch("gcp_internal").help("Display internal testing instance types"),
        ])
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let args = invocation.args;
        let query = InstanceTypeQuery {
            regions: args.list("regions").to_vec(),
            internal: args.flag("gcp_internal"),
            custom_payload: custom_payload(args)?,
        };
        Ok(invocation.gateway.get_instance_types(&query).await?)
    }
}

/// `query current-host`: metadata of the machine cloudops runs on
pub struct GcpQueryCurrentHost;

#[async_trait]
impl Phases for GcpQueryCurrentHost {
    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        Ok(invocation.gateway.get_current_host_info().await?)
    }
}

/// `query spot-pricing`
pub struct GcpQuerySpotPricing;

#[async_trait]
impl Phases for GcpQuerySpotPricing {
    fn add_extra_args(&self, spec: CommandSpec) -> std::result::Result<CommandSpec, SpecError> {
        spec.with_flags([FlagDefinition::string("instance_type")
            .required()
            .help("The instance type to get pricing info for")])
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        _target: Option<Target>,
    ) -> Result<serde_json::Value> {
        let args = invocation.args;
        let region = args
            .str("region")
            .ok_or_else(|| CommandError::operational("Must specify a region to query spot price"))?;
        let query = SpotPriceQuery {
            region: region.to_string(),
            zone: args.str("zone").map(str::to_string),
            instance_type: args.require_str("instance_type")?.to_string(),
        };
        let price = invocation.gateway.get_spot_pricing(&query).await?;
        Ok(json!({ "SpotPrice": price }))
    }
}
