//! Provider metadata and per-region payloads
//!
//! [`GcpMetadata`] is the provider's static knowledge (network name, known
//! regions). `--metadata_override` files are merged over it key by key.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpMetadata {
    /// VPC network the provider works in
    pub network: Option<String>,

    /// Source ranges allowed by the internal firewall rule
    pub internal_ranges: Vec<String>,

    pub regions: BTreeMap<String, RegionMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionMetadata {
    pub zones: Vec<String>,
    pub subnetwork: Option<String>,
}

impl GcpMetadata {
    pub fn with_network(network: Option<String>) -> Self {
        Self {
            network,
            internal_ranges: vec!["10.0.0.0/8".to_string()],
            regions: BTreeMap::new(),
        }
    }

    /// Merge a YAML override file into this metadata
    pub async fn apply_override(&mut self, path: &Path) -> Result<()> {
        let content = tokio::fs::read_to_string(path).await?;
        self.merge_yaml(&content)
    }

    pub fn merge_yaml(&mut self, content: &str) -> Result<()> {
        let overlay: serde_yaml::Value = serde_yaml::from_str(content)?;
        let mut base = serde_yaml::to_value(&*self)?;
        merge_values(&mut base, overlay);
        *self = serde_yaml::from_value(base)?;
        Ok(())
    }
}

/// Deep merge: mappings merge recursively, anything else is replaced
fn merge_values(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base), serde_yaml::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, serde_yaml::Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

/// `--custom_payload` of network and query commands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomPayload {
    /// VPC of the host running cloudops
    pub host_vpc_id: Option<String>,

    /// VPC to place instances in
    pub dest_vpc_id: Option<String>,

    pub per_region_metadata: BTreeMap<String, PerRegionMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerRegionMetadata {
    pub subnet_id: Option<String>,
    pub custom_image_id: Option<String>,
}

impl CustomPayload {
    /// Payloads that do not match the expected shape count as empty
    pub fn from_value(value: Option<&serde_json::Value>) -> Self {
        value
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Network to act on, by precedence: destination VPC, host VPC, `fallback`
    pub fn network<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.dest_vpc_id
            .as_deref()
            .or(self.host_vpc_id.as_deref())
            .unwrap_or(fallback)
    }

    pub fn regions(&self) -> Vec<String> {
        self.per_region_metadata.keys().cloned().collect()
    }
}
