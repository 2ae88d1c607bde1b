//! Preemptible price lookup through the Cloud Billing catalog
//!
//! GCE bills a preemptible machine as separate core and RAM SKUs per
//! machine family and region. The hourly price of a machine type is
//! `cores * core_price + memory_gb * ram_price`.

use crate::error::{GcpError, Result};
use serde::Deserialize;

/// Catalog service id of Compute Engine
const COMPUTE_SERVICE: &str = "6F81-5844-456A";
const CATALOG_URL: &str = "https://cloudbilling.googleapis.com/v1/services";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkuPage {
    pub skus: Vec<Sku>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sku {
    pub description: String,
    pub category: SkuCategory,
    pub service_regions: Vec<String>,
    pub pricing_info: Vec<PricingInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkuCategory {
    pub resource_group: String,
    pub usage_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingInfo {
    pub pricing_expression: PricingExpression,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingExpression {
    pub tiered_rates: Vec<TieredRate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TieredRate {
    pub unit_price: Money,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Money {
    pub units: String,
    pub nanos: i64,
}

impl Money {
    pub fn amount(&self) -> f64 {
        let units: f64 = self.units.parse().unwrap_or(0.0);
        units + self.nanos as f64 / 1e9
    }
}

impl Sku {
    /// Price of the highest tier, which is the steady-state rate
    pub fn unit_price(&self) -> Option<f64> {
        self.pricing_info
            .first()?
            .pricing_expression
            .tiered_rates
            .last()
            .map(|rate| rate.unit_price.amount())
    }

    fn matches(&self, family: &str, region: &str, resource_group: &str) -> bool {
        let prefix = format!("Preemptible {} ", family);
        self.category.usage_type == "Preemptible"
            && self.category.resource_group == resource_group
            && self.service_regions.iter().any(|r| r == region)
            && self.description.starts_with(&prefix)
    }
}

/// Machine family as it appears in SKU descriptions (`n2-standard-8` -> `N2`)
pub fn machine_family(instance_type: &str) -> String {
    instance_type
        .split('-')
        .next()
        .unwrap_or(instance_type)
        .to_uppercase()
}

/// Hourly preemptible price of a machine shape
pub fn preemptible_price(
    skus: &[Sku],
    region: &str,
    instance_type: &str,
    cores: i64,
    memory_gb: f64,
) -> Option<f64> {
    let family = machine_family(instance_type);
    let core = skus
        .iter()
        .find(|s| s.matches(&family, region, "CPU"))?
        .unit_price()?;
    let ram = skus
        .iter()
        .find(|s| s.matches(&family, region, "RAM"))?
        .unit_price()?;
    Some(cores as f64 * core + memory_gb * ram)
}

/// Billing catalog client
pub struct BillingCatalog {
    client: reqwest::Client,
}

impl Default for BillingCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingCatalog {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Every Compute Engine SKU, following pagination
    pub async fn compute_skus(&self, access_token: &str) -> Result<Vec<Sku>> {
        let url = format!("{}/{}/skus", CATALOG_URL, COMPUTE_SERVICE);
        let mut skus = Vec::new();
        let mut page_token = String::new();

        loop {
            tracing::debug!("Fetching billing SKUs page '{}'", page_token);
            let response = self
                .client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("pageToken", page_token.as_str())])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(GcpError::CommandFailed(format!(
                    "billing catalog returned {}",
                    response.status()
                )));
            }

            let page: SkuPage = response.json().await?;
            skus.extend(page.skus);
            if page.next_page_token.is_empty() {
                break;
            }
            page_token = page.next_page_token;
        }

        Ok(skus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku(description: &str, group: &str, region: &str, units: &str, nanos: i64) -> Sku {
        serde_json::from_value(serde_json::json!({
            "description": description,
            "category": {"resourceGroup": group, "usageType": "Preemptible"},
            "serviceRegions": [region],
            "pricingInfo": [{
                "pricingExpression": {
                    "tieredRates": [{"unitPrice": {"units": units, "nanos": nanos}}]
                }
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_machine_family() {
        assert_eq!(machine_family("n1-standard-4"), "N1");
        assert_eq!(machine_family("c2-standard-8"), "C2");
    }

    #[test]
    fn test_preemptible_price() {
        let skus = vec![
            sku("Preemptible N1 Predefined Instance Core running in Americas", "CPU", "us-west1", "0", 6_655_000),
            sku("Preemptible N1 Predefined Instance Ram running in Americas", "RAM", "us-west1", "0", 892_000),
            sku("Preemptible N2 Instance Core running in Americas", "CPU", "us-west1", "0", 7_000_000),
        ];

        let price = preemptible_price(&skus, "us-west1", "n1-standard-4", 4, 15.0).unwrap();
        let expected = 4.0 * 0.006655 + 15.0 * 0.000892;
        assert!((price - expected).abs() < 1e-9);
    }

    #[test]
    fn test_no_price_for_other_region() {
        let skus = vec![
            sku("Preemptible N1 Predefined Instance Core running in Americas", "CPU", "us-west1", "0", 1),
            sku("Preemptible N1 Predefined Instance Ram running in Americas", "RAM", "us-west1", "0", 1),
        ];
        assert!(preemptible_price(&skus, "europe-west1", "n1-standard-4", 4, 15.0).is_none());
    }
}
