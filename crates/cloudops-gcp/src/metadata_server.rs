//! GCE metadata server client
//!
//! Answers "which machine am I on" without credentials. Only reachable from
//! inside GCE.

use crate::error::{GcpError, Result};
use crate::gcloud::{last_segment, zone_region};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MetadataServer {
    base_url: String,
    client: reqwest::Client,
}

impl MetadataServer {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get(&self, path: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GcpError::Metadata(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }

        Ok(response.text().await?.trim().to_string())
    }

    /// Name, project, zone, region and network of this machine
    pub async fn current_host(&self) -> Result<serde_json::Value> {
        let name = self.get("instance/name").await?;
        let project = self.get("project/project-id").await?;
        let zone = self.get("instance/zone").await?;
        let network = self.get("instance/network-interfaces/0/network").await?;

        let zone = last_segment(&zone);
        Ok(serde_json::json!({
            "name": name,
            "project": project,
            "host_project": project,
            "zone": zone,
            "region": zone_region(zone),
            "network": last_segment(&network),
        }))
    }
}
