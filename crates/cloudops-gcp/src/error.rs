//! GCP provider error types

use cloudops_core::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("gcloud not found at '{0}'. Install the Google Cloud SDK or set gcp.gcloud_path")]
    GcloudNotFound(String),

    #[error("gcloud authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("gcloud command failed: {0}")]
    CommandFailed(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Zone is required for {0}")]
    ZoneRequired(String),

    #[error("No pricing found for {instance_type} in {region}")]
    PricingNotFound {
        region: String,
        instance_type: String,
    },

    /// Rejected by the provider's own preconditions, shown to the operator as is
    #[error("{0}")]
    Runtime(String),

    #[error("Metadata server error: {0}")]
    Metadata(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GcpError>;

impl From<GcpError> for GatewayError {
    fn from(e: GcpError) -> Self {
        match e {
            GcpError::GcloudNotFound(_) => GatewayError::InvalidConfig(e.to_string()),
            GcpError::AuthenticationFailed(msg) => GatewayError::AuthenticationFailed(msg),
            GcpError::CommandFailed(msg) => GatewayError::CommandFailed(msg),
            GcpError::InstanceNotFound(name) => GatewayError::ResourceNotFound(name),
            GcpError::ZoneRequired(_) | GcpError::Runtime(_) => {
                GatewayError::Runtime(e.to_string())
            }
            GcpError::IoError(io) => GatewayError::Io(io),
            GcpError::JsonError(json) => GatewayError::Json(json),
            other => GatewayError::ApiError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_maps_to_runtime() {
        let err: GatewayError = GcpError::Runtime("Network already exists".into()).into();
        assert!(matches!(err, GatewayError::Runtime(_)));
        assert_eq!(err.to_string(), "Network already exists");
    }

    #[test]
    fn test_command_failure_keeps_stderr() {
        let err: GatewayError = GcpError::CommandFailed("quota exceeded".into()).into();
        assert_eq!(err.to_string(), "Command execution failed: quota exceeded");
    }

    #[test]
    fn test_missing_zone_is_operational() {
        let err: GatewayError = GcpError::ZoneRequired("create_disk".into()).into();
        assert_eq!(err.to_string(), "Zone is required for create_disk");
    }
}
