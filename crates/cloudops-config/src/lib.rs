//! cloudops configuration
//!
//! Settings live in a single YAML file. A missing file is not an error;
//! every field has a default.

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file directly
pub const CONFIG_ENV: &str = "CLOUDOPS_CONFIG";

const CANDIDATES: [&str; 4] = [
    "cloudops.local.yaml",
    ".cloudops.local.yaml",
    "cloudops.yaml",
    ".cloudops.yaml",
];

/// Top-level config file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudopsConfig {
    pub gcp: GcpConfig,
}

/// `gcp:` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// GCP project, falls back to the gcloud default project
    pub project: Option<String>,

    pub gcloud_path: String,

    /// User written into instance SSH key metadata
    pub ssh_user: String,

    pub image_family: String,

    pub image_project: String,

    /// VPC network used when a command does not name one
    pub network: Option<String>,

    pub metadata_url: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project: None,
            gcloud_path: "gcloud".to_string(),
            ssh_user: "centos".to_string(),
            image_family: "centos-7".to_string(),
            image_project: "centos-cloud".to_string(),
            network: None,
            metadata_url: "http://metadata.google.internal/computeMetadata/v1".to_string(),
        }
    }
}

/// Global config path (`~/.config/cloudops/config.yaml`)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cloudops").join("config.yaml"))
}

/// Search `dir` and `dir/.cloudops/` for a project config file
pub fn find_config_file_in(dir: &Path) -> Option<PathBuf> {
    let project_dir = dir.join(".cloudops");
    [dir.to_path_buf(), project_dir]
        .iter()
        .filter(|d| d.is_dir())
        .flat_map(|d| CANDIDATES.iter().map(move |name| d.join(name)))
        .find(|path| path.exists())
}

/// Locate the config file.
///
/// Priority:
/// 1. `CLOUDOPS_CONFIG`
/// 2. current directory: cloudops.local.yaml, .cloudops.local.yaml, cloudops.yaml, .cloudops.yaml
/// 3. `./.cloudops/` with the same names
/// 4. `~/.config/cloudops/config.yaml`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        tracing::warn!("{} points to missing file {}", CONFIG_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_config_file_in(&current_dir) {
        return Ok(Some(path));
    }

    Ok(global_config_path().filter(|path| path.exists()))
}

/// Parse one config file
pub fn load_file(path: &Path) -> Result<CloudopsConfig> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(CloudopsConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load an explicit file, or discover one, or fall back to defaults
pub fn load(explicit: Option<&Path>) -> Result<CloudopsConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file()?,
    };

    match path {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            load_file(&path)
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(CloudopsConfig::default())
        }
    }
}
