use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, ShardError};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub openstack: OpenStackConfig,
    #[serde(default)]
    pub waits: WaitSettings,
}

/// Connection settings for the control plane.
#[derive(Clone, Deserialize)]
pub struct OpenStackConfig {
    /// Identity v3 endpoint, e.g. `https://keystone.example:5000/v3`.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub project_id: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    /// Explicit service endpoints; when unset they come from the token catalog.
    pub compute_endpoint: Option<String>,
    pub network_endpoint: Option<String>,
    pub volume_endpoint: Option<String>,
}

impl fmt::Debug for OpenStackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenStackConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"*****")
            .field("project_id", &self.project_id)
            .field("domain", &self.domain)
            .field("verify_ssl", &self.verify_ssl)
            .field("compute_endpoint", &self.compute_endpoint)
            .field("network_endpoint", &self.network_endpoint)
            .field("volume_endpoint", &self.volume_endpoint)
            .finish()
    }
}

/// Plain string lookups supplied by the orchestration host.
pub trait PropertySource {
    fn property(&self, key: &str) -> Option<String>;
}

impl PropertySource for HashMap<String, String> {
    fn property(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl OpenStackConfig {
    /// Build connection settings from host properties.
    ///
    /// Keys: `endpoint`, `username`, `password`, `projectId` (required) and
    /// `domain` (optional, defaults to `Default`). All missing keys are
    /// reported in one error.
    pub fn from_properties(props: &dyn PropertySource) -> Result<Self> {
        let lookup = |key: &str| props.property(key).filter(|v| !v.trim().is_empty());

        let endpoint = lookup("endpoint");
        let username = lookup("username");
        let password = lookup("password");
        let project_id = lookup("projectId");

        let missing: Vec<&str> = [
            ("endpoint", endpoint.is_none()),
            ("username", username.is_none()),
            ("password", password.is_none()),
            ("projectId", project_id.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        match (endpoint, username, password, project_id) {
            (Some(endpoint), Some(username), Some(password), Some(project_id)) => Ok(Self {
                endpoint,
                username,
                password,
                project_id,
                domain: lookup("domain").unwrap_or_else(default_domain),
                verify_ssl: default_verify_ssl(),
                compute_endpoint: None,
                network_endpoint: None,
                volume_endpoint: None,
            }),
            _ => Err(ShardError::Configuration(format!(
                "Required configuration details do not exist: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Timeout and poll interval for one kind of readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBudget {
    pub timeout_seconds: u64,
    pub poll_interval_seconds: u64,
}

impl WaitBudget {
    pub const fn new(timeout_seconds: u64, poll_interval_seconds: u64) -> Self {
        Self {
            timeout_seconds,
            poll_interval_seconds,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "WaitSettingsFile")]
pub struct WaitSettings {
    pub volume: WaitBudget,
    pub instance: WaitBudget,
    pub network: WaitBudget,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            volume: default_volume_wait(),
            instance: default_instance_wait(),
            network: default_network_wait(),
        }
    }
}

/// One `[waits.<kind>]` table as written. Missing keys take the kind's default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BudgetOverrides {
    timeout_seconds: Option<u64>,
    poll_interval_seconds: Option<u64>,
}

impl BudgetOverrides {
    fn resolve(self, defaults: WaitBudget) -> WaitBudget {
        WaitBudget::new(
            self.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            self.poll_interval_seconds.unwrap_or(defaults.poll_interval_seconds),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct WaitSettingsFile {
    #[serde(default)]
    volume: BudgetOverrides,
    #[serde(default)]
    instance: BudgetOverrides,
    #[serde(default)]
    network: BudgetOverrides,
}

impl From<WaitSettingsFile> for WaitSettings {
    fn from(file: WaitSettingsFile) -> Self {
        Self {
            volume: file.volume.resolve(default_volume_wait()),
            instance: file.instance.resolve(default_instance_wait()),
            network: file.network.resolve(default_network_wait()),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        Self::read(path).map_err(|e| ShardError::Configuration(format!("{:#}", e)))
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

// Default functions
fn default_domain() -> String {
    "Default".to_string()
}

fn default_verify_ssl() -> bool {
    true
}

fn default_volume_wait() -> WaitBudget {
    WaitBudget::new(3000, 10)
}

fn default_instance_wait() -> WaitBudget {
    WaitBudget::new(5000, 10)
}

fn default_network_wait() -> WaitBudget {
    WaitBudget::new(3000, 10)
}
