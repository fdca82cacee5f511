use crate::deployer::DeploySettings;
use crate::error::{DeployError, Result};
use crate::paths;
use crate::types::{ConfigurationReference, ExecutionMode, OperationKind};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// WebhookConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret expected in the `X-Gitlab-Token` header. Unset means
    /// `POST /deploy` is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4242
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            secret: None,
        }
    }
}

impl WebhookConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.address.parse().map_err(|_| {
            DeployError::InvalidConfig(format!("webhook.address '{}' is not an IP address", self.address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_flake_url")]
    pub flake_url: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_operation")]
    pub operation: OperationKind,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_agent_unit")]
    pub agent_unit: String,
    #[serde(default = "default_identity_option")]
    pub identity_option: String,
    #[serde(default = "default_machine_id_file")]
    pub machine_id_file: PathBuf,
    #[serde(default = "default_system_profile")]
    pub system_profile: PathBuf,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Falls back to an empty name, which `validate` rejects.
fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default()
}

fn default_flake_url() -> String {
    ".".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_STATE_DIR)
}

fn default_operation() -> OperationKind {
    OperationKind::Switch
}

fn default_agent_unit() -> String {
    paths::DEFAULT_AGENT_UNIT.to_string()
}

fn default_identity_option() -> String {
    paths::DEFAULT_IDENTITY_OPTION.to_string()
}

fn default_machine_id_file() -> PathBuf {
    PathBuf::from(paths::DEFAULT_MACHINE_ID_FILE)
}

fn default_system_profile() -> PathBuf {
    PathBuf::from(paths::DEFAULT_SYSTEM_PROFILE)
}

fn default_query_timeout() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            flake_url: default_flake_url(),
            state_dir: default_state_dir(),
            operation: default_operation(),
            dry_run: false,
            agent_unit: default_agent_unit(),
            identity_option: default_identity_option(),
            machine_id_file: default_machine_id_file(),
            system_profile: default_system_profile(),
            query_timeout_secs: default_query_timeout(),
            poll_interval_secs: None,
            webhook: WebhookConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| DeployError::filesystem(path, e))?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(DeployError::InvalidConfig("hostname must not be empty".into()));
        }
        // The hostname names the GC root file, so it must stay one path component.
        if self.hostname.contains(['/', '\0']) || self.hostname == "." || self.hostname == ".." {
            return Err(DeployError::InvalidConfig(format!(
                "hostname '{}' is not a valid host name",
                self.hostname
            )));
        }
        if self.flake_url.trim().is_empty() {
            return Err(DeployError::InvalidConfig("flake_url must not be empty".into()));
        }
        if !self.state_dir.is_absolute() {
            return Err(DeployError::InvalidConfig(format!(
                "state_dir '{}' must be an absolute path",
                self.state_dir.display()
            )));
        }
        if self.query_timeout_secs == 0 {
            return Err(DeployError::InvalidConfig("query_timeout_secs must be greater than 0".into()));
        }
        if self.poll_interval_secs == Some(0) {
            return Err(DeployError::InvalidConfig("poll_interval_secs must be greater than 0".into()));
        }
        self.webhook.socket_addr()?;
        Ok(())
    }

    pub fn mode(&self) -> ExecutionMode {
        ExecutionMode::from_dry_run(self.dry_run)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }

    pub fn reference(&self) -> ConfigurationReference {
        ConfigurationReference::new(&self.flake_url, &self.hostname)
    }

    pub fn settings(&self) -> DeploySettings {
        DeploySettings {
            reference: self.reference(),
            operation: self.operation,
            mode: self.mode(),
            state_dir: self.state_dir.clone(),
            agent_unit: self.agent_unit.clone(),
            identity_option: self.identity_option.clone(),
            machine_id_file: self.machine_id_file.clone(),
            system_profile: self.system_profile.clone(),
        }
    }
}
