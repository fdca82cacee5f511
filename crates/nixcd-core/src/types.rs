use crate::error::{DeployError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// ConfigurationReference / BuildArtifact
// ---------------------------------------------------------------------------

/// One deployable target: a configuration source and the host name inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationReference {
    pub flake_url: String,
    pub hostname: String,
}

impl ConfigurationReference {
    pub fn new(flake_url: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            flake_url: flake_url.into(),
            hostname: hostname.into(),
        }
    }

    /// Installable for a config attribute of this host, e.g.
    /// `.#nixosConfigurations.web1.config.system.build.toplevel`.
    pub fn installable(&self, attribute: &str) -> String {
        format!(
            "{}#nixosConfigurations.{}.config.{}",
            self.flake_url, self.hostname, attribute
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Derivation path (`/nix/store/...-nixos-system-web1.drv`).
    pub drv_path: String,
    pub output_path: PathBuf,
}

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// Argument handed to `switch-to-configuration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Switch,
    Boot,
    Test,
    DryActivate,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Switch => "switch",
            OperationKind::Boot => "boot",
            OperationKind::Test => "test",
            OperationKind::DryActivate => "dry-activate",
        }
    }

    /// Only switch and boot move the system profile pointer; the boot loader
    /// entries are generated from it.
    pub fn updates_profile(&self) -> bool {
        matches!(self, OperationKind::Switch | OperationKind::Boot)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "switch" => Ok(OperationKind::Switch),
            "boot" => Ok(OperationKind::Boot),
            "test" => Ok(OperationKind::Test),
            "dry-activate" => Ok(OperationKind::DryActivate),
            other => Err(DeployError::UnknownOperation(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionMode
// ---------------------------------------------------------------------------

/// Whether side-effecting steps run or are only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Apply,
    Simulate,
}

impl ExecutionMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            ExecutionMode::Simulate
        } else {
            ExecutionMode::Apply
        }
    }

    pub fn is_simulate(&self) -> bool {
        matches!(self, ExecutionMode::Simulate)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Preparing,
    SafetyChecking,
    Building,
    Activating,
    Finalizing,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

// ---------------------------------------------------------------------------
// DeploymentResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentFailure {
    /// Phase that was running when the error occurred.
    pub phase: Phase,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub hostname: String,
    pub operation: OperationKind,
    pub mode: ExecutionMode,
    /// Set as soon as evaluation resolved it, even if a later step failed.
    pub output_path: Option<PathBuf>,
    pub needs_restart: bool,
    pub error: Option<DeploymentFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn phase(&self) -> Phase {
        if self.succeeded() {
            Phase::Succeeded
        } else {
            Phase::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_switch_and_boot_update_profile() {
        assert!(OperationKind::Switch.updates_profile());
        assert!(OperationKind::Boot.updates_profile());
        assert!(!OperationKind::Test.updates_profile());
        assert!(!OperationKind::DryActivate.updates_profile());
    }

    #[test]
    fn operation_parses_cli_spelling() {
        for op in [
            OperationKind::Switch,
            OperationKind::Boot,
            OperationKind::Test,
            OperationKind::DryActivate,
        ] {
            assert_eq!(op.as_str().parse::<OperationKind>().unwrap(), op);
        }
        let err = "reboot".parse::<OperationKind>().unwrap_err();
        assert!(matches!(err, DeployError::UnknownOperation(s) if s == "reboot"));
    }

    #[test]
    fn operation_serializes_kebab_case() {
        let json = serde_json::to_string(&OperationKind::DryActivate).unwrap();
        assert_eq!(json, "\"dry-activate\"");
    }

    #[test]
    fn installable_targets_host_attribute() {
        let reference = ConfigurationReference::new("git+https://example.org/infra", "web1");
        assert_eq!(
            reference.installable("system.build.toplevel"),
            "git+https://example.org/infra#nixosConfigurations.web1.config.system.build.toplevel"
        );
    }

    #[test]
    fn dry_run_maps_to_simulate() {
        assert_eq!(ExecutionMode::from_dry_run(true), ExecutionMode::Simulate);
        assert_eq!(ExecutionMode::from_dry_run(false), ExecutionMode::Apply);
    }
}
