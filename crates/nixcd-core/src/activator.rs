//! The only place that mutates live machine state.

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::paths::switch_to_configuration;
use crate::runner::{CommandLine, CommandRunner};
use crate::types::{ExecutionMode, OperationKind};

/// Point the system profile at `output_path`.
///
/// Only switch and boot touch the profile; other operations return
/// immediately in either mode. Returns whether the profile command was (or,
/// when simulating, would have been) issued.
pub async fn set_system_profile(
    runner: &dyn CommandRunner,
    operation: OperationKind,
    output_path: &Path,
    system_profile: &Path,
    mode: ExecutionMode,
) -> Result<bool> {
    if !operation.updates_profile() {
        return Ok(false);
    }
    let cmd = CommandLine::new("nix-env").args([
        "--profile".to_string(),
        system_profile.display().to_string(),
        "--set".to_string(),
        output_path.display().to_string(),
    ]);
    if mode.is_simulate() {
        info!("Dry-run enabled: '{cmd}' has not been executed");
        return Ok(true);
    }
    runner.stream(&cmd).await?;
    Ok(true)
}

/// Run `<output_path>/bin/switch-to-configuration <operation>`.
pub async fn activate(
    runner: &dyn CommandRunner,
    operation: OperationKind,
    output_path: &Path,
    mode: ExecutionMode,
) -> Result<()> {
    let exe = switch_to_configuration(output_path);
    let cmd = CommandLine::new(exe.display().to_string()).arg(operation.as_str());
    if mode.is_simulate() {
        info!("Dry-run enabled: '{cmd}' has not been executed");
        return Ok(());
    }
    runner.stream(&cmd).await?;
    info!("Activation '{operation}' successfully terminated");
    Ok(())
}
