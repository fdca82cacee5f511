use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::Result;
use crate::runner::{CommandLine, CommandRunner};

/// SHA-256 of the unit definition currently loaded by systemd
/// (`systemctl cat <unit>`). The text is hashed, never parsed.
pub async fn fingerprint_unit(runner: &dyn CommandRunner, unit: &str) -> Result<String> {
    let cmd = CommandLine::new("systemctl").args(["cat", unit]);
    let definition = runner.output(&cmd).await?;
    let hash = format!("{:x}", Sha256::digest(&definition));
    info!(unit = %unit, "The unit file sha256 is '{hash}'");
    Ok(hash)
}

/// The agent must restart when its own unit changed across activation.
pub fn needs_restart(before: &str, after: &str) -> bool {
    before != after
}
