use std::path::PathBuf;

use tracing::info;

use crate::error::Result;
use crate::evaluator::{nix_command, resolve_artifact};
use crate::runner::CommandRunner;
use crate::types::{BuildArtifact, ConfigurationReference};

/// Realise the derivation into its output path.
///
/// `--no-link`: no `./result` symlink is created; the GC root written after a
/// successful deployment is the only durable reference. Rebuilding an already
/// realised derivation is a no-op on the nix side.
pub async fn build(runner: &dyn CommandRunner, artifact: &BuildArtifact) -> Result<PathBuf> {
    let cmd = nix_command(["build", artifact.drv_path.as_str(), "-L", "--no-link"]);
    runner.stream(&cmd).await?;
    info!("Built {}", artifact.output_path.display());
    Ok(artifact.output_path.clone())
}

/// Evaluate and build a host without checking identity or activating.
pub async fn build_host(
    runner: &dyn CommandRunner,
    reference: &ConfigurationReference,
) -> Result<PathBuf> {
    let artifact = resolve_artifact(runner, reference).await?;
    build(runner, &artifact).await
}
