//! Configuration evaluation: expected machine identity, the toplevel
//! derivation of a host, and the list of hosts a flake declares.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{DeployError, Result};
use crate::paths::{NIX_FEATURE_FLAGS, TOPLEVEL_ATTRIBUTE};
use crate::runner::{CommandLine, CommandRunner};
use crate::types::{BuildArtifact, ConfigurationReference};

/// `nix <flags> <args...>`
pub(crate) fn nix_command<I, S>(args: I) -> CommandLine
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandLine::new("nix").args(NIX_FEATURE_FLAGS).args(args)
}

async fn query_json<T: DeserializeOwned>(runner: &dyn CommandRunner, cmd: &CommandLine) -> Result<T> {
    let stdout = runner.output(cmd).await?;
    serde_json::from_slice(&stdout).map_err(|source| DeployError::ToolOutput {
        command: cmd.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Expected identity
// ---------------------------------------------------------------------------

/// Evaluate `identity_option` (e.g. `services.nixcd.machineId`) for the host.
/// An unset option evaluates to JSON `null` and yields `None`.
pub async fn resolve_expected_identity(
    runner: &dyn CommandRunner,
    reference: &ConfigurationReference,
    identity_option: &str,
) -> Result<Option<String>> {
    let installable = reference.installable(identity_option);
    let cmd = nix_command(["eval", installable.as_str(), "--json"]);
    let identity: Option<String> = query_json(runner, &cmd).await?;
    match &identity {
        Some(id) => debug!(host = %reference.hostname, "{identity_option} = {id}"),
        None => debug!(host = %reference.hostname, "{identity_option} = null (not set)"),
    }
    Ok(identity)
}

// ---------------------------------------------------------------------------
// Toplevel derivation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Derivation {
    outputs: DerivationOutputs,
    #[serde(default)]
    env: DerivationEnv,
}

#[derive(Debug, Deserialize)]
struct DerivationOutputs {
    out: OutputPath,
}

#[derive(Debug, Deserialize)]
struct OutputPath {
    path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct DerivationEnv {
    #[serde(default)]
    name: Option<String>,
}

/// Resolve the derivation and output path of the host's system toplevel.
pub async fn resolve_artifact(
    runner: &dyn CommandRunner,
    reference: &ConfigurationReference,
) -> Result<BuildArtifact> {
    let installable = reference.installable(TOPLEVEL_ATTRIBUTE);
    let cmd = nix_command(["show-derivation", installable.as_str(), "-L"]);
    let derivations: BTreeMap<String, Derivation> = query_json(runner, &cmd).await?;
    let artifact = select_toplevel(derivations, &reference.hostname)
        .ok_or(DeployError::DerivationNotFound { installable })?;
    info!(host = %reference.hostname, "The derivation path is {}", artifact.drv_path);
    info!(host = %reference.hostname, "The output path is {}", artifact.output_path.display());
    Ok(artifact)
}

/// Pick the toplevel derivation out of a `show-derivation` map.
///
/// The toplevel is named `nixos-system-<hostName>-<version>`, where the host
/// part comes from `networking.hostName`. An exact `<host>-<version>` match
/// beats a bare prefix match, so host `web` never picks `web-1`. Otherwise a
/// single entry is taken as is. Ties go to the smallest derivation path so the
/// result never depends on map order.
fn select_toplevel(
    derivations: BTreeMap<String, Derivation>,
    hostname: &str,
) -> Option<BuildArtifact> {
    let system_prefix = format!("nixos-system-{hostname}-");
    let total = derivations.len();
    let mut best: Option<(u8, BuildArtifact)> = None;
    for (drv_path, drv) in derivations {
        let rank = drv
            .env
            .name
            .as_deref()
            .and_then(|n| n.strip_prefix(&system_prefix))
            .map_or(0, |version| {
                let exact = version.starts_with(|c: char| c.is_ascii_digit())
                    && !version.contains('-');
                if exact {
                    2
                } else {
                    1
                }
            });
        if best.as_ref().is_some_and(|(r, _)| *r >= rank) {
            continue;
        }
        best = Some((
            rank,
            BuildArtifact {
                drv_path,
                output_path: drv.outputs.out.path,
            },
        ));
    }
    let (rank, artifact) = best?;
    if rank == 0 && total > 1 {
        warn!(
            host = %hostname,
            candidates = total,
            "no derivation named {system_prefix}*, using {}",
            artifact.drv_path
        );
    }
    Some(artifact)
}

// ---------------------------------------------------------------------------
// Host listing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FlakeShow {
    #[serde(default, rename = "nixosConfigurations")]
    nixos_configurations: BTreeMap<String, serde_json::Value>,
}

/// Host names declared under `nixosConfigurations`, sorted.
pub async fn list_hosts(runner: &dyn CommandRunner, flake_url: &str) -> Result<Vec<String>> {
    let cmd = nix_command(["flake", "show", flake_url, "--json"]);
    let show: FlakeShow = query_json(runner, &cmd).await?;
    Ok(show.nixos_configurations.into_keys().collect())
}
