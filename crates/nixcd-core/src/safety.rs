use std::path::Path;

use tracing::info;

use crate::error::{DeployError, Result};

/// Compare the expected machine identity (if configured) with the one in
/// `machine_id_file`.
///
/// Nothing is read when `expected` is `None`. When it is set, an unreadable
/// identity file is an error, not a skipped check.
pub fn check_identity(expected: Option<&str>, machine_id_file: &Path) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let raw = std::fs::read_to_string(machine_id_file).map_err(|source| {
        DeployError::IdentityRead {
            path: machine_id_file.to_path_buf(),
            source,
        }
    })?;
    let actual = raw.trim_end_matches('\n');
    if actual != expected {
        return Err(DeployError::IdentityMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    info!("Machine id '{actual}' matches the expected machine id");
    Ok(())
}
