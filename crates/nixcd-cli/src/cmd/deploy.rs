use std::sync::Arc;

use anyhow::{bail, Result};
use nixcd_core::{Config, DeployGate, Deployer, StatusStore};

use crate::output::{print_json, print_result};

pub fn run(config: &Config, json: bool) -> Result<()> {
    let settings = config.settings();
    let store = Arc::new(StatusStore::new(&settings));
    let gate = DeployGate::new(Deployer::new(super::runner(config), settings, store));

    let rt = tokio::runtime::Runtime::new()?;
    let Some(result) = rt.block_on(gate.run_if_idle()) else {
        bail!("a deployment is already running");
    };

    if json {
        print_json(&result)?;
    } else {
        print_result(&result);
    }

    if let Some(failure) = &result.error {
        bail!("deployment of '{}' failed: {}", result.hostname, failure.message);
    }
    Ok(())
}
