use std::sync::Arc;

use anyhow::{Context, Result};
use nixcd_core::{Config, DeployGate, Deployer, StatusStore};
use nixcd_server::{serve_on, spawn_scheduler, AppState, ServeExit};
use tracing::info;

pub fn run(config: &Config) -> Result<()> {
    let settings = config.settings();
    let store = Arc::new(StatusStore::new(&settings));
    let deployer = Deployer::new(super::runner(config), settings, store.clone());
    let gate = DeployGate::new(deployer);
    let addr = config.webhook.socket_addr()?;

    let rt = tokio::runtime::Runtime::new()?;
    let exit = rt.block_on(async {
        // Bind before the scheduler starts, so a bind failure never leaves a
        // deployment running on a runtime about to be dropped.
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("can not listen on {addr}"))?;
        let scheduler = config.poll_interval().map(|period| {
            info!("Deploying every {}s", period.as_secs());
            spawn_scheduler(gate.clone(), period)
        });
        let state = AppState::new(gate, store, config.webhook.secret.clone());
        serve_on(listener, state, scheduler)
            .await
            .with_context(|| format!("webhook server on {addr} failed"))
    })?;

    if exit == ServeExit::RestartRequested {
        info!("Exiting to let the service manager restart the agent");
    }
    Ok(())
}
