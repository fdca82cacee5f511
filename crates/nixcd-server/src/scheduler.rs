use std::time::Duration;

use nixcd_core::DeployGate;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Trigger the gate every `period`, starting immediately. Triggers that hit a
/// running deployment are dropped.
pub fn spawn_scheduler(gate: DeployGate, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if gate.trigger() {
                info!("Periodic deployment triggered");
            } else {
                debug!("Periodic trigger skipped, a deployment is already running");
            }
        }
    })
}
