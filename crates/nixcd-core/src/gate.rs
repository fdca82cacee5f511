//! Single-flight trigger gate: at most one deployment runs at a time, and
//! requests arriving while one runs are dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::deployer::Deployer;
use crate::types::DeploymentResult;

#[derive(Clone)]
pub struct DeployGate {
    deployer: Arc<Deployer>,
    busy: Arc<AtomicBool>,
}

/// Clears the busy flag when dropped, including on panic unwinding.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DeployGate {
    pub fn new(deployer: Deployer) -> Self {
        Self {
            deployer: Arc::new(deployer),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(self.busy.clone()))
    }

    /// Start a deployment in the background. Returns `false` when one is
    /// already running. Must be called from within a tokio runtime.
    pub fn trigger(&self) -> bool {
        let Some(guard) = self.acquire() else {
            info!("A deployment is already running");
            return false;
        };
        let deployer = self.deployer.clone();
        tokio::spawn(async move {
            let _guard = guard;
            deployer.deploy().await;
        });
        true
    }

    /// Stop admitting deployments. Waits for a running one to finish, then
    /// keeps the busy flag set for good, so every later `trigger` and
    /// `run_if_idle` is refused.
    pub async fn close(&self) {
        let mut waiting = false;
        while self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            if !waiting {
                info!("Waiting for the running deployment to finish");
                waiting = true;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Run a deployment on the caller's task, or return `None` when one is
    /// already running.
    pub async fn run_if_idle(&self) -> Option<DeploymentResult> {
        let _guard = self.acquire()?;
        Some(self.deployer.deploy().await)
    }
}
