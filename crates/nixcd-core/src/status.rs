//! In-memory deployment status, read by `GET /status`.

use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::deployer::DeploySettings;
use crate::gcroot::GcRoots;
use crate::types::{DeploymentResult, ExecutionMode, OperationKind, Phase};

/// Receives progress from the orchestrator.
pub trait StatusPublisher: Send + Sync {
    fn phase_changed(&self, phase: Phase);
    fn deployment_finished(&self, result: &DeploymentResult);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub hostname: String,
    pub flake_url: String,
    pub operation: OperationKind,
    pub mode: ExecutionMode,
    pub busy: bool,
    pub phase: Phase,
    pub deployments: u64,
    pub failures: u64,
    pub last_result: Option<DeploymentResult>,
    /// Current target of this host's GC root.
    pub gc_root: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Inner {
    phase: Phase,
    deployments: u64,
    failures: u64,
    last_result: Option<DeploymentResult>,
}

pub struct StatusStore {
    hostname: String,
    flake_url: String,
    operation: OperationKind,
    mode: ExecutionMode,
    roots: GcRoots,
    inner: RwLock<Inner>,
    restart: Notify,
}

impl StatusStore {
    pub fn new(settings: &DeploySettings) -> Self {
        Self {
            hostname: settings.reference.hostname.clone(),
            flake_url: settings.reference.flake_url.clone(),
            operation: settings.operation,
            mode: settings.mode,
            roots: GcRoots::new(&settings.state_dir),
            inner: RwLock::new(Inner::default()),
            restart: Notify::new(),
        }
    }

    /// `busy` comes from the trigger gate, which owns the flag.
    pub fn snapshot(&self, busy: bool) -> StatusSnapshot {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        StatusSnapshot {
            hostname: self.hostname.clone(),
            flake_url: self.flake_url.clone(),
            operation: self.operation,
            mode: self.mode,
            busy,
            phase: inner.phase,
            deployments: inner.deployments,
            failures: inner.failures,
            last_result: inner.last_result.clone(),
            gc_root: self.roots.current(&self.hostname),
        }
    }

    /// Resolves once a finished deployment reported `needs_restart`. A request
    /// made before anyone waits is kept until the next call.
    pub async fn restart_requested(&self) {
        self.restart.notified().await;
    }
}

impl StatusPublisher for StatusStore {
    fn phase_changed(&self, phase: Phase) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.phase = phase;
    }

    fn deployment_finished(&self, result: &DeploymentResult) {
        {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            inner.phase = result.phase();
            inner.deployments += 1;
            if !result.succeeded() {
                inner.failures += 1;
            }
            inner.last_result = Some(result.clone());
        }
        if result.needs_restart {
            self.restart.notify_one();
        }
    }
}
