use std::sync::Arc;

use nixcd_core::{DeployGate, StatusStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: DeployGate,
    pub store: Arc<StatusStore>,
    /// Expected `X-Gitlab-Token` value for `POST /deploy`.
    pub secret: Option<String>,
}

impl AppState {
    pub fn new(gate: DeployGate, store: Arc<StatusStore>, secret: Option<String>) -> Self {
        Self {
            gate,
            store,
            secret,
        }
    }
}
