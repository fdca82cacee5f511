use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

pub const TRIGGERED: &str = "A deployment has been triggered";
pub const ALREADY_RUNNING: &str = "A deployment is already running";

/// POST /deploy: start a deployment unless one is already running.
pub async fn trigger_deploy(State(app): State<AppState>) -> (StatusCode, &'static str) {
    if app.gate.trigger() {
        tracing::info!("Deployment triggered over HTTP");
        (StatusCode::OK, TRIGGERED)
    } else {
        (StatusCode::CONFLICT, ALREADY_RUNNING)
    }
}
