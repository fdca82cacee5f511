use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::state::AppState;

/// GET /status: pretty-printed status snapshot.
pub async fn get_status(State(app): State<AppState>) -> Result<Response, AppError> {
    let snapshot = app.store.snapshot(app.gate.is_busy());
    let body = serde_json::to_string_pretty(&snapshot)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
