use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

pub const TOKEN_HEADER: &str = "X-Gitlab-Token";

/// Require the shared secret in [`TOKEN_HEADER`] when one is configured.
/// Without a secret every request passes through.
pub async fn require_token(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let Some(secret) = app.secret.as_deref() else {
        return next.run(req).await;
    };
    let Some(value) = req.headers().get(TOKEN_HEADER) else {
        return (
            StatusCode::UNAUTHORIZED,
            format!("The header {TOKEN_HEADER} is required"),
        )
            .into_response();
    };
    if value.as_bytes() != secret.as_bytes() {
        return (
            StatusCode::UNAUTHORIZED,
            format!("Invalid {TOKEN_HEADER} header value"),
        )
            .into_response();
    }
    next.run(req).await
}
