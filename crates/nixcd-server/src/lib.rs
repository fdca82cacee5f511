pub mod auth;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

pub use scheduler::spawn_scheduler;
pub use state::AppState;

/// Why [`serve_on`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeExit {
    Shutdown,
    /// A deployment changed the agent's own unit; the process should exit so
    /// the service manager starts the new one.
    RestartRequested,
}

/// Build the axum Router with all routes and middleware.
/// Used by `serve_on` callers and available for integration testing.
pub fn build_router(state: AppState) -> Router {
    let deploy = Router::new()
        .route("/deploy", post(routes::deploy::trigger_deploy))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    Router::new()
        .merge(deploy)
        .route("/status", get(routes::status::get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on a bound listener until ctrl-c or a restart request.
///
/// `scheduler` is the periodic trigger task, if any. On the way out it is
/// aborted and the gate is closed, waiting for a running deployment first.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: AppState,
    scheduler: Option<JoinHandle<()>>,
) -> anyhow::Result<ServeExit> {
    let addr = listener.local_addr()?;
    let app = build_router(state.clone());
    tracing::info!("nixcd listening on http://{addr}");

    let restart = Arc::new(AtomicBool::new(false));
    let shutdown = {
        let restart = restart.clone();
        let store = state.store.clone();
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received ctrl-c, shutting down");
                }
                _ = store.restart_requested() => {
                    tracing::info!("The agent unit changed, exiting so the service manager restarts nixcd");
                    restart.store(true, Ordering::SeqCst);
                }
            }
        }
    };
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    // Activation is never interrupted: wait for it, and admit nothing after.
    state.gate.close().await;
    served?;

    if restart.load(Ordering::SeqCst) {
        Ok(ServeExit::RestartRequested)
    } else {
        Ok(ServeExit::Shutdown)
    }
}
