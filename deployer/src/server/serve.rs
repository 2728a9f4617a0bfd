//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use deploy_api::models::{METADATA_PATH, RUN_PATH};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::DeployerError;
use crate::server::errors::{install_panic_hook, panic_response};
use crate::server::handlers::{metadata_handler, run_handler, version_handler};
use crate::server::state::ServerState;
use crate::storage::settings::ServerSettings;

/// Build the receiver router
pub fn router(state: Arc<ServerState>) -> Router {
    install_panic_hook();
    Router::new()
        .route(RUN_PATH, post(run_handler))
        .route(METADATA_PATH, get(metadata_handler))
        .route("/deployer/version", get(version_handler))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerSettings,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployerError>>, DeployerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting receiver on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DeployerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
