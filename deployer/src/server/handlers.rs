//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use deploy_api::models::{RunRequest, DEFAULT_ENVIRONMENT, TOKEN_HEADER};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::receiver::auth::{authenticate, authenticate_any};
use crate::server::errors::ApiError;
use crate::server::state::ServerState;
use crate::trace;
use crate::utils::version_info;

fn provided_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(TOKEN_HEADER).and_then(|value| value.to_str().ok())
}

/// Run endpoint: deletions, extraction and commands for one environment
pub async fn run_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: RunRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            // only a known token holder learns why the body was refused
            authenticate_any(&state.settings, provided_token(&headers))
                .map_err(|e| ApiError::from_error(e, trace!()))?;
            return Err(ApiError::bad_request(format!("Invalid request body: {e}")));
        }
    };
    debug!("Run request for {}", request.env);

    let env = authenticate(&state.settings, &request.env, provided_token(&headers))
        .map_err(|e| ApiError::from_error(e, trace!()))?;

    let commands = match &request.commands {
        Some(commands) => commands.clone(),
        None => env.commands_or(&state.settings.default_commands).to_vec(),
    };

    let result = state.receiver.apply(&request, &commands).await;
    info!(
        "Deployment for {} finished in {}s",
        result.environment, result.total_time
    );
    Ok(Json(result))
}

/// Metadata endpoint query
#[derive(Debug, Deserialize)]
pub struct MetadataQuery {
    pub env: Option<String>,
}

/// Metadata endpoint: the record of the last applied deployment
pub async fn metadata_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(query): Query<MetadataQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let environment = query.env.as_deref().unwrap_or(DEFAULT_ENVIRONMENT);
    authenticate(&state.settings, environment, provided_token(&headers))
        .map_err(|e| ApiError::from_error(e, trace!()))?;

    let response = state
        .receiver
        .store()
        .describe(environment)
        .await
        .map_err(|e| ApiError::from_error(e, trace!()))?;
    Ok(Json(response))
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}
