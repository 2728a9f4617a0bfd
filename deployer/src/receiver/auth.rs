//! Token authentication for receiver requests

use tracing::warn;

use crate::errors::DeployerError;
use crate::storage::settings::{EnvironmentSettings, Settings};
use crate::utils::constant_time_eq;

/// Error text for a rejected token
pub const UNAUTHORIZED: &str = "Unauthorized - Invalid token";

/// Resolve the requested environment and check the provided token against it.
///
/// An unknown environment is a validation error. An environment without a
/// configured token rejects every request.
pub fn authenticate<'a>(
    settings: &'a Settings,
    environment: &str,
    provided: Option<&str>,
) -> Result<&'a EnvironmentSettings, DeployerError> {
    let Some(env) = settings.environment(environment) else {
        return Err(DeployerError::ValidationError(format!(
            "Invalid environment: {environment}"
        )));
    };

    let Some(expected) = env.token() else {
        warn!("No deploy token configured for {}", environment);
        return Err(DeployerError::AuthError(UNAUTHORIZED.to_string()));
    };

    match provided {
        Some(provided) if constant_time_eq(expected.as_bytes(), provided.as_bytes()) => Ok(env),
        _ => {
            warn!("Rejected request for {}: invalid token", environment);
            Err(DeployerError::AuthError(UNAUTHORIZED.to_string()))
        }
    }
}

/// Check the provided token against every environment, for requests whose
/// environment cannot be read
pub fn authenticate_any(settings: &Settings, provided: Option<&str>) -> Result<(), DeployerError> {
    let accepted = provided.is_some_and(|provided| {
        settings
            .environments
            .values()
            .filter_map(|env| env.token())
            .any(|expected| constant_time_eq(expected.as_bytes(), provided.as_bytes()))
    });
    if accepted {
        Ok(())
    } else {
        warn!("Rejected request with an unreadable body: invalid token");
        Err(DeployerError::AuthError(UNAUTHORIZED.to_string()))
    }
}
