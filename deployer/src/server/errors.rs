//! JSON error envelope for handler failures

use std::any::Any;
use std::cell::RefCell;
use std::sync::Once;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deploy_api::models::ErrorResponse;
use tracing::error;

use crate::errors::DeployerError;

/// A rejected or failed request
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    /// `file:line` of the failure, for unexpected faults
    pub location: Option<String>,
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            location: None,
        }
    }

    /// Map a crate error raised at `location` (see the `trace!` macro)
    pub fn from_error(err: DeployerError, location: String) -> Self {
        match err {
            DeployerError::ValidationError(msg) => Self::bad_request(msg),
            DeployerError::AuthError(msg) => Self {
                status: StatusCode::UNAUTHORIZED,
                error: msg,
                location: None,
            },
            other => {
                error!("Request failed at {}: {}", location, other);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: other.to_string(),
                    location: Some(location),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (file, line) = match self.location.as_deref().and_then(|l| l.rsplit_once(':')) {
            Some((file, line)) => (Some(file.to_string()), line.parse().ok()),
            None => (None, None),
        };
        let body = ErrorResponse {
            success: false,
            error: self.error,
            file,
            line,
        };
        (self.status, Json(body)).into_response()
    }
}

thread_local! {
    /// `file:line` of the last panic raised on this thread
    static PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that remembers where each panic was raised, so
/// [`panic_response`] can report it. Installed once per process.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()));
            PANIC_LOCATION.with(|slot| *slot.borrow_mut() = location);
            previous(info);
        }));
    });
}

/// Render a handler panic as a 500 envelope.
///
/// Called on the thread that caught the panic, which is the one that raised it.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    };
    let location = PANIC_LOCATION.with(|slot| slot.borrow_mut().take());
    error!(
        "Handler panicked at {}: {}",
        location.as_deref().unwrap_or("unknown location"),
        message
    );

    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        error: message,
        location,
    }
    .into_response()
}
