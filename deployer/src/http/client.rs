//! HTTP client for the receiver endpoints

use std::time::Duration;

use deploy_api::models::{
    DeploymentResult, ErrorResponse, MetadataResponse, RunRequest, METADATA_PATH, RUN_PATH,
    TOKEN_HEADER,
};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::errors::DeployerError;

/// Client for one environment's receiver. Reuses its connection across calls.
pub struct DeployerApiClient {
    client: Client,
    base_url: String,
    environment: String,
    token: SecretString,
}

impl DeployerApiClient {
    /// Create a new client
    pub fn new(
        base_url: &str,
        environment: &str,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, DeployerError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            environment: environment.to_string(),
            token,
        })
    }

    /// Run endpoint URL
    pub fn run_url(&self) -> String {
        format!("{}{}", self.base_url, RUN_PATH)
    }

    /// Fetch the record of the last deployment
    pub async fn fetch_metadata(&self) -> Result<MetadataResponse, DeployerError> {
        let url = format!("{}{}", self.base_url, METADATA_PATH);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("env", self.environment.as_str())])
            .header(TOKEN_HEADER, self.token.expose_secret())
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Call the run endpoint
    pub async fn run(&self, request: &RunRequest) -> Result<DeploymentResult, DeployerError> {
        let url = self.run_url();
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, self.token.expose_secret())
            .json(request)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, DeployerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(envelope) => match (envelope.file, envelope.line) {
                (Some(file), Some(line)) => format!("{} ({}:{})", envelope.error, file, line),
                _ => envelope.error,
            },
            Err(_) => body,
        };
        error!("Receiver returned {}: {}", status, message);

        Err(match status {
            StatusCode::UNAUTHORIZED => DeployerError::AuthError(message),
            StatusCode::BAD_REQUEST => DeployerError::ValidationError(message),
            _ => DeployerError::RemoteError(format!("{status}: {message}")),
        })
    }
}
