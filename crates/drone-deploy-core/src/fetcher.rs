//! Drone REST API client.
//!
//! [`BuildSource`] is the seam the walker and report builder depend on;
//! [`DroneClient`] is the HTTP implementation. Tests plug in in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::build::{Build, Repository};
use crate::error::FetchError;
use crate::provider::ProviderContext;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of build history for one provider.
#[async_trait]
pub trait BuildSource: Send + Sync {
    /// Builds of `repo`, in server order (newest first).
    async fn fetch_builds(&self, repo: &str) -> Result<Vec<Build>, FetchError>;

    /// Repositories visible to the authenticated account.
    async fn list_repos(&self) -> Result<Vec<Repository>, FetchError>;
}

/// HTTP client bound to one provider's server and token.
pub struct DroneClient {
    context: ProviderContext,
    http_client: reqwest::Client,
}

impl DroneClient {
    /// Create a client with an explicit per-request timeout.
    pub fn new(context: ProviderContext, request_timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("drone-deploy/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(DroneClient {
            context,
            http_client,
        })
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        debug!(provider = %self.context.provider, url = %url, "GET");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.context.auth_header())
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.clone(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.clone(),
            detail: e.to_string(),
        })?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url,
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl BuildSource for DroneClient {
    async fn fetch_builds(&self, repo: &str) -> Result<Vec<Build>, FetchError> {
        self.get_json(self.context.builds_url(repo)).await
    }

    async fn list_repos(&self) -> Result<Vec<Repository>, FetchError> {
        self.get_json(self.context.repos_url()).await
    }
}
