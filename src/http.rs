//! Thin HTTP seam shared by every enricher.

use reqwest::{Client, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::Credential;
use crate::harvest::FetchError;
use crate::rate_limit::{Api, RateLimiter};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// `reqwest` client that charges every request against the API's budget and
/// maps non-success statuses to [`FetchError::Status`].
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl ApiClient {
    pub fn new(timeout: Duration, limiter: Arc<RateLimiter>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, limiter })
    }

    pub async fn get_json(
        &self,
        api: Api,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<Value, FetchError> {
        let response = self.send(api, url, credential).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    pub async fn get_text(&self, api: Api, url: &str) -> Result<String, FetchError> {
        let response = self.send(api, url, None).await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    #[instrument(skip(self, credential))]
    async fn send(
        &self,
        api: Api,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<Response, FetchError> {
        self.limiter.acquire(api).await?;

        let mut request = self.client.get(url);
        if let Some(credential) = credential.filter(|c| c.is_present()) {
            request = request.basic_auth(&credential.user, Some(&credential.token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "response received");
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
            });
        }
        Ok(response)
    }
}
