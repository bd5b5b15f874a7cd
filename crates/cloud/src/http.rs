//! HTTP client wrapper with JSON decoding and retry logic.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{CloudError, Result};

const USER_AGENT: &str = concat!("vbicompare/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the ArcGIS REST services.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    request_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(request_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            max_retries,
            request_timeout,
        })
    }

    /// GET `url` with query parameters and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        debug!(url, params = query.len(), "GET");
        let req = self.client.get(url).query(query);
        self.send_json(req, url).await
    }

    /// POST `form` as `application/x-www-form-urlencoded` and decode the JSON body.
    pub async fn post_form_json<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<T> {
        debug!(url, params = form.len(), "POST");
        let req = self.client.post(url).form(form);
        self.send_json(req, url).await
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder, url: &str) -> Result<T> {
        let resp = self.execute_with_retry(req, url).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| CloudError::Network(format!("reading response body from {url}: {e}")))?;

        serde_json::from_str(&body).map_err(|e| {
            CloudError::Network(format!(
                "parsing response from {url}: {e}: {}",
                body.chars().take(200).collect::<String>()
            ))
        })
    }

    /// Execute a request with exponential backoff retry.
    ///
    /// Connect errors, timeouts and 5xx responses are retried; 4xx responses
    /// fail immediately.
    async fn execute_with_retry(&self, request: RequestBuilder, url: &str) -> Result<reqwest::Response> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 500ms, 1s, 2s, ...
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                debug!(url, attempt, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }

            let Some(cloned) = request.try_clone() else {
                return Ok(request.send().await?);
            };

            match cloned.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    let err = CloudError::Network(format!(
                        "HTTP {} from {}: {}",
                        status,
                        url,
                        body.chars().take(500).collect::<String>()
                    ));
                    if status == StatusCode::NOT_FOUND {
                        return Err(CloudError::NotFound(url.to_string()));
                    }
                    // Don't retry client errors (4xx)
                    if status.is_client_error() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = Some(CloudError::Http(e));
                }
                Err(e) => return Err(CloudError::Http(e)),
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network(format!("request to {url} failed"))))
    }

    /// Getter for the timeout duration.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
