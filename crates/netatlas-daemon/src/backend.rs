//! reqwest-backed HTTP transport for the fetch pipeline.

use std::time::Duration;

use async_trait::async_trait;
use netatlas_core::fetch::{FetchError, HttpBackend, RawResponse};

/// Production [`HttpBackend`] over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Creates a backend with explicit connect and overall timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] when the client cannot be
    /// initialized.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|error| FetchError::Transport {
                url: String::new(),
                message: error.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| FetchError::Transport {
                url: url.to_string(),
                message: error.to_string(),
            })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|error| FetchError::Transport {
                url: url.to_string(),
                message: error.to_string(),
            })?
            .to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
