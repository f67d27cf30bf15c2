/*
[INPUT]:  HTTP configuration (base URL, timeouts, API key)
[OUTPUT]: Configured reqwest client ready for API calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::http::{Result, StreamError};

/// Base URL for the Binance REST API
const API_BASE_URL: &str = "https://api.binance.com";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Credentials for API-key authenticated requests
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
}

/// Error body returned by the exchange on non-2xx replies
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i32,
    msg: String,
}

/// HTTP client for the Binance REST API
#[derive(Debug, Clone)]
pub struct BinanceClient {
    http_client: Client,
    base_url: Url,
    timeout: Duration,
    credentials: Option<Credentials>,
}

impl BinanceClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_config_and_base_url(config, API_BASE_URL)
    }

    /// Create a new client against a custom base URL (testnet, mock servers)
    pub fn with_config_and_base_url(config: ClientConfig, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            timeout: config.timeout,
            credentials: None,
        })
    }

    /// Set credentials for authenticated requests
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// Builder-style variant of [`BinanceClient::set_credentials`]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.set_credentials(Credentials {
            api_key: api_key.into(),
        });
        self
    }

    /// Get credentials if set
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Build request builder for an API-key authenticated endpoint
    pub(crate) fn request_with_api_key(
        &self,
        method: Method,
        endpoint: &str,
    ) -> Result<RequestBuilder> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            StreamError::config("an API key is required for user data stream endpoints")
        })?;
        let url = self.base_url.join(endpoint)?;
        Ok(self
            .http_client
            .request(method, url)
            .header(API_KEY_HEADER, &credentials.api_key))
    }

    /// Send a request and decode a JSON body
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let body = self.send(builder).await?;
        serde_json::from_str(&body).map_err(StreamError::from)
    }

    /// Send a request whose reply body carries no data
    pub(crate) async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        self.send(builder).await.map(|_| ())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<String> {
        let response = builder
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(1);
            return Err(StreamError::RateLimit { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;
        if !status.is_success() {
            debug!(status = status.as_u16(), bytes = body.len(), "api request failed");
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(error) => StreamError::Api {
                    code: error.code,
                    message: error.msg,
                },
                Err(_) => StreamError::api_error(status, body),
            });
        }

        Ok(body)
    }

    fn transport_error(&self, err: reqwest::Error) -> StreamError {
        if err.is_timeout() {
            StreamError::Timeout {
                duration: self.timeout.as_secs(),
            }
        } else {
            StreamError::Http(err)
        }
    }
}
