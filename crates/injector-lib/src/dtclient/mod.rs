//! Client for the Dynatrace environment REST API
//!
//! Only the token endpoints are implemented; the reconciler uses them to
//! check the API token and to mint PaaS tokens for the installer.

mod token;

pub use token::{TokenScopes, TOKEN_SCOPE_DATA_EXPORT, TOKEN_SCOPE_INSTALLER_DOWNLOAD};

use async_trait::async_trait;
use reqwest::{Client, Proxy, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DtClientError {
    #[error("error initialising http client: {0}")]
    Init(#[source] reqwest::Error),

    #[error("error making post request to dynatrace api: {0}")]
    Request(#[source] reqwest::Error),

    #[error("dynatrace server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("response error: {0}, can't unmarshal json response")]
    UnexpectedStatus(StatusCode),

    #[error("error unmarshalling json response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Token operations used by the reconciler
#[async_trait]
pub trait TokenApi: Send + Sync {
    /// Create a PaaS token allowed to download installers
    async fn create_paas_token(&self, token: &str) -> Result<String, DtClientError>;

    /// Look up the scopes granted to `token`
    async fn get_token_scopes(&self, token: &str) -> Result<TokenScopes, DtClientError>;
}

/// Options for [`DynatraceClient`]
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Accept any server certificate
    pub skip_cert_check: bool,
    /// Proxy URL for all requests
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
}

/// Dynatrace environment API client
#[derive(Debug, Clone)]
pub struct DynatraceClient {
    client: Client,
    url: String,
}

#[derive(Deserialize)]
struct ServerErrorResponse {
    error: ServerError,
}

#[derive(Deserialize)]
struct ServerError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl DynatraceClient {
    /// Create a client for the environment API at `url`, e.g.
    /// `https://abc123.live.dynatrace.com/api`
    pub fn new(url: impl Into<String>, options: ClientOptions) -> Result<Self, DtClientError> {
        let mut builder = Client::builder()
            .timeout(options.timeout.unwrap_or(Duration::from_secs(30)))
            .danger_accept_invalid_certs(options.skip_cert_check);

        if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(Proxy::all(proxy).map_err(DtClientError::Init)?);
        }

        let client = builder.build().map_err(DtClientError::Init)?;
        let url = url.into().trim_end_matches('/').to_string();

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `body` to `endpoint` authenticated with `token`, returning the
    /// raw response body of a successful call
    async fn token_api_request(
        &self,
        token: &str,
        endpoint: &str,
        body: &impl serde::Serialize,
    ) -> Result<Vec<u8>, DtClientError> {
        let url = format!("{}/{}", self.url, endpoint);
        debug!(url = %url, "Calling token API");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Api-Token {}", token))
            .json(body)
            .send()
            .await
            .map_err(DtClientError::Request)?;

        let status = response.status();
        let data = response.bytes().await.map_err(DtClientError::Request)?;

        if status != StatusCode::OK {
            return Err(match serde_json::from_slice::<ServerErrorResponse>(&data) {
                Ok(se) => DtClientError::Server {
                    code: se.error.code,
                    message: se.error.message,
                },
                Err(_) => DtClientError::UnexpectedStatus(status),
            });
        }

        Ok(data.to_vec())
    }
}
