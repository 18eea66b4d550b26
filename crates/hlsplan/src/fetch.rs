//! The URI fetch collaborator.
//!
//! [`UriFetcher`] is the only way the engine reaches the outside world for
//! manifests and keys. [`HttpFetcher`] serves `http(s)` through reqwest and
//! `file:` URIs or plain paths straight from disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::proxy::build_proxy_from_config;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP status error: {0}")]
    StatusCode(StatusCode),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0}")]
    UrlError(String),

    #[error("Proxy error: {0}")]
    Proxy(String),
}

#[async_trait]
pub trait UriFetcher: Send + Sync {
    /// Fetch the whole body behind `uri`.
    async fn fetch(
        &self,
        uri: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Bytes, FetchError>;

    /// The URL `uri` ends up at after redirects.
    async fn resolve_final_url(&self, uri: &str, headers: &HeaderMap)
    -> Result<String, FetchError>;
}

/// Build a reqwest client from a [`FetchConfig`]
pub fn create_client(config: &FetchConfig) -> Result<Client, FetchError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if let Some(proxy_config) = &config.proxy {
        let proxy = build_proxy_from_config(proxy_config).map_err(FetchError::Proxy)?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy");
    } else if config.use_system_proxy {
        debug!("Using system proxy settings");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled");
    }

    client_builder.build().map_err(FetchError::from)
}

enum Location {
    Remote,
    Local(PathBuf),
}

fn locate(uri: &str) -> Result<Location, FetchError> {
    match Url::parse(uri) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Location::Remote),
            "file" => url
                .to_file_path()
                .map(Location::Local)
                .map_err(|_| FetchError::UrlError(format!("not a local file URI: {uri}"))),
            // single letters are drive prefixes, not schemes
            scheme if scheme.len() == 1 => Ok(Location::Local(PathBuf::from(uri))),
            scheme => Err(FetchError::UrlError(format!(
                "unsupported scheme '{scheme}' in {uri}"
            ))),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Location::Local(PathBuf::from(uri))),
        Err(e) => Err(FetchError::UrlError(format!("{uri}: {e}"))),
    }
}

fn file_url(path: &Path) -> Result<String, FetchError> {
    let absolute = std::path::absolute(path)?;
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|_| FetchError::UrlError(format!("cannot express {} as a URL", path.display())))
}

/// [`UriFetcher`] backed by reqwest and the local filesystem
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    retry_delay_base: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self::with_client(create_client(config)?, config))
    }

    /// Reuse an existing client; only the retry policy is taken from `config`
    pub fn with_client(client: Client, config: &FetchConfig) -> Self {
        Self {
            client,
            max_retries: config.max_retries,
            retry_delay_base: config.retry_delay_base,
        }
    }

    /// Backoff before retry number `attempt`: `base * 2^(attempt - 1)`, saturating
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_delay_base.saturating_mul(factor)
    }

    async fn send(
        &self,
        uri: &str,
        headers: &HeaderMap,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, FetchError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut request = self.client.get(uri).headers(headers.clone());
            if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
                request = request.timeout(timeout);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.is_client_error() || attempts > self.max_retries {
                        return Err(FetchError::StatusCode(status));
                    }
                    warn!(url = %uri, status = %status, attempt = attempts, "Server error, retrying");
                }
                Err(e) => {
                    if !e.is_connect() && !e.is_timeout() && !e.is_request() {
                        return Err(FetchError::from(e));
                    }
                    if attempts > self.max_retries {
                        return Err(FetchError::from(e));
                    }
                    warn!(url = %uri, error = %e, attempt = attempts, "Request failed, retrying");
                }
            }

            tokio::time::sleep(self.retry_delay(attempts)).await;
        }
    }
}

#[async_trait]
impl UriFetcher for HttpFetcher {
    async fn fetch(
        &self,
        uri: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        match locate(uri)? {
            Location::Local(path) => {
                debug!(path = %path.display(), "Reading local resource");
                Ok(Bytes::from(tokio::fs::read(&path).await?))
            }
            Location::Remote => {
                debug!(url = %uri, "Fetching remote resource");
                let response = self.send(uri, headers, Some(timeout)).await?;
                Ok(response.bytes().await?)
            }
        }
    }

    async fn resolve_final_url(
        &self,
        uri: &str,
        headers: &HeaderMap,
    ) -> Result<String, FetchError> {
        match locate(uri)? {
            Location::Local(path) => file_url(&path),
            Location::Remote => {
                let response = self.send(uri, headers, None).await?;
                let final_url = response.url().to_string();
                if final_url != uri {
                    debug!(from = %uri, to = %final_url, "Manifest URL redirected");
                }
                Ok(final_url)
            }
        }
    }
}
