//! # Configuration builders
//!
//! Fluent builders for [`FetchConfig`] and [`ResolverConfig`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use hlsplan_engine::{FetchConfig, KeyOverride, RangeSpec, ResolverConfig};
//!
//! let fetch = FetchConfig::builder()
//!     .with_timeout(Duration::from_secs(20))
//!     .with_user_agent("MyApp/1.0")
//!     .build();
//!
//! let job = ResolverConfig::builder("https://example.com/live/index.m3u8")
//!     .with_header("Referer", "https://example.com/")
//!     .with_work_dir("/tmp/job-1")
//!     .with_key_override(KeyOverride::Base64("AAECAwQFBgcICQoLDA0ODw==".to_string()))
//!     .with_range(RangeSpec::parse("00:01:00-00:02:00"))
//!     .build()
//!     .unwrap();
//! # let _ = (fetch, job);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::config::{FetchConfig, KeyOverride, ResolverConfig};
use crate::error::ResolveError;
use crate::plan::RangeSpec;
use crate::providers::ProviderRules;
use crate::proxy::ProxyConfig;

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        name.parse::<reqwest::header::HeaderName>(),
        HeaderValue::from_str(value),
    ) {
        headers.insert(name, value);
    }
}

/// Builder for creating FetchConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: FetchConfig::default(),
        }
    }

    /// Set the overall timeout for a request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        insert_header(&mut self.config.headers, name.as_ref(), value.as_ref());
        self
    }

    /// Set all HTTP headers, replacing any existing headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    /// Set the proxy configuration
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self.config.use_system_proxy = false; // Explicit proxy overrides system proxy
        self
    }

    /// Set whether to use system proxy settings if available
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        // Only set system proxy if no explicit proxy is configured
        if self.config.proxy.is_none() {
            self.config.use_system_proxy = use_system_proxy;
        }
        self
    }

    /// Set whether to accept invalid certificates
    ///
    /// # Warning
    /// This is unsafe and should only be used for testing or in controlled environments.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.danger_accept_invalid_certs = accept;
        self
    }

    /// Set the retry budget for transient failures
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn with_retry_delay_base(mut self, delay: Duration) -> Self {
        self.config.retry_delay_base = delay;
        self
    }

    /// Build the FetchConfig instance
    pub fn build(self) -> FetchConfig {
        self.config
    }
}

impl Default for FetchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`ResolverConfig`]
#[derive(Debug, Clone)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            config: ResolverConfig {
                source_url: source_url.into(),
                ..ResolverConfig::default()
            },
        }
    }

    /// Add a request header sent with manifest and key fetches
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        insert_header(&mut self.config.headers, name.as_ref(), value.as_ref());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    /// Use a fixed base URL instead of deriving one from the manifest location
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.config.base_url = (!base_url.is_empty()).then_some(base_url);
        self
    }

    pub fn with_key_override(mut self, key: KeyOverride) -> Self {
        self.config.key_override = Some(key);
        self
    }

    pub fn with_iv_override(mut self, iv: impl Into<String>) -> Self {
        let iv = iv.into();
        self.config.iv_override = (!iv.is_empty()).then_some(iv);
        self
    }

    /// Set the window to keep; `None` (e.g. from a malformed spec) keeps everything
    pub fn with_range(mut self, range: Option<RangeSpec>) -> Self {
        self.config.range = range;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = work_dir.into();
        self
    }

    pub fn with_audio_only(mut self, audio_only: bool) -> Self {
        self.config.audio_only = audio_only;
        self
    }

    pub fn with_ad_removal(mut self, remove_ads: bool) -> Self {
        self.config.remove_ads = remove_ads;
        self
    }

    pub fn with_max_redirect_depth(mut self, depth: usize) -> Self {
        self.config.max_redirect_depth = depth;
        self
    }

    pub fn with_manifest_timeout(mut self, timeout: Duration) -> Self {
        self.config.manifest_timeout = timeout;
        self
    }

    pub fn with_key_timeout(mut self, timeout: Duration) -> Self {
        self.config.key_timeout = timeout;
        self
    }

    /// Replace the provider rule registry
    pub fn with_rules(mut self, rules: ProviderRules) -> Self {
        self.config.rules = rules;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<ResolverConfig, ResolveError> {
        if self.config.source_url.trim().is_empty() {
            return Err(ResolveError::Config("source URL is empty".to_string()));
        }
        if self.config.max_redirect_depth == 0 {
            return Err(ResolveError::Config(
                "max redirect depth must be at least 1".to_string(),
            ));
        }
        if let Some(KeyOverride::Base64(key)) | Some(KeyOverride::File(key)) =
            &self.config.key_override
        {
            if key.trim().is_empty() {
                return Err(ResolveError::Config("key override is empty".to_string()));
            }
        }
        Ok(self.config)
    }
}
