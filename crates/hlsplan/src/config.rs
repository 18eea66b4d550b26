use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::plan::RangeSpec;
use crate::providers::ProviderRules;
use crate::proxy::ProxyConfig;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Transport options for the HTTP fetch collaborator
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Overall timeout for a request, zero disables it
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// Upper bound on followed redirects
    pub max_redirects: usize,

    /// User agent string
    pub user_agent: String,

    /// Headers sent with every request
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,

    pub danger_accept_invalid_certs: bool,

    /// Retries for connect/timeout failures and 5xx responses
    pub max_retries: u32,

    /// Base for exponential backoff between retries
    pub retry_delay_base: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            max_redirects: 10,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: FetchConfig::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
            danger_accept_invalid_certs: false,
            max_retries: 2,
            retry_delay_base: Duration::from_millis(500),
        }
    }
}

impl FetchConfig {
    pub fn builder() -> crate::builder::FetchConfigBuilder {
        crate::builder::FetchConfigBuilder::new()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        default_headers
    }
}

/// Explicit key material supplied by the caller instead of the manifest's key directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOverride {
    /// Base64 encoded key bytes
    Base64(String),
    /// Path or URI of a file holding the raw key bytes
    File(String),
}

/// Everything one resolution job needs to know.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Manifest URL, `file:` URI or local path
    pub source_url: String,

    /// Headers sent with manifest and key requests
    pub headers: HeaderMap,

    /// Base URL override; derived from the final manifest URL when absent
    pub base_url: Option<String>,

    pub key_override: Option<KeyOverride>,

    /// IV used together with `key_override`, hex with or without `0x`
    pub iv_override: Option<String>,

    /// Time or index window to keep
    pub range: Option<RangeSpec>,

    /// Per-job working directory receiving `raw.m3u8`, `meta.json` and friends
    pub work_dir: PathBuf,

    /// Re-resolve a single external audio track as the primary stream
    pub audio_only: bool,

    /// Drop segments matched by the ad rules
    pub remove_ads: bool,

    /// Maximum number of master/audio redirections for one job
    pub max_redirect_depth: usize,

    pub manifest_timeout: Duration,

    pub key_timeout: Duration,

    pub rules: ProviderRules,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            headers: HeaderMap::new(),
            base_url: None,
            key_override: None,
            iv_override: None,
            range: None,
            work_dir: PathBuf::from("./Downloads"),
            audio_only: false,
            remove_ads: true,
            max_redirect_depth: 4,
            manifest_timeout: Duration::from_secs(60),
            key_timeout: Duration::from_secs(60),
            rules: ProviderRules::default(),
        }
    }
}

impl ResolverConfig {
    pub fn builder(source_url: impl Into<String>) -> crate::builder::ResolverConfigBuilder {
        crate::builder::ResolverConfigBuilder::new(source_url)
    }
}
