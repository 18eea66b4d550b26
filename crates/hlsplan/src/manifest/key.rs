//! Encryption state tracking for `#EXT-X-KEY`.
//!
//! Only the parameters are resolved here: which method, which key material and
//! which IV apply to each segment. Segment bytes are never decrypted.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};

use crate::config::KeyOverride;
use crate::error::ResolveError;
use crate::fetch::UriFetcher;
use crate::manifest::attributes::AttributeList;
use crate::providers::ProviderRules;
use crate::url_utils::combine;

pub const METHOD_NONE: &str = "NONE";
pub const METHOD_AES_128: &str = "AES-128";

const INLINE_KEY_PREFIX: &str = "base64:";

/// Encryption parameters currently in force.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    pub method: String,
    /// Base64 key material
    pub key: String,
    pub iv: String,
}

impl Default for KeyState {
    fn default() -> Self {
        Self {
            method: METHOD_NONE.to_string(),
            key: String::new(),
            iv: String::new(),
        }
    }
}

impl KeyState {
    pub fn is_encrypted(&self) -> bool {
        self.method != METHOD_NONE
    }

    /// The IV for the segment at `index`: the declared one, else the index as hex
    pub fn iv_for(&self, index: i64) -> String {
        if self.iv.is_empty() {
            format!("0x{index:x}")
        } else {
            self.iv.clone()
        }
    }
}

/// Normalise an IV to `0x`-prefixed hex
pub fn normalize_iv(iv: &str) -> String {
    let iv = iv.trim();
    let digits = iv
        .strip_prefix("0x")
        .or_else(|| iv.strip_prefix("0X"))
        .unwrap_or(iv);
    format!("0x{digits}")
}

/// Resolves key directives for one pass.
pub struct KeyResolver<'a> {
    fetcher: &'a dyn UriFetcher,
    headers: &'a HeaderMap,
    timeout: Duration,
    rules: &'a ProviderRules,
    state: KeyState,
    /// URI of the preceding key directive with the material it resolved to
    last: Option<(String, String)>,
    overridden: bool,
    requires_binary_fallback: bool,
}

impl<'a> KeyResolver<'a> {
    pub fn new(
        fetcher: &'a dyn UriFetcher,
        headers: &'a HeaderMap,
        timeout: Duration,
        rules: &'a ProviderRules,
    ) -> Self {
        Self {
            fetcher,
            headers,
            timeout,
            rules,
            state: KeyState::default(),
            last: None,
            overridden: false,
            requires_binary_fallback: false,
        }
    }

    pub fn state(&self) -> &KeyState {
        &self.state
    }

    /// Set when a method other than AES-128 was seen
    pub fn requires_binary_fallback(&self) -> bool {
        self.requires_binary_fallback
    }

    /// Install caller-supplied key material. Key directives in the manifest can
    /// afterwards only contribute an IV.
    pub async fn apply_override(
        &mut self,
        key: &KeyOverride,
        iv: Option<&str>,
    ) -> Result<(), ResolveError> {
        let material = match key {
            KeyOverride::Base64(text) => text.trim().to_string(),
            KeyOverride::File(location) => {
                info!(key_file = %location, "Loading key file");
                let bytes = self
                    .fetcher
                    .fetch(location, self.headers, self.timeout)
                    .await
                    .map_err(|e| ResolveError::fetch(location.as_str(), e))?;
                STANDARD.encode(&bytes)
            }
        };

        self.state = KeyState {
            method: METHOD_AES_128.to_string(),
            key: material,
            iv: iv.map(normalize_iv).unwrap_or_default(),
        };
        self.overridden = true;
        Ok(())
    }

    /// Handle the attribute list of one `#EXT-X-KEY` directive.
    pub async fn on_key_directive(
        &mut self,
        attributes: &str,
        base_url: &str,
    ) -> Result<(), ResolveError> {
        let attrs = AttributeList::parse(attributes);

        if self.overridden {
            if self.state.iv.is_empty() {
                if let Some(iv) = attrs.get("IV").filter(|iv| !iv.is_empty()) {
                    self.state.iv = iv.to_string();
                }
            }
            return Ok(());
        }

        let Some(method) = attrs.get("METHOD").filter(|m| !m.is_empty()) else {
            return Ok(());
        };
        let uri = attrs.text("URI");
        let iv = attrs.text("IV");

        match method {
            METHOD_NONE => {
                debug!("Encryption cleared");
                self.state = KeyState::default();
                self.last = None;
            }
            METHOD_AES_128 => {
                let material = match &self.last {
                    Some((last_uri, material)) if last_uri == uri => material.clone(),
                    _ => self.resolve_material(uri, base_url).await?,
                };
                self.state = KeyState {
                    method: METHOD_AES_128.to_string(),
                    key: material.clone(),
                    iv: iv.to_string(),
                };
                self.last = Some((uri.to_string(), material));
            }
            other => {
                warn!(method = %other, "Unsupported encryption method, binary merge required");
                self.state = KeyState {
                    method: format!("{other}(NOTSUPPORTED)"),
                    key: String::new(),
                    iv: String::new(),
                };
                self.last = None;
                self.requires_binary_fallback = true;
            }
        }
        Ok(())
    }

    async fn resolve_material(&self, uri: &str, base_url: &str) -> Result<String, ResolveError> {
        if uri.is_empty() {
            warn!("AES-128 key directive without URI");
            return Ok(String::new());
        }
        if let Some(inline) = uri.strip_prefix(INLINE_KEY_PREFIX) {
            return Ok(inline.to_string());
        }

        let key_url = combine(base_url, uri);
        info!(url = %key_url, "Fetching key");
        let bytes = self
            .fetcher
            .fetch(&key_url, self.headers, self.timeout)
            .await
            .map_err(|e| ResolveError::fetch(key_url.as_str(), e))?;

        let bytes = match self.rules.key_rule(&key_url) {
            Some(rule) => {
                debug!(rule = rule.name, url = %key_url, "Applying key rule");
                (rule.transform)(&bytes).map_err(|reason| {
                    ResolveError::invalid(key_url.as_str(), format!("{}: {reason}", rule.name))
                })?
            }
            None => bytes.to_vec(),
        };
        if bytes.len() != 16 {
            warn!(url = %key_url, len = bytes.len(), "Key is not 16 bytes long");
        }
        Ok(STANDARD.encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::fetch::FetchError;

    #[derive(Default)]
    struct CountingFetcher {
        bodies: HashMap<String, Vec<u8>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UriFetcher for CountingFetcher {
        async fn fetch(
            &self,
            uri: &str,
            _headers: &HeaderMap,
            _timeout: Duration,
        ) -> Result<Bytes, FetchError> {
            self.calls.lock().unwrap().push(uri.to_string());
            self.bodies
                .get(uri)
                .map(|b| Bytes::from(b.clone()))
                .ok_or(FetchError::StatusCode(reqwest::StatusCode::NOT_FOUND))
        }

        async fn resolve_final_url(
            &self,
            uri: &str,
            _headers: &HeaderMap,
        ) -> Result<String, FetchError> {
            Ok(uri.to_string())
        }
    }

    fn fetcher() -> CountingFetcher {
        let mut bodies = HashMap::new();
        bodies.insert("https://h/k1.bin".to_string(), vec![1u8; 16]);
        bodies.insert("https://h/k2.bin".to_string(), vec![2u8; 16]);
        CountingFetcher {
            bodies,
            ..CountingFetcher::default()
        }
    }

    #[tokio::test]
    async fn test_reuses_material_for_repeated_uri() {
        let fetcher = fetcher();
        let headers = HeaderMap::new();
        let rules = ProviderRules::default();
        let mut keys = KeyResolver::new(&fetcher, &headers, Duration::from_secs(1), &rules);

        keys.on_key_directive(r#"METHOD=AES-128,URI="k1.bin""#, "https://h/")
            .await
            .unwrap();
        keys.on_key_directive(r#"METHOD=AES-128,URI="k1.bin",IV=0x01"#, "https://h/")
            .await
            .unwrap();
        assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
        assert_eq!(keys.state().key, STANDARD.encode([1u8; 16]));
        assert_eq!(keys.state().iv, "0x01");

        keys.on_key_directive(r#"METHOD=AES-128,URI="k2.bin""#, "https://h/")
            .await
            .unwrap();
        assert_eq!(fetcher.calls.lock().unwrap().len(), 2);
        assert_eq!(keys.state().key, STANDARD.encode([2u8; 16]));
        assert_eq!(keys.state().iv, "");
    }

    #[tokio::test]
    async fn test_method_handling() {
        let fetcher = fetcher();
        let headers = HeaderMap::new();
        let rules = ProviderRules::default();
        let mut keys = KeyResolver::new(&fetcher, &headers, Duration::from_secs(1), &rules);

        keys.on_key_directive(r#"URI="k1.bin""#, "https://h/").await.unwrap();
        assert_eq!(keys.state(), &KeyState::default());

        keys.on_key_directive(r#"METHOD=SAMPLE-AES,URI="k1.bin""#, "https://h/")
            .await
            .unwrap();
        assert_eq!(keys.state().method, "SAMPLE-AES(NOTSUPPORTED)");
        assert!(keys.requires_binary_fallback());
        assert!(fetcher.calls.lock().unwrap().is_empty());

        keys.on_key_directive(r#"METHOD=AES-128,URI="base64:AAEC""#, "https://h/")
            .await
            .unwrap();
        assert_eq!(keys.state().key, "AAEC");

        keys.on_key_directive("METHOD=NONE", "https://h/").await.unwrap();
        assert!(!keys.state().is_encrypted());
    }

    #[tokio::test]
    async fn test_override_keeps_material() {
        let fetcher = fetcher();
        let headers = HeaderMap::new();
        let rules = ProviderRules::default();
        let mut keys = KeyResolver::new(&fetcher, &headers, Duration::from_secs(1), &rules);

        keys.apply_override(&KeyOverride::Base64("AAAA".to_string()), None)
            .await
            .unwrap();
        keys.on_key_directive(r#"METHOD=AES-128,URI="k1.bin",IV=0xff"#, "https://h/")
            .await
            .unwrap();
        keys.on_key_directive(r#"METHOD=AES-128,URI="k2.bin",IV=0xee"#, "https://h/")
            .await
            .unwrap();

        assert!(fetcher.calls.lock().unwrap().is_empty());
        assert_eq!(keys.state().key, "AAAA");
        assert_eq!(keys.state().iv, "0xff");

        let mut keys = KeyResolver::new(&fetcher, &headers, Duration::from_secs(1), &rules);
        keys.apply_override(
            &KeyOverride::File("https://h/k2.bin".to_string()),
            Some("1234"),
        )
        .await
        .unwrap();
        assert_eq!(keys.state().key, STANDARD.encode([2u8; 16]));
        assert_eq!(keys.state().iv, "0x1234");
    }

    #[tokio::test]
    async fn test_missing_key_is_fatal() {
        let fetcher = fetcher();
        let headers = HeaderMap::new();
        let rules = ProviderRules::default();
        let mut keys = KeyResolver::new(&fetcher, &headers, Duration::from_secs(1), &rules);

        let err = keys
            .on_key_directive(r#"METHOD=AES-128,URI="/nope.bin""#, "https://h/a/")
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "fetch");
        assert!(err.to_string().contains("https://h/nope.bin"));
    }

    #[test]
    fn test_iv_helpers() {
        let state = KeyState::default();
        assert_eq!(state.iv_for(26), "0x1a");
        assert_eq!(normalize_iv("0XABCD"), "0xABCD");
        assert_eq!(normalize_iv("abcd"), "0xabcd");
    }
}
