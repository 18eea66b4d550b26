//! Site-specific manifest handling.
//!
//! Every quirk is a plain `predicate -> transform` entry so new CDNs can be
//! supported by pushing another rule instead of editing the scanner.
//! [`ProviderRules::default`] carries the built-in set.

use crate::url_utils::query_of;

/// Where a suffix would be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriKind {
    Segment,
    Variant,
}

/// Marks a segment URI as an inserted advertisement
#[derive(Debug, Clone, Copy)]
pub struct AdSegmentRule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
}

/// Copies part of the source manifest URL verbatim onto resolved URIs.
#[derive(Debug, Clone, Copy)]
pub struct QuerySuffixRule {
    pub name: &'static str,
    /// Receives the source manifest URL and returns the suffix to append, if any
    pub suffix: fn(&str) -> Option<&str>,
    /// Receives the resolved URI and its kind
    pub applies_to: fn(&str, UriKind) -> bool,
}

/// Post-processes fetched key bytes for one key endpoint
#[derive(Debug, Clone, Copy)]
pub struct KeyRule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub transform: fn(&[u8]) -> Result<Vec<u8>, String>,
}

/// Rewrites the source URL before it is fetched
#[derive(Debug, Clone, Copy)]
pub struct SourceRewriteRule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub rewrite: fn(&str) -> String,
}

/// Forces on-demand handling for source URLs that describe a finished recording
#[derive(Debug, Clone, Copy)]
pub struct VodHintRule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
}

#[derive(Debug, Clone)]
pub struct ProviderRules {
    pub ad_segments: Vec<AdSegmentRule>,
    pub query_suffixes: Vec<QuerySuffixRule>,
    pub keys: Vec<KeyRule>,
    pub source_rewrites: Vec<SourceRewriteRule>,
    pub vod_hints: Vec<VodHintRule>,
}

impl ProviderRules {
    /// A registry with no rules at all
    pub fn empty() -> Self {
        Self {
            ad_segments: Vec::new(),
            query_suffixes: Vec::new(),
            keys: Vec::new(),
            source_rewrites: Vec::new(),
            vod_hints: Vec::new(),
        }
    }

    pub fn is_ad_segment(&self, uri: &str) -> bool {
        self.ad_segments.iter().any(|rule| (rule.matches)(uri))
    }

    /// Append every applicable suffix taken from `source_url` to `uri`.
    pub fn with_query_suffixes(&self, source_url: &str, uri: String, kind: UriKind) -> String {
        self.query_suffixes.iter().fold(uri, |mut uri, rule| {
            if let Some(suffix) = (rule.suffix)(source_url) {
                if (rule.applies_to)(&uri, kind) {
                    uri.push_str(suffix);
                }
            }
            uri
        })
    }

    pub fn key_rule(&self, key_url: &str) -> Option<&KeyRule> {
        self.keys.iter().find(|rule| (rule.matches)(key_url))
    }

    pub fn rewrite_source(&self, source_url: &str) -> String {
        self.source_rewrites
            .iter()
            .fold(source_url.to_string(), |url, rule| {
                if (rule.matches)(&url) {
                    (rule.rewrite)(&url)
                } else {
                    url
                }
            })
    }

    pub fn forces_vod(&self, source_url: &str) -> bool {
        self.vod_hints.iter().any(|rule| (rule.matches)(source_url))
    }
}

impl Default for ProviderRules {
    fn default() -> Self {
        Self {
            ad_segments: vec![
                AdSegmentRule {
                    name: "youku-ad-path",
                    matches: |uri| {
                        uri.contains("ccode=") && uri.contains("/ad/") && uri.contains("duration=")
                    },
                },
                AdSegmentRule {
                    name: "youku-ad-ccode",
                    matches: |uri| uri.contains("ccode=0902") && uri.contains("duration="),
                },
            ],
            query_suffixes: vec![
                QuerySuffixRule {
                    name: "gda-token",
                    suffix: |source| source.find("?__gda__").map(|idx| &source[idx..]),
                    applies_to: |_, _| true,
                },
                QuerySuffixRule {
                    name: "cmvideo-query",
                    suffix: |source| {
                        if source.contains("//dlsc.hcs.cmvideo.cn") {
                            source.find('?').map(|idx| &source[idx..])
                        } else {
                            None
                        }
                    },
                    applies_to: |uri, kind| {
                        kind == UriKind::Segment && (uri.ends_with(".ts") || uri.ends_with(".mp4"))
                    },
                },
            ],
            keys: vec![
                KeyRule {
                    name: "ventunotech-hex-key",
                    matches: |url| url == "https://hls.ventunotech.com/m3u8/pc_videosecurevtnkey.key",
                    transform: decode_hex_key,
                },
                KeyRule {
                    name: "myqcloud-license",
                    matches: |url| url.contains("drm.vod2.myqcloud.com/getlicense"),
                    transform: |body| Ok(body.to_vec()),
                },
            ],
            source_rewrites: vec![SourceRewriteRule {
                name: "cntv-h5e",
                matches: |url| url.contains(".cntv."),
                rewrite: |url| url.replace("/h5e/", "/"),
            }],
            vod_hints: vec![VodHintRule {
                name: "cctv-playback-endtime",
                matches: |url| {
                    url.contains("tlivecloud-playback-cdn.ysp.cctv.cn")
                        && query_of(url).is_some_and(|query| query.contains("endtime"))
                },
            }],
        }
    }
}

/// Key endpoints that answer with the key as 32 hex digits instead of raw bytes
fn decode_hex_key(body: &[u8]) -> Result<Vec<u8>, String> {
    let text = std::str::from_utf8(body).map_err(|e| format!("key is not text: {e}"))?;
    let text = text.trim();
    let digits = text
        .get(..32)
        .ok_or_else(|| format!("expected 32 hex digits, got {} characters", text.len()))?;
    hex::decode(digits).map_err(|e| format!("invalid hex key: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ad_rules() {
        let rules = ProviderRules::default();
        assert!(rules.is_ad_segment("https://h/ad/x.ts?ccode=01&duration=5"));
        assert!(rules.is_ad_segment("https://h/x.ts?ccode=0902&duration=5"));
        assert!(!rules.is_ad_segment("https://h/ad/x.ts?ccode=01"));
        assert!(!rules.is_ad_segment("https://h/seg1.ts"));
        assert!(!ProviderRules::empty().is_ad_segment("https://h/x.ts?ccode=0902&duration=5"));
    }

    #[test]
    fn test_query_suffixes() {
        let rules = ProviderRules::default();

        let source = "https://h/a/index.m3u8?__gda__=123_abc";
        assert_eq!(
            rules.with_query_suffixes(source, "https://h/a/1.ts".into(), UriKind::Segment),
            "https://h/a/1.ts?__gda__=123_abc"
        );
        assert_eq!(
            rules.with_query_suffixes(source, "https://h/a/v.m3u8".into(), UriKind::Variant),
            "https://h/a/v.m3u8?__gda__=123_abc"
        );

        let source = "https://dlsc.hcs.cmvideo.cn/a/index.m3u8?msisdn=1&sign=x";
        assert_eq!(
            rules.with_query_suffixes(source, "https://h/a/1.ts".into(), UriKind::Segment),
            "https://h/a/1.ts?msisdn=1&sign=x"
        );
        assert_eq!(
            rules.with_query_suffixes(source, "https://h/a/1.aac".into(), UriKind::Segment),
            "https://h/a/1.aac"
        );
        assert_eq!(
            rules.with_query_suffixes(source, "https://h/a/v.ts".into(), UriKind::Variant),
            "https://h/a/v.ts"
        );

        assert_eq!(
            rules.with_query_suffixes("https://h/i.m3u8?t=1", "https://h/1.ts".into(), UriKind::Segment),
            "https://h/1.ts"
        );
    }

    #[test]
    fn test_key_rules() {
        let rules = ProviderRules::default();
        let rule = rules
            .key_rule("https://hls.ventunotech.com/m3u8/pc_videosecurevtnkey.key")
            .unwrap();
        assert_eq!(
            (rule.transform)(b"000102030405060708090a0b0c0d0e0f\n").unwrap(),
            (0u8..16).collect::<Vec<_>>()
        );
        assert!((rule.transform)(b"abc").is_err());

        let rule = rules
            .key_rule("https://drm.vod2.myqcloud.com/getlicense/v1?token=x")
            .unwrap();
        assert_eq!(rule.name, "myqcloud-license");
        assert_eq!((rule.transform)(&[1, 2, 3]).unwrap(), vec![1, 2, 3]);

        assert!(rules.key_rule("https://h/key.bin").is_none());
    }

    #[test]
    fn test_source_rules() {
        let rules = ProviderRules::default();
        assert_eq!(
            rules.rewrite_source("https://hls.cntv.example/h5e/a/index.m3u8"),
            "https://hls.cntv.example/a/index.m3u8"
        );
        assert_eq!(
            rules.rewrite_source("https://h/h5e/index.m3u8"),
            "https://h/h5e/index.m3u8"
        );

        assert!(rules.forces_vod(
            "https://tlivecloud-playback-cdn.ysp.cctv.cn/a/index.m3u8?starttime=1&endtime=2"
        ));
        assert!(!rules.forces_vod("https://tlivecloud-playback-cdn.ysp.cctv.cn/a/index.m3u8"));
    }
}
