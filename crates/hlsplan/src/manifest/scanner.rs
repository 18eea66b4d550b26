//! Line-oriented scanner turning manifest text into parts, variants and tracks.

use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::manifest::attributes::AttributeList;
use crate::manifest::directive::Directive;
use crate::manifest::key::KeyResolver;
use crate::manifest::types::{
    BestVariant, InitSegment, MediaGroups, MediaTrack, Part, Segment, VariantDescriptor,
};
use crate::providers::{ProviderRules, UriKind};
use crate::url_utils::combine;

/// Inputs a session reads but never changes.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    /// URL the manifest was requested from, after source rewrites
    pub source_url: &'a str,
    pub base_url: &'a str,
    pub remove_ads: bool,
    pub rules: &'a ProviderRules,
}

/// Everything one pass learned from its manifest.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub parts: Vec<Part>,
    pub start_index: i64,
    /// Index the next segment would have received
    pub next_index: i64,
    pub target_duration: i64,
    pub total_duration: f64,
    pub is_vod: bool,
    pub variants: Vec<VariantDescriptor>,
    pub best_variant: Option<BestVariant>,
    pub audio_groups: MediaGroups,
    pub subtitle_groups: MediaGroups,
    pub init_segment: Option<InitSegment>,
    pub program_date_time: Option<String>,
    pub requires_binary_fallback: bool,
    pub removed_ad_segments: usize,
}

impl ScanOutcome {
    /// True when the manifest listed at least one variant stream
    pub fn is_master(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.parts.iter().map(Vec::len).sum()
    }
}

/// Mutable state of one resolution pass. Consumed by [`scan`](Self::scan).
pub struct ResolutionSession<'a> {
    ctx: ScanContext<'a>,
    keys: KeyResolver<'a>,

    seen_header: bool,
    expect_segment: bool,
    expect_variant: bool,
    in_ad_block: bool,
    pending_ad_merge: bool,

    pending: Segment,
    pending_variant: VariantDescriptor,
    /// Where a byte range without explicit offset starts
    next_range_start: i64,
    index: i64,
    current: Part,
    out: ScanOutcome,
}

impl<'a> ResolutionSession<'a> {
    pub fn new(ctx: ScanContext<'a>, keys: KeyResolver<'a>) -> Self {
        Self {
            ctx,
            keys,
            seen_header: false,
            expect_segment: false,
            expect_variant: false,
            in_ad_block: false,
            pending_ad_merge: false,
            pending: Segment::default(),
            pending_variant: VariantDescriptor::default(),
            next_range_start: 0,
            index: 0,
            current: Part::new(),
            out: ScanOutcome::default(),
        }
    }

    pub async fn scan(mut self, content: &str) -> Result<ScanOutcome, ResolveError> {
        let content = content.trim_start_matches('\u{feff}');

        for line in content.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }

            let directive = Directive::parse(line);
            if let Directive::UplynkSegment(marker) = directive {
                if marker.contains(",ad") {
                    self.in_ad_block = true;
                } else if marker.contains(",segment") {
                    self.in_ad_block = false;
                }
                continue;
            }
            if self.in_ad_block {
                continue;
            }

            match directive {
                Directive::Header => self.seen_header = true,
                Directive::ByteRange(value) => self.on_byte_range(value),
                Directive::TargetDuration(value) => {
                    if let Some(duration) = parse_number(value) {
                        self.out.target_duration = duration;
                    }
                }
                Directive::MediaSequence(value) => match value.trim().parse::<i64>() {
                    Ok(sequence) => {
                        self.index = sequence;
                        self.out.start_index = sequence;
                    }
                    Err(_) => warn!(value = %value, "Ignoring malformed media sequence"),
                },
                Directive::ProgramDateTime(value) => {
                    if self.out.program_date_time.is_none() {
                        self.out.program_date_time = Some(value.trim().to_string());
                    }
                }
                Directive::Discontinuity => self.on_discontinuity(),
                Directive::Key(value) => {
                    self.keys.on_key_directive(value, self.ctx.base_url).await?;
                }
                Directive::Inf(value) => self.on_inf(value),
                Directive::StreamInf(value) => self.on_stream_inf(value),
                Directive::Media(value) => self.on_media(value),
                Directive::EndList => {
                    self.close_part();
                    self.out.is_vod = true;
                }
                Directive::Map(value) => {
                    if self.out.init_segment.is_some() {
                        debug!("Second initialization section, stopping scan");
                        self.close_part();
                        self.out.is_vod = true;
                        break;
                    }
                    self.on_map(value);
                }
                Directive::Uri(uri) => {
                    if self.expect_segment {
                        self.on_segment_uri(uri);
                    } else if self.expect_variant {
                        self.on_variant_uri(uri);
                    }
                }
                Directive::IFrameStreamInf | Directive::Ignored | Directive::UplynkSegment(_) => {}
            }
        }

        if !self.seen_header {
            return Err(ResolveError::invalid(
                self.ctx.source_url,
                "missing #EXTM3U header",
            ));
        }

        self.close_part();
        self.out.next_index = self.index;
        self.out.requires_binary_fallback = self.keys.requires_binary_fallback();
        debug!(
            parts = self.out.parts.len(),
            segments = self.out.segment_count(),
            variants = self.out.variants.len(),
            removed_ads = self.out.removed_ad_segments,
            "Manifest scanned"
        );
        Ok(self.out)
    }

    fn close_part(&mut self) {
        if !self.current.is_empty() {
            self.out.parts.push(std::mem::take(&mut self.current));
        }
    }

    fn on_byte_range(&mut self, value: &str) {
        let (length, offset) = match value.split_once('@') {
            Some((length, offset)) => (length, Some(offset)),
            None => (value, None),
        };
        let length = length.trim().parse::<i64>().unwrap_or(0);
        let offset = offset
            .and_then(|o| o.trim().parse::<i64>().ok())
            .unwrap_or(self.next_range_start);

        self.pending.expect_byte = length;
        self.pending.start_byte = offset;
        self.next_range_start = offset + length;
        self.expect_segment = true;
    }

    fn on_discontinuity(&mut self) {
        if self.pending_ad_merge {
            if let Some(mut previous) = self.out.parts.pop() {
                previous.append(&mut self.current);
                self.current = previous;
                self.pending_ad_merge = false;
                debug!("Merged part split by removed advertisement");
            } else if !self.current.is_empty() {
                self.pending_ad_merge = false;
            }
            return;
        }
        self.close_part();
    }

    fn on_inf(&mut self, value: &str) {
        let duration = value
            .split(',')
            .next()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .unwrap_or(0.0);

        let key = self.keys.state();
        self.pending.index = self.index;
        self.pending.method = key.method.clone();
        if key.is_encrypted() {
            self.pending.key = key.key.clone();
            self.pending.iv = key.iv_for(self.index);
        }
        self.pending.duration = duration;

        self.out.total_duration += duration;
        self.index += 1;
        self.expect_segment = true;
    }

    fn on_segment_uri(&mut self, line: &str) {
        let uri = combine(self.ctx.base_url, line);
        let uri = self
            .ctx
            .rules
            .with_query_suffixes(self.ctx.source_url, uri, UriKind::Segment);

        let mut segment = std::mem::take(&mut self.pending);
        segment.uri = uri;
        self.expect_segment = false;

        if self.ctx.remove_ads && self.ctx.rules.is_ad_segment(&segment.uri) {
            debug!(index = segment.index, uri = %segment.uri, "Dropping advertisement segment");
            self.index -= 1;
            self.out.total_duration -= segment.duration;
            self.out.removed_ad_segments += 1;
            self.pending_ad_merge = true;
            return;
        }
        self.current.push(segment);
    }

    fn on_stream_inf(&mut self, value: &str) {
        let attrs = AttributeList::parse(value);
        self.pending_variant = VariantDescriptor {
            url: String::new(),
            bandwidth: attrs.text("BANDWIDTH").to_string(),
            average_bandwidth: attrs.text("AVERAGE-BANDWIDTH").to_string(),
            codecs: attrs.text("CODECS").to_string(),
            resolution: attrs.text("RESOLUTION").to_string(),
            frame_rate: attrs.text("FRAME-RATE").to_string(),
            hdcp_level: attrs.text("HDCP-LEVEL").to_string(),
            audio_group: attrs.text("AUDIO").to_string(),
            video_group: attrs.text("VIDEO").to_string(),
            subtitle_group: attrs.text("SUBTITLES").to_string(),
            closed_captions: attrs.text("CLOSED-CAPTIONS").to_string(),
        };
        self.expect_variant = true;
    }

    fn on_variant_uri(&mut self, line: &str) {
        let url = combine(self.ctx.base_url, line);
        let url = self
            .ctx
            .rules
            .with_query_suffixes(self.ctx.source_url, url, UriKind::Variant);

        let mut variant = std::mem::take(&mut self.pending_variant);
        variant.url = url;
        self.expect_variant = false;

        let bandwidth = variant.bandwidth_value();
        if self
            .out
            .best_variant
            .as_ref()
            .is_none_or(|best| bandwidth >= best.bandwidth)
        {
            self.out.best_variant = Some(BestVariant {
                bandwidth,
                url: variant.url.clone(),
                audio_group: variant.audio_group.clone(),
                subtitle_group: variant.subtitle_group.clone(),
            });
        }
        debug!(url = %variant.url, bandwidth, "Variant stream");
        self.out.variants.push(variant);
    }

    fn on_media(&mut self, value: &str) {
        let attrs = AttributeList::parse(value);
        let groups = match attrs.text("TYPE") {
            "AUDIO" => &mut self.out.audio_groups,
            "SUBTITLES" => &mut self.out.subtitle_groups,
            _ => return,
        };

        let uri = attrs.text("URI");
        let track = MediaTrack {
            name: attrs.text("NAME").to_string(),
            language: attrs.text("LANGUAGE").to_string(),
            uri: if uri.is_empty() {
                String::new()
            } else {
                combine(self.ctx.base_url, uri)
            },
            channels: attrs
                .get("CHANNELS")
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        };
        groups
            .entry(attrs.text("GROUP-ID").to_string())
            .or_default()
            .push(track);
    }

    fn on_map(&mut self, value: &str) {
        let attrs = AttributeList::parse(value);
        let uri = attrs.text("URI");
        let uri = if uri.starts_with("http") {
            uri.to_string()
        } else {
            combine(self.ctx.base_url, uri)
        };
        self.out.init_segment = Some(InitSegment {
            uri,
            byte_range: attrs.get("BYTERANGE").map(str::to_string),
        });
    }
}

fn parse_number(value: &str) -> Option<i64> {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|v| v as i64))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::header::HeaderMap;

    use super::*;
    use crate::fetch::{FetchError, UriFetcher};

    struct NoFetch;

    #[async_trait]
    impl UriFetcher for NoFetch {
        async fn fetch(
            &self,
            uri: &str,
            _headers: &HeaderMap,
            _timeout: Duration,
        ) -> Result<Bytes, FetchError> {
            if uri.ends_with(".key") {
                return Ok(Bytes::from_static(&[7u8; 16]));
            }
            Err(FetchError::UrlError(uri.to_string()))
        }

        async fn resolve_final_url(
            &self,
            uri: &str,
            _headers: &HeaderMap,
        ) -> Result<String, FetchError> {
            Ok(uri.to_string())
        }
    }

    async fn scan_with(content: &str, source_url: &str, remove_ads: bool) -> Result<ScanOutcome, ResolveError> {
        let headers = HeaderMap::new();
        let rules = ProviderRules::default();
        let keys = KeyResolver::new(&NoFetch, &headers, Duration::from_secs(1), &rules);
        let ctx = ScanContext {
            source_url,
            base_url: "https://h/live/",
            remove_ads,
            rules: &rules,
        };
        ResolutionSession::new(ctx, keys).scan(content).await
    }

    async fn scan(content: &str) -> ScanOutcome {
        scan_with(content, "https://h/live/index.m3u8", true)
            .await
            .unwrap()
    }

    fn uris(part: &Part) -> Vec<&str> {
        part.iter().map(|s| s.uri.as_str()).collect()
    }

    #[tokio::test]
    async fn test_media_playlist_basics() {
        let outcome = scan(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:100\n\
             #EXTINF:9.5,\nseg100.ts\n#EXTINF:10,\n/abs/seg101.ts\n#EXT-X-ENDLIST\n",
        )
        .await;

        assert!(outcome.is_vod);
        assert!(!outcome.is_master());
        assert_eq!(outcome.target_duration, 10);
        assert_eq!(outcome.start_index, 100);
        assert_eq!(outcome.next_index, 102);
        assert_eq!(outcome.total_duration, 19.5);
        assert_eq!(outcome.parts.len(), 1);
        assert_eq!(
            uris(&outcome.parts[0]),
            vec!["https://h/live/seg100.ts", "https://h/abs/seg101.ts"]
        );
        assert_eq!(outcome.parts[0][0].index, 100);
        assert_eq!(outcome.parts[0][0].method, "NONE");
        assert_eq!(outcome.parts[0][0].expect_byte, -1);
    }

    #[tokio::test]
    async fn test_missing_header_is_invalid() {
        let err = scan_with("#EXTINF:1,\na.ts\n", "https://h/live/index.m3u8", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidManifest { .. }));
    }

    #[tokio::test]
    async fn test_discontinuities_split_parts() {
        let outcome = scan(
            "#EXTM3U\n#EXTINF:1,\na.ts\n#EXTINF:1,\nb.ts\n#EXT-X-DISCONTINUITY\n\
             #EXT-X-DISCONTINUITY\n#EXTINF:1,\nc.ts\n",
        )
        .await;

        // no ENDLIST: live, last part still emitted
        assert!(!outcome.is_vod);
        assert_eq!(outcome.parts.len(), 2);
        assert_eq!(outcome.parts[0].len(), 2);
        assert_eq!(outcome.parts[1][0].index, 2);
        assert!(outcome.parts.iter().all(|p| !p.is_empty()));
    }

    #[tokio::test]
    async fn test_ad_merge_keeps_single_part() {
        let outcome = scan(
            "#EXTM3U\n#EXTINF:5,\nhttps://ad/ad/a.ts?ccode=01&duration=5\n#EXT-X-DISCONTINUITY\n\
             #EXTINF:10,\nb.ts\n#EXT-X-DISCONTINUITY\n#EXTINF:10,\nc.ts\n#EXT-X-ENDLIST\n",
        )
        .await;

        assert_eq!(outcome.parts.len(), 1);
        assert_eq!(
            uris(&outcome.parts[0]),
            vec!["https://h/live/b.ts", "https://h/live/c.ts"]
        );
        assert_eq!(outcome.parts[0][0].index, 0);
        assert_eq!(outcome.parts[0][1].index, 1);
        assert_eq!(outcome.total_duration, 20.0);
        assert_eq!(outcome.removed_ad_segments, 1);
    }

    #[tokio::test]
    async fn test_ad_merge_rejoins_closed_part() {
        let outcome = scan(
            "#EXTM3U\n#EXTINF:10,\na.ts\n#EXT-X-DISCONTINUITY\n\
             #EXTINF:5,\nx.ts?ccode=0902&duration=5\n#EXT-X-DISCONTINUITY\n\
             #EXTINF:10,\nb.ts\n#EXT-X-ENDLIST\n",
        )
        .await;

        assert_eq!(outcome.parts.len(), 1);
        assert_eq!(
            uris(&outcome.parts[0]),
            vec!["https://h/live/a.ts", "https://h/live/b.ts"]
        );
    }

    #[tokio::test]
    async fn test_ads_kept_when_removal_disabled() {
        let outcome = scan_with(
            "#EXTM3U\n#EXTINF:5,\nx.ts?ccode=0902&duration=5\n#EXTINF:10,\nb.ts\n",
            "https://h/live/index.m3u8",
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.segment_count(), 2);
    }

    #[tokio::test]
    async fn test_uplynk_ad_block_is_skipped() {
        let outcome = scan(
            "#EXTM3U\n#EXTINF:10,\na.ts\n#UPLYNK-SEGMENT: x,00000000,ad\n#EXTINF:10,\nad1.ts\n\
             #EXT-X-DISCONTINUITY\n#UPLYNK-SEGMENT: y,00000001,segment\n#EXTINF:10,\nb.ts\n",
        )
        .await;
        assert_eq!(outcome.parts.len(), 1);
        assert_eq!(
            uris(&outcome.parts[0]),
            vec!["https://h/live/a.ts", "https://h/live/b.ts"]
        );
        assert_eq!(outcome.parts[0][1].index, 1);
    }

    #[tokio::test]
    async fn test_key_persistence_and_default_iv() {
        let outcome = scan(
            "#EXTM3U\n#EXTINF:1,\na.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.key\"\n\
             #EXTINF:1,\nb.ts\n#EXTINF:1,\nc.ts\n\
             #EXT-X-KEY:METHOD=AES-128,URI=\"k.key\",IV=0x0000000000000000000000000000000A\n\
             #EXTINF:1,\nd.ts\n#EXT-X-KEY:METHOD=NONE\n#EXTINF:1,\ne.ts\n",
        )
        .await;

        let segments = &outcome.parts[0];
        assert_eq!(segments[0].method, "NONE");
        assert!(segments[0].key.is_empty());
        assert_eq!(segments[1].method, "AES-128");
        assert_eq!(segments[1].iv, "0x1");
        assert_eq!(segments[2].iv, "0x2");
        assert_eq!(segments[1].key, segments[2].key);
        assert_eq!(segments[3].iv, "0x0000000000000000000000000000000A");
        assert_eq!(segments[3].key, segments[1].key);
        assert_eq!(segments[4].method, "NONE");
        assert!(segments[4].iv.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_method_sets_fallback() {
        let outcome = scan(
            "#EXTM3U\n#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"skd://x\"\n#EXTINF:1,\na.ts\n",
        )
        .await;
        assert!(outcome.requires_binary_fallback);
        assert_eq!(outcome.parts[0][0].method, "SAMPLE-AES(NOTSUPPORTED)");
    }

    #[tokio::test]
    async fn test_byte_ranges() {
        let outcome = scan(
            "#EXTM3U\n#EXTINF:1,\n#EXT-X-BYTERANGE:100@0\nmain.ts\n\
             #EXTINF:1,\n#EXT-X-BYTERANGE:50\nmain.ts\n#EXTINF:1,\nother.ts\n",
        )
        .await;
        let segments = &outcome.parts[0];
        assert_eq!((segments[0].expect_byte, segments[0].start_byte), (100, 0));
        assert_eq!((segments[1].expect_byte, segments[1].start_byte), (50, 100));
        assert_eq!((segments[2].expect_byte, segments[2].start_byte), (-1, 0));
    }

    #[tokio::test]
    async fn test_master_playlist() {
        let outcome = scan(
            "#EXTM3U\n\
             #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aac\",NAME=\"English\",LANGUAGE=\"en\",CHANNELS=\"2\",URI=\"audio/en.m3u8\"\n\
             #EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"English\",LANGUAGE=\"en\",URI=\"subs/en.m3u8\"\n\
             #EXT-X-MEDIA:TYPE=VIDEO,GROUP-ID=\"v\",NAME=\"x\"\n\
             #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,AUDIO=\"aac\"\nlow.m3u8\n\
             #EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=9000000,URI=\"iframe.m3u8\"\n\
             #EXT-X-STREAM-INF:BANDWIDTH=1600000,AUDIO=\"aac\",SUBTITLES=\"subs\"\nv1.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=1600000,AUDIO=\"aac\",SUBTITLES=\"subs\"\nv2.m3u8\n",
        )
        .await;

        assert!(outcome.is_master());
        assert_eq!(outcome.variants.len(), 3);
        let best = outcome.best_variant.unwrap();
        assert_eq!(best.url, "https://h/live/v2.m3u8");
        assert_eq!(best.audio_group, "aac");
        assert_eq!(best.subtitle_group, "subs");
        assert_eq!(outcome.audio_groups["aac"][0].uri, "https://h/live/audio/en.m3u8");
        assert_eq!(outcome.audio_groups["aac"][0].channels.as_deref(), Some("2"));
        assert_eq!(outcome.subtitle_groups["subs"][0].language, "en");
        assert_eq!(outcome.subtitle_groups["subs"][0].channels, None);
        assert!(outcome.parts.is_empty());
    }

    #[tokio::test]
    async fn test_init_sections() {
        let outcome = scan(
            "#EXTM3U\n#EXT-X-MAP:URI=\"init.mp4\"\n#EXTINF:1,\na.m4s\n\
             #EXT-X-MAP:URI=\"init2.mp4\"\n#EXTINF:1,\nb.m4s\n",
        )
        .await;
        assert!(outcome.is_vod);
        assert_eq!(outcome.segment_count(), 1);
        let init = outcome.init_segment.unwrap();
        assert_eq!(init.uri, "https://h/live/init.mp4");
        assert_eq!(init.byte_range, None);
    }

    #[tokio::test]
    async fn test_query_suffix_and_program_date_time() {
        let outcome = scan_with(
            "#EXTM3U\n#EXT-X-PROGRAM-DATE-TIME:2024-05-01T10:00:00.000Z\n#EXTINF:1,\na.ts\n\
             #EXT-X-PROGRAM-DATE-TIME:2024-05-01T10:00:01.000Z\n#EXTINF:1,\nb.ts\n",
            "https://h/live/index.m3u8?__gda__=1_x",
            true,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome.program_date_time.as_deref(),
            Some("2024-05-01T10:00:00.000Z")
        );
        assert_eq!(outcome.parts[0][0].uri, "https://h/live/a.ts?__gda__=1_x");
    }
}
