use std::collections::BTreeMap;

use serde::Serialize;

/// One media segment of the plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Byte-range length, `-1` when the whole resource is wanted
    pub expect_byte: i64,
    pub start_byte: i64,
    pub index: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    /// Base64 key material
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub iv: String,
    pub duration: f64,
    #[serde(rename = "segUri", skip_serializing_if = "String::is_empty")]
    pub uri: String,
}

impl Default for Segment {
    fn default() -> Self {
        Self {
            expect_byte: -1,
            start_byte: 0,
            index: 0,
            method: "NONE".to_string(),
            key: String::new(),
            iv: String::new(),
            duration: 0.0,
            uri: String::new(),
        }
    }
}

/// Run of segments between two discontinuities
pub type Part = Vec<Segment>;

/// Attributes of one `#EXT-X-STREAM-INF` entry, keyed like the tag itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariantDescriptor {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "BANDWIDTH", skip_serializing_if = "String::is_empty")]
    pub bandwidth: String,
    #[serde(rename = "AVERAGE-BANDWIDTH", skip_serializing_if = "String::is_empty")]
    pub average_bandwidth: String,
    #[serde(rename = "CODECS", skip_serializing_if = "String::is_empty")]
    pub codecs: String,
    #[serde(rename = "RESOLUTION", skip_serializing_if = "String::is_empty")]
    pub resolution: String,
    #[serde(rename = "FRAME-RATE", skip_serializing_if = "String::is_empty")]
    pub frame_rate: String,
    #[serde(rename = "HDCP-LEVEL", skip_serializing_if = "String::is_empty")]
    pub hdcp_level: String,
    #[serde(rename = "AUDIO", skip_serializing_if = "String::is_empty")]
    pub audio_group: String,
    #[serde(rename = "VIDEO", skip_serializing_if = "String::is_empty")]
    pub video_group: String,
    #[serde(rename = "SUBTITLES", skip_serializing_if = "String::is_empty")]
    pub subtitle_group: String,
    #[serde(rename = "CLOSED-CAPTIONS", skip_serializing_if = "String::is_empty")]
    pub closed_captions: String,
}

impl VariantDescriptor {
    /// Bandwidth as a number; unparsable values count as zero
    pub fn bandwidth_value(&self) -> i64 {
        self.bandwidth.trim().parse().unwrap_or(0)
    }

    /// The one-line JSON record exported in `playLists.json`
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Alternate audio or subtitle rendition from `#EXT-X-MEDIA`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaTrack {
    pub name: String,
    pub language: String,
    /// Absolute URI; empty when the rendition is muxed into the variant
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<String>,
}

/// Group id to tracks, tracks in declaration order
pub type MediaGroups = BTreeMap<String, Vec<MediaTrack>>;

/// Human-readable label such as `[English] [en] [2ch]`; empty fields are left out.
pub fn track_label(track: &MediaTrack) -> String {
    let channels = match track.channels.as_deref() {
        Some(ch) if !ch.is_empty() => format!("{ch}ch"),
        _ => String::new(),
    };
    format!("[{}] [{}] [{}]", track.name, track.language, channels)
        .replace("[]", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The `#EXT-X-MAP` initialization section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSegment {
    pub uri: String,
    pub byte_range: Option<String>,
}

impl InitSegment {
    /// Value of the `extMAP` field: the bare URI when a byte range is present,
    /// `URI|` otherwise.
    pub fn ext_map_value(&self) -> String {
        match self.byte_range.as_deref() {
            Some(range) if !range.is_empty() => self.uri.clone(),
            _ => format!("{}|", self.uri),
        }
    }
}

/// The highest-bandwidth variant seen so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestVariant {
    pub bandwidth: i64,
    pub url: String,
    pub audio_group: String,
    pub subtitle_group: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_json_shape() {
        let segment = Segment {
            index: 3,
            duration: 10.0,
            uri: "https://h/3.ts".to_string(),
            ..Segment::default()
        };
        assert_eq!(
            serde_json::to_string(&segment).unwrap(),
            r#"{"expectByte":-1,"startByte":0,"index":3,"method":"NONE","duration":10.0,"segUri":"https://h/3.ts"}"#
        );
    }

    #[test]
    fn test_variant_text() {
        let variant = VariantDescriptor {
            url: "https://h/720.m3u8".to_string(),
            bandwidth: "1280000".to_string(),
            codecs: "avc1.4d401f,mp4a.40.2".to_string(),
            audio_group: "aac".to_string(),
            ..VariantDescriptor::default()
        };
        assert_eq!(
            variant.to_text().unwrap(),
            r#"{"URL":"https://h/720.m3u8","BANDWIDTH":"1280000","CODECS":"avc1.4d401f,mp4a.40.2","AUDIO":"aac"}"#
        );
        assert_eq!(variant.bandwidth_value(), 1_280_000);
        assert_eq!(VariantDescriptor::default().bandwidth_value(), 0);
    }

    #[test]
    fn test_track_label() {
        let track = MediaTrack {
            name: "English".to_string(),
            language: "en".to_string(),
            uri: String::new(),
            channels: Some("2".to_string()),
        };
        assert_eq!(track_label(&track), "[English] [en] [2ch]");

        let track = MediaTrack {
            name: "Commentary".to_string(),
            ..MediaTrack::default()
        };
        assert_eq!(track_label(&track), "[Commentary]");
    }

    #[test]
    fn test_ext_map_value() {
        let with_range = InitSegment {
            uri: "https://h/init.mp4".to_string(),
            byte_range: Some("720@0".to_string()),
        };
        assert_eq!(with_range.ext_map_value(), "https://h/init.mp4");

        let without = InitSegment {
            uri: "https://h/init.mp4".to_string(),
            byte_range: None,
        };
        assert_eq!(without.ext_map_value(), "https://h/init.mp4|");
    }

    #[test]
    fn test_media_track_json() {
        let track = MediaTrack {
            name: "English".to_string(),
            language: "en".to_string(),
            uri: "https://h/en.m3u8".to_string(),
            channels: None,
        };
        assert_eq!(
            serde_json::to_string(&track).unwrap(),
            r#"{"Name":"English","Language":"en","Uri":"https://h/en.m3u8"}"#
        );
    }
}
