//! `meta.json` and `playLists.json` writers.

use std::path::PathBuf;

use serde::ser::{Serialize, Serializer};
use tracing::info;

use crate::error::ResolveError;
use crate::manifest::{InitSegment, MediaGroups, Part, VariantDescriptor};
use crate::workspace::{MASTER_MANIFEST, META, PLAYLISTS, RAW_MANIFEST, Workspace};

/// Timestamp format shared by every artifact
pub fn update_time() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

/// The final segment plan handed to the download stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub source_url: String,
    pub base_url: String,
    pub update_time: String,
    /// Segments before trimming
    pub original_count: i64,
    pub count: i64,
    pub is_vod: bool,
    pub target_duration: i64,
    pub total_duration: f64,
    pub audio_url: Option<String>,
    pub subtitle_url: Option<String>,
    pub init_segment: Option<InitSegment>,
    pub parts: Vec<Part>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaDocument<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    m3u8: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    m3u8_base_uri: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    update_time: &'a str,
    m3u8_info: MetaInfo<'a>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaInfo<'a> {
    original_count: i64,
    count: i64,
    vod: bool,
    target_duration: i64,
    total_duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
    #[serde(rename = "extMAP", skip_serializing_if = "Option::is_none")]
    ext_map: Option<String>,
    #[serde(skip_serializing_if = "<[Part]>::is_empty")]
    segments: &'a [Part],
}

impl Serialize for Plan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MetaDocument {
            m3u8: &self.source_url,
            m3u8_base_uri: &self.base_url,
            update_time: &self.update_time,
            m3u8_info: MetaInfo {
                original_count: self.original_count,
                count: self.count,
                vod: self.is_vod,
                target_duration: self.target_duration,
                total_duration: self.total_duration,
                audio: self.audio_url.as_deref(),
                sub: self.subtitle_url.as_deref(),
                ext_map: self.init_segment.as_ref().map(InitSegment::ext_map_value),
                segments: &self.parts,
            },
        }
        .serialize(serializer)
    }
}

/// Summary of a master playlist, written next to `master.m3u8`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterListing {
    #[serde(rename = "masterUri")]
    pub master_url: String,
    pub update_time: String,
    /// One JSON record per variant, in declaration order
    pub play_lists: Vec<String>,
    pub audio_tracks: MediaGroups,
    pub subtitle_tracks: MediaGroups,
}

impl MasterListing {
    pub fn new(
        master_url: impl Into<String>,
        variants: &[VariantDescriptor],
        audio_tracks: MediaGroups,
        subtitle_tracks: MediaGroups,
    ) -> Result<Self, ResolveError> {
        let play_lists = variants
            .iter()
            .map(VariantDescriptor::to_text)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ResolveError::Serialization {
                what: "variant descriptor",
                source,
            })?;

        Ok(Self {
            master_url: master_url.into(),
            update_time: update_time(),
            play_lists,
            audio_tracks,
            subtitle_tracks,
        })
    }
}

/// Write `meta.json`
pub async fn emit_plan(workspace: &Workspace, plan: &Plan) -> Result<PathBuf, ResolveError> {
    let path = workspace.write_json(META, plan).await?;
    info!(
        path = %path.display(),
        segments = plan.count,
        parts = plan.parts.len(),
        vod = plan.is_vod,
        "Segment plan written"
    );
    Ok(path)
}

/// Keep the master manifest as `master.m3u8` and write `playLists.json`
pub async fn emit_master(
    workspace: &Workspace,
    listing: &MasterListing,
) -> Result<PathBuf, ResolveError> {
    workspace.copy(RAW_MANIFEST, MASTER_MANIFEST).await?;
    let path = workspace.write_json(PLAYLISTS, listing).await?;
    info!(
        path = %path.display(),
        variants = listing.play_lists.len(),
        "Master playlist listing written"
    );
    Ok(path)
}
