use tracing::{info, warn};

use crate::manifest::{BestVariant, MediaGroups, MediaTrack, track_label};

/// Alternate renditions chosen for the best variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackSelection {
    pub audio_url: Option<String>,
    pub subtitle_url: Option<String>,
    /// Tracks of an audio group too ambiguous to pick automatically
    pub audio_choices: Vec<MediaTrack>,
    pub subtitle_choices: Vec<MediaTrack>,
}

/// Resolve the audio and subtitle groups referenced by `best`.
///
/// A group with exactly one track supplies its URI; larger groups are returned
/// unresolved for the caller to choose from.
pub fn select_tracks(
    best: &BestVariant,
    audio_groups: &MediaGroups,
    subtitle_groups: &MediaGroups,
) -> TrackSelection {
    let (audio_url, audio_choices) = resolve_group("audio", &best.audio_group, audio_groups);
    let (subtitle_url, subtitle_choices) =
        resolve_group("subtitle", &best.subtitle_group, subtitle_groups);

    TrackSelection {
        audio_url,
        subtitle_url,
        audio_choices,
        subtitle_choices,
    }
}

fn resolve_group(
    kind: &'static str,
    group_id: &str,
    groups: &MediaGroups,
) -> (Option<String>, Vec<MediaTrack>) {
    if group_id.is_empty() {
        return (None, Vec::new());
    }
    let Some(tracks) = groups.get(group_id) else {
        warn!(kind, group = %group_id, "Variant references an undeclared group");
        return (None, Vec::new());
    };

    match tracks.as_slice() {
        [] => (None, Vec::new()),
        [only] if only.uri.is_empty() => (None, Vec::new()),
        [only] => {
            info!(kind, track = %track_label(only), url = %only.uri, "External track selected");
            (Some(only.uri.clone()), Vec::new())
        }
        several => {
            let labels: Vec<String> = several.iter().map(track_label).collect();
            warn!(kind, group = %group_id, tracks = ?labels, "Several tracks available, none selected");
            (None, several.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(name: &str, uri: &str) -> MediaTrack {
        MediaTrack {
            name: name.to_string(),
            language: "en".to_string(),
            uri: uri.to_string(),
            channels: None,
        }
    }

    fn best(audio: &str, subs: &str) -> BestVariant {
        BestVariant {
            bandwidth: 1,
            url: "https://h/v.m3u8".to_string(),
            audio_group: audio.to_string(),
            subtitle_group: subs.to_string(),
        }
    }

    #[test]
    fn test_single_track_groups_resolve() {
        let mut audio = MediaGroups::new();
        audio.insert("aac".to_string(), vec![track("English", "https://h/en.m3u8")]);
        let mut subs = MediaGroups::new();
        subs.insert("subs".to_string(), vec![track("English", "https://h/en.vtt.m3u8")]);

        let selection = select_tracks(&best("aac", "subs"), &audio, &subs);
        assert_eq!(selection.audio_url.as_deref(), Some("https://h/en.m3u8"));
        assert_eq!(
            selection.subtitle_url.as_deref(),
            Some("https://h/en.vtt.m3u8")
        );
        assert!(selection.audio_choices.is_empty());
    }

    #[test]
    fn test_ambiguous_and_missing_groups() {
        let mut audio = MediaGroups::new();
        audio.insert(
            "aac".to_string(),
            vec![track("English", "https://h/en.m3u8"), track("French", "https://h/fr.m3u8")],
        );
        audio.insert("muxed".to_string(), vec![track("Main", "")]);

        let selection = select_tracks(&best("aac", "nope"), &audio, &MediaGroups::new());
        assert_eq!(selection.audio_url, None);
        assert_eq!(selection.audio_choices.len(), 2);
        assert_eq!(selection.subtitle_url, None);

        let selection = select_tracks(&best("muxed", ""), &audio, &MediaGroups::new());
        assert_eq!(selection, TrackSelection::default());
    }
}
