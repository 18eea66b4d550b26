//! Classification of one manifest line.

/// One trimmed, non-blank manifest line.
///
/// Tags are matched by their exact name (the text before the first `:`), so
/// `#EXT-X-DISCONTINUITY-SEQUENCE` never reads as a discontinuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    Header,
    ByteRange(&'a str),
    /// Uplynk ad-block marker; carries the whole line
    UplynkSegment(&'a str),
    TargetDuration(&'a str),
    MediaSequence(&'a str),
    ProgramDateTime(&'a str),
    Discontinuity,
    Key(&'a str),
    Inf(&'a str),
    StreamInf(&'a str),
    IFrameStreamInf,
    Media(&'a str),
    EndList,
    Map(&'a str),
    /// Any other tag or comment
    Ignored,
    Uri(&'a str),
}

impl<'a> Directive<'a> {
    pub fn parse(line: &'a str) -> Self {
        if !line.starts_with('#') {
            return Directive::Uri(line);
        }
        if line.starts_with("#UPLYNK-SEGMENT") {
            return Directive::UplynkSegment(line);
        }

        let (name, value) = line.split_once(':').unwrap_or((line, ""));
        match name {
            "#EXTM3U" => Directive::Header,
            "#EXT-X-BYTERANGE" => Directive::ByteRange(value),
            "#EXT-X-TARGETDURATION" => Directive::TargetDuration(value),
            "#EXT-X-MEDIA-SEQUENCE" => Directive::MediaSequence(value),
            "#EXT-X-PROGRAM-DATE-TIME" => Directive::ProgramDateTime(value),
            "#EXT-X-DISCONTINUITY" => Directive::Discontinuity,
            "#EXT-X-KEY" => Directive::Key(value),
            "#EXTINF" => Directive::Inf(value),
            "#EXT-X-STREAM-INF" => Directive::StreamInf(value),
            "#EXT-X-I-FRAME-STREAM-INF" => Directive::IFrameStreamInf,
            "#EXT-X-MEDIA" => Directive::Media(value),
            "#EXT-X-ENDLIST" => Directive::EndList,
            "#EXT-X-MAP" => Directive::Map(value),
            _ => Directive::Ignored,
        }
    }
}
