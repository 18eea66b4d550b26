//! Time and index windows over the scanned parts.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::manifest::Part;

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+:\d+:\d+)?\s*-\s*(\d+:\d+:\d+)?\s*$").unwrap()
});

static INDEX_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d*)\s*-\s*(\d*)\s*$").unwrap());

static CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):(\d+):(\d+)$").unwrap());

/// A requested window of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeSpec {
    /// `HH:MM:SS` bounds measured from the first segment
    Time {
        start: Option<String>,
        end: Option<String>,
    },
    /// Inclusive segment index bounds
    Index { start: Option<i64>, end: Option<i64> },
}

impl RangeSpec {
    /// Parse `HH:MM:SS-HH:MM:SS` or `<n>-<m>`, either side optional.
    ///
    /// Malformed input is logged and yields `None`, meaning no trimming.
    pub fn parse(spec: &str) -> Option<Self> {
        let parsed = if spec.contains(':') {
            TIME_RANGE.captures(spec).map(|caps| RangeSpec::Time {
                start: caps.get(1).map(|m| m.as_str().to_string()),
                end: caps
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .filter(|end| parse_clock(end) != Some(0.0)),
            })
        } else {
            INDEX_RANGE.captures(spec).and_then(|caps| {
                let bound = |i: usize| {
                    caps.get(i)
                        .map(|m| m.as_str())
                        .filter(|s| !s.is_empty())
                        .map(|s| s.parse::<i64>())
                        .transpose()
                };
                match (bound(1), bound(2)) {
                    (Ok(start), Ok(end)) => Some(RangeSpec::Index { start, end }),
                    _ => None,
                }
            })
        };

        match parsed {
            Some(RangeSpec::Time {
                start: None,
                end: None,
            })
            | Some(RangeSpec::Index {
                start: None,
                end: None,
            }) => None,
            None => {
                warn!(range = %spec, "Malformed range, downloading everything");
                None
            }
            some => some,
        }
    }

    /// The inclusive index window this range selects from `parts`, or `None` when
    /// nothing should be trimmed.
    pub fn window(&self, parts: &[Part], total_duration: f64) -> Option<Window> {
        let first = parts.first()?.first()?.index;
        let last = parts.last()?.last()?.index;

        match self {
            RangeSpec::Index { start, end } => {
                let window = Window {
                    start: start.unwrap_or(first),
                    end: end.unwrap_or(last),
                };
                if window.start > window.end {
                    warn!(start = window.start, end = window.end, "Empty index range, not trimming");
                    return None;
                }
                Some(window)
            }
            RangeSpec::Time { start, end } => {
                let start_secs = match start.as_deref() {
                    Some(clock) => parse_clock(clock)?,
                    None => 0.0,
                };
                let end_secs = match end.as_deref() {
                    Some(clock) => parse_clock(clock)?,
                    None => total_duration,
                };
                if end_secs - start_secs <= 0.0 {
                    warn!(start = start_secs, end = end_secs, "Empty time range, not trimming");
                    return None;
                }

                let mut window = Window {
                    start: first,
                    end: last,
                };
                let (mut found_start, mut found_end) = (false, false);
                let mut elapsed = 0.0;
                for segment in parts.iter().flatten() {
                    elapsed += segment.duration;
                    if !found_start && elapsed > start_secs {
                        window.start = segment.index;
                        found_start = true;
                    }
                    if !found_end && elapsed >= end_secs {
                        window.end = segment.index;
                        found_end = true;
                    }
                }
                debug!(start = window.start, end = window.end, "Time range mapped to segments");
                Some(window)
            }
        }
    }
}

/// Inclusive range of segment indices to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

/// Result of trimming
#[derive(Debug, Clone, PartialEq)]
pub struct Trimmed {
    pub parts: Vec<Part>,
    pub count: i64,
    pub total_duration: f64,
}

/// Seconds of an `HH:MM:SS` clock, `None` when it does not fit in a `u64`
pub fn parse_clock(clock: &str) -> Option<f64> {
    let caps = CLOCK.captures(clock.trim())?;
    let field = |i: usize| caps[i].parse::<u64>().ok();
    let (hours, minutes, seconds) = (field(1)?, field(2)?, field(3)?);
    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Some(total as f64)
}

/// Keep segments with `start <= index <= end`, dropping parts left empty.
pub fn apply_window(parts: Vec<Part>, window: Window) -> Trimmed {
    let parts: Vec<Part> = parts
        .into_iter()
        .map(|part| {
            part.into_iter()
                .filter(|s| window.start <= s.index && s.index <= window.end)
                .collect::<Part>()
        })
        .filter(|part| !part.is_empty())
        .collect();

    let count = parts.iter().map(|p| p.len() as i64).sum();
    let total_duration = parts.iter().flatten().map(|s| s.duration).sum();
    Trimmed {
        parts,
        count,
        total_duration,
    }
}

/// Apply `range` to `parts`; without a usable window the input comes back unchanged.
pub fn trim(parts: Vec<Part>, range: Option<&RangeSpec>, total_duration: f64) -> Trimmed {
    match range.and_then(|r| r.window(&parts, total_duration)) {
        Some(window) => apply_window(parts, window),
        None => Trimmed {
            count: parts.iter().map(|p| p.len() as i64).sum(),
            parts,
            total_duration,
        },
    }
}
