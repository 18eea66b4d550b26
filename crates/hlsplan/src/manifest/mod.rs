// Manifest scanning: directive classification, attribute lists, key state and
// the per-pass scanner.

pub mod attributes;
pub mod directive;
pub mod key;
pub mod scanner;
pub mod types;

pub use key::{KeyResolver, KeyState};
pub use scanner::{ResolutionSession, ScanContext, ScanOutcome};
pub use types::{
    BestVariant, InitSegment, MediaGroups, MediaTrack, Part, Segment, VariantDescriptor,
    track_label,
};
