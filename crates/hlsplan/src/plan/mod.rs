// Turning a scan outcome into the emitted plan: track selection, range trimming
// and artifact writing.

pub mod emitter;
pub mod selector;
pub mod trimmer;

pub use emitter::{MasterListing, Plan, emit_master, emit_plan, update_time};
pub use selector::{TrackSelection, select_tracks};
pub use trimmer::{RangeSpec, Trimmed, Window, parse_clock, trim};
