//! Hash-keyed deduplication of torrent metadata.

mod gate;
mod markers;

pub use gate::{Admission, DeduplicationGate};
pub use markers::ScrapeMarkers;
