//! Ingestion pipelines: scraped items in, canonical records out.

mod error;
mod handler;
mod item;
mod outcome;
mod queue;

pub use error::{EnqueueError, IngestError};
pub use handler::{channel_id, TorrentStoreHandler, TvChannelHandler};
pub use item::{MediaKind, ScrapedItem};
pub use outcome::{DropReason, IngestOutcome};
pub use queue::{IngestQueue, ItemHandler, QueueStats};
