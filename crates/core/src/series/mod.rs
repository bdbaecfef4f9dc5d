//! Per-title aggregates and their episode mapping.

mod aggregator;
mod episodes;

pub use aggregator::{new_aggregate_id, organize_episodes, SeriesAggregator};
pub use episodes::{episode_files_from, is_video_file, parse_season_episode};
