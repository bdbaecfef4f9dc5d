//! Mapping torrent files to season/episode numbers.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::metadata::TorrentFile;
use crate::store::EpisodeFile;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "mov", "wmv", "ts", "m2ts", "webm", "flv", "mpg", "mpeg",
];

static SXXEYY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)s(\d{1,2})[ ._-]?e(\d{1,3})").unwrap());
static NXNN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})x(\d{2,3})\b").unwrap());
static SEASON_EPISODE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)season[ ._-]?(\d{1,2})[ ._-]*episode[ ._-]?(\d{1,3})").unwrap()
});
static EPISODE_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:ep?|episode)[ ._-]?(\d{1,3})\b").unwrap());
static DASH_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r" - (\d{1,3})\b").unwrap());
static SEASON_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:season[ ._-]?|s)(\d{1,2})\b").unwrap());

/// Whether the path looks like a playable video (samples excluded).
pub fn is_video_file(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let is_video = lower
        .rsplit_once('.')
        .is_some_and(|(_, ext)| VIDEO_EXTENSIONS.contains(&ext));
    is_video && !lower.rsplit('/').next().unwrap_or(&lower).contains("sample")
}

/// Parse `(season, episode)` from a file name.
///
/// Episode-only names fall back to `default_season`.
pub fn parse_season_episode(file_name: &str, default_season: Option<u32>) -> Option<(u32, u32)> {
    for pattern in [&*SXXEYY, &*NXNN, &*SEASON_EPISODE_WORDS] {
        if let Some(caps) = pattern.captures(file_name) {
            let season = caps.get(1)?.as_str().parse().ok()?;
            let episode = caps.get(2)?.as_str().parse().ok()?;
            return Some((season, episode));
        }
    }

    let episode = [&*EPISODE_ONLY, &*DASH_NUMBER].iter().find_map(|pattern| {
        pattern
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    })?;
    Some((default_season?, episode))
}

/// Build episode files for every video in `files`.
///
/// `default_season` applies to files that only carry an episode number and
/// sit in no season directory.
pub fn episode_files_from(files: &[TorrentFile], default_season: Option<u32>) -> Vec<EpisodeFile> {
    let mut out = Vec::new();
    for (index, file) in files.iter().enumerate() {
        if !is_video_file(&file.path) {
            continue;
        }
        let name = file.file_name();
        let dir_season = file
            .path
            .rsplit_once('/')
            .and_then(|(dirs, _)| dirs.rsplit('/').find_map(season_from_dir));
        let Some((season, episode)) =
            parse_season_episode(name, dir_season.or(default_season).or(Some(1)))
        else {
            continue;
        };
        out.push(EpisodeFile {
            season_number: season,
            episode_number: episode,
            filename: name.to_string(),
            size: file.size,
            file_index: index,
        });
    }
    out
}

fn season_from_dir(dir: &str) -> Option<u32> {
    SEASON_DIR
        .captures(dir)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, size: u64) -> TorrentFile {
        TorrentFile {
            path: path.to_string(),
            size,
        }
    }

    #[test]
    fn test_parse_patterns() {
        assert_eq!(parse_season_episode("Show.S01E02.1080p.mkv", None), Some((1, 2)));
        assert_eq!(parse_season_episode("show s3 e11.mkv", None), Some((3, 11)));
        assert_eq!(parse_season_episode("Show 2x05.avi", None), Some((2, 5)));
        assert_eq!(
            parse_season_episode("Show Season 4 Episode 7.mp4", None),
            Some((4, 7))
        );
        assert_eq!(parse_season_episode("Show Ep 09.mp4", Some(2)), Some((2, 9)));
        assert_eq!(parse_season_episode("[Sub] Show - 12 [1080p].mkv", Some(1)), Some((1, 12)));
        assert_eq!(parse_season_episode("Show Ep 09.mp4", None), None);
        assert_eq!(parse_season_episode("Movie.2020.mkv", Some(1)), None);
    }

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file("Show/Show.S01E01.MKV"));
        assert!(!is_video_file("Show/Show.S01E01.srt"));
        assert!(!is_video_file("Show/Sample/show-sample.mkv"));
        assert!(!is_video_file("README"));
    }

    #[test]
    fn test_episode_files_keep_torrent_indexes() {
        let files = vec![
            file("Show.S01/info.nfo", 1),
            file("Show.S01/Show.S01E01.mkv", 100),
            file("Show.S01/Show.S01E02.mkv", 200),
            file("Show.S01/Sample/sample.mkv", 5),
        ];
        let episodes = episode_files_from(&files, None);

        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].file_index, 1);
        assert_eq!(episodes[0].filename, "Show.S01E01.mkv");
        assert_eq!(episodes[1].episode_number, 2);
        assert_eq!(episodes[1].size, 200);
    }

    #[test]
    fn test_season_directory_applies_to_episode_only_names() {
        let files = vec![
            file("Show/Season 2/Episode 01.mkv", 10),
            file("Show/Season 3/E04.mkv", 10),
        ];
        let episodes = episode_files_from(&files, Some(1));
        assert_eq!(
            episodes
                .iter()
                .map(|e| (e.season_number, e.episode_number))
                .collect::<Vec<_>>(),
            vec![(2, 1), (3, 4)]
        );
    }
}
