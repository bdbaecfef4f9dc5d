//! Title attribute extraction.
//!
//! `TitleParser` is the capability the pipelines depend on.
//! `PatternTitleParser` is a best-effort regex implementation of it.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TitleParseError {
    #[error("Title is empty")]
    Empty,

    #[error("Title could not be parsed: {0}")]
    Unparseable(String),
}

/// Structured attributes recovered from a release title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleAttributes {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub resolution: Option<String>,
    pub quality: Option<String>,
    pub codec: Option<String>,
    #[serde(default)]
    pub audio: Vec<String>,
    #[serde(default)]
    pub hdr: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub seasons: Vec<u32>,
    #[serde(default)]
    pub episodes: Vec<u32>,
}

/// Turns a raw release title into structured attributes.
pub trait TitleParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<TitleAttributes, TitleParseError>;
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static LEADING_GROUP: Lazy<Regex> = Lazy::new(|| re(r"^\s*\[[^\]]*\]\s*"));
static YEAR: Lazy<Regex> = Lazy::new(|| re(r"\b(19\d{2}|20\d{2})\b"));
static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\b(2160p|4k|uhd|1080p|1080i|720p|576p|480p|360p)\b"));
static SEASON_EPISODE: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\bs(\d{1,2})[ -]?e(\d{1,3})(?:[ -]?e?(\d{1,3}))?\b"));
static CROSS_EPISODE: Lazy<Regex> = Lazy::new(|| re(r"(?i)\b(\d{1,2})x(\d{2,3})\b"));
static SEASON_RANGE: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bs(\d{1,2})[ ]?-[ ]?s?(\d{1,2})\b"));
static SEASON_WORD: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bseason[ ]?(\d{1,2})\b"));
static SEASON_ONLY: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bs(\d{1,2})\b"));
static EPISODE_WORD: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bepisode[ ]?(\d{1,3})\b"));

static QUALITY: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"(?i)\b(?:bd-?remux|remux)\b"), "BluRay REMUX"),
        (re(r"(?i)\b(?:blu-?ray|bdrip|brrip|bd)\b"), "BluRay"),
        (re(r"(?i)\bweb-?dl\b"), "WEB-DL"),
        (re(r"(?i)\bweb-?rip\b"), "WEBRip"),
        (re(r"(?i)\bhdtv\b"), "HDTV"),
        (re(r"(?i)\bhdrip\b"), "HDRip"),
        (re(r"(?i)\b(?:dvd-?rip|dvd)\b"), "DVDRip"),
        (re(r"(?i)\b(?:hdcam|camrip|cam)\b"), "CAM"),
        (re(r"(?i)\b(?:hdts|telesync|ts)\b"), "TeleSync"),
    ]
});

static CODEC: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"(?i)\b(?:x265|h[ ]?265|hevc)\b"), "hevc"),
        (re(r"(?i)\b(?:x264|h[ ]?264|avc)\b"), "avc"),
        (re(r"(?i)\bav1\b"), "av1"),
        (re(r"(?i)\b(?:xvid|divx)\b"), "xvid"),
    ]
});

static AUDIO: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"(?i)\bdts-?hd(?:[ -]?ma)?\b"), "DTS-HD MA"),
        (re(r"(?i)\btruehd\b"), "TrueHD"),
        (re(r"(?i)\batmos\b"), "Atmos"),
        (re(r"(?i)\b(?:ddp|e-?ac-?3)"), "DDP"),
        (re(r"(?i)\b(?:dd5[ ]1|dd2[ ]0|ac-?3)\b"), "DD"),
        (re(r"(?i)\baac"), "AAC"),
        (re(r"(?i)\bflac\b"), "FLAC"),
        (re(r"(?i)\bdts\b"), "DTS"),
        (re(r"(?i)\bopus\b"), "OPUS"),
    ]
});

static HDR: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"(?i)\b(?:dv|dovi|dolby[ -]?vision)\b"), "DV"),
        (re(r"(?i)\bhdr10(?:\+|plus)"), "HDR10+"),
        (re(r"(?i)\bhdr10\b"), "HDR10"),
        (re(r"(?i)\bhdr\b"), "HDR"),
        (re(r"(?i)\bhlg\b"), "HLG"),
    ]
});

static LANGUAGES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"(?i)\b(?:english|eng)\b"), "English"),
        (re(r"(?i)\b(?:hindi|hin)\b"), "Hindi"),
        (re(r"(?i)\b(?:tamil|tam)\b"), "Tamil"),
        (re(r"(?i)\b(?:telugu|tel)\b"), "Telugu"),
        (re(r"(?i)\bmalayalam\b"), "Malayalam"),
        (re(r"(?i)\bkannada\b"), "Kannada"),
        (re(r"(?i)\b(?:french|truefrench|vff)\b"), "French"),
        (re(r"(?i)\b(?:spanish|castellano|latino)\b"), "Spanish"),
        (re(r"(?i)\b(?:german|ger)\b"), "German"),
        (re(r"(?i)\b(?:italian|ita)\b"), "Italian"),
        (re(r"(?i)\b(?:russian|rus)\b"), "Russian"),
        (re(r"(?i)\bjapanese\b"), "Japanese"),
        (re(r"(?i)\bkorean\b"), "Korean"),
        (re(r"(?i)\bportuguese\b"), "Portuguese"),
    ]
});

/// Regex based title parser for scene-style release names.
#[derive(Debug, Clone, Default)]
pub struct PatternTitleParser;

impl PatternTitleParser {
    pub fn new() -> Self {
        Self
    }
}

impl TitleParser for PatternTitleParser {
    fn parse(&self, raw: &str) -> Result<TitleAttributes, TitleParseError> {
        if !raw.chars().any(|c| c.is_alphanumeric()) {
            return Err(TitleParseError::Empty);
        }

        let stripped = LEADING_GROUP.replace(raw, "");
        let text: String = stripped
            .chars()
            .map(|c| if c == '.' || c == '_' { ' ' } else { c })
            .collect();

        let mut attrs = TitleAttributes::default();
        // Position where the title ends: first attribute token after the start.
        let mut cut = text.len();
        let mut mark = |start: usize| {
            if start > 0 && start < cut {
                cut = start;
            }
        };

        if let Some(m) = YEAR.find_iter(&text).find(|m| m.start() > 0) {
            attrs.year = m.as_str().parse().ok();
            mark(m.start());
        }

        if let Some(caps) = RESOLUTION.captures(&text) {
            let value = caps[1].to_ascii_lowercase();
            attrs.resolution = Some(match value.as_str() {
                "2160p" | "4k" | "uhd" => "4k".to_string(),
                "1080i" => "1080p".to_string(),
                _ => value,
            });
            if let Some(m) = caps.get(0) {
                mark(m.start());
            }
        }

        parse_seasons(&text, &mut attrs, &mut mark);

        attrs.quality = first_label(&QUALITY, &text, &mut mark);
        attrs.codec = first_label(&CODEC, &text, &mut mark);
        attrs.audio = all_labels(&AUDIO, &text, &mut mark);
        if attrs.audio.iter().any(|a| a == "DTS-HD MA") {
            attrs.audio.retain(|a| a != "DTS");
        }
        attrs.hdr = all_labels(&HDR, &text, &mut mark);
        if attrs.hdr.iter().any(|h| h == "HDR10+") {
            attrs.hdr.retain(|h| h != "HDR10");
        }
        attrs.languages = all_labels(&LANGUAGES, &text, &mut |_| {});

        if let Some(bracket) = text.find(['[', '(']) {
            mark(bracket);
        }

        let title = text[..cut]
            .trim()
            .trim_end_matches(['-', ' '])
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if title.is_empty() {
            return Err(TitleParseError::Unparseable(raw.to_string()));
        }
        attrs.title = Some(title);

        Ok(attrs)
    }
}

fn parse_seasons(text: &str, attrs: &mut TitleAttributes, mark: &mut impl FnMut(usize)) {
    for caps in SEASON_EPISODE.captures_iter(text) {
        push_number(&mut attrs.seasons, caps.get(1).map(|m| m.as_str()));
        let first: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
        let last: Option<u32> = caps.get(3).and_then(|m| m.as_str().parse().ok());
        match (first, last) {
            (Some(a), Some(b)) if b >= a && b - a < 100 => {
                for ep in a..=b {
                    if !attrs.episodes.contains(&ep) {
                        attrs.episodes.push(ep);
                    }
                }
            }
            (Some(a), _) => {
                if !attrs.episodes.contains(&a) {
                    attrs.episodes.push(a);
                }
            }
            _ => {}
        }
        if let Some(m) = caps.get(0) {
            mark(m.start());
        }
    }

    if attrs.seasons.is_empty() {
        if let Some(caps) = CROSS_EPISODE.captures(text) {
            push_number(&mut attrs.seasons, caps.get(1).map(|m| m.as_str()));
            push_number(&mut attrs.episodes, caps.get(2).map(|m| m.as_str()));
            if let Some(m) = caps.get(0) {
                mark(m.start());
            }
        }
    }

    if attrs.seasons.is_empty() {
        if let Some(caps) = SEASON_RANGE.captures(text) {
            let a: Option<u32> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let b: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
            if let (Some(a), Some(b)) = (a, b) {
                if b >= a {
                    attrs.seasons.extend(a..=b);
                }
            }
            if let Some(m) = caps.get(0) {
                mark(m.start());
            }
        }
    }

    for pattern in [&*SEASON_WORD, &*SEASON_ONLY] {
        if !attrs.seasons.is_empty() {
            break;
        }
        if let Some(caps) = pattern.captures(text) {
            push_number(&mut attrs.seasons, caps.get(1).map(|m| m.as_str()));
            if let Some(m) = caps.get(0) {
                mark(m.start());
            }
        }
    }

    if attrs.episodes.is_empty() {
        if let Some(caps) = EPISODE_WORD.captures(text) {
            push_number(&mut attrs.episodes, caps.get(1).map(|m| m.as_str()));
            if let Some(m) = caps.get(0) {
                mark(m.start());
            }
        }
    }
}

fn push_number(target: &mut Vec<u32>, value: Option<&str>) {
    if let Some(n) = value.and_then(|v| v.parse().ok()) {
        if !target.contains(&n) {
            target.push(n);
        }
    }
}

fn first_label(
    patterns: &[(Regex, &'static str)],
    text: &str,
    mark: &mut impl FnMut(usize),
) -> Option<String> {
    patterns.iter().find_map(|(pattern, label)| {
        pattern.find(text).map(|m| {
            mark(m.start());
            label.to_string()
        })
    })
}

fn all_labels(
    patterns: &[(Regex, &'static str)],
    text: &str,
    mark: &mut impl FnMut(usize),
) -> Vec<String> {
    let mut labels = Vec::new();
    for (pattern, label) in patterns {
        if let Some(m) = pattern.find(text) {
            mark(m.start());
            labels.push(label.to_string());
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> TitleAttributes {
        PatternTitleParser::new().parse(raw).unwrap()
    }

    #[test]
    fn test_parse_movie_release() {
        let attrs = parse("The.Matrix.1999.1080p.BluRay.x264.DTS-HD.MA.5.1-GROUP");
        assert_eq!(attrs.title.as_deref(), Some("The Matrix"));
        assert_eq!(attrs.year, Some(1999));
        assert_eq!(attrs.resolution.as_deref(), Some("1080p"));
        assert_eq!(attrs.quality.as_deref(), Some("BluRay"));
        assert_eq!(attrs.codec.as_deref(), Some("avc"));
        assert_eq!(attrs.audio, vec!["DTS-HD MA"]);
        assert!(attrs.seasons.is_empty());
    }

    #[test]
    fn test_parse_episode_release() {
        let attrs = parse("Some.Show.S02E05.2160p.WEB-DL.DDP5.1.HDR10+.HEVC-GRP");
        assert_eq!(attrs.title.as_deref(), Some("Some Show"));
        assert_eq!(attrs.seasons, vec![2]);
        assert_eq!(attrs.episodes, vec![5]);
        assert_eq!(attrs.resolution.as_deref(), Some("4k"));
        assert_eq!(attrs.quality.as_deref(), Some("WEB-DL"));
        assert_eq!(attrs.codec.as_deref(), Some("hevc"));
        assert_eq!(attrs.audio, vec!["DDP"]);
        assert_eq!(attrs.hdr, vec!["HDR10+"]);
    }

    #[test]
    fn test_parse_multi_episode_and_languages() {
        let attrs = parse("[TorrentGroup] Show Name S01E01-E03 720p Hindi English AAC");
        assert_eq!(attrs.title.as_deref(), Some("Show Name"));
        assert_eq!(attrs.seasons, vec![1]);
        assert_eq!(attrs.episodes, vec![1, 2, 3]);
        assert_eq!(attrs.languages, vec!["English", "Hindi"]);
        assert_eq!(attrs.audio, vec!["AAC"]);
    }

    #[test]
    fn test_parse_season_pack() {
        let attrs = parse("Show Name Season 3 Complete 1080p WEBRip");
        assert_eq!(attrs.title.as_deref(), Some("Show Name"));
        assert_eq!(attrs.seasons, vec![3]);
        assert!(attrs.episodes.is_empty());
        assert_eq!(attrs.quality.as_deref(), Some("WEBRip"));
    }

    #[test]
    fn test_parse_season_range() {
        let attrs = parse("Show.S01-S03.720p.HDTV");
        assert_eq!(attrs.seasons, vec![1, 2, 3]);
    }

    #[test]
    fn test_year_at_start_is_title() {
        let attrs = parse("2012.2009.720p.BluRay");
        assert_eq!(attrs.title.as_deref(), Some("2012"));
        assert_eq!(attrs.year, Some(2009));
    }

    #[test]
    fn test_parse_empty_fails() {
        let parser = PatternTitleParser::new();
        assert_eq!(parser.parse(""), Err(TitleParseError::Empty));
        assert_eq!(parser.parse(" .-_ "), Err(TitleParseError::Empty));
    }

    #[test]
    fn test_parse_only_attributes_is_unparseable() {
        let parser = PatternTitleParser::new();
        assert!(matches!(
            parser.parse("[GRP]"),
            Err(TitleParseError::Unparseable(_))
        ));
    }
}
