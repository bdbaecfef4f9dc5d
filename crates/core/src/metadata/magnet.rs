//! Magnet URI parsing.

use thiserror::Error;

/// Errors from magnet URI parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MagnetError {
    #[error("Not a magnet URI")]
    NotMagnet,

    #[error("Magnet URI has no btih exact topic")]
    MissingInfoHash,

    #[error("Invalid info hash '{0}': expected 40 hex characters")]
    InvalidInfoHash(String),
}

/// Fields extracted from a magnet URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// Lowercase 40-character hex digest.
    pub info_hash: String,
    /// Tracker URIs in the order they appear.
    pub trackers: Vec<String>,
    pub display_name: Option<String>,
}

impl MagnetLink {
    /// Build a magnet URI for an info hash and trackers.
    pub fn to_uri(&self) -> String {
        let mut uri = format!("magnet:?xt=urn:btih:{}", self.info_hash);
        if let Some(name) = &self.display_name {
            uri.push_str("&dn=");
            uri.push_str(&urlencoding::encode(name));
        }
        for tracker in &self.trackers {
            uri.push_str("&tr=");
            uri.push_str(&urlencoding::encode(tracker));
        }
        uri
    }
}

/// Parse a magnet URI.
///
/// The info hash must be 40 hex characters and is returned lowercased.
/// Tracker and display name parameters are percent-decoded.
pub fn parse_magnet(uri: &str) -> Result<MagnetLink, MagnetError> {
    let query = uri
        .trim()
        .strip_prefix("magnet:?")
        .ok_or(MagnetError::NotMagnet)?;

    let mut info_hash = None;
    let mut trackers = Vec::new();
    let mut display_name = None;

    for param in query.split('&') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key {
            "xt" => {
                let Some(topic) = strip_prefix_ignore_case(value, "urn:btih:") else {
                    continue;
                };
                if info_hash.is_none() {
                    info_hash = Some(validate_info_hash(topic)?);
                }
            }
            "tr" => {
                let tracker = decode_component(value);
                if !tracker.is_empty() && !trackers.contains(&tracker) {
                    trackers.push(tracker);
                }
            }
            "dn" => display_name = Some(decode_component(value)),
            _ => {}
        }
    }

    Ok(MagnetLink {
        info_hash: info_hash.ok_or(MagnetError::MissingInfoHash)?,
        trackers,
        display_name,
    })
}

/// Check that `hash` is a 40 hex character digest and lowercase it.
pub fn validate_info_hash(hash: &str) -> Result<String, MagnetError> {
    if hash.len() == 40 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hash.to_ascii_lowercase())
    } else {
        Err(MagnetError::InvalidInfoHash(hash.to_string()))
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    match value.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => value.get(prefix.len()..),
        _ => None,
    }
}

fn decode_component(value: &str) -> String {
    let value = value.replace('+', " ");
    urlencoding::decode(&value)
        .map(|s| s.into_owned())
        .unwrap_or(value)
}
