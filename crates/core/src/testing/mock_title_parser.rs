//! Title parser that always fails.

use crate::metadata::{TitleAttributes, TitleParseError, TitleParser};

/// Rejects every title, for exercising the drop path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingTitleParser;

impl TitleParser for FailingTitleParser {
    fn parse(&self, raw: &str) -> Result<TitleAttributes, TitleParseError> {
        Err(TitleParseError::Unparseable(raw.to_string()))
    }
}
