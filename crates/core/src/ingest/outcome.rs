use std::fmt;

/// Why an item was dropped without touching the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingField(&'static str),
    InvalidMagnet(String),
    MissingInfoHash,
    TitleParse(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingField(field) => write!(f, "missing required field '{}'", field),
            DropReason::InvalidMagnet(e) => write!(f, "invalid magnet link: {}", e),
            DropReason::MissingInfoHash => f.write_str("no info hash could be determined"),
            DropReason::TitleParse(e) => write!(f, "title parse failed: {}", e),
        }
    }
}

/// Result of processing one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new record was written.
    Insert,
    /// An existing record was superseded by a better-sourced one.
    Replace { previous_source: Option<String> },
    /// The record already exists from an acceptable source.
    Skip,
    /// Not processable now, but not known to be useless either.
    Deferred { reason: String },
    Dropped(DropReason),
}

impl IngestOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Insert => "insert",
            IngestOutcome::Replace { .. } => "replace",
            IngestOutcome::Skip => "skip",
            IngestOutcome::Deferred { .. } => "deferred",
            IngestOutcome::Dropped(_) => "dropped",
        }
    }

    /// Whether the store was written.
    pub fn wrote(&self) -> bool {
        matches!(self, IngestOutcome::Insert | IngestOutcome::Replace { .. })
    }
}
