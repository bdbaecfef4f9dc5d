use std::sync::Arc;

use tracing::{debug, info};

use crate::ingest::IngestOutcome;
use crate::store::{MetadataStore, StoreError, TorrentStream};

/// Result of [`DeduplicationGate::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub outcome: IngestOutcome,
    /// Aggregate the record was linked to before a replace.
    pub previous_meta_id: Option<String>,
}

impl Admission {
    fn new(outcome: IngestOutcome) -> Self {
        Self {
            outcome,
            previous_meta_id: None,
        }
    }
}

/// Decides whether a freshly parsed torrent is inserted, replaces the
/// stored one, or is skipped as a duplicate.
pub struct DeduplicationGate {
    store: Arc<dyn MetadataStore>,
}

impl DeduplicationGate {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Decide without writing.
    ///
    /// An existing record is replaced only when `expected_sources` is a
    /// non-empty allowlist that does not contain the stored source.
    pub fn evaluate(
        &self,
        info_hash: &str,
        expected_sources: Option<&[String]>,
    ) -> Result<IngestOutcome, StoreError> {
        Ok(self.decide(info_hash, expected_sources)?.outcome)
    }

    fn decide(
        &self,
        info_hash: &str,
        expected_sources: Option<&[String]>,
    ) -> Result<Admission, StoreError> {
        let Some(existing) = self.store.find_by_hash(info_hash)? else {
            return Ok(Admission::new(IngestOutcome::Insert));
        };

        match expected_sources {
            Some(allowed) if !allowed.is_empty() && !allowed.contains(&existing.source) => {
                Ok(Admission {
                    outcome: IngestOutcome::Replace {
                        previous_source: Some(existing.source),
                    },
                    previous_meta_id: Some(existing.meta_id),
                })
            }
            _ => Ok(Admission::new(IngestOutcome::Skip)),
        }
    }

    /// Decide and apply the decision to the store.
    pub fn admit(
        &self,
        stream: &TorrentStream,
        expected_sources: Option<&[String]>,
    ) -> Result<Admission, StoreError> {
        let decision = self.decide(&stream.info_hash, expected_sources)?;
        match decision.outcome {
            IngestOutcome::Insert => match self.store.insert(stream) {
                Ok(()) => Ok(decision),
                // A concurrent pipeline stored the hash first; decide again against its record.
                Err(StoreError::Duplicate(_)) => {
                    debug!(info_hash = %stream.info_hash, "Lost insert race, re-evaluating");
                    let retry = self.decide(&stream.info_hash, expected_sources)?;
                    match retry.outcome {
                        IngestOutcome::Replace { .. } => {
                            self.store.replace(stream)?;
                            Ok(retry)
                        }
                        _ => Ok(Admission::new(IngestOutcome::Skip)),
                    }
                }
                Err(e) => Err(e),
            },
            IngestOutcome::Replace {
                ref previous_source,
            } => {
                self.store.replace(stream)?;
                info!(
                    info_hash = %stream.info_hash,
                    previous_source = previous_source.as_deref().unwrap_or(""),
                    source = %stream.source,
                    "Replaced torrent from disallowed source"
                );
                Ok(decision)
            }
            _ => {
                debug!(info_hash = %stream.info_hash, source = %stream.source, "Duplicate torrent skipped");
                Ok(decision)
            }
        }
    }
}
