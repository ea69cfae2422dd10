//! The corpus source contract shared by the feed and the bounded window.

use async_trait::async_trait;

use crate::item::{Item, SearchField, SearchMatch, SourceKind};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// Transport failure: connect, timeout, reset.
    #[error("network error: {0}")]
    Network(String),
    /// The service answered but refused or failed the request.
    #[error("service error ({status}): {reason}")]
    Service { status: u16, reason: String },
    #[error("invalid page request offset={offset} limit={limit} (total {total})")]
    InvalidRange {
        offset: usize,
        limit: usize,
        total: usize,
    },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("{operation} is not supported by the {kind} corpus")]
    Unsupported {
        kind: SourceKind,
        operation: &'static str,
    },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Service { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Service {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// A backing collection of poems.
///
/// The local corpus is finite and paged by offset; the remote corpus only
/// hands out batches and does not know its size.
#[async_trait]
pub trait CorpusSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// `None` when the size is unknown.
    async fn total_count(&self) -> Result<Option<usize>, SourceError>;

    /// Ordered page starting at `offset`. Fewer than `limit` items are
    /// returned near the end of the corpus.
    async fn get_page(&self, offset: usize, limit: usize) -> Result<Vec<Item>, SourceError>;

    /// Up to `count` items sampled from the corpus.
    async fn fetch_batch(&self, count: usize) -> Result<Vec<Item>, SourceError>;

    async fn search_by(
        &self,
        field: SearchField,
        query: &str,
        mode: SearchMatch,
        limit: usize,
    ) -> Result<Vec<Item>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SourceError::Network("reset".into()).is_transient());
        assert!(SourceError::Service { status: 503, reason: "down".into() }.is_transient());
        assert!(SourceError::Service { status: 429, reason: "slow down".into() }.is_transient());
        assert!(!SourceError::Service { status: 404, reason: "Not found".into() }.is_transient());
        assert!(!SourceError::Decode("eof".into()).is_transient());
    }
}
