// src/error.rs
use thiserror::Error;

/// Source unreachable or unparsable. The cycle is skipped; the next tick retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {status}")]
    Status { status: u16 },

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("channel api error: {0}")]
    Api(String),
}

/// Secondary article fetch/parse failure. Never surfaces past the extractor:
/// it is turned into a placeholder body.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("article returned HTTP {status}")]
    Status { status: u16 },

    #[error("invalid selector `{0}`")]
    Selector(String),

    #[error("no paragraphs matched")]
    NoParagraphs,
}

/// Backend unreachable or (in strict mode) rejecting the payload.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected item with HTTP {status}")]
    Rejected { status: u16 },
}

impl DeliveryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Rejected { status } => Some(*status),
            DeliveryError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}
