use thiserror::Error;

/// Errors raised while fetching or normalizing odds.
#[derive(Error, Debug)]
pub enum OddsError {
    /// The provider answered with a non-success status.
    #[error("odds provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("odds provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode odds response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A single quote failed validation at construction time.
    #[error("invalid quote: {0}")]
    InvalidQuote(String),
}
