use thiserror::Error;

/// Errors surfaced by the export pipeline.
///
/// Only a handful of these are fatal to a conversation export: a quote whose
/// author cannot be determined, a malformed quote reference, or a failed write.
/// Everything else on the quote-chain path is degraded silently by the resolver.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("quote without author")]
    QuoteWithoutAuthor,

    #[error("cannot parse quote ID: {0}")]
    InvalidQuoteId(String),

    #[error("conversation not found: {0}")]
    UnknownConversation(String),

    #[error("conversation has no messages")]
    EmptyConversation,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("malformed message JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ExportError> = std::result::Result<T, E>;
