//! Error taxonomy shared across the crate.

use thiserror::Error;

/// Convenience alias used by every fallible operation in the library.
pub type Result<T> = std::result::Result<T, GraderError>;

/// Errors produced by configuration, provider, parsing, and storage layers.
///
/// The provider variants are mapped uniformly regardless of which vendor
/// underlies the call, so callers never branch on provider identity.
/// `ProviderConnection` is the only variant a caller may retry without
/// modifying the request.
#[derive(Debug, Error)]
pub enum GraderError {
    /// No usable provider credential or an otherwise unusable configuration.
    /// Fatal; raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network, timeout, or authentication failure while reaching a provider.
    #[error("could not reach the AI provider: {0}")]
    ProviderConnection(String),

    /// The provider answered but rejected the request or returned a
    /// malformed envelope.
    #[error("AI provider rejected the request: {0}")]
    ProviderResponse(String),

    /// The model's reply yielded no usable score after every parse strategy.
    #[error("could not extract a grade from the model response: {0}")]
    ResponseParse(String),

    /// Referenced discussion does not exist on disk.
    #[error("discussion {0} not found")]
    DiscussionNotFound(u32),

    /// Referenced submission does not exist within its discussion.
    #[error("submission {submission} not found in discussion {discussion}")]
    SubmissionNotFound {
        /// Parent discussion identifier.
        discussion: u32,
        /// Submission identifier within that discussion.
        submission: u32,
    },

    /// Malformed caller input (missing required fields, empty text, ...).
    #[error("invalid input: {0}")]
    Validation(String),

    /// Filesystem failure in the repository layer.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Stored metadata or submission file failed to (de)serialize.
    #[error("malformed stored data: {0}")]
    Json(#[from] serde_json::Error),
}
