//! Error types for bridge operations.

/// Alias for `Result<T, crossway::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by bridge operations.
///
/// Configuration problems are returned synchronously from the calling
/// method; transport and timeout failures flow through the transaction's
/// callback. Malformed inbound wire strings are not errors at all — the
/// inbound channel is shared with arbitrary senders, so noise is dropped
/// silently.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The bridge builder was finalized without a host.
    #[error("bridge requires a context host")]
    MissingHost,

    /// The target descriptor does not match the addressing grammar.
    #[error(transparent)]
    BadTarget(#[from] crossway_proto::ParseTargetError),

    /// Relay delivery was selected but no relay URL is configured.
    #[error("relay delivery requires a relay URL; none configured")]
    MissingRelayUrl,

    /// The payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),

    /// The underlying transport rejected the send.
    #[error("transport failure: {0}")]
    Transport(String),

    /// No acknowledgement arrived within the configured window.
    #[error("no acknowledgement within {timeout_ms} ms for transaction {tid}")]
    Timeout {
        /// The transaction that expired.
        tid: u64,
        /// The window that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The opener binding exhausted its retries and no relay URL exists
    /// to fall back to.
    #[error("opener binding '{0}' is unreachable and no relay URL is configured")]
    BindingUnavailable(String),
}
