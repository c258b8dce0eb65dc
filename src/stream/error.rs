//! Error types for event streams

use thiserror::Error;

/// Ways a subscription can end abnormally
///
/// A subscription that ends because of a QUIT event or a hub shutdown ends
/// without an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// Consumer did not keep up and was dropped from the registry
    #[error("consumer {consumer} evicted: outbox full")]
    Overflow { consumer: String },

    /// Outbound transport rejected an event
    #[error("transport error for consumer {consumer}: {reason}")]
    Transport { consumer: String, reason: String },
}

/// Result type for stream operations
pub type HubResult<T> = Result<T, HubError>;
