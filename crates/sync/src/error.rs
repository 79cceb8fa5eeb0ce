//! Error types for the sync engine

use thiserror::Error;

/// Errors produced while ingesting webhook events or performing billing
/// operations.
///
/// The variants map onto the outcomes a transport cares about:
/// [`SyncError::Authentication`] is a client-class rejection (bad or missing
/// signature) and must never be retried internally; everything else is a
/// processing failure for the single event or operation at hand, and the
/// delivering party's at-least-once redelivery is expected to retry it.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Webhook signature verification failed. Never reaches the dispatcher.
    #[error("webhook signature verification failed")]
    Authentication,

    /// Configuration is missing or invalid (e.g. unset environment variable)
    #[error("configuration error: {0}")]
    Config(String),

    /// The event's `data.object` payload did not have the expected shape
    #[error("malformed event payload: {0}")]
    Payload(String),

    /// An outbound call to the billing provider failed
    #[error("billing provider error: {0}")]
    Provider(String),

    /// The record store failed
    #[error("store error: {0}")]
    Store(String),

    /// A directly-invoked operation referenced a subscription we don't have
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether this error is an authentication rejection.
    ///
    /// Transports should map this to a client-error response so the
    /// delivering party retries only after its configuration is fixed;
    /// all other variants are server-side processing failures.
    pub fn is_authentication(&self) -> bool {
        matches!(self, SyncError::Authentication)
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_is_distinguished_from_processing_failures() {
        assert!(SyncError::Authentication.is_authentication());
        assert!(!SyncError::Store("down".to_string()).is_authentication());
        assert!(!SyncError::Payload("bad".to_string()).is_authentication());
    }
}
