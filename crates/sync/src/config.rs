//! Stripe configuration

use crate::error::{SyncError, SyncResult};

/// Stripe credentials, resolved once at startup and threaded into the
/// services that need them.
///
/// `secret_key` authenticates outbound API calls; `webhook_secret` is the
/// signing secret handed to the [`EventVerifier`](crate::event::EventVerifier)
/// implementation for inbound verification. Handlers never read the
/// environment themselves.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// API secret key (`sk_...`) for outbound calls
    pub secret_key: String,
    /// Webhook signing secret (`whsec_...`) for inbound verification
    pub webhook_secret: String,
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Load configuration from `STRIPE_SECRET_KEY` and `STRIPE_WEBHOOK_SECRET`.
    pub fn from_env() -> SyncResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| SyncError::Config("STRIPE_SECRET_KEY not set".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| SyncError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?;

        Ok(Self {
            secret_key,
            webhook_secret,
        })
    }
}
