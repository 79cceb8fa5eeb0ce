//! Checkout session creation

use std::sync::Arc;

use serde::Serialize;

use crate::error::SyncResult;
use crate::provider::{BillingProvider, CreateCheckoutParams};

/// Response to a checkout session request
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    /// Where to redirect the buyer, absent for embedded flows
    pub url: Option<String>,
}

/// Checkout session passthrough to the billing provider
pub struct CheckoutService {
    provider: Arc<dyn BillingProvider>,
}

impl CheckoutService {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// Create a checkout session. Provider failures surface to the caller;
    /// the session row is recorded locally only when its completion webhook
    /// arrives.
    pub async fn create_checkout_session(
        &self,
        params: CreateCheckoutParams,
    ) -> SyncResult<CheckoutResponse> {
        let session = self.provider.create_checkout_session(params).await?;

        tracing::info!(session_id = %session.session_id, "Checkout session created");

        Ok(CheckoutResponse {
            session_id: session.session_id,
            url: session.url,
        })
    }
}
