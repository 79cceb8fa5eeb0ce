//! Customer portal sessions

use std::sync::Arc;

use serde::Serialize;

use crate::error::SyncResult;
use crate::provider::BillingProvider;

/// Response to a portal session request
#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// Customer-portal passthrough to the billing provider
pub struct PortalService {
    provider: Arc<dyn BillingProvider>,
}

impl PortalService {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> SyncResult<PortalResponse> {
        let url = self
            .provider
            .create_portal_session(customer_id, return_url)
            .await?;

        tracing::info!(customer_id = %customer_id, "Portal session created");

        Ok(PortalResponse { url })
    }
}
