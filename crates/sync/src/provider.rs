//! Billing provider abstraction
//!
//! Outbound calls to the billing service (Stripe) go through this trait so
//! the engine can be exercised without network access. All methods may block
//! on network I/O; implementations are expected to bound their requests with
//! timeouts and surface failures as [`SyncError::Provider`](crate::error::SyncError).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::types::{CheckoutMode, Metadata};

/// Invoice as fetched from the provider, trimmed to the fields the
/// classifier and invoice handlers use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInvoice {
    pub id: String,
    pub customer: Option<String>,
    /// Set when the invoice belongs to a subscription; the classifier's
    /// primary signal for "this capture is not a standalone payment".
    pub subscription: Option<String>,
    pub status: Option<String>,
    pub amount_due: i64,
    pub amount_paid: i64,
}

/// Parameters for creating a checkout session
#[derive(Debug, Clone, Default)]
pub struct CreateCheckoutParams {
    pub price_id: String,
    pub mode: Option<CheckoutMode>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer: Option<String>,
    pub metadata: Option<Metadata>,
    /// Seat count for per-seat subscription prices
    pub quantity: Option<u64>,
}

/// A created checkout session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    /// Redirect target, absent for embedded flows
    pub url: Option<String>,
}

/// Remote billing service operations
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Fetch an invoice by id
    async fn fetch_invoice(&self, invoice_id: &str) -> SyncResult<ProviderInvoice>;

    /// Change the seat quantity on a subscription
    async fn update_subscription_quantity(
        &self,
        subscription_id: &str,
        quantity: u64,
    ) -> SyncResult<()>;

    /// Cancel a subscription, immediately or at the end of the current
    /// billing period
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> SyncResult<()>;

    /// Create a checkout session
    async fn create_checkout_session(
        &self,
        params: CreateCheckoutParams,
    ) -> SyncResult<CheckoutSessionResponse>;

    /// Create a customer-portal session, returning the redirect URL
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> SyncResult<String>;
}
