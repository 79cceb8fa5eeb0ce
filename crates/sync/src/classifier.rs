//! Payment classification
//!
//! Stripe emits `payment_intent.succeeded` both for standalone one-time
//! payments and for subscription invoice payments. Only the former should
//! become payment rows; the latter are already represented by invoices, and
//! recording both would double count. No single signal is authoritative, so
//! classification is a short-circuiting cascade of two checks.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};

use crate::error::SyncResult;
use crate::event::PaymentIntentObject;
use crate::provider::BillingProvider;
use crate::store::RecordStore;

/// How long a locally synced subscription counts as "just created" for the
/// recency heuristic. A capture for the same customer inside this window is
/// treated as that subscription's first invoice payment.
///
/// This is a heuristic, not a proof: under high subscription churn for one
/// customer it can swallow an unrelated standalone payment. Kept at the
/// documented fixed window deliberately.
pub const RECENT_SUBSCRIPTION_WINDOW: Duration = Duration::minutes(10);

/// Bound on the classifier's remote invoice lookup. A slow provider must
/// not stall webhook processing; on expiry the lookup is treated as
/// inconclusive.
pub const INVOICE_LOOKUP_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Classification outcome for a captured payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentClass {
    /// Belongs to a subscription invoice; discard, the invoice path records it
    SubscriptionDerived,
    /// A genuine standalone payment; record a payment row
    Standalone,
}

/// Decides whether a captured payment is subscription-derived.
pub struct PaymentClassifier {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn BillingProvider>,
}

impl PaymentClassifier {
    pub fn new(store: Arc<dyn RecordStore>, provider: Arc<dyn BillingProvider>) -> Self {
        Self { store, provider }
    }

    /// Classify a captured payment. Evaluated in order, short-circuiting on
    /// the first positive match:
    ///
    /// 1. If the intent links an invoice, fetch it; an invoice referencing a
    ///    subscription means subscription-derived. A failed or timed-out
    ///    fetch is inconclusive and falls through, never failing the event.
    /// 2. If the intent has a customer, a subscription for that customer
    ///    synced within [`RECENT_SUBSCRIPTION_WINDOW`] means
    ///    subscription-derived - delivery order between the subscription's
    ///    creation and its first invoice's capture is not guaranteed.
    /// 3. Otherwise the payment is standalone.
    pub async fn classify(&self, intent: &PaymentIntentObject) -> SyncResult<PaymentClass> {
        if let Some(invoice_ref) = &intent.invoice {
            let invoice_id = invoice_ref.id();
            match tokio::time::timeout(INVOICE_LOOKUP_TIMEOUT, self.provider.fetch_invoice(invoice_id))
                .await
            {
                Ok(Ok(invoice)) => {
                    if let Some(subscription_id) = invoice.subscription {
                        tracing::debug!(
                            payment_intent_id = %intent.id,
                            invoice_id = %invoice_id,
                            subscription_id = %subscription_id,
                            "Capture linked to subscription invoice"
                        );
                        return Ok(PaymentClass::SubscriptionDerived);
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        payment_intent_id = %intent.id,
                        invoice_id = %invoice_id,
                        error = %e,
                        "Invoice lookup failed, falling back to recency heuristic"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        payment_intent_id = %intent.id,
                        invoice_id = %invoice_id,
                        timeout_secs = INVOICE_LOOKUP_TIMEOUT.as_secs(),
                        "Invoice lookup timed out, falling back to recency heuristic"
                    );
                }
            }
        }

        if let Some(customer) = &intent.customer {
            let cutoff = OffsetDateTime::now_utc() - RECENT_SUBSCRIPTION_WINDOW;
            let subscriptions = self
                .store
                .list_subscriptions_by_customer(customer.id())
                .await?;
            if let Some(recent) = subscriptions.iter().find(|s| s.synced_at >= cutoff) {
                tracing::debug!(
                    payment_intent_id = %intent.id,
                    customer_id = %customer.id(),
                    subscription_id = %recent.stripe_subscription_id,
                    "Capture follows a recently synced subscription, treating as its first invoice"
                );
                return Ok(PaymentClass::SubscriptionDerived);
            }
        }

        Ok(PaymentClass::Standalone)
    }
}
