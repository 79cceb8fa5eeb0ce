//! Stripe webhook handling
//!
//! Maps verified events onto idempotent state transitions. Delivery is
//! at-least-once with no ordering guarantee, so every handler is an
//! upsert or patch scoped to one natural key: replays are no-ops, updates
//! for unknown keys are no-ops, and each handler touches exactly one row so
//! a failure never leaves a partial cross-entity write.

use std::sync::Arc;

use uuid::Uuid;

use crate::classifier::{PaymentClass, PaymentClassifier};
use crate::error::SyncResult;
use crate::event::{
    CheckoutSessionObject, CustomerObject, EventKind, EventVerifier, InvoiceObject,
    PaymentIntentObject, SubscriptionObject, WebhookEvent,
};
use crate::provider::BillingProvider;
use crate::store::{CheckoutSessionPatch, CustomerPatch, InvoicePatch, SubscriptionPatch};
use crate::types::{
    project_linkage, CheckoutMode, CheckoutSessionRecord, CustomerRecord, InvoiceRecord,
    PaymentRecord, SubscriptionRecord, SubscriptionStatus,
};
use crate::upsert::UpsertLayer;

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    verifier: Arc<dyn EventVerifier>,
    upserts: UpsertLayer,
    classifier: PaymentClassifier,
}

impl WebhookHandler {
    pub fn new(
        verifier: Arc<dyn EventVerifier>,
        upserts: UpsertLayer,
        provider: Arc<dyn BillingProvider>,
    ) -> Self {
        let classifier = PaymentClassifier::new(upserts.store().clone(), provider);
        Self {
            verifier,
            upserts,
            classifier,
        }
    }

    /// Ingestion entry point: verify the raw payload, then dispatch.
    ///
    /// A signature rejection surfaces as [`SyncError::Authentication`]
    /// (client-class, never retried internally); any handler error is a
    /// processing failure the transport should report so the provider's
    /// redelivery retries the event.
    ///
    /// [`SyncError::Authentication`]: crate::error::SyncError::Authentication
    pub async fn ingest(&self, payload: &[u8], signature: &str) -> SyncResult<()> {
        let event = self.verifier.verify(payload, signature)?;
        self.handle_event(event).await
    }

    /// Handle a verified event
    pub async fn handle_event(&self, event: WebhookEvent) -> SyncResult<()> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.kind,
            "Processing Stripe webhook event"
        );

        match &event.kind {
            EventKind::CustomerCreated => self.handle_customer_created(&event).await,
            EventKind::CustomerUpdated => self.handle_customer_updated(&event).await,
            EventKind::SubscriptionCreated => self.handle_subscription_created(&event).await,
            EventKind::SubscriptionUpdated => self.handle_subscription_updated(&event).await,
            EventKind::SubscriptionDeleted => self.handle_subscription_deleted(&event).await,
            EventKind::CheckoutSessionCompleted => self.handle_checkout_completed(&event).await,
            EventKind::InvoiceCreated | EventKind::InvoiceFinalized => {
                self.handle_invoice_created(&event).await
            }
            // Both mean "invoice money collected"
            EventKind::InvoicePaid | EventKind::InvoicePaymentSucceeded => {
                self.handle_invoice_paid(&event).await
            }
            EventKind::InvoicePaymentFailed => self.handle_invoice_payment_failed(&event).await,
            EventKind::PaymentIntentSucceeded => self.handle_payment_intent_succeeded(&event).await,
            EventKind::Unknown(kind) => {
                // Log at info level so we can track which events we're not handling
                tracing::info!(
                    event_id = %event.id,
                    event_type = %kind,
                    "Received unhandled Stripe event type - no handler configured"
                );
                Ok(())
            }
        }
    }

    async fn handle_customer_created(&self, event: &WebhookEvent) -> SyncResult<()> {
        let customer: CustomerObject = event.extract()?;

        let id = self
            .upserts
            .insert_customer_if_absent(CustomerRecord {
                id: Uuid::new_v4(),
                stripe_customer_id: customer.id.clone(),
                email: customer.email,
                name: customer.name,
                metadata: customer.metadata.unwrap_or_default(),
            })
            .await?;

        tracing::info!(customer_id = %customer.id, record_id = %id, "Customer created");
        Ok(())
    }

    async fn handle_customer_updated(&self, event: &WebhookEvent) -> SyncResult<()> {
        let customer: CustomerObject = event.extract()?;

        let patched = self
            .upserts
            .patch_customer_if_present(
                &customer.id,
                CustomerPatch {
                    email: customer.email,
                    name: customer.name,
                    metadata: customer.metadata,
                },
            )
            .await?;

        if patched.is_none() {
            // Creation is the creation event's responsibility
            tracing::debug!(customer_id = %customer.id, "Update for unknown customer, ignoring");
        }
        Ok(())
    }

    async fn handle_subscription_created(&self, event: &WebhookEvent) -> SyncResult<()> {
        let subscription: SubscriptionObject = event.extract()?;

        let metadata = subscription.metadata.clone().unwrap_or_default();
        let (org_id, user_id) = project_linkage(&metadata);

        let id = self
            .upserts
            .insert_subscription_if_absent(SubscriptionRecord {
                id: Uuid::new_v4(),
                stripe_subscription_id: subscription.id.clone(),
                stripe_customer_id: subscription.customer.id().to_string(),
                status: subscription
                    .status
                    .as_deref()
                    .map(SubscriptionStatus::from_stripe)
                    .unwrap_or(SubscriptionStatus::Incomplete),
                current_period_end: subscription.current_period_end.unwrap_or(0),
                cancel_at_period_end: subscription.cancel_at_period_end.unwrap_or(false),
                quantity: subscription.effective_quantity(),
                price_id: subscription.price_id(),
                metadata,
                org_id,
                user_id,
                synced_at: time::OffsetDateTime::now_utc(),
            })
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            customer_id = %subscription.customer.id(),
            record_id = %id,
            "Subscription created"
        );
        Ok(())
    }

    async fn handle_subscription_updated(&self, event: &WebhookEvent) -> SyncResult<()> {
        let subscription: SubscriptionObject = event.extract()?;

        let (metadata, org_id, user_id) = match subscription.metadata.clone() {
            Some(bag) => {
                let (org_id, user_id) = project_linkage(&bag);
                (Some(bag), org_id, user_id)
            }
            None => (None, None, None),
        };

        let patched = self
            .upserts
            .patch_subscription_if_present(
                &subscription.id,
                SubscriptionPatch {
                    status: subscription
                        .status
                        .as_deref()
                        .map(SubscriptionStatus::from_stripe),
                    current_period_end: subscription.current_period_end,
                    cancel_at_period_end: subscription.cancel_at_period_end,
                    quantity: subscription.effective_quantity(),
                    price_id: subscription.price_id(),
                    metadata,
                    org_id,
                    user_id,
                },
            )
            .await?;

        match patched {
            Some(_) => tracing::info!(
                subscription_id = %subscription.id,
                status = ?subscription.status,
                "Subscription updated"
            ),
            None => tracing::debug!(
                subscription_id = %subscription.id,
                "Update for unknown subscription, ignoring"
            ),
        }
        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: &WebhookEvent) -> SyncResult<()> {
        let subscription: SubscriptionObject = event.extract()?;

        // Terminal status, row retained
        let patched = self
            .upserts
            .patch_subscription_if_present(
                &subscription.id,
                SubscriptionPatch {
                    status: Some(SubscriptionStatus::Canceled),
                    ..Default::default()
                },
            )
            .await?;

        match patched {
            Some(_) => {
                tracing::info!(subscription_id = %subscription.id, "Subscription canceled")
            }
            None => tracing::debug!(
                subscription_id = %subscription.id,
                "Deletion for unknown subscription, ignoring"
            ),
        }
        Ok(())
    }

    async fn handle_checkout_completed(&self, event: &WebhookEvent) -> SyncResult<()> {
        let session: CheckoutSessionObject = event.extract()?;

        let mode = session.mode.as_deref().and_then(CheckoutMode::from_stripe);
        let customer_id = session.customer.as_ref().map(|c| c.id().to_string());
        let status = session
            .status
            .clone()
            .unwrap_or_else(|| "complete".to_string());

        self.upserts
            .upsert_checkout_session(
                CheckoutSessionRecord {
                    id: Uuid::new_v4(),
                    stripe_checkout_session_id: session.id.clone(),
                    stripe_customer_id: customer_id.clone(),
                    mode,
                    status: status.clone(),
                    metadata: session.metadata.clone().unwrap_or_default(),
                },
                CheckoutSessionPatch {
                    stripe_customer_id: customer_id.clone(),
                    mode,
                    status: Some(status),
                    metadata: session.metadata.clone(),
                },
            )
            .await?;

        tracing::info!(session_id = %session.id, mode = ?mode, "Checkout session completed");

        // A payment-mode completion may carry the customer a guest capture
        // was missing; backfill it write-once.
        if mode == Some(CheckoutMode::Payment) {
            if let (Some(customer), Some(payment_intent)) = (&customer_id, &session.payment_intent)
            {
                let backfilled = self
                    .upserts
                    .backfill_payment_customer(payment_intent.id(), customer)
                    .await?;
                if backfilled.is_some() {
                    tracing::info!(
                        payment_intent_id = %payment_intent.id(),
                        customer_id = %customer,
                        "Backfilled payment customer from checkout session"
                    );
                }
            }
        }

        Ok(())
    }

    async fn handle_invoice_created(&self, event: &WebhookEvent) -> SyncResult<()> {
        let invoice: InvoiceObject = event.extract()?;

        let id = self
            .upserts
            .insert_invoice_if_absent(InvoiceRecord {
                id: Uuid::new_v4(),
                stripe_invoice_id: invoice.id.clone(),
                stripe_customer_id: invoice.customer.id().to_string(),
                stripe_subscription_id: invoice.subscription.as_ref().map(|s| s.id().to_string()),
                status: invoice.status.clone().unwrap_or_else(|| "open".to_string()),
                amount_due: invoice.amount_due,
                amount_paid: invoice.amount_paid,
                created: invoice.created,
            })
            .await?;

        tracing::info!(invoice_id = %invoice.id, record_id = %id, "Invoice recorded");
        Ok(())
    }

    async fn handle_invoice_paid(&self, event: &WebhookEvent) -> SyncResult<()> {
        let invoice: InvoiceObject = event.extract()?;

        let patched = self
            .upserts
            .patch_invoice_if_present(
                &invoice.id,
                InvoicePatch {
                    status: Some("paid".to_string()),
                    amount_paid: Some(invoice.amount_paid),
                },
            )
            .await?;

        match patched {
            Some(_) => tracing::info!(
                invoice_id = %invoice.id,
                amount_paid = invoice.amount_paid,
                "Invoice paid"
            ),
            None => tracing::debug!(invoice_id = %invoice.id, "Paid event for unknown invoice, ignoring"),
        }
        Ok(())
    }

    async fn handle_invoice_payment_failed(&self, event: &WebhookEvent) -> SyncResult<()> {
        let invoice: InvoiceObject = event.extract()?;

        // The invoice stays collectible; Stripe keeps retrying it
        let patched = self
            .upserts
            .patch_invoice_if_present(
                &invoice.id,
                InvoicePatch {
                    status: Some("open".to_string()),
                    amount_paid: None,
                },
            )
            .await?;

        match patched {
            Some(_) => tracing::warn!(
                invoice_id = %invoice.id,
                amount_due = invoice.amount_due,
                "Invoice payment failed"
            ),
            None => tracing::debug!(
                invoice_id = %invoice.id,
                "Payment-failed event for unknown invoice, ignoring"
            ),
        }
        Ok(())
    }

    async fn handle_payment_intent_succeeded(&self, event: &WebhookEvent) -> SyncResult<()> {
        let intent: PaymentIntentObject = event.extract()?;

        if self.classifier.classify(&intent).await? == PaymentClass::SubscriptionDerived {
            tracing::info!(
                payment_intent_id = %intent.id,
                "Capture belongs to a subscription invoice, not recording a payment"
            );
            return Ok(());
        }

        let (org_id, user_id) = project_linkage(&intent.metadata);

        let id = self
            .upserts
            .insert_payment_if_absent(PaymentRecord {
                id: Uuid::new_v4(),
                stripe_payment_intent_id: intent.id.clone(),
                stripe_customer_id: intent.customer.as_ref().map(|c| c.id().to_string()),
                amount: intent.amount,
                currency: intent
                    .currency
                    .clone()
                    .unwrap_or_else(|| "usd".to_string()),
                status: intent
                    .status
                    .clone()
                    .unwrap_or_else(|| "succeeded".to_string()),
                created: intent.created,
                metadata: intent.metadata.clone(),
                org_id,
                user_id,
            })
            .await?;

        tracing::info!(
            payment_intent_id = %intent.id,
            amount = intent.amount,
            record_id = %id,
            "Standalone payment recorded"
        );
        Ok(())
    }
}
