//! Payment operations

use uuid::Uuid;

use crate::error::SyncResult;
use crate::store::RecordStore;
use crate::types::PaymentRecord;
use crate::upsert::UpsertLayer;

/// Directly-invoked payment operations
pub struct PaymentService {
    upserts: UpsertLayer,
}

impl PaymentService {
    pub fn new(upserts: UpsertLayer) -> Self {
        Self { upserts }
    }

    pub async fn get(&self, stripe_payment_intent_id: &str) -> SyncResult<Option<PaymentRecord>> {
        self.upserts
            .store()
            .get_payment(stripe_payment_intent_id)
            .await
    }

    pub async fn list_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> SyncResult<Vec<PaymentRecord>> {
        self.upserts
            .store()
            .list_payments_by_customer(stripe_customer_id)
            .await
    }

    pub async fn list_by_user(&self, user_id: &str) -> SyncResult<Vec<PaymentRecord>> {
        self.upserts.store().list_payments_by_user(user_id).await
    }

    pub async fn list_by_org(&self, org_id: &str) -> SyncResult<Vec<PaymentRecord>> {
        self.upserts.store().list_payments_by_org(org_id).await
    }

    /// Attach a customer to a payment captured before the customer was
    /// known. Write-once: an already-set customer id is never overwritten.
    /// Returns `None` if no payment row exists for the intent.
    pub async fn backfill_customer(
        &self,
        stripe_payment_intent_id: &str,
        stripe_customer_id: &str,
    ) -> SyncResult<Option<Uuid>> {
        self.upserts
            .backfill_payment_customer(stripe_payment_intent_id, stripe_customer_id)
            .await
    }
}
