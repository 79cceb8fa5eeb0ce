//! Idempotent upsert layer
//!
//! Every webhook handler and direct operation funnels its writes through
//! here. The layer guarantees that a natural key maps to at most one row
//! even when the same notification is delivered twice concurrently: writes
//! for the same `(entity, natural key)` pair are serialized through a keyed
//! mutex map, while writes for different keys proceed in parallel. There is
//! no global lock.
//!
//! Callers construct the record they would insert (with a fresh storage id)
//! and, for upserts, the patch they would apply instead; the layer decides
//! which happens after looking up the key under the lock. The returned id is
//! always the surviving row's storage id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::store::{
    CheckoutSessionPatch, CustomerPatch, InvoicePatch, PaymentPatch, RecordStore,
    SubscriptionPatch,
};
use crate::types::{
    CheckoutSessionRecord, CustomerRecord, InvoiceRecord, PaymentRecord, SubscriptionRecord,
};

/// Entity collections, used to scope the per-key locks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Customer,
    Subscription,
    Payment,
    CheckoutSession,
    Invoice,
}

/// Keyed mutual-exclusion map over `(entity, natural key)`.
///
/// Entries are retained after use; cardinality is bounded by the number of
/// distinct natural keys seen by this process.
#[derive(Default)]
struct KeyLocks {
    locks: StdMutex<HashMap<(EntityKind, String), Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, kind: EntityKind, key: &str) -> SyncResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| SyncError::Internal("key lock map poisoned".to_string()))?;
            locks
                .entry((kind, key.to_string()))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }
}

/// The idempotent write path shared by the webhook dispatcher and the
/// directly-invoked services. Clone-cheap; clones share the same lock map
/// so both paths serialize on the same keys.
#[derive(Clone)]
pub struct UpsertLayer {
    store: Arc<dyn RecordStore>,
    locks: Arc<KeyLocks>,
}

impl UpsertLayer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyLocks::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // Customers

    /// Insert the customer if its natural key is unseen; replayed creation
    /// notifications are no-ops that return the existing row's id.
    pub async fn insert_customer_if_absent(&self, record: CustomerRecord) -> SyncResult<Uuid> {
        let key = record.stripe_customer_id.clone();
        let _guard = self.locks.acquire(EntityKind::Customer, &key).await?;

        if let Some(existing) = self.store.get_customer(&key).await? {
            return Ok(existing.id);
        }
        self.store.insert_customer(record).await
    }

    /// Patch the customer if present; update-for-unknown-customer is a
    /// silent no-op.
    pub async fn patch_customer_if_present(
        &self,
        stripe_customer_id: &str,
        patch: CustomerPatch,
    ) -> SyncResult<Option<Uuid>> {
        let _guard = self
            .locks
            .acquire(EntityKind::Customer, stripe_customer_id)
            .await?;
        self.store.patch_customer(stripe_customer_id, patch).await
    }

    /// Insert-or-patch a customer by natural key.
    pub async fn upsert_customer(
        &self,
        record: CustomerRecord,
        patch: CustomerPatch,
    ) -> SyncResult<Uuid> {
        let key = record.stripe_customer_id.clone();
        let _guard = self.locks.acquire(EntityKind::Customer, &key).await?;

        if self.store.get_customer(&key).await?.is_some() {
            return self
                .store
                .patch_customer(&key, patch)
                .await?
                .ok_or_else(|| SyncError::Internal(format!("customer {key} vanished mid-upsert")));
        }
        self.store.insert_customer(record).await
    }

    // Subscriptions

    pub async fn insert_subscription_if_absent(
        &self,
        record: SubscriptionRecord,
    ) -> SyncResult<Uuid> {
        let key = record.stripe_subscription_id.clone();
        let _guard = self.locks.acquire(EntityKind::Subscription, &key).await?;

        if let Some(existing) = self.store.get_subscription(&key).await? {
            return Ok(existing.id);
        }
        self.store.insert_subscription(record).await
    }

    pub async fn patch_subscription_if_present(
        &self,
        stripe_subscription_id: &str,
        patch: SubscriptionPatch,
    ) -> SyncResult<Option<Uuid>> {
        let _guard = self
            .locks
            .acquire(EntityKind::Subscription, stripe_subscription_id)
            .await?;
        self.store
            .patch_subscription(stripe_subscription_id, patch)
            .await
    }

    // Payments

    pub async fn insert_payment_if_absent(&self, record: PaymentRecord) -> SyncResult<Uuid> {
        let key = record.stripe_payment_intent_id.clone();
        let _guard = self.locks.acquire(EntityKind::Payment, &key).await?;

        if let Some(existing) = self.store.get_payment(&key).await? {
            return Ok(existing.id);
        }
        self.store.insert_payment(record).await
    }

    /// Write-once customer backfill for a payment captured before its
    /// customer was known. Sets the customer id only while it is currently
    /// unset; an already-set id is never overwritten, so a replayed or
    /// malformed later event cannot corrupt a correct earlier link.
    ///
    /// Returns `None` if no payment row exists for the intent yet.
    pub async fn backfill_payment_customer(
        &self,
        stripe_payment_intent_id: &str,
        stripe_customer_id: &str,
    ) -> SyncResult<Option<Uuid>> {
        let _guard = self
            .locks
            .acquire(EntityKind::Payment, stripe_payment_intent_id)
            .await?;

        let Some(existing) = self.store.get_payment(stripe_payment_intent_id).await? else {
            return Ok(None);
        };
        if let Some(current) = existing.stripe_customer_id.as_deref() {
            if current != stripe_customer_id {
                tracing::warn!(
                    payment_intent_id = %stripe_payment_intent_id,
                    existing_customer = %current,
                    attempted_customer = %stripe_customer_id,
                    "Ignoring customer backfill for payment with customer already set"
                );
            }
            return Ok(Some(existing.id));
        }

        self.store
            .patch_payment(
                stripe_payment_intent_id,
                PaymentPatch {
                    stripe_customer_id: Some(stripe_customer_id.to_string()),
                    ..Default::default()
                },
            )
            .await
    }

    // Checkout sessions

    pub async fn upsert_checkout_session(
        &self,
        record: CheckoutSessionRecord,
        patch: CheckoutSessionPatch,
    ) -> SyncResult<Uuid> {
        let key = record.stripe_checkout_session_id.clone();
        let _guard = self.locks.acquire(EntityKind::CheckoutSession, &key).await?;

        if self.store.get_checkout_session(&key).await?.is_some() {
            return self
                .store
                .patch_checkout_session(&key, patch)
                .await?
                .ok_or_else(|| {
                    SyncError::Internal(format!("checkout session {key} vanished mid-upsert"))
                });
        }
        self.store.insert_checkout_session(record).await
    }

    // Invoices

    pub async fn insert_invoice_if_absent(&self, record: InvoiceRecord) -> SyncResult<Uuid> {
        let key = record.stripe_invoice_id.clone();
        let _guard = self.locks.acquire(EntityKind::Invoice, &key).await?;

        if let Some(existing) = self.store.get_invoice(&key).await? {
            return Ok(existing.id);
        }
        self.store.insert_invoice(record).await
    }

    pub async fn patch_invoice_if_present(
        &self,
        stripe_invoice_id: &str,
        patch: InvoicePatch,
    ) -> SyncResult<Option<Uuid>> {
        let _guard = self
            .locks
            .acquire(EntityKind::Invoice, stripe_invoice_id)
            .await?;
        self.store.patch_invoice(stripe_invoice_id, patch).await
    }
}
