//! Record store contract
//!
//! The sync engine only needs two access patterns: unique point lookup by
//! natural key and range scans over a handful of secondary keys. Implement
//! [`RecordStore`] to persist records to your database; an in-memory
//! implementation is provided for tests and for embedding without one.
//!
//! Patch structs carry `Option` fields: `None` means "leave untouched",
//! never "set to null". Patching an absent row returns `Ok(None)` so the
//! caller can decide whether that is a no-op.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::types::{
    CheckoutMode, CheckoutSessionRecord, CustomerRecord, InvoiceRecord, Metadata, PaymentRecord,
    SubscriptionRecord, SubscriptionStatus,
};

/// Partial update for a customer row
#[derive(Debug, Clone, Default)]
pub struct CustomerPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Partial update for a subscription row
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPatch {
    pub status: Option<SubscriptionStatus>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: Option<bool>,
    pub quantity: Option<u64>,
    pub price_id: Option<String>,
    pub metadata: Option<Metadata>,
    pub org_id: Option<String>,
    pub user_id: Option<String>,
}

/// Partial update for a payment row.
///
/// The write-once rule for `stripe_customer_id` is enforced by the upsert
/// layer, not here; the store applies whatever it is given.
#[derive(Debug, Clone, Default)]
pub struct PaymentPatch {
    pub stripe_customer_id: Option<String>,
    pub status: Option<String>,
    pub metadata: Option<Metadata>,
    pub org_id: Option<String>,
    pub user_id: Option<String>,
}

/// Partial update for a checkout session row
#[derive(Debug, Clone, Default)]
pub struct CheckoutSessionPatch {
    pub stripe_customer_id: Option<String>,
    pub mode: Option<CheckoutMode>,
    pub status: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Partial update for an invoice row
#[derive(Debug, Clone, Default)]
pub struct InvoicePatch {
    pub status: Option<String>,
    pub amount_paid: Option<i64>,
}

/// Storage contract for synced billing records.
///
/// Implementations must enforce uniqueness of each entity's natural key:
/// `insert_*` for a key that already exists is an error. Callers that need
/// insert-or-patch semantics go through the upsert layer, which serializes
/// per natural key before deciding which to do.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // Customers

    async fn get_customer(&self, stripe_customer_id: &str) -> SyncResult<Option<CustomerRecord>>;

    async fn insert_customer(&self, record: CustomerRecord) -> SyncResult<Uuid>;

    async fn patch_customer(
        &self,
        stripe_customer_id: &str,
        patch: CustomerPatch,
    ) -> SyncResult<Option<Uuid>>;

    // Subscriptions

    async fn get_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> SyncResult<Option<SubscriptionRecord>>;

    async fn insert_subscription(&self, record: SubscriptionRecord) -> SyncResult<Uuid>;

    async fn patch_subscription(
        &self,
        stripe_subscription_id: &str,
        patch: SubscriptionPatch,
    ) -> SyncResult<Option<Uuid>>;

    async fn list_subscriptions_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> SyncResult<Vec<SubscriptionRecord>>;

    /// First subscription carrying the given projected `orgId`, if any
    async fn find_subscription_by_org(
        &self,
        org_id: &str,
    ) -> SyncResult<Option<SubscriptionRecord>>;

    async fn list_subscriptions_by_user(&self, user_id: &str)
        -> SyncResult<Vec<SubscriptionRecord>>;

    // Payments

    async fn get_payment(&self, stripe_payment_intent_id: &str)
        -> SyncResult<Option<PaymentRecord>>;

    async fn insert_payment(&self, record: PaymentRecord) -> SyncResult<Uuid>;

    async fn patch_payment(
        &self,
        stripe_payment_intent_id: &str,
        patch: PaymentPatch,
    ) -> SyncResult<Option<Uuid>>;

    async fn list_payments_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> SyncResult<Vec<PaymentRecord>>;

    async fn list_payments_by_user(&self, user_id: &str) -> SyncResult<Vec<PaymentRecord>>;

    async fn list_payments_by_org(&self, org_id: &str) -> SyncResult<Vec<PaymentRecord>>;

    // Checkout sessions

    async fn get_checkout_session(
        &self,
        stripe_checkout_session_id: &str,
    ) -> SyncResult<Option<CheckoutSessionRecord>>;

    async fn insert_checkout_session(&self, record: CheckoutSessionRecord) -> SyncResult<Uuid>;

    async fn patch_checkout_session(
        &self,
        stripe_checkout_session_id: &str,
        patch: CheckoutSessionPatch,
    ) -> SyncResult<Option<Uuid>>;

    // Invoices

    async fn get_invoice(&self, stripe_invoice_id: &str) -> SyncResult<Option<InvoiceRecord>>;

    async fn insert_invoice(&self, record: InvoiceRecord) -> SyncResult<Uuid>;

    async fn patch_invoice(
        &self,
        stripe_invoice_id: &str,
        patch: InvoicePatch,
    ) -> SyncResult<Option<Uuid>>;

    async fn list_invoices_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> SyncResult<Vec<InvoiceRecord>>;
}

pub mod memory {
    //! In-memory record store

    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard};

    use super::*;
    use crate::error::SyncError;

    /// In-memory [`RecordStore`] backed by per-entity hash maps keyed by
    /// natural key. Uniqueness of the natural key is enforced on insert.
    #[derive(Default)]
    pub struct MemoryStore {
        customers: Mutex<HashMap<String, CustomerRecord>>,
        subscriptions: Mutex<HashMap<String, SubscriptionRecord>>,
        payments: Mutex<HashMap<String, PaymentRecord>>,
        checkout_sessions: Mutex<HashMap<String, CheckoutSessionRecord>>,
        invoices: Mutex<HashMap<String, InvoiceRecord>>,
    }

    impl MemoryStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn locked<T>(mutex: &Mutex<T>) -> SyncResult<MutexGuard<'_, T>> {
        mutex
            .lock()
            .map_err(|_| SyncError::Store("memory store lock poisoned".to_string()))
    }

    fn duplicate(entity: &str, key: &str) -> SyncError {
        SyncError::Store(format!("duplicate {entity} natural key: {key}"))
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn get_customer(
            &self,
            stripe_customer_id: &str,
        ) -> SyncResult<Option<CustomerRecord>> {
            Ok(locked(&self.customers)?.get(stripe_customer_id).cloned())
        }

        async fn insert_customer(&self, record: CustomerRecord) -> SyncResult<Uuid> {
            let mut customers = locked(&self.customers)?;
            if customers.contains_key(&record.stripe_customer_id) {
                return Err(duplicate("customer", &record.stripe_customer_id));
            }
            let id = record.id;
            customers.insert(record.stripe_customer_id.clone(), record);
            Ok(id)
        }

        async fn patch_customer(
            &self,
            stripe_customer_id: &str,
            patch: CustomerPatch,
        ) -> SyncResult<Option<Uuid>> {
            let mut customers = locked(&self.customers)?;
            let Some(record) = customers.get_mut(stripe_customer_id) else {
                return Ok(None);
            };
            if let Some(email) = patch.email {
                record.email = Some(email);
            }
            if let Some(name) = patch.name {
                record.name = Some(name);
            }
            if let Some(metadata) = patch.metadata {
                record.metadata = metadata;
            }
            Ok(Some(record.id))
        }

        async fn get_subscription(
            &self,
            stripe_subscription_id: &str,
        ) -> SyncResult<Option<SubscriptionRecord>> {
            Ok(locked(&self.subscriptions)?
                .get(stripe_subscription_id)
                .cloned())
        }

        async fn insert_subscription(&self, record: SubscriptionRecord) -> SyncResult<Uuid> {
            let mut subscriptions = locked(&self.subscriptions)?;
            if subscriptions.contains_key(&record.stripe_subscription_id) {
                return Err(duplicate("subscription", &record.stripe_subscription_id));
            }
            let id = record.id;
            subscriptions.insert(record.stripe_subscription_id.clone(), record);
            Ok(id)
        }

        async fn patch_subscription(
            &self,
            stripe_subscription_id: &str,
            patch: SubscriptionPatch,
        ) -> SyncResult<Option<Uuid>> {
            let mut subscriptions = locked(&self.subscriptions)?;
            let Some(record) = subscriptions.get_mut(stripe_subscription_id) else {
                return Ok(None);
            };
            if let Some(status) = patch.status {
                record.status = status;
            }
            if let Some(period_end) = patch.current_period_end {
                record.current_period_end = period_end;
            }
            if let Some(cancel) = patch.cancel_at_period_end {
                record.cancel_at_period_end = cancel;
            }
            if let Some(quantity) = patch.quantity {
                record.quantity = Some(quantity);
            }
            if let Some(price_id) = patch.price_id {
                record.price_id = Some(price_id);
            }
            if let Some(metadata) = patch.metadata {
                record.metadata = metadata;
            }
            if let Some(org_id) = patch.org_id {
                record.org_id = Some(org_id);
            }
            if let Some(user_id) = patch.user_id {
                record.user_id = Some(user_id);
            }
            Ok(Some(record.id))
        }

        async fn list_subscriptions_by_customer(
            &self,
            stripe_customer_id: &str,
        ) -> SyncResult<Vec<SubscriptionRecord>> {
            Ok(locked(&self.subscriptions)?
                .values()
                .filter(|s| s.stripe_customer_id == stripe_customer_id)
                .cloned()
                .collect())
        }

        async fn find_subscription_by_org(
            &self,
            org_id: &str,
        ) -> SyncResult<Option<SubscriptionRecord>> {
            Ok(locked(&self.subscriptions)?
                .values()
                .find(|s| s.org_id.as_deref() == Some(org_id))
                .cloned())
        }

        async fn list_subscriptions_by_user(
            &self,
            user_id: &str,
        ) -> SyncResult<Vec<SubscriptionRecord>> {
            Ok(locked(&self.subscriptions)?
                .values()
                .filter(|s| s.user_id.as_deref() == Some(user_id))
                .cloned()
                .collect())
        }

        async fn get_payment(
            &self,
            stripe_payment_intent_id: &str,
        ) -> SyncResult<Option<PaymentRecord>> {
            Ok(locked(&self.payments)?
                .get(stripe_payment_intent_id)
                .cloned())
        }

        async fn insert_payment(&self, record: PaymentRecord) -> SyncResult<Uuid> {
            let mut payments = locked(&self.payments)?;
            if payments.contains_key(&record.stripe_payment_intent_id) {
                return Err(duplicate("payment", &record.stripe_payment_intent_id));
            }
            let id = record.id;
            payments.insert(record.stripe_payment_intent_id.clone(), record);
            Ok(id)
        }

        async fn patch_payment(
            &self,
            stripe_payment_intent_id: &str,
            patch: PaymentPatch,
        ) -> SyncResult<Option<Uuid>> {
            let mut payments = locked(&self.payments)?;
            let Some(record) = payments.get_mut(stripe_payment_intent_id) else {
                return Ok(None);
            };
            if let Some(customer) = patch.stripe_customer_id {
                record.stripe_customer_id = Some(customer);
            }
            if let Some(status) = patch.status {
                record.status = status;
            }
            if let Some(metadata) = patch.metadata {
                record.metadata = metadata;
            }
            if let Some(org_id) = patch.org_id {
                record.org_id = Some(org_id);
            }
            if let Some(user_id) = patch.user_id {
                record.user_id = Some(user_id);
            }
            Ok(Some(record.id))
        }

        async fn list_payments_by_customer(
            &self,
            stripe_customer_id: &str,
        ) -> SyncResult<Vec<PaymentRecord>> {
            Ok(locked(&self.payments)?
                .values()
                .filter(|p| p.stripe_customer_id.as_deref() == Some(stripe_customer_id))
                .cloned()
                .collect())
        }

        async fn list_payments_by_user(&self, user_id: &str) -> SyncResult<Vec<PaymentRecord>> {
            Ok(locked(&self.payments)?
                .values()
                .filter(|p| p.user_id.as_deref() == Some(user_id))
                .cloned()
                .collect())
        }

        async fn list_payments_by_org(&self, org_id: &str) -> SyncResult<Vec<PaymentRecord>> {
            Ok(locked(&self.payments)?
                .values()
                .filter(|p| p.org_id.as_deref() == Some(org_id))
                .cloned()
                .collect())
        }

        async fn get_checkout_session(
            &self,
            stripe_checkout_session_id: &str,
        ) -> SyncResult<Option<CheckoutSessionRecord>> {
            Ok(locked(&self.checkout_sessions)?
                .get(stripe_checkout_session_id)
                .cloned())
        }

        async fn insert_checkout_session(
            &self,
            record: CheckoutSessionRecord,
        ) -> SyncResult<Uuid> {
            let mut sessions = locked(&self.checkout_sessions)?;
            if sessions.contains_key(&record.stripe_checkout_session_id) {
                return Err(duplicate(
                    "checkout session",
                    &record.stripe_checkout_session_id,
                ));
            }
            let id = record.id;
            sessions.insert(record.stripe_checkout_session_id.clone(), record);
            Ok(id)
        }

        async fn patch_checkout_session(
            &self,
            stripe_checkout_session_id: &str,
            patch: CheckoutSessionPatch,
        ) -> SyncResult<Option<Uuid>> {
            let mut sessions = locked(&self.checkout_sessions)?;
            let Some(record) = sessions.get_mut(stripe_checkout_session_id) else {
                return Ok(None);
            };
            if let Some(customer) = patch.stripe_customer_id {
                record.stripe_customer_id = Some(customer);
            }
            if let Some(mode) = patch.mode {
                record.mode = Some(mode);
            }
            if let Some(status) = patch.status {
                record.status = status;
            }
            if let Some(metadata) = patch.metadata {
                record.metadata = metadata;
            }
            Ok(Some(record.id))
        }

        async fn get_invoice(&self, stripe_invoice_id: &str) -> SyncResult<Option<InvoiceRecord>> {
            Ok(locked(&self.invoices)?.get(stripe_invoice_id).cloned())
        }

        async fn insert_invoice(&self, record: InvoiceRecord) -> SyncResult<Uuid> {
            let mut invoices = locked(&self.invoices)?;
            if invoices.contains_key(&record.stripe_invoice_id) {
                return Err(duplicate("invoice", &record.stripe_invoice_id));
            }
            let id = record.id;
            invoices.insert(record.stripe_invoice_id.clone(), record);
            Ok(id)
        }

        async fn patch_invoice(
            &self,
            stripe_invoice_id: &str,
            patch: InvoicePatch,
        ) -> SyncResult<Option<Uuid>> {
            let mut invoices = locked(&self.invoices)?;
            let Some(record) = invoices.get_mut(stripe_invoice_id) else {
                return Ok(None);
            };
            if let Some(status) = patch.status {
                record.status = status;
            }
            if let Some(amount_paid) = patch.amount_paid {
                record.amount_paid = amount_paid;
            }
            Ok(Some(record.id))
        }

        async fn list_invoices_by_customer(
            &self,
            stripe_customer_id: &str,
        ) -> SyncResult<Vec<InvoiceRecord>> {
            Ok(locked(&self.invoices)?
                .values()
                .filter(|i| i.stripe_customer_id == stripe_customer_id)
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::types::Metadata;
    use time::OffsetDateTime;

    fn subscription(natural_key: &str, customer: &str) -> SubscriptionRecord {
        SubscriptionRecord {
            id: Uuid::new_v4(),
            stripe_subscription_id: natural_key.to_string(),
            stripe_customer_id: customer.to_string(),
            status: SubscriptionStatus::Active,
            current_period_end: 0,
            cancel_at_period_end: false,
            quantity: None,
            price_id: None,
            metadata: Metadata::new(),
            org_id: None,
            user_id: None,
            synced_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn insert_then_point_lookup() {
        let store = MemoryStore::new();
        let id = store
            .insert_subscription(subscription("sub_1", "cus_1"))
            .await
            .unwrap();

        let found = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(store.get_subscription("sub_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_natural_key_rejected() {
        let store = MemoryStore::new();
        store
            .insert_subscription(subscription("sub_1", "cus_1"))
            .await
            .unwrap();

        let err = store
            .insert_subscription(subscription("sub_1", "cus_1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[tokio::test]
    async fn patch_absent_row_returns_none() {
        let store = MemoryStore::new();
        let result = store
            .patch_subscription("sub_missing", SubscriptionPatch::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn patch_touches_only_supplied_fields() {
        let store = MemoryStore::new();
        let mut record = subscription("sub_1", "cus_1");
        record.quantity = Some(5);
        store.insert_subscription(record).await.unwrap();

        store
            .patch_subscription(
                "sub_1",
                SubscriptionPatch {
                    status: Some(SubscriptionStatus::PastDue),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let found = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(found.status, SubscriptionStatus::PastDue);
        assert_eq!(found.quantity, Some(5));
        assert_eq!(found.stripe_customer_id, "cus_1");
    }

    #[tokio::test]
    async fn secondary_scans_filter_by_linkage() {
        let store = MemoryStore::new();
        let mut a = subscription("sub_a", "cus_1");
        a.org_id = Some("org_1".to_string());
        a.user_id = Some("u_1".to_string());
        let b = subscription("sub_b", "cus_1");
        let c = subscription("sub_c", "cus_2");
        for record in [a, b, c] {
            store.insert_subscription(record).await.unwrap();
        }

        assert_eq!(
            store
                .list_subscriptions_by_customer("cus_1")
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            store
                .find_subscription_by_org("org_1")
                .await
                .unwrap()
                .unwrap()
                .stripe_subscription_id,
            "sub_a"
        );
        assert!(store
            .find_subscription_by_org("org_404")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.list_subscriptions_by_user("u_1").await.unwrap().len(), 1);
    }
}
