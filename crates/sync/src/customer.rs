//! Customer operations

use uuid::Uuid;

use crate::error::SyncResult;
use crate::store::{CustomerPatch, RecordStore};
use crate::types::{CustomerRecord, Metadata};
use crate::upsert::UpsertLayer;

/// Directly-invoked customer operations
pub struct CustomerService {
    upserts: UpsertLayer,
}

impl CustomerService {
    pub fn new(upserts: UpsertLayer) -> Self {
        Self { upserts }
    }

    pub async fn get(&self, stripe_customer_id: &str) -> SyncResult<Option<CustomerRecord>> {
        self.upserts.store().get_customer(stripe_customer_id).await
    }

    /// Insert-or-patch a customer by natural key. Only supplied fields are
    /// written on the patch path.
    pub async fn create_or_update(
        &self,
        stripe_customer_id: &str,
        email: Option<String>,
        name: Option<String>,
        metadata: Option<Metadata>,
    ) -> SyncResult<Uuid> {
        self.upserts
            .upsert_customer(
                CustomerRecord {
                    id: Uuid::new_v4(),
                    stripe_customer_id: stripe_customer_id.to_string(),
                    email: email.clone(),
                    name: name.clone(),
                    metadata: metadata.clone().unwrap_or_default(),
                },
                CustomerPatch {
                    email,
                    name,
                    metadata,
                },
            )
            .await
    }
}
