//! Invoice queries

use crate::error::SyncResult;
use crate::store::RecordStore;
use crate::types::InvoiceRecord;
use crate::upsert::UpsertLayer;

/// Directly-invoked invoice queries
pub struct InvoiceService {
    upserts: UpsertLayer,
}

impl InvoiceService {
    pub fn new(upserts: UpsertLayer) -> Self {
        Self { upserts }
    }

    pub async fn get(&self, stripe_invoice_id: &str) -> SyncResult<Option<InvoiceRecord>> {
        self.upserts.store().get_invoice(stripe_invoice_id).await
    }

    pub async fn list_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> SyncResult<Vec<InvoiceRecord>> {
        self.upserts
            .store()
            .list_invoices_by_customer(stripe_customer_id)
            .await
    }
}
