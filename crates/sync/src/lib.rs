// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Stripe Sync Engine
//!
//! Keeps a local record store consistent with Stripe's view of customers,
//! subscriptions, payments, checkout sessions, and invoices.
//!
//! ## Features
//!
//! - **Webhook ingestion**: verified events dispatched to idempotent,
//!   natural-key-scoped handlers; safe under duplicate and out-of-order
//!   delivery
//! - **Payment classification**: separates standalone one-time payments
//!   from subscription invoice captures so money is never counted twice
//! - **Idempotent upserts**: per-natural-key serialization, write-once
//!   customer backfill for guest checkouts
//! - **Metadata projection**: reserved `orgId`/`userId` metadata keys
//!   promoted to indexed fields for secondary lookup
//! - **Direct operations**: seat quantity changes, cancellation, checkout
//!   and portal session creation (remote call first, local patch after)
//!
//! The HTTP transport, signature cryptography, concrete Stripe client, and
//! storage engine stay outside the crate behind the [`EventVerifier`],
//! [`BillingProvider`], and [`RecordStore`] traits.

pub mod checkout;
pub mod classifier;
pub mod config;
pub mod customer;
pub mod error;
pub mod event;
pub mod invoices;
pub mod payments;
pub mod portal;
pub mod provider;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod upsert;
pub mod webhooks;


// Checkout
pub use checkout::{CheckoutResponse, CheckoutService};

// Classifier
pub use classifier::{
    PaymentClass, PaymentClassifier, INVOICE_LOOKUP_TIMEOUT, RECENT_SUBSCRIPTION_WINDOW,
};

// Config
pub use config::StripeConfig;

// Customer
pub use customer::CustomerService;

// Error
pub use error::{SyncError, SyncResult};

// Events
pub use event::{
    CheckoutSessionObject, CustomerObject, EventKind, EventVerifier, Expandable, InvoiceObject,
    PaymentIntentObject, SubscriptionObject, WebhookEvent,
};

// Invoices
pub use invoices::InvoiceService;

// Payments
pub use payments::PaymentService;

// Portal
pub use portal::{PortalResponse, PortalService};

// Provider
pub use provider::{
    BillingProvider, CheckoutSessionResponse, CreateCheckoutParams, ProviderInvoice,
};

// Store
pub use store::memory::MemoryStore;
pub use store::{
    CheckoutSessionPatch, CustomerPatch, InvoicePatch, PaymentPatch, RecordStore,
    SubscriptionPatch,
};

// Subscriptions
pub use subscriptions::SubscriptionService;

// Types
pub use types::{
    project_linkage, CheckoutMode, CheckoutSessionRecord, CustomerRecord, InvoiceRecord, Metadata,
    PaymentRecord, SubscriptionRecord, SubscriptionStatus,
};

// Upsert
pub use upsert::{EntityKind, UpsertLayer};

// Webhooks
pub use webhooks::WebhookHandler;

use std::sync::Arc;

/// Main sync service that combines all entity operations and the webhook
/// dispatcher over one shared store and upsert layer, so the webhook path
/// and the direct-operation path serialize on the same natural keys.
pub struct SyncService {
    pub customers: CustomerService,
    pub subscriptions: SubscriptionService,
    pub payments: PaymentService,
    pub invoices: InvoiceService,
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub webhooks: WebhookHandler,
    config: StripeConfig,
}

impl SyncService {
    /// Create a sync service with explicit config and collaborators.
    pub fn new(
        config: StripeConfig,
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn BillingProvider>,
        verifier: Arc<dyn EventVerifier>,
    ) -> Self {
        let upserts = UpsertLayer::new(store);

        Self {
            customers: CustomerService::new(upserts.clone()),
            subscriptions: SubscriptionService::new(upserts.clone(), provider.clone()),
            payments: PaymentService::new(upserts.clone()),
            invoices: InvoiceService::new(upserts.clone()),
            checkout: CheckoutService::new(provider.clone()),
            portal: PortalService::new(provider.clone()),
            webhooks: WebhookHandler::new(verifier, upserts, provider),
            config,
        }
    }

    /// Create a sync service with config resolved from the environment.
    pub fn from_env(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn BillingProvider>,
        verifier: Arc<dyn EventVerifier>,
    ) -> SyncResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config, store, provider, verifier))
    }

    /// The credentials this service was constructed with; what the
    /// embedding application hands to its provider and verifier
    /// implementations.
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
