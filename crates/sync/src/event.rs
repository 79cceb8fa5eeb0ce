//! Webhook event model
//!
//! Events arrive as an envelope with a `type` discriminator and a nested
//! `data.object` whose shape depends on the type. The envelope is parsed
//! eagerly; the object is kept as raw JSON and decoded per kind by the
//! dispatcher, so an unrecognized kind never fails on payload shape.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{SyncError, SyncResult};
use crate::types::Metadata;

/// Event kinds the dispatcher maps to handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    CustomerCreated,
    CustomerUpdated,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    CheckoutSessionCompleted,
    InvoiceCreated,
    InvoiceFinalized,
    InvoicePaid,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    PaymentIntentSucceeded,
    /// Acknowledged and discarded, never a failure
    Unknown(String),
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "customer.created" => Self::CustomerCreated,
            "customer.updated" => Self::CustomerUpdated,
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "invoice.created" => Self::InvoiceCreated,
            "invoice.finalized" => Self::InvoiceFinalized,
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CustomerCreated => "customer.created",
            Self::CustomerUpdated => "customer.updated",
            Self::SubscriptionCreated => "customer.subscription.created",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::InvoiceCreated => "invoice.created",
            Self::InvoiceFinalized => "invoice.finalized",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::Unknown(other) => other.as_str(),
        };
        write!(f, "{s}")
    }
}

/// A verified webhook event
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Event id (`evt_...`)
    pub id: String,
    pub kind: EventKind,
    /// When the provider created the event (Unix timestamp)
    pub created: i64,
    /// Raw `data.object`, decoded per kind via [`WebhookEvent::extract`]
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Parse the event envelope from a raw payload.
    ///
    /// Verification of the payload's authenticity is the
    /// [`EventVerifier`]'s job; this only decodes the envelope shape.
    pub fn from_payload(payload: &[u8]) -> SyncResult<Self> {
        let raw: RawEvent =
            serde_json::from_slice(payload).map_err(|e| SyncError::Payload(e.to_string()))?;
        Ok(Self {
            id: raw.id,
            kind: EventKind::from(raw.event_type.as_str()),
            created: raw.created,
            object: raw.data.object,
        })
    }

    /// Decode `data.object` into the payload type for this event's kind.
    pub fn extract<T: DeserializeOwned>(&self) -> SyncResult<T> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| SyncError::Payload(format!("{}: {e}", self.kind)))
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: i64,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// The verification gate: raw bytes + signature header in, typed event or
/// authentication failure out.
///
/// The cryptography lives behind this trait in the embedding application;
/// implementations must return [`SyncError::Authentication`] for any
/// bad or missing signature so transports can reject with a client-error
/// outcome.
pub trait EventVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], signature: &str) -> SyncResult<WebhookEvent>;
}

/// A reference that may arrive as a bare id string or an expanded object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object { id } => id,
        }
    }
}

/// `data.object` for customer events
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerObject {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Absent in sparse payloads; `None` must never clobber the stored bag
    pub metadata: Option<Metadata>,
}

/// `data.object` for subscription events
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: Expandable,
    pub status: Option<String>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: Option<bool>,
    pub quantity: Option<u64>,
    pub items: Option<SubscriptionItems>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Option<SubscriptionPrice>,
    pub quantity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionPrice {
    pub id: String,
}

impl SubscriptionObject {
    /// Price id of the first item, if present
    #[must_use]
    pub fn price_id(&self) -> Option<String> {
        self.items
            .as_ref()?
            .data
            .first()?
            .price
            .as_ref()
            .map(|p| p.id.clone())
    }

    /// Top-level quantity, falling back to the first item's
    #[must_use]
    pub fn effective_quantity(&self) -> Option<u64> {
        self.quantity
            .or_else(|| self.items.as_ref()?.data.first()?.quantity)
    }
}

/// `data.object` for `payment_intent.succeeded`
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub customer: Option<Expandable>,
    #[serde(default)]
    pub amount: i64,
    pub currency: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub created: i64,
    /// Link to the invoice this capture paid, when Stripe attaches one
    pub invoice: Option<Expandable>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// `data.object` for `checkout.session.completed`
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub customer: Option<Expandable>,
    pub mode: Option<String>,
    pub status: Option<String>,
    pub payment_intent: Option<Expandable>,
    pub metadata: Option<Metadata>,
}

/// `data.object` for invoice events
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub customer: Expandable,
    pub subscription: Option<Expandable>,
    pub status: Option<String>,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub created: i64,
}
