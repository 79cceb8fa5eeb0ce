//! Entity records synced from Stripe
//!
//! Every record is keyed by Stripe's own identifier (the natural key).
//! The `Uuid` ids are storage bookkeeping only and are never used for
//! matching; entities reference each other by natural key strings, so
//! retaining or canceling one row never cascades to another.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Opaque, caller-defined metadata bag.
///
/// Stored verbatim; never schema-validated beyond the two projected keys
/// (see [`project_linkage`]).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Reserved metadata key projected into the indexed `org_id` field
pub const METADATA_ORG_KEY: &str = "orgId";
/// Reserved metadata key projected into the indexed `user_id` field
pub const METADATA_USER_KEY: &str = "userId";

/// Copy the reserved `orgId` / `userId` keys out of a metadata bag.
///
/// Projection is additive: the bag itself is always stored unchanged,
/// including the reserved keys. Non-string values are ignored.
pub fn project_linkage(metadata: &Metadata) -> (Option<String>, Option<String>) {
    let org_id = metadata
        .get(METADATA_ORG_KEY)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let user_id = metadata
        .get(METADATA_USER_KEY)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    (org_id, user_id)
}

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Paused,
    Unpaid,
}

impl SubscriptionStatus {
    /// Parse from Stripe's status string. Unknown statuses map to
    /// `Canceled`, the most conservative entitlement outcome.
    #[must_use]
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "paused" => Self::Paused,
            "unpaid" => Self::Unpaid,
            _ => Self::Canceled,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Paused => "paused",
            Self::Unpaid => "unpaid",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Checkout session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Subscription,
    Setup,
}

impl CheckoutMode {
    #[must_use]
    pub fn from_stripe(mode: &str) -> Option<Self> {
        match mode {
            "payment" => Some(Self::Payment),
            "subscription" => Some(Self::Subscription),
            "setup" => Some(Self::Setup),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Subscription => "subscription",
            Self::Setup => "setup",
        }
    }
}

/// A Stripe customer. Created on first sight, mutated in place, never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: Uuid,
    /// Natural key (`cus_...`)
    pub stripe_customer_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub metadata: Metadata,
}

/// A Stripe subscription. Created only by a creation notification;
/// deletion sets `status = Canceled` and retains the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    /// Natural key (`sub_...`)
    pub stripe_subscription_id: String,
    /// Owning customer natural key; immutable once set
    pub stripe_customer_id: String,
    pub status: SubscriptionStatus,
    /// Current billing period end (Unix timestamp)
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
    /// Seat count, if the price is per-seat
    pub quantity: Option<u64>,
    pub price_id: Option<String>,
    pub metadata: Metadata,
    /// Indexed linkage, projected from `metadata.orgId`
    pub org_id: Option<String>,
    /// Indexed linkage, projected from `metadata.userId`
    pub user_id: Option<String>,
    /// When this row was first written locally. Webhook delivery order
    /// between subscription creation and the first invoice's payment
    /// capture is not guaranteed; the payment classifier uses this
    /// timestamp to spot captures that likely belong to a just-created
    /// subscription.
    pub synced_at: OffsetDateTime,
}

/// A standalone one-time payment. Subscription-derived captures never
/// become payment rows; they are represented by invoices instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    /// Natural key (`pi_...`)
    pub stripe_payment_intent_id: String,
    /// May be unknown at capture time (guest checkout) and backfilled
    /// once, write-once, by a later checkout completion.
    pub stripe_customer_id: Option<String>,
    /// Amount in minor currency units
    pub amount: i64,
    pub currency: String,
    pub status: String,
    /// Capture time (Unix timestamp)
    pub created: i64,
    pub metadata: Metadata,
    pub org_id: Option<String>,
    pub user_id: Option<String>,
}

/// A checkout session, tracked from its completion notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionRecord {
    pub id: Uuid,
    /// Natural key (`cs_...`)
    pub stripe_checkout_session_id: String,
    pub stripe_customer_id: Option<String>,
    pub mode: Option<CheckoutMode>,
    pub status: String,
    pub metadata: Metadata,
}

/// An invoice. Created once, status and paid amount mutated by payment
/// outcomes, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: Uuid,
    /// Natural key (`in_...`)
    pub stripe_invoice_id: String,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: Option<String>,
    pub status: String,
    /// Amounts in minor currency units
    pub amount_due: i64,
    pub amount_paid: i64,
    /// Invoice creation time (Unix timestamp)
    pub created: i64,
}
