//! Subscription management
//!
//! Directly-invoked subscription operations. Operations that change remote
//! state call the provider first and patch the local row only after the
//! remote call succeeds: a failed RPC surfaces to the caller with local
//! state untouched, so we never record a change Stripe rejected. The two
//! writes are not transactional in the other direction - a crash between
//! them is healed by the provider's subsequent webhook.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::provider::BillingProvider;
use crate::store::{RecordStore, SubscriptionPatch};
use crate::types::{project_linkage, Metadata, SubscriptionRecord, SubscriptionStatus};
use crate::upsert::UpsertLayer;

/// Directly-invoked subscription operations
pub struct SubscriptionService {
    upserts: UpsertLayer,
    provider: Arc<dyn BillingProvider>,
}

impl SubscriptionService {
    pub fn new(upserts: UpsertLayer, provider: Arc<dyn BillingProvider>) -> Self {
        Self { upserts, provider }
    }

    pub async fn get(
        &self,
        stripe_subscription_id: &str,
    ) -> SyncResult<Option<SubscriptionRecord>> {
        self.upserts
            .store()
            .get_subscription(stripe_subscription_id)
            .await
    }

    pub async fn list_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> SyncResult<Vec<SubscriptionRecord>> {
        self.upserts
            .store()
            .list_subscriptions_by_customer(stripe_customer_id)
            .await
    }

    pub async fn get_first_by_org(&self, org_id: &str) -> SyncResult<Option<SubscriptionRecord>> {
        self.upserts.store().find_subscription_by_org(org_id).await
    }

    pub async fn list_by_user(&self, user_id: &str) -> SyncResult<Vec<SubscriptionRecord>> {
        self.upserts
            .store()
            .list_subscriptions_by_user(user_id)
            .await
    }

    /// Change the seat quantity: remote first, then local.
    pub async fn update_quantity(
        &self,
        stripe_subscription_id: &str,
        quantity: u64,
    ) -> SyncResult<Uuid> {
        self.require_known(stripe_subscription_id).await?;

        self.provider
            .update_subscription_quantity(stripe_subscription_id, quantity)
            .await?;

        let patched = self
            .upserts
            .patch_subscription_if_present(
                stripe_subscription_id,
                SubscriptionPatch {
                    quantity: Some(quantity),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            subscription_id = %stripe_subscription_id,
            quantity = quantity,
            "Subscription quantity updated"
        );

        patched.ok_or_else(|| {
            SyncError::SubscriptionNotFound(stripe_subscription_id.to_string())
        })
    }

    /// Replace the metadata bag and re-project the `orgId`/`userId` linkage
    /// fields. Local only; the bag is stored verbatim.
    pub async fn update_metadata(
        &self,
        stripe_subscription_id: &str,
        metadata: Metadata,
    ) -> SyncResult<Uuid> {
        let (org_id, user_id) = project_linkage(&metadata);

        let patched = self
            .upserts
            .patch_subscription_if_present(
                stripe_subscription_id,
                SubscriptionPatch {
                    metadata: Some(metadata),
                    org_id,
                    user_id,
                    ..Default::default()
                },
            )
            .await?;

        patched.ok_or_else(|| {
            SyncError::SubscriptionNotFound(stripe_subscription_id.to_string())
        })
    }

    /// Cancel a subscription, immediately or at the end of the current
    /// period: remote first, then local.
    pub async fn cancel(
        &self,
        stripe_subscription_id: &str,
        at_period_end: bool,
    ) -> SyncResult<Uuid> {
        self.require_known(stripe_subscription_id).await?;

        self.provider
            .cancel_subscription(stripe_subscription_id, at_period_end)
            .await?;

        let patch = if at_period_end {
            SubscriptionPatch {
                cancel_at_period_end: Some(true),
                ..Default::default()
            }
        } else {
            SubscriptionPatch {
                status: Some(SubscriptionStatus::Canceled),
                ..Default::default()
            }
        };

        let patched = self
            .upserts
            .patch_subscription_if_present(stripe_subscription_id, patch)
            .await?;

        tracing::info!(
            subscription_id = %stripe_subscription_id,
            at_period_end = at_period_end,
            "Subscription canceled"
        );

        patched.ok_or_else(|| {
            SyncError::SubscriptionNotFound(stripe_subscription_id.to_string())
        })
    }

    async fn require_known(&self, stripe_subscription_id: &str) -> SyncResult<()> {
        if self
            .upserts
            .store()
            .get_subscription(stripe_subscription_id)
            .await?
            .is_none()
        {
            return Err(SyncError::SubscriptionNotFound(
                stripe_subscription_id.to_string(),
            ));
        }
        Ok(())
    }
}
