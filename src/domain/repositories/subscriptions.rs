use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    value_objects::enums::subscription_statuses::SubscriptionStatus,
};

pub trait SubscriptionRepository<C>: Send + Sync + 'static {
    /// Serializes subscription changes for one user until the transaction ends.
    fn lock_user_subscriptions(&self, conn: &mut C, user_id: Uuid) -> Result<()>;

    fn find_current_active_subscription(
        &self,
        conn: &mut C,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>>;

    fn insert(&self, conn: &mut C, subscription: InsertSubscriptionEntity) -> Result<Uuid>;

    /// Moves an `active` subscription to `status`. Returns `false` when the row had
    /// already left `active`, e.g. expired by the sweeper.
    fn update_status(
        &self,
        conn: &mut C,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    fn expire_ended_before(&self, conn: &mut C, now: DateTime<Utc>) -> Result<usize>;
}
