use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, RunQueryDsl, insert_into, prelude::*, sql_types::Text, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        repositories::subscriptions::SubscriptionRepository,
        value_objects::enums::subscription_statuses::SubscriptionStatus,
    },
    infra::db::postgres::schema::subscriptions,
};

/// Transaction-scoped advisory lock keyed by user id.
pub const USER_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))";

pub struct SubscriptionPostgres;

impl SubscriptionRepository<PgConnection> for SubscriptionPostgres {
    fn lock_user_subscriptions(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<()> {
        // Released automatically at commit or rollback.
        diesel::sql_query(USER_LOCK_SQL)
            .bind::<Text, _>(user_id.to_string())
            .execute(conn)?;

        Ok(())
    }

    fn find_current_active_subscription(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>> {
        let row = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
            .order(subscriptions::starts_at.desc())
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(conn)
            .optional()?;

        Ok(row)
    }

    fn insert(
        &self,
        conn: &mut PgConnection,
        subscription: InsertSubscriptionEntity,
    ) -> Result<Uuid> {
        let id = insert_into(subscriptions::table)
            .values(&subscription)
            .returning(subscriptions::id)
            .get_result::<Uuid>(conn)?;

        Ok(id)
    }

    fn update_status(
        &self,
        conn: &mut PgConnection,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = update(subscriptions::table)
            .filter(subscriptions::id.eq(subscription_id))
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
            .set((
                subscriptions::status.eq(status.as_str()),
                subscriptions::updated_at.eq(updated_at),
            ))
            .execute(conn)?;

        Ok(updated == 1)
    }

    fn expire_ended_before(&self, conn: &mut PgConnection, now: DateTime<Utc>) -> Result<usize> {
        let expired = update(subscriptions::table)
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
            .filter(subscriptions::ends_at.lt(now))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Expired.as_str()),
                subscriptions::updated_at.eq(now),
            ))
            .execute(conn)?;

        Ok(expired)
    }
}
