use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, RunQueryDsl, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::payments::{InsertPaymentEntity, PaymentCompletion, PaymentEntity},
        repositories::payments::PaymentRepository,
        value_objects::{enums::payment_statuses::PaymentStatus, payments::PaymentLookup},
    },
    infra::db::postgres::schema::payments,
};

pub struct PaymentPostgres;

impl PaymentRepository<PgConnection> for PaymentPostgres {
    fn insert(
        &self,
        conn: &mut PgConnection,
        payment: InsertPaymentEntity,
    ) -> Result<PaymentEntity> {
        let row = insert_into(payments::table)
            .values(&payment)
            .returning(PaymentEntity::as_select())
            .get_result::<PaymentEntity>(conn)?;

        Ok(row)
    }

    fn find(
        &self,
        conn: &mut PgConnection,
        lookup: &PaymentLookup,
    ) -> Result<Option<PaymentEntity>> {
        let query = payments::table
            .select(PaymentEntity::as_select())
            .into_boxed();

        let query = match lookup {
            PaymentLookup::Id(id) => query.filter(payments::id.eq(*id)),
            PaymentLookup::GatewayOrderId(order_id) => {
                query.filter(payments::gateway_order_id.eq(order_id.as_str()))
            }
        };

        let row = query.first::<PaymentEntity>(conn).optional()?;

        Ok(row)
    }

    fn find_by_gateway_order_id_for_update(
        &self,
        conn: &mut PgConnection,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentEntity>> {
        let row = payments::table
            .filter(payments::gateway_order_id.eq(gateway_order_id))
            .select(PaymentEntity::as_select())
            .for_update()
            .first::<PaymentEntity>(conn)
            .optional()?;

        Ok(row)
    }

    fn mark_completed(
        &self,
        conn: &mut PgConnection,
        payment_id: Uuid,
        completion: &PaymentCompletion,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = update(payments::table)
            .filter(payments::id.eq(payment_id))
            .filter(payments::status.eq(PaymentStatus::Pending.as_str()))
            .set((
                payments::gateway_payment_id.eq(Some(completion.gateway_payment_id.as_str())),
                payments::gateway_signature.eq(Some(completion.gateway_signature.as_str())),
                payments::status.eq(PaymentStatus::Completed.as_str()),
                payments::updated_at.eq(completed_at),
            ))
            .execute(conn)?;

        Ok(updated == 1)
    }

    fn expire_pending_before(&self, conn: &mut PgConnection, now: DateTime<Utc>) -> Result<usize> {
        let expired = update(payments::table)
            .filter(payments::status.eq(PaymentStatus::Pending.as_str()))
            .filter(payments::expires_at.lt(now))
            .set((
                payments::status.eq(PaymentStatus::Expired.as_str()),
                payments::updated_at.eq(now),
            ))
            .execute(conn)?;

        Ok(expired)
    }
}
