use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::payments::{InsertPaymentEntity, PaymentCompletion, PaymentEntity},
    value_objects::payments::PaymentLookup,
};

pub trait PaymentRepository<C>: Send + Sync + 'static {
    fn insert(&self, conn: &mut C, payment: InsertPaymentEntity) -> Result<PaymentEntity>;

    fn find(&self, conn: &mut C, lookup: &PaymentLookup) -> Result<Option<PaymentEntity>>;

    /// Loads the payment and holds an exclusive row lock until the surrounding
    /// transaction ends.
    fn find_by_gateway_order_id_for_update(
        &self,
        conn: &mut C,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentEntity>>;

    /// Moves a `pending` payment to `completed`. Returns `false` when the row was no
    /// longer pending, so the caller can treat the update as a lost race.
    fn mark_completed(
        &self,
        conn: &mut C,
        payment_id: Uuid,
        completion: &PaymentCompletion,
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;

    fn expire_pending_before(&self, conn: &mut C, now: DateTime<Utc>) -> Result<usize>;
}
