use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::{
        payments::{InsertPaymentEntity, PaymentCompletion, PaymentEntity},
        plans::PlanEntity,
        subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    },
    repositories::{
        payments::PaymentRepository, plans::PlanRepository,
        subscriptions::SubscriptionRepository, unit_of_work::UnitOfWork,
    },
    value_objects::{
        enums::{payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus},
        payments::PaymentLookup,
    },
};

/// The three tables, held in process.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    pub payments: BTreeMap<Uuid, PaymentEntity>,
    pub plans: BTreeMap<Uuid, PlanEntity>,
    pub subscriptions: BTreeMap<Uuid, SubscriptionEntity>,
}

impl MemoryTables {
    pub fn active_subscriptions_for(&self, user_id: Uuid) -> Vec<&SubscriptionEntity> {
        self.subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.status() == SubscriptionStatus::Active)
            .collect()
    }

    pub fn payment_by_order(&self, gateway_order_id: &str) -> Option<&PaymentEntity> {
        self.payments
            .values()
            .find(|p| p.gateway_order_id == gateway_order_id)
    }
}

/// In-process unit of work.
///
/// A transaction holds the table mutex for its whole duration, which makes every
/// transaction serializable. Work happens on a copy that replaces the tables only
/// on `Ok`, so an error or a panic leaves the committed state untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryUnitOfWork {
    tables: Arc<Mutex<MemoryTables>>,
}

impl MemoryUnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: impl IntoIterator<Item = PlanEntity>) -> Self {
        let uow = Self::new();
        {
            let mut tables = uow.lock();
            for plan in plans {
                tables.plans.insert(plan.id, plan);
            }
        }
        uow
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> MemoryTables {
        self.lock().clone()
    }

    /// Direct access for seeding and test setup, bypassing the stores.
    pub fn update<T>(&self, f: impl FnOnce(&mut MemoryTables) -> T) -> T {
        f(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTables> {
        // Committed state is never half-written, so a poisoned lock is safe to reuse.
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UnitOfWork for MemoryUnitOfWork {
    type Conn = MemoryTables;

    fn connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut MemoryTables) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut tables = self.lock();
        f(&mut *tables)
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut MemoryTables) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut tables = self.lock();
        let mut working = tables.clone();
        let out = f(&mut working)?;
        *tables = working;
        Ok(out)
    }
}

pub struct PaymentMemory;

impl PaymentRepository<MemoryTables> for PaymentMemory {
    fn insert(
        &self,
        conn: &mut MemoryTables,
        payment: InsertPaymentEntity,
    ) -> Result<PaymentEntity> {
        if conn.payment_by_order(&payment.gateway_order_id).is_some() {
            bail!(
                "duplicate key value violates unique constraint on gateway_order_id {}",
                payment.gateway_order_id
            );
        }

        let now = Utc::now();
        let row = PaymentEntity {
            id: Uuid::new_v4(),
            user_id: payment.user_id,
            plan_id: payment.plan_id,
            gateway_order_id: payment.gateway_order_id,
            gateway_payment_id: None,
            gateway_signature: None,
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            status: payment.status,
            created_at: now,
            expires_at: payment.expires_at,
            updated_at: now,
        };
        conn.payments.insert(row.id, row.clone());

        Ok(row)
    }

    fn find(&self, conn: &mut MemoryTables, lookup: &PaymentLookup) -> Result<Option<PaymentEntity>> {
        let row = match lookup {
            PaymentLookup::Id(id) => conn.payments.get(id),
            PaymentLookup::GatewayOrderId(order_id) => conn.payment_by_order(order_id),
        };

        Ok(row.cloned())
    }

    fn find_by_gateway_order_id_for_update(
        &self,
        conn: &mut MemoryTables,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentEntity>> {
        Ok(conn.payment_by_order(gateway_order_id).cloned())
    }

    fn mark_completed(
        &self,
        conn: &mut MemoryTables,
        payment_id: Uuid,
        completion: &PaymentCompletion,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(row) = conn.payments.get_mut(&payment_id) else {
            return Ok(false);
        };
        if row.status() != PaymentStatus::Pending {
            return Ok(false);
        }

        row.gateway_payment_id = Some(completion.gateway_payment_id.clone());
        row.gateway_signature = Some(completion.gateway_signature.clone());
        row.status = PaymentStatus::Completed.to_string();
        row.updated_at = completed_at;

        Ok(true)
    }

    fn expire_pending_before(&self, conn: &mut MemoryTables, now: DateTime<Utc>) -> Result<usize> {
        let mut expired = 0;
        for row in conn.payments.values_mut() {
            if row.status() == PaymentStatus::Pending && row.expires_at < now {
                row.status = PaymentStatus::Expired.to_string();
                row.updated_at = now;
                expired += 1;
            }
        }

        Ok(expired)
    }
}

pub struct PlanMemory;

impl PlanRepository<MemoryTables> for PlanMemory {
    fn find_by_id(&self, conn: &mut MemoryTables, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        Ok(conn.plans.get(&plan_id).cloned())
    }

    fn list_active_plans(&self, conn: &mut MemoryTables) -> Result<Vec<PlanEntity>> {
        let mut plans: Vec<PlanEntity> = conn
            .plans
            .values()
            .filter(|plan| plan.is_active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| {
            a.price_minor
                .cmp(&b.price_minor)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(plans)
    }
}

pub struct SubscriptionMemory;

impl SubscriptionRepository<MemoryTables> for SubscriptionMemory {
    fn lock_user_subscriptions(&self, _conn: &mut MemoryTables, _user_id: Uuid) -> Result<()> {
        // The table mutex already serializes every transaction.
        Ok(())
    }

    fn find_current_active_subscription(
        &self,
        conn: &mut MemoryTables,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>> {
        let current = conn
            .active_subscriptions_for(user_id)
            .into_iter()
            .max_by_key(|s| s.starts_at)
            .cloned();

        Ok(current)
    }

    fn insert(
        &self,
        conn: &mut MemoryTables,
        subscription: InsertSubscriptionEntity,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let row = SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: subscription.user_id,
            plan_id: subscription.plan_id,
            payment_id: subscription.payment_id,
            starts_at: subscription.starts_at,
            ends_at: subscription.ends_at,
            status: subscription.status,
            created_at: now,
            updated_at: now,
        };
        let id = row.id;
        conn.subscriptions.insert(id, row);

        Ok(id)
    }

    fn update_status(
        &self,
        conn: &mut MemoryTables,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(row) = conn.subscriptions.get_mut(&subscription_id) else {
            return Ok(false);
        };
        if row.status() != SubscriptionStatus::Active {
            return Ok(false);
        }

        row.status = status.to_string();
        row.updated_at = updated_at;

        Ok(true)
    }

    fn expire_ended_before(&self, conn: &mut MemoryTables, now: DateTime<Utc>) -> Result<usize> {
        let mut expired = 0;
        for row in conn.subscriptions.values_mut() {
            if row.status() == SubscriptionStatus::Active && row.ends_at < now {
                row.status = SubscriptionStatus::Expired.to_string();
                row.updated_at = now;
                expired += 1;
            }
        }

        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_payment(order_id: &str) -> InsertPaymentEntity {
        InsertPaymentEntity {
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            gateway_order_id: order_id.to_string(),
            amount_minor: 49900,
            currency: "INR".to_string(),
            status: PaymentStatus::Pending.to_string(),
            expires_at: Utc::now() + Duration::minutes(30),
        }
    }

    #[test]
    fn transaction_error_discards_every_write() {
        let uow = MemoryUnitOfWork::new();

        let result: Result<(), anyhow::Error> = uow.transaction(|conn| {
            PaymentMemory.insert(conn, pending_payment("order_rollback"))?;
            anyhow::bail!("forced failure")
        });

        assert!(result.is_err());
        assert!(uow.snapshot().payments.is_empty());
    }

    #[test]
    fn transaction_ok_commits() {
        let uow = MemoryUnitOfWork::new();

        let payment = uow
            .transaction(|conn| PaymentMemory.insert(conn, pending_payment("order_commit")))
            .unwrap();

        let stored = uow.snapshot();
        assert_eq!(stored.payments.get(&payment.id), Some(&payment));
    }

    #[test]
    fn duplicate_gateway_order_id_is_rejected() {
        let uow = MemoryUnitOfWork::new();

        uow.connection(|conn| PaymentMemory.insert(conn, pending_payment("order_dup")))
            .unwrap();
        let second =
            uow.connection(|conn| PaymentMemory.insert(conn, pending_payment("order_dup")));

        assert!(second.is_err());
        assert_eq!(uow.snapshot().payments.len(), 1);
    }

    #[test]
    fn mark_completed_only_moves_pending_rows() {
        let uow = MemoryUnitOfWork::new();
        let completion = PaymentCompletion {
            gateway_order_id: "order_cas".to_string(),
            gateway_payment_id: "pay_cas".to_string(),
            gateway_signature: "sig".to_string(),
        };

        let (first, second) = uow
            .transaction(|conn| {
                let payment = PaymentMemory.insert(conn, pending_payment("order_cas"))?;
                let first = PaymentMemory.mark_completed(conn, payment.id, &completion, Utc::now())?;
                let second =
                    PaymentMemory.mark_completed(conn, payment.id, &completion, Utc::now())?;
                Ok::<_, anyhow::Error>((first, second))
            })
            .unwrap();

        assert!(first);
        assert!(!second);
    }

    #[test]
    fn status_change_leaves_expired_subscription_alone() {
        let uow = MemoryUnitOfWork::new();
        let now = Utc::now();

        let (subscription_id, changed) = uow
            .transaction(|conn| {
                let id = SubscriptionMemory.insert(
                    conn,
                    InsertSubscriptionEntity {
                        user_id: Uuid::new_v4(),
                        plan_id: Uuid::new_v4(),
                        payment_id: None,
                        starts_at: now - Duration::days(31),
                        ends_at: now - Duration::days(1),
                        status: SubscriptionStatus::Expired.to_string(),
                    },
                )?;
                let changed =
                    SubscriptionMemory.update_status(conn, id, SubscriptionStatus::Cancelled, now)?;
                Ok::<_, anyhow::Error>((id, changed))
            })
            .unwrap();

        assert!(!changed);
        assert_eq!(
            uow.snapshot().subscriptions[&subscription_id].status(),
            SubscriptionStatus::Expired
        );
    }

    #[test]
    fn sweeper_queries_only_touch_overdue_rows() {
        let uow = MemoryUnitOfWork::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();

        let expired = uow
            .transaction(|conn| {
                let mut stale = pending_payment("order_stale");
                stale.expires_at = now - Duration::minutes(1);
                PaymentMemory.insert(conn, stale)?;
                PaymentMemory.insert(conn, pending_payment("order_fresh"))?;

                SubscriptionMemory.insert(
                    conn,
                    InsertSubscriptionEntity {
                        user_id,
                        plan_id: Uuid::new_v4(),
                        payment_id: None,
                        starts_at: now - Duration::days(31),
                        ends_at: now - Duration::days(1),
                        status: SubscriptionStatus::Active.to_string(),
                    },
                )?;

                let payments = PaymentMemory.expire_pending_before(conn, now)?;
                let subscriptions = SubscriptionMemory.expire_ended_before(conn, now)?;
                Ok::<_, anyhow::Error>((payments, subscriptions))
            })
            .unwrap();

        assert_eq!(expired, (1, 1));
        let tables = uow.snapshot();
        assert_eq!(
            tables.payment_by_order("order_fresh").map(|p| p.status()),
            Some(PaymentStatus::Pending)
        );
        assert!(tables.active_subscriptions_for(user_id).is_empty());
    }
}
