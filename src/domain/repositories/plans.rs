use anyhow::Result;
use uuid::Uuid;

use crate::domain::entities::plans::PlanEntity;

pub trait PlanRepository<C>: Send + Sync + 'static {
    /// Returns the plan whether or not it is active.
    fn find_by_id(&self, conn: &mut C, plan_id: Uuid) -> Result<Option<PlanEntity>>;

    fn list_active_plans(&self, conn: &mut C) -> Result<Vec<PlanEntity>>;
}
