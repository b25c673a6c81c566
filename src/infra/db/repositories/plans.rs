use anyhow::Result;
use diesel::{PgConnection, RunQueryDsl, prelude::*};
use uuid::Uuid;

use crate::domain::{entities::plans::PlanEntity, repositories::plans::PlanRepository};
use crate::infra::db::postgres::schema::plans;

pub struct PlanPostgres;

impl PlanRepository<PgConnection> for PlanPostgres {
    fn find_by_id(&self, conn: &mut PgConnection, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        let row = plans::table
            .filter(plans::id.eq(plan_id))
            .select(PlanEntity::as_select())
            .first::<PlanEntity>(conn)
            .optional()?;

        Ok(row)
    }

    fn list_active_plans(&self, conn: &mut PgConnection) -> Result<Vec<PlanEntity>> {
        let rows = plans::table
            .filter(plans::is_active.eq(true))
            .order((plans::price_minor.asc(), plans::name.asc()))
            .select(PlanEntity::as_select())
            .load::<PlanEntity>(conn)?;

        Ok(rows)
    }
}
