use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use diesel::{Connection, PgConnection, RunQueryDsl};

use crate::domain::repositories::unit_of_work::UnitOfWork;
use crate::infra::db::postgres::postgres_connection::PgPoolSquad;

pub struct PgUnitOfWork {
    db_pool: Arc<PgPoolSquad>,
    lock_timeout: Duration,
}

impl PgUnitOfWork {
    pub fn new(db_pool: Arc<PgPoolSquad>, lock_timeout: Duration) -> Self {
        Self {
            db_pool,
            lock_timeout,
        }
    }
}

enum TxError<E> {
    App(E),
    Db(diesel::result::Error),
}

impl<E> From<diesel::result::Error> for TxError<E> {
    fn from(value: diesel::result::Error) -> Self {
        TxError::Db(value)
    }
}

impl UnitOfWork for PgUnitOfWork {
    type Conn = PgConnection;

    fn connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .map_err(|err| E::from(anyhow!(err).context("failed to acquire database connection")))?;

        f(&mut *conn)
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .map_err(|err| E::from(anyhow!(err).context("failed to acquire database connection")))?;

        let conn: &mut PgConnection = &mut conn;

        let lock_timeout_ms = self.lock_timeout.as_millis().max(1);

        // A panic inside `f` leaves the connection mid-transaction; r2d2 then discards
        // it as broken and the server rolls back on disconnect.
        conn.transaction::<T, TxError<E>, _>(|tx| {
            // Bounds row and advisory lock waits for this transaction only.
            diesel::sql_query(format!("SET LOCAL lock_timeout = {lock_timeout_ms}"))
                .execute(tx)?;
            f(tx).map_err(TxError::App)
        })
        .map_err(|err| match err {
            TxError::App(err) => err,
            TxError::Db(err) => E::from(anyhow!(err).context("database transaction failed")),
        })
    }
}
