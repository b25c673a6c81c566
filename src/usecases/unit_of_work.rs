use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::anyhow;
use tracing::{error, warn};

use crate::domain::repositories::unit_of_work::UnitOfWork;

use super::errors::{PaymentError, UseCaseResult};

/// Raises the flag when dropped unless disarmed, i.e. when the awaiting future
/// is dropped before the blocking work finishes.
struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            armed: true,
        }
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Runs `f` inside one transaction on the blocking pool.
///
/// If the caller stops awaiting before `f` returns, the transaction rolls back
/// with `PaymentError::Cancelled` instead of committing.
pub async fn run_transaction<U, T, F>(uow: Arc<U>, f: F) -> UseCaseResult<T>
where
    U: UnitOfWork,
    T: Send + 'static,
    F: FnOnce(&mut U::Conn) -> UseCaseResult<T> + Send + 'static,
{
    let guard = CancelOnDrop::new();
    let cancelled = guard.flag();

    let handle = tokio::task::spawn_blocking(move || {
        uow.transaction(|conn| {
            let value = f(conn)?;
            if cancelled.load(Ordering::SeqCst) {
                warn!("payments: caller went away, rolling back transaction");
                return Err(PaymentError::Cancelled);
            }
            Ok(value)
        })
    });

    let joined = handle.await;
    guard.disarm();

    joined.unwrap_or_else(|join_error| {
        error!(error = %join_error, "payments: transaction task failed");
        Err(PaymentError::Internal(anyhow!(
            "transaction task failed: {join_error}"
        )))
    })
}

/// Runs `f` on a plain connection on the blocking pool. No atomicity across calls.
pub async fn run_on_connection<U, T, F>(uow: Arc<U>, f: F) -> UseCaseResult<T>
where
    U: UnitOfWork,
    T: Send + 'static,
    F: FnOnce(&mut U::Conn) -> UseCaseResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || uow.connection(f))
        .await
        .unwrap_or_else(|join_error| {
            error!(error = %join_error, "payments: connection task failed");
            Err(PaymentError::Internal(anyhow!(
                "connection task failed: {join_error}"
            )))
        })
}
