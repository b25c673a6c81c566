use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::domain::value_objects::payments::SweepReport;

use super::payments::PaymentService;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Expires stale orders and lapsed subscriptions forever. Errors are logged and
/// the next tick retries.
pub async fn run_sweeper_loop(service: Arc<dyn PaymentService>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = interval.as_secs(), "sweeper: started");
    loop {
        ticker.tick().await;
        sweep_once(service.as_ref(), Utc::now()).await;
    }
}

pub async fn sweep_once(service: &dyn PaymentService, now: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    match service.expire_stale_payments(now).await {
        Ok(count) => report.expired_payments = count,
        Err(e) => error!(error = %e, "sweeper: failed to expire stale payments"),
    }

    match service.expire_lapsed_subscriptions(now).await {
        Ok(count) => report.expired_subscriptions = count,
        Err(e) => error!(error = %e, "sweeper: failed to expire lapsed subscriptions"),
    }

    if report != SweepReport::default() {
        info!(
            expired_payments = report.expired_payments,
            expired_subscriptions = report.expired_subscriptions,
            "sweeper: expired rows"
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use mockall::predicate::eq;

    use super::*;
    use crate::usecases::{errors::PaymentError, payments::MockPaymentService};

    #[tokio::test]
    async fn runs_both_expiries_with_the_same_clock() {
        let now = Utc::now();
        let mut service = MockPaymentService::new();
        service
            .expect_expire_stale_payments()
            .with(eq(now))
            .times(1)
            .returning(|_| Ok(2));
        service
            .expect_expire_lapsed_subscriptions()
            .with(eq(now))
            .times(1)
            .returning(|_| Ok(1));

        let report = sweep_once(&service, now).await;

        assert_eq!(
            report,
            SweepReport {
                expired_payments: 2,
                expired_subscriptions: 1,
            }
        );
    }

    #[tokio::test]
    async fn payment_failure_does_not_skip_subscriptions() {
        let mut service = MockPaymentService::new();
        service
            .expect_expire_stale_payments()
            .returning(|_| Err(PaymentError::Internal(anyhow!("db down"))));
        service
            .expect_expire_lapsed_subscriptions()
            .times(1)
            .returning(|_| Ok(3));

        let report = sweep_once(&service, Utc::now()).await;

        assert_eq!(report.expired_payments, 0);
        assert_eq!(report.expired_subscriptions, 3);
    }
}
