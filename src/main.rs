use std::{sync::Arc, time::Duration};

use anyhow::Result;
use subscription_payments::{
    axum_http::http_serve,
    config::config_loader,
    events::{
        dispatcher::EventDispatcher,
        sinks::{EventSink, LogEventSink, WebhookEventSink},
    },
    infra::db::{
        postgres::postgres_connection,
        repositories::{
            payments::PaymentPostgres, plans::PlanPostgres, subscriptions::SubscriptionPostgres,
            unit_of_work::PgUnitOfWork,
        },
    },
    observability,
    payments::{razorpay_client::RazorpayClient, signature::GatewaySignatureVerifier},
    usecases::{
        payments::{PaymentService, PaymentSettings, PaymentUseCase},
        sweeper,
    },
};
use tracing::{error, info};

const EVENTS_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Payments service exited with error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    observability::init_observability("payments")?;

    let config = config_loader::load()?;
    info!(stage = %config.stage, "ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(&config.database)?;
    info!("Postgres connection has been established");

    let sinks: Vec<Arc<dyn EventSink>> = match &config.events.webhook_url {
        Some(url) => {
            let sink: Arc<dyn EventSink> =
                Arc::new(WebhookEventSink::new(url.clone(), EVENTS_WEBHOOK_TIMEOUT)?);
            vec![sink]
        }
        None => {
            info!("EVENTS_WEBHOOK_URL not set; events are only logged");
            let sink: Arc<dyn EventSink> = Arc::new(LogEventSink);
            vec![sink]
        }
    };
    let publisher = EventDispatcher::new(sinks, config.events.queue_capacity);

    let gateway = RazorpayClient::new(&config.razorpay)?;
    let verifier = GatewaySignatureVerifier::new(
        config.razorpay.key_secret.clone(),
        config.razorpay.webhook_secret.clone(),
    );

    let settings = PaymentSettings {
        gateway_key_id: config.razorpay.key_id.clone(),
        order_ttl: chrono::Duration::minutes(config.payments.order_ttl_minutes),
        gateway_timeout: Duration::from_secs(config.razorpay.timeout_secs),
        display_offset: config.payments.display_offset,
    };

    let usecase = PaymentUseCase::new(
        Arc::new(PgUnitOfWork::new(
            Arc::new(postgres_pool),
            Duration::from_millis(config.database.lock_timeout_ms),
        )),
        Arc::new(PaymentPostgres),
        Arc::new(SubscriptionPostgres),
        Arc::new(PlanPostgres),
        Arc::new(gateway),
        Arc::new(verifier),
        Arc::new(publisher),
        settings,
    );
    let service: Arc<dyn PaymentService> = Arc::new(usecase);

    tokio::spawn(sweeper::run_sweeper_loop(
        Arc::clone(&service),
        Duration::from_secs(config.sweeper.interval_secs),
    ));

    http_serve::start(Arc::new(config), service).await?;

    Ok(())
}
