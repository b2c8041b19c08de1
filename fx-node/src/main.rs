//! Wires the exchange-rate cache and payment orchestrator together and runs
//! until a shutdown signal arrives. Not an HTTP server -- binding webhook and
//! API routes to a framework is left to whatever process embeds these
//! crates; this binary only proves the pieces compose into something
//! runnable.

use std::{collections::HashMap, sync::Arc, time::Duration};

use fx_common::config::Config;
use fx_eventbus::build_bus;
use fx_orchestrator::{provider::FakePaymentProvider, PaymentOrchestrator};
use fx_rates::{provider::FakeExchangeRateProvider, ExchangeService, RateCache};
use fx_tokio::{shutdown::ShutdownChannel, task::LxTask};
use tracing::info;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::from_env();
    let shutdown = ShutdownChannel::new();

    let rate_cache = Arc::new(RateCache::new(config.exr_cache_ttl));
    // No concrete upstream rate provider ships with the core (out of scope,
    // see spec's external-interfaces section); the fake stands in so the
    // refresher and exchange service have something to drive against.
    let rate_provider = Arc::new(FakeExchangeRateProvider::new("USD", default_seed_rates()));
    let exchange_service = Arc::new(ExchangeService::new(rate_cache, rate_provider));

    let refresher_task = fx_rates::refresher::spawn(exchange_service.clone(), shutdown.clone());

    let bus = build_bus(&config).await;

    let payment_provider = Arc::new(FakePaymentProvider::new(
        config.stripe_signing_secret.clone().unwrap_or_default(),
    ));
    // Held for the process lifetime: whatever HTTP layer binds
    // `handle_webhook` / `initiate_payment` / `initiate_payout` to routes
    // owns a clone of this `Arc`.
    let _orchestrator = Arc::new(
        PaymentOrchestrator::new(
            bus,
            payment_provider,
            config.stripe_success_path.clone(),
            config.stripe_cancel_path.clone(),
        )
        .with_signing_secret(config.stripe_signing_secret.clone().unwrap_or_default().into_bytes()),
    );

    info!("fx-node: started, waiting for shutdown signal");

    let mut sigint = tokio::signal::ctrl_c();
    tokio::select! {
        _ = &mut sigint => {
            info!("fx-node: received ctrl-c, shutting down");
        }
        () = shutdown.recv() => {}
    }
    shutdown.send();

    join_with_timeout(refresher_task, Duration::from_secs(5)).await;
    Ok(())
}

async fn join_with_timeout<T>(task: LxTask<T>, timeout: Duration) {
    if tokio::time::timeout(timeout, task).await.is_err() {
        tracing::warn!("fx-node: task did not finish within shutdown grace period");
    }
}

fn default_seed_rates() -> HashMap<String, f64> {
    let mut rates = HashMap::new();
    rates.insert("EUR".to_string(), 0.92);
    rates.insert("GBP".to_string(), 0.79);
    rates.insert("JPY".to_string(), 151.0);
    rates
}
