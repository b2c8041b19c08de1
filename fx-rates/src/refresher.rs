//! The Background Refresher: a long-lived task that keeps the rate cache
//! warm by periodically rebuilding it from the upstream provider.

use std::{sync::Arc, time::Duration};

use fx_tokio::{shutdown::ShutdownChannel, task::LxTask};
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::{cache::FetchedRate, service::ExchangeService};

const TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const REFRESH_BASE: &str = "USD";

/// Spawns the Background Refresher as an [`LxTask`]. The task ticks every
/// five minutes, checks [`crate::cache::RateCache::is_cache_stale`], and on
/// staleness fetches a fresh rate table from the provider under a 30-second
/// timeout. Terminates cleanly when `shutdown` fires; never exits on error.
pub fn spawn(service: Arc<ExchangeService>, shutdown: ShutdownChannel) -> LxTask<()> {
    LxTask::spawn("exr-background-refresher", async move {
        let mut ticker = time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = refresh_if_stale(&service).await {
                        warn!(error = %e, "background refresher: refresh cycle failed");
                    }
                }
                () = shutdown.recv() => {
                    info!("background refresher: shutting down");
                    return;
                }
            }
        }
    })
}

async fn refresh_if_stale(service: &ExchangeService) -> anyhow::Result<()> {
    let (stale, _) = service.cache().is_cache_stale();
    if !stale {
        return Ok(());
    }

    let fetch = time::timeout(FETCH_TIMEOUT, service_fetch_rates(service)).await;
    let rates = match fetch {
        Ok(Ok(rates)) => rates,
        Ok(Err(e)) => {
            error!(error = %e, "background refresher: provider fetch failed");
            return Ok(());
        }
        Err(_) => {
            error!("background refresher: provider fetch timed out after 30s");
            return Ok(());
        }
    };

    let rates = rates
        .into_iter()
        .map(|(to, rate)| (to, FetchedRate { rate }))
        .collect();

    service
        .cache()
        .cache_rates(REFRESH_BASE, rates, "background-refresher")
        .await
}

async fn service_fetch_rates(
    service: &ExchangeService,
) -> anyhow::Result<std::collections::HashMap<String, f64>> {
    // Routed through the same provider the cache-miss path uses, so both
    // call sites honour one `ExchangeRateProvider` implementation.
    service.fetch_rates_from_provider(REFRESH_BASE).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{cache::RateCache, provider::FakeExchangeRateProvider};

    #[tokio::test]
    async fn refresh_populates_stale_cache() {
        let cache = Arc::new(RateCache::new(Duration::from_secs(300)));
        let mut rates = HashMap::new();
        rates.insert("EUR".to_string(), 0.85);
        let provider = Arc::new(FakeExchangeRateProvider::new("USD", rates));
        let service = Arc::new(ExchangeService::new(cache, provider));

        refresh_if_stale(&service).await.unwrap();

        assert!(service.cache().rates().get("USD:EUR").is_ok());
        let (stale, _) = service.cache().is_cache_stale();
        assert!(!stale);
    }

    #[tokio::test]
    async fn refresh_is_a_noop_when_fresh() {
        let cache = Arc::new(RateCache::new(Duration::from_secs(300)));
        cache
            .cache_rates("USD", HashMap::new(), "seed")
            .await
            .unwrap();
        let provider = Arc::new(FakeExchangeRateProvider::new("USD", HashMap::new()));
        provider.set_failing(true);
        let service = Arc::new(ExchangeService::new(cache, provider));

        // Provider would error if called; a no-op refresh must not call it.
        refresh_if_stale(&service).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_task_stops_on_shutdown() {
        let cache = Arc::new(RateCache::new(Duration::from_secs(300)));
        let provider = Arc::new(FakeExchangeRateProvider::new("USD", HashMap::new()));
        let service = Arc::new(ExchangeService::new(cache, provider));
        let shutdown = ShutdownChannel::new();

        let task = spawn(service, shutdown.clone());
        shutdown.send();
        task.await.unwrap();
    }
}
