//! Registry metrics: counters for registrations/unregistrations/lookups/
//! errors, gauges for entity/active counts, and per-op latency histograms.

use std::time::Instant;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry as PromRegistry};

pub struct RegistryMetrics {
    pub registrations: IntCounter,
    pub unregistrations: IntCounter,
    pub lookups: IntCounter,
    pub errors: IntCounter,
    pub entity_count: IntGauge,
    pub active_count: IntGauge,
    pub op_latency: Histogram,
}

impl RegistryMetrics {
    /// Builds a fresh set of metrics, registered under `namespace` (e.g. the
    /// service name) on the given Prometheus registry.
    pub fn new(namespace: &str, prom_registry: &PromRegistry) -> anyhow::Result<Self> {
        let registrations = IntCounter::new(
            format!("{namespace}_registry_registrations_total"),
            "Total number of successful register() calls",
        )?;
        let unregistrations = IntCounter::new(
            format!("{namespace}_registry_unregistrations_total"),
            "Total number of successful unregister() calls",
        )?;
        let lookups = IntCounter::new(
            format!("{namespace}_registry_lookups_total"),
            "Total number of get() calls",
        )?;
        let errors = IntCounter::new(
            format!("{namespace}_registry_errors_total"),
            "Total number of operations that returned an error",
        )?;
        let entity_count = IntGauge::new(
            format!("{namespace}_registry_entity_count"),
            "Current number of entities in the registry",
        )?;
        let active_count = IntGauge::new(
            format!("{namespace}_registry_active_count"),
            "Current number of active entities in the registry",
        )?;
        let op_latency = Histogram::with_opts(HistogramOpts::new(
            format!("{namespace}_registry_op_latency_seconds"),
            "Latency of registry operations",
        ))?;

        prom_registry.register(Box::new(registrations.clone()))?;
        prom_registry.register(Box::new(unregistrations.clone()))?;
        prom_registry.register(Box::new(lookups.clone()))?;
        prom_registry.register(Box::new(errors.clone()))?;
        prom_registry.register(Box::new(entity_count.clone()))?;
        prom_registry.register(Box::new(active_count.clone()))?;
        prom_registry.register(Box::new(op_latency.clone()))?;

        Ok(Self {
            registrations,
            unregistrations,
            lookups,
            errors,
            entity_count,
            active_count,
            op_latency,
        })
    }

    /// Builds metrics that aren't registered on any [`PromRegistry`], for
    /// tests and for registries that don't care about metrics export.
    pub fn unregistered(namespace: &str) -> Self {
        let prom_registry = PromRegistry::new();
        Self::new(namespace, &prom_registry)
            .expect("fresh metric names never collide in a fresh registry")
    }

    pub fn time_op<T>(&self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.op_latency.observe(start.elapsed().as_secs_f64());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = RegistryMetrics::unregistered("test");
        assert_eq!(metrics.registrations.get(), 0);
    }

    #[test]
    fn time_op_records_a_sample() {
        let metrics = RegistryMetrics::unregistered("test");
        metrics.time_op(|| 1 + 1);
        assert_eq!(metrics.op_latency.get_sample_count(), 1);
    }
}
