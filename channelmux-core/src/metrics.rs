//! Prometheus metrics for the admission subsystem
//!
//! Counters are registered against a crate-local registry; embedders
//! expose them through `export()` on whatever surface they serve
//! metrics from.

use prometheus::{
    register_counter_vec_with_registry, register_int_counter_with_registry, CounterVec, Encoder,
    IntCounter, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Acquire outcomes, labeled `reused` / `assigned` / `no_capacity`
pub static ACQUIRES_TOTAL: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
    register_counter_vec_with_registry!(
        "channelmux_acquires_total",
        "Total number of lease acquire calls by outcome",
        &["outcome"],
        REGISTRY.clone()
    )
    .expect("Failed to register ACQUIRES_TOTAL")
});

/// Completed releases (no-op releases included)
pub static RELEASES_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter_with_registry!(
        "channelmux_releases_total",
        "Total number of lease release calls",
        REGISTRY.clone()
    )
    .expect("Failed to register RELEASES_TOTAL")
});

/// Leases reclaimed by the reconciliation sweep
pub static LEASES_REAPED_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter_with_registry!(
        "channelmux_leases_reaped_total",
        "Total number of abandoned leases reclaimed by the reaper",
        REGISTRY.clone()
    )
    .expect("Failed to register LEASES_REAPED_TOTAL")
});

/// Render all registered metrics in the Prometheus text format.
#[must_use]
pub fn export() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_registered_counters() {
        ACQUIRES_TOTAL.with_label_values(&["assigned"]).inc();
        RELEASES_TOTAL.inc();

        let rendered = export();
        assert!(rendered.contains("channelmux_acquires_total"));
        assert!(rendered.contains("channelmux_releases_total"));
    }
}
