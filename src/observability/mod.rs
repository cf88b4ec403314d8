//! Metrics instruments
//!
//! A local `SdkMeterProvider` is installed as the global provider at start-up.
//! Instruments are created lazily from the global meter, so code running before
//! (or without) the provider, such as unit tests, records into a no-op meter.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::sync::OnceLock;
use tracing::info;

pub use opentelemetry::KeyValue;

/// Install the process-wide meter provider
pub fn init_meter_provider() -> SdkMeterProvider {
    let provider = SdkMeterProvider::builder().build();
    global::set_meter_provider(provider.clone());
    info!("OpenTelemetry configured: local metrics only");
    provider
}

/// Pre-built instruments for the scheduler and the session layer
pub struct TunerMetrics {
    pub schedule_rebuilds: Counter<u64>,
    pub schedule_conflicts: Counter<u64>,
    pub provider_failures: Counter<u64>,
    pub sessions_launched: Counter<u64>,
    pub launch_failures: Counter<u64>,
    pub sessions_evicted: Counter<u64>,
    pub chunklist_fetches: Counter<u64>,
    pub part_bytes: Counter<u64>,
}

impl TunerMetrics {
    fn new() -> Self {
        let meter: Meter = global::meter("sports-tuner");
        Self {
            schedule_rebuilds: meter
                .u64_counter("schedule_rebuilds_total")
                .with_description("Completed channel allocation passes")
                .build(),
            schedule_conflicts: meter
                .u64_counter("schedule_conflicts_total")
                .with_description("Events dropped during allocation")
                .build(),
            provider_failures: meter
                .u64_counter("provider_failures_total")
                .with_description("Failed provider fetch, refresh or initialize calls")
                .build(),
            sessions_launched: meter
                .u64_counter("sessions_launched_total")
                .with_description("Channel sessions that reached live")
                .build(),
            launch_failures: meter
                .u64_counter("session_launch_failures_total")
                .with_description("Channel session launches that failed")
                .build(),
            sessions_evicted: meter
                .u64_counter("sessions_evicted_total")
                .with_description("Sessions discarded by the reaper")
                .build(),
            chunklist_fetches: meter
                .u64_counter("chunklist_upstream_fetches_total")
                .with_description("Chunklists fetched from upstream")
                .build(),
            part_bytes: meter
                .u64_counter("part_bytes_total")
                .with_description("Segment and key bytes proxied to clients")
                .build(),
        }
    }
}

static METRICS: OnceLock<TunerMetrics> = OnceLock::new();

pub fn metrics() -> &'static TunerMetrics {
    METRICS.get_or_init(TunerMetrics::new)
}
