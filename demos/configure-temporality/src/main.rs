use std::error::Error;
use std::thread;
use std::time::Duration;

use tally_sdk::metrics::{
    InstrumentKind, InstrumentationScope, PeriodicReader, SdkMeterProvider, Temporality,
    TemporalityPreference,
};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

const EXPORT_INTERVAL: Duration = Duration::from_millis(5_000);

fn init_logging() {
    // JSON lines go to stdout, so diagnostics are kept on stderr.
    // Use RUST_LOG=tally_sdk=debug to watch the readers work.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn init_meter_provider() -> SdkMeterProvider {
    // The metrics that are exported using this exporter will represent a cumulative value
    let cumulative = tally_stdout::MetricExporter::builder()
        .with_temporality_preference(
            TemporalityPreference::default().with(InstrumentKind::Counter, Temporality::Cumulative),
        )
        .build();

    // The metrics that are exported using this exporter will represent a delta value
    let delta = tally_stdout::MetricExporter::builder()
        .with_temporality_preference(
            TemporalityPreference::default().with(InstrumentKind::Counter, Temporality::Delta),
        )
        .build();

    // Each reader takes its temporality from the exporter it drives
    SdkMeterProvider::builder()
        .with_reader(
            PeriodicReader::builder(cumulative)
                .with_interval(EXPORT_INTERVAL)
                .build(),
        )
        .with_reader(
            PeriodicReader::builder(delta)
                .with_interval(EXPORT_INTERVAL)
                .build(),
        )
        .build()
}

fn main() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    init_logging();
    let meter_provider = init_meter_provider();

    let meter = meter_provider.meter_with_scope(
        InstrumentationScope::builder("preferred-temporality")
            .with_version("0.1.2")
            .build(),
    );
    let counter = meter.u64_counter("requests").build();

    // Two lines are printed per export interval. The cumulative one keeps a
    // running sum of all values added, the delta one only holds what was
    // added since its previous export.
    counter.add(5)?;
    thread::sleep(Duration::from_secs(10));
    counter.add(20)?;

    // Shutting down flushes the last increment instead of waiting for the
    // next interval.
    meter_provider.shutdown()?;
    Ok(())
}
