//! End-to-end checks through the public API only: a custom exporter, the
//! periodic reader and the provider lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tally_sdk::error::{SdkError, SdkResult};
use tally_sdk::metrics::{
    InstrumentKind, InstrumentationScope, ManualReader, MetricBatch, MetricReader,
    PeriodicReader, PushMetricExporter, SdkMeterProvider, Temporality, TemporalityPreference,
};

#[derive(Debug, Clone)]
struct RecordingExporter {
    preference: TemporalityPreference,
    batches: Arc<Mutex<Vec<MetricBatch>>>,
}

impl RecordingExporter {
    fn new(preference: TemporalityPreference) -> Self {
        RecordingExporter {
            preference,
            batches: Arc::default(),
        }
    }

    fn values(&self, name: &str) -> Vec<f64> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .filter_map(|batch| batch.metric(name).map(|m| m.data.value_as_f64()))
            .collect()
    }
}

#[async_trait]
impl PushMetricExporter for RecordingExporter {
    async fn export(&self, metrics: &MetricBatch) -> SdkResult {
        self.batches.lock().unwrap().push(metrics.clone());
        Ok(())
    }

    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
        Ok(())
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.preference.get(kind)
    }
}

#[test]
fn periodic_exports_follow_each_exporter_preference() {
    let interval = Duration::from_millis(200);
    let cumulative = RecordingExporter::new(TemporalityPreference::cumulative());
    let delta = RecordingExporter::new(TemporalityPreference::delta());

    let provider = SdkMeterProvider::builder()
        .with_reader(
            PeriodicReader::builder(cumulative.clone())
                .with_interval(interval)
                .build(),
        )
        .with_reader(
            PeriodicReader::builder(delta.clone())
                .with_interval(interval)
                .build(),
        )
        .build();

    let meter = provider.meter_with_scope(
        InstrumentationScope::builder("preferred-temporality")
            .with_version("0.1.2")
            .build(),
    );
    let counter = meter
        .u64_counter("c1")
        .with_description("a counter exported with two temporalities")
        .build();

    counter.add(5).unwrap();
    std::thread::sleep(interval * 2 + interval / 2);
    counter.add(20).unwrap();
    provider.shutdown().unwrap();

    let cumulative_values = cumulative.values("c1");
    let delta_values = delta.values("c1");

    // every cumulative point is a running total, ending at the full sum
    assert_eq!(cumulative_values.last(), Some(&25.0));
    assert!(cumulative_values.windows(2).all(|w| w[0] <= w[1]));

    // deltas add up to the same total, with no export counted twice
    assert_eq!(delta_values.iter().sum::<f64>(), 25.0);
    assert_eq!(delta_values.first(), Some(&5.0));
}

#[test]
fn manual_reader_collects_on_demand() {
    let reader = ManualReader::builder()
        .with_temporality(Temporality::Delta)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let counter = provider.meter("manual").f64_counter("bytes").with_unit("By").build();

    let mut batch = MetricBatch::default();
    counter.add(1.5).unwrap();
    reader.collect(&mut batch).unwrap();
    assert_eq!(batch.metric("bytes").unwrap().data.value_as_f64(), 1.5);

    counter.add(2.0).unwrap();
    reader.collect(&mut batch).unwrap();
    let metric = batch.metric("bytes").unwrap();
    assert_eq!(metric.data.value_as_f64(), 2.0);
    assert_eq!(metric.unit, "By");

    provider.shutdown().unwrap();
    assert!(reader.collect(&mut batch).is_err());
}

#[test]
fn provider_shutdown_reports_reader_timeout() {
    #[derive(Debug)]
    struct StuckExporter;

    #[async_trait]
    impl PushMetricExporter for StuckExporter {
        async fn export(&self, _metrics: &MetricBatch) -> SdkResult {
            futures_timer::Delay::new(Duration::from_secs(2)).await;
            Ok(())
        }

        fn force_flush(&self) -> SdkResult {
            Ok(())
        }

        fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
            Ok(())
        }

        fn temporality(&self, _kind: InstrumentKind) -> Temporality {
            Temporality::Cumulative
        }
    }

    let provider = SdkMeterProvider::builder()
        .with_periodic_exporter(StuckExporter)
        .build();
    provider.meter("stuck").u64_counter("c").build().add(1).unwrap();

    let result = provider.shutdown_with_timeout(Duration::from_millis(50));
    assert!(matches!(result, Err(SdkError::Timeout(_))));
    // shutdown completed regardless
    assert!(provider.shutdown().is_ok());
    assert!(matches!(provider.force_flush(), Err(SdkError::AlreadyShutdown)));
}
