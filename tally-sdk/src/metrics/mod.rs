//! The metrics engine.
//!
//! ## Moving parts
//!
//! * Instruments ([Counter], [UpDownCounter]) are created through a [Meter]
//!   and keep one running total each. Recording is a single atomic update and
//!   never waits on export activity.
//! * A [MetricReader] (usually a [PeriodicReader]) owns the aggregation state
//!   for every instrument it sees. On each collection it turns running totals
//!   into data points in the [Temporality] its exporter asked for.
//! * A [PushMetricExporter] receives the collected [MetricBatch] and ships it.
//! * [SdkMeterProvider] wires readers to instruments and owns their lifecycle.
//!
//! ## Example
//!
//! ```
//! # #[cfg(feature = "testing")]
//! # {
//! use tally_sdk::metrics::{
//!     InMemoryMetricExporter, PeriodicReader, SdkMeterProvider, Temporality,
//! };
//! use std::time::Duration;
//!
//! let exporter = InMemoryMetricExporter::builder()
//!     .with_temporality(Temporality::Delta)
//!     .build();
//! let reader = PeriodicReader::builder(exporter.clone())
//!     .with_interval(Duration::from_secs(5))
//!     .build();
//!
//! let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
//! let meter = meter_provider.meter("my_app");
//!
//! let counter = meter
//!     .u64_counter("power_consumption")
//!     .with_unit("kWh")
//!     .build();
//! counter.add(10).unwrap();
//!
//! // flushes everything that was not exported yet
//! meter_provider.shutdown().unwrap();
//! assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
//! # }
//! ```

pub mod data;
mod error;
pub mod exporter;
pub(crate) mod instrument;
pub(crate) mod instruments;
pub(crate) mod internal;
pub(crate) mod manual_reader;
pub(crate) mod meter;
mod meter_provider;
pub(crate) mod periodic_reader;
pub(crate) mod pipeline;
pub mod reader;
mod temporality;

/// In-Memory metric exporter for testing purpose.
#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "testing", test))))]
pub mod in_memory_exporter;
#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "testing", test))))]
pub use in_memory_exporter::{InMemoryMetricExporter, InMemoryMetricExporterBuilder};

pub use data::MetricBatch;
pub use error::{MetricError, MetricResult};
pub use exporter::PushMetricExporter;
pub use instrument::{InstrumentKind, InstrumentationScope, InstrumentationScopeBuilder};
pub use instruments::{Counter, InstrumentBuilder, UpDownCounter};
pub use manual_reader::*;
pub use meter::Meter;
pub use meter_provider::*;
pub use periodic_reader::*;
pub use pipeline::Pipeline;
pub use reader::MetricReader;
pub use temporality::TemporalityPreference;

/// Defines the window that an aggregation was calculated over.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Temporality {
    /// A measurement interval that continues to expand forward in time from a
    /// starting point.
    ///
    /// New measurements are added to all previous measurements since a start time.
    #[default]
    Cumulative,

    /// A measurement interval that resets each cycle.
    ///
    /// Measurements from one cycle are recorded independently, measurements from
    /// other cycles do not affect them.
    Delta,
}

#[cfg(test)]
mod tests {
    use super::data::{AggregatedMetrics, Sum};
    use super::*;
    use crate::error::{SdkError, SdkResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    // Run all tests in this mod
    // cargo test metrics::tests -- --nocapture

    struct TestContext {
        exporter: InMemoryMetricExporter,
        meter_provider: SdkMeterProvider,
    }

    impl TestContext {
        fn new(temporality: Temporality) -> Self {
            let exporter = InMemoryMetricExporterBuilder::new()
                .with_temporality(temporality)
                .build();
            let meter_provider = SdkMeterProvider::builder()
                .with_periodic_exporter(exporter.clone())
                .build();

            TestContext {
                exporter,
                meter_provider,
            }
        }

        fn meter(&self) -> Meter {
            self.meter_provider.meter("test")
        }

        fn flush_metrics(&self) {
            self.meter_provider.force_flush().unwrap();
        }

        /// The u64 sums exported for `name`, one per export.
        fn exported_u64_sums(&self, name: &str) -> Vec<Sum<u64>> {
            self.exporter
                .get_finished_metrics()
                .expect("metrics expected to be exported")
                .iter()
                .filter_map(|batch| match batch.metric(name).map(|m| &m.data) {
                    Some(AggregatedMetrics::U64(sum)) => Some(sum.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn counter_aggregation_cumulative() {
        let test_context = TestContext::new(Temporality::Cumulative);
        let counter = test_context.meter().u64_counter("my_counter").build();

        counter.add(5).unwrap();
        test_context.flush_metrics();
        counter.add(20).unwrap();
        test_context.flush_metrics();

        let sums = test_context.exported_u64_sums("my_counter");
        let values: Vec<u64> = sums.iter().map(|s| s.data_point.value).collect();
        assert_eq!(values, [5, 25]);
        for sum in &sums {
            assert!(sum.is_monotonic, "Counter should produce monotonic.");
            assert_eq!(sum.temporality, Temporality::Cumulative);
        }
        // cumulative windows share their start
        assert_eq!(sums[0].data_point.start_time, sums[1].data_point.start_time);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn counter_aggregation_delta() {
        let test_context = TestContext::new(Temporality::Delta);
        let counter = test_context.meter().u64_counter("my_counter").build();

        counter.add(5).unwrap();
        test_context.flush_metrics();
        counter.add(20).unwrap();
        test_context.flush_metrics();

        let sums = test_context.exported_u64_sums("my_counter");
        let values: Vec<u64> = sums.iter().map(|s| s.data_point.value).collect();
        assert_eq!(values, [5, 20]);
        assert!(sums.iter().all(|s| s.temporality == Temporality::Delta));
        // delta windows are contiguous
        assert_eq!(sums[1].data_point.start_time, sums[0].data_point.time);
    }

    #[test]
    fn two_readers_observe_the_same_counter_differently() {
        let cumulative = InMemoryMetricExporter::builder()
            .with_temporality(Temporality::Cumulative)
            .build();
        let delta = InMemoryMetricExporter::builder()
            .with_temporality(Temporality::Delta)
            .build();
        let provider = SdkMeterProvider::builder()
            .with_periodic_exporter(cumulative.clone())
            .with_periodic_exporter(delta.clone())
            .build();
        let meter = provider.meter_with_scope(
            InstrumentationScope::builder("preferred-temporality")
                .with_version("0.1.2")
                .build(),
        );
        let counter = meter.u64_counter("c1").build();

        counter.add(5).unwrap();
        provider.force_flush().unwrap();
        counter.add(20).unwrap();
        provider.shutdown().unwrap();

        let values = |exporter: &InMemoryMetricExporter| -> Vec<f64> {
            exporter
                .get_finished_metrics()
                .unwrap()
                .iter()
                .filter_map(|batch| batch.metric("c1").map(|m| m.data.value_as_f64()))
                .collect()
        };
        assert_eq!(values(&cumulative), [5.0, 25.0]);
        assert_eq!(values(&delta), [5.0, 20.0]);
        assert_eq!(counter.current_total(), 25);

        let batches = delta.get_finished_metrics().unwrap();
        assert_eq!(batches[0].scope_metrics[0].scope.version(), Some("0.1.2"));
    }

    #[test]
    fn unchanged_counter_is_exported_with_zero_delta() {
        let test_context = TestContext::new(Temporality::Delta);
        let counter = test_context.meter().u64_counter("idle").build();
        counter.add(3).unwrap();

        test_context.flush_metrics();
        test_context.flush_metrics();

        let values: Vec<u64> = test_context
            .exported_u64_sums("idle")
            .iter()
            .map(|s| s.data_point.value)
            .collect();
        assert_eq!(values, [3, 0]);
    }

    #[test]
    fn negative_increment_is_rejected_and_not_exported() {
        let test_context = TestContext::new(Temporality::Cumulative);
        let counter = test_context.meter().u64_counter("c").build();
        let float_counter = test_context.meter().f64_counter("f").build();

        counter.add(4).unwrap();
        assert!(matches!(
            float_counter.add(-1.0),
            Err(MetricError::InvalidArgument(_))
        ));
        test_context.flush_metrics();

        let batch = &test_context.exporter.get_finished_metrics().unwrap()[0];
        assert_eq!(batch.metric("c").unwrap().data.value_as_f64(), 4.0);
        assert_eq!(batch.metric("f").unwrap().data.value_as_f64(), 0.0);
    }

    #[test]
    fn overflowing_increment_keeps_delta_reader_alive() {
        let reader = ManualReader::builder()
            .with_temporality(Temporality::Delta)
            .build();
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let counter = meter_provider.meter("test").u64_counter("bytes").build();

        counter.add(u64::MAX).unwrap();
        assert!(matches!(
            counter.add(2),
            Err(MetricError::InvalidArgument(_))
        ));
        assert_eq!(counter.current_total(), u64::MAX);

        let mut batch = MetricBatch::default();
        reader.collect(&mut batch).unwrap();
        assert_eq!(batch.metric("bytes").unwrap().data.value_as_f64(), u64::MAX as f64);
        reader.collect(&mut batch).unwrap();
        assert_eq!(batch.metric("bytes").unwrap().data.value_as_f64(), 0.0);

        assert!(meter_provider.shutdown().is_ok());
    }

    #[test]
    fn up_down_counter_keeps_cumulative_under_delta_preference() {
        let test_context = TestContext::new(Temporality::Delta);
        let updown = test_context.meter().i64_up_down_counter("queue").build();
        updown.add(10).unwrap();
        updown.add(-4).unwrap();
        test_context.flush_metrics();

        let batch = &test_context.exporter.get_finished_metrics().unwrap()[0];
        let data = &batch.metric("queue").unwrap().data;
        assert_eq!(data.temporality(), Temporality::Cumulative);
        assert!(!data.is_monotonic());
        assert_eq!(data.value_as_f64(), 6.0);
    }

    #[derive(Debug, Clone, Default)]
    struct FailingExporter {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PushMetricExporter for FailingExporter {
        async fn export(&self, _metrics: &MetricBatch) -> SdkResult {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err(SdkError::InternalFailure("sink unavailable".into()))
        }

        fn force_flush(&self) -> SdkResult {
            Ok(())
        }

        fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
            Ok(())
        }

        fn temporality(&self, _kind: InstrumentKind) -> Temporality {
            Temporality::Delta
        }
    }

    #[test]
    fn failing_reader_does_not_affect_others() {
        let failing = FailingExporter::default();
        let healthy = InMemoryMetricExporter::builder()
            .with_temporality(Temporality::Delta)
            .build();
        let provider = SdkMeterProvider::builder()
            .with_reader(
                PeriodicReader::builder(failing.clone())
                    .with_interval(Duration::from_millis(10))
                    .build(),
            )
            .with_reader(
                PeriodicReader::builder(healthy.clone())
                    .with_interval(Duration::from_millis(10))
                    .build(),
            )
            .build();
        let counter = provider.meter("test").u64_counter("c").build();
        counter.add(7).unwrap();

        thread::sleep(Duration::from_millis(200));
        assert!(failing.attempts.load(Ordering::Relaxed) >= 2);

        // the failing reader does not block the provider either
        assert!(provider.force_flush().is_err());
        provider.shutdown_with_timeout(Duration::from_secs(1)).ok();

        let total: f64 = healthy
            .get_finished_metrics()
            .unwrap()
            .iter()
            .filter_map(|batch| batch.metric("c").map(|m| m.data.value_as_f64()))
            .sum();
        // delta telescopes to the single increment, never double counted
        assert_eq!(total, 7.0);
    }

    #[test]
    fn shutdown_flushes_and_is_idempotent() {
        let test_context = TestContext::new(Temporality::Cumulative);
        let counter = test_context.meter().u64_counter("c").build();
        counter.add(1).unwrap();

        assert!(test_context.meter_provider.shutdown().is_ok());
        assert_eq!(test_context.exporter.get_finished_metrics().unwrap().len(), 1);

        assert!(test_context.meter_provider.shutdown().is_ok());
        assert_eq!(test_context.exporter.get_finished_metrics().unwrap().len(), 1);

        // the exporter was shut down after the final flush
        let batch = MetricBatch::default();
        assert!(matches!(
            futures_executor::block_on(test_context.exporter.export(&batch)),
            Err(SdkError::AlreadyShutdown)
        ));
    }

    #[test]
    fn concurrent_adds_are_never_lost() {
        let test_context = TestContext::new(Temporality::Delta);
        let counter = test_context.meter().u64_counter("c").build();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.add(1).unwrap();
                    }
                })
            })
            .collect();
        // collect while writers are still running
        for _ in 0..5 {
            test_context.flush_metrics();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        test_context.flush_metrics();

        assert_eq!(counter.current_total(), 8000);
        let total: u64 = test_context
            .exported_u64_sums("c")
            .iter()
            .map(|s| s.data_point.value)
            .sum();
        assert_eq!(total, 8000);
    }
}
