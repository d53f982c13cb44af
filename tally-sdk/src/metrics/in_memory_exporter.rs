use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{SdkError, SdkResult};
use crate::metrics::data::MetricBatch;
use crate::metrics::exporter::PushMetricExporter;
use crate::metrics::{InstrumentKind, MetricResult, Temporality, TemporalityPreference};

/// An in-memory metrics exporter that stores metrics data in memory.
///
/// This exporter is useful for testing and debugging purposes. It stores
/// every exported [MetricBatch] in a `VecDeque`. Batches can be retrieved
/// using the `get_finished_metrics` method. Stored batches survive the
/// exporter's shutdown so they can still be inspected afterwards.
///
/// # Example
///
/// ```
/// use tally_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
///
/// // Create an InMemoryMetricExporter
/// let exporter = InMemoryMetricExporter::default();
///
/// // Create a MeterProvider and register the exporter
/// let meter_provider = SdkMeterProvider::builder()
///     .with_reader(PeriodicReader::builder(exporter.clone()).build())
///     .build();
///
/// // Create and record metrics using the MeterProvider
/// let meter = meter_provider.meter("example");
/// let counter = meter.u64_counter("my_counter").build();
/// counter.add(1).unwrap();
///
/// meter_provider.force_flush().unwrap();
///
/// // Retrieve the finished metrics from the exporter
/// let finished_metrics = exporter.get_finished_metrics().unwrap();
///
/// // Print the finished metrics
/// for batch in finished_metrics {
///     println!("{:?}", batch);
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryMetricExporter {
    metrics: Arc<Mutex<VecDeque<MetricBatch>>>,
    temporality: TemporalityPreference,
    is_shutdown: Arc<AtomicBool>,
}

impl fmt::Debug for InMemoryMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetricExporter").finish()
    }
}

impl Default for InMemoryMetricExporter {
    fn default() -> Self {
        InMemoryMetricExporterBuilder::new().build()
    }
}

/// Builder for [`InMemoryMetricExporter`].
/// # Example
///
/// ```
/// # use tally_sdk::metrics::{InMemoryMetricExporter, InMemoryMetricExporterBuilder};
///
/// let exporter = InMemoryMetricExporterBuilder::new().build();
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMetricExporterBuilder {
    temporality: TemporalityPreference,
}

impl InMemoryMetricExporterBuilder {
    /// Creates a new instance of the `InMemoryMetricExporterBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the temporality of the exporter, see [TemporalityPreference]'s
    /// `From<Temporality>` for how it maps to instrument kinds.
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality.into();
        self
    }

    /// Sets the per-kind temporality preference of the exporter.
    pub fn with_temporality_preference(mut self, preference: TemporalityPreference) -> Self {
        self.temporality = preference;
        self
    }

    /// Creates a new instance of the `InMemoryMetricExporter`.
    pub fn build(self) -> InMemoryMetricExporter {
        InMemoryMetricExporter {
            metrics: Arc::new(Mutex::new(VecDeque::new())),
            temporality: self.temporality,
            is_shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl InMemoryMetricExporter {
    /// Configuration for the exporter.
    pub fn builder() -> InMemoryMetricExporterBuilder {
        InMemoryMetricExporterBuilder::new()
    }

    /// Returns the finished metrics as a vector of [MetricBatch], oldest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns a `MetricError` if the internal lock cannot be acquired.
    pub fn get_finished_metrics(&self) -> MetricResult<Vec<MetricBatch>> {
        let metrics = self.metrics.lock()?;
        Ok(metrics.iter().cloned().collect())
    }

    /// Clears the internal storage of finished metrics.
    pub fn reset(&self) {
        let _ = self
            .metrics
            .lock()
            .map(|mut metrics_guard| metrics_guard.clear());
    }
}

#[async_trait]
impl PushMetricExporter for InMemoryMetricExporter {
    async fn export(&self, metrics: &MetricBatch) -> SdkResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        self.metrics
            .lock()
            .map(|mut metrics_guard| metrics_guard.push_back(metrics.clone()))
            .map_err(SdkError::from)
    }

    fn force_flush(&self) -> SdkResult {
        Ok(()) // In this implementation, flush does nothing
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        Ok(())
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.temporality.get(kind)
    }
}
