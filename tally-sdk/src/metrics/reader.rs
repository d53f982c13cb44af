//! Interfaces for reading and producing metrics
use std::{fmt, sync::Weak, time::Duration};

use crate::error::SdkResult;

use super::{data::MetricBatch, pipeline::Pipeline, InstrumentKind, MetricResult, Temporality};

/// The interface used between the SDK and an exporter.
///
/// Control flow is bi-directional through the `MetricReader`, since the SDK
/// initiates `force_flush` and `shutdown` while the reader initiates
/// collection. The `register_pipeline` method here informs the metric reader
/// that it can begin reading, signaling the start of bi-directional control
/// flow.
///
/// Push-based exporters implement [PushMetricExporter] and are driven by a
/// [PeriodicReader]. Pull-based integrations use a [ManualReader] or implement
/// `MetricReader` themselves.
///
/// [PushMetricExporter]: crate::metrics::PushMetricExporter
/// [PeriodicReader]: crate::metrics::PeriodicReader
/// [ManualReader]: crate::metrics::ManualReader
pub trait MetricReader: fmt::Debug + Send + Sync + 'static {
    /// Registers a [MetricReader] with a [Pipeline].
    ///
    /// The pipeline argument allows the `MetricReader` to signal the sdk to collect
    /// and send aggregated metric measurements.
    fn register_pipeline(&self, pipeline: Weak<Pipeline>);

    /// Gathers and returns all metric data related to the [MetricReader] from the
    /// SDK and stores it in the provided [MetricBatch] reference.
    ///
    /// An error is returned if this is called after shutdown.
    fn collect(&self, batch: &mut MetricBatch) -> MetricResult<()>;

    /// Flushes all metric measurements held in an export pipeline.
    ///
    /// There is no guaranteed that all telemetry be flushed or all resources have
    /// been released on error.
    fn force_flush(&self) -> SdkResult;

    /// Flushes all metric measurements held in an export pipeline and releases any
    /// held computational resources, waiting at most `timeout`.
    ///
    /// Resources are released even when the final flush fails or times out.
    ///
    /// After `shutdown` is called, calls to `collect` will perform no operation and
    /// instead will return an error indicating the shutdown state.
    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult;

    /// Shutdown with the default timeout of 5 seconds.
    fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(Duration::from_secs(5))
    }

    /// The output temporality, a function of instrument kind.
    /// This SHOULD be obtained from the exporter.
    ///
    /// If not configured, the Cumulative temporality SHOULD be used.
    fn temporality(&self, kind: InstrumentKind) -> Temporality;
}

/// Produces metrics for a [MetricReader].
pub(crate) trait SdkProducer: fmt::Debug + Send + Sync {
    /// Returns aggregated metrics from a single collection.
    fn produce(&self, batch: &mut MetricBatch) -> MetricResult<()>;
}
