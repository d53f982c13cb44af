//! Interfaces for exporting metrics
use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;

use crate::error::SdkResult;

use super::{data::MetricBatch, InstrumentKind, Temporality};

/// Exporter handles the delivery of metric data to external receivers.
///
/// This is the final component in the metric push pipeline. The temporality
/// an exporter reports through [PushMetricExporter::temporality] must not
/// change over its lifetime; readers resolve it once per instrument.
#[async_trait]
pub trait PushMetricExporter: Debug + Send + Sync + 'static {
    /// Export serializes and transmits metric data to a receiver.
    ///
    /// All retry logic must be contained in this function. The SDK does not
    /// implement any retry logic. All errors returned by this function are
    /// considered unrecoverable and will be logged.
    async fn export(&self, metrics: &MetricBatch) -> SdkResult;

    /// Flushes any metric data held by an exporter.
    fn force_flush(&self) -> SdkResult;

    /// Releases any held computational resources.
    ///
    /// After Shutdown is called, calls to Export will perform no operation and
    /// instead will return an error indicating the shutdown state.
    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult;

    /// Shutdown with the default timeout of 5 seconds.
    fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(Duration::from_secs(5))
    }

    /// The [Temporality] this exporter wants for instruments of `kind`.
    fn temporality(&self, kind: InstrumentKind) -> Temporality;
}
