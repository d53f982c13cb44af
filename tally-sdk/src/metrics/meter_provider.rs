use core::fmt;
use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::{error::SdkResult, tally_debug, tally_error, tally_info};

use super::{
    exporter::PushMetricExporter, instrument::InstrumentationScope, meter::Meter,
    pipeline::Pipelines, reader::MetricReader, PeriodicReader,
};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles the creation and coordination of [Meter]s.
///
/// All `Meter`s created by a `MeterProvider` have their produced metric
/// telemetry passed to the configured [MetricReader]s. This is a clonable
/// handle to the MeterProvider implementation itself, and cloning it will
/// create a new reference, not a new instance of a MeterProvider. Dropping the
/// last reference to it will trigger shutdown of the provider. Shutdown can
/// also be triggered manually by calling the `shutdown` method.
#[derive(Clone, Debug)]
pub struct SdkMeterProvider {
    inner: Arc<SdkMeterProviderInner>,
}

#[derive(Debug)]
struct SdkMeterProviderInner {
    pipes: Arc<Pipelines>,
    meters: Mutex<HashMap<InstrumentationScope, Meter>>,
    shutdown_invoked: AtomicBool,
}

impl Default for SdkMeterProvider {
    fn default() -> Self {
        SdkMeterProvider::builder().build()
    }
}

impl SdkMeterProvider {
    /// Return default [MeterProviderBuilder]
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// Returns the meter for the scope with the given name and no version.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.meter_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns the meter for `scope`, creating it on first use.
    ///
    /// Meters are cached by scope: asking twice for an equal scope yields
    /// meters that share their instruments' registration.
    ///
    /// ```
    /// use tally_sdk::metrics::{InstrumentationScope, SdkMeterProvider};
    ///
    /// let provider = SdkMeterProvider::default();
    /// let scope = InstrumentationScope::builder("preferred-temporality")
    ///     .with_version("0.1.2")
    ///     .build();
    /// let meter = provider.meter_with_scope(scope);
    /// assert_eq!(meter.scope().version(), Some("0.1.2"));
    /// ```
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        if self.inner.shutdown_invoked.load(Ordering::Relaxed) {
            // Instruments still record, but no pipeline picks them up.
            tally_debug!(
                name: "MeterProvider.MeterAfterShutdown",
                meter_name = scope.name(),
            );
            return Meter::new(scope, self.inner.pipes.clone());
        }

        if scope.name().is_empty() {
            tally_info!(name: "MeterProvider.MeterNameEmpty", message = "Meter name is empty; consider providing a meaningful name.");
        }

        match self.inner.meters.lock() {
            Ok(mut meters) => {
                if let Some(existing_meter) = meters.get(&scope) {
                    tally_debug!(
                        name: "MeterProvider.ExistingMeterReturned",
                        meter_name = scope.name(),
                    );
                    existing_meter.clone()
                } else {
                    let new_meter = Meter::new(scope.clone(), self.inner.pipes.clone());
                    meters.insert(scope, new_meter.clone());
                    tally_debug!(
                        name: "MeterProvider.NewMeterCreated",
                        meter_name = new_meter.scope().name(),
                    );
                    new_meter
                }
            }
            Err(_) => Meter::new(scope, self.inner.pipes.clone()),
        }
    }

    /// Flushes all pending telemetry.
    ///
    /// Every reader collects and exports immediately, without waiting for
    /// its next scheduled export. Returns [SdkError::AlreadyShutdown] after
    /// the provider was shut down.
    ///
    /// There is no guaranteed that all telemetry be flushed or all resources have
    /// been released on error.
    ///
    /// [SdkError::AlreadyShutdown]: crate::error::SdkError::AlreadyShutdown
    pub fn force_flush(&self) -> SdkResult {
        self.inner.force_flush()
    }

    /// Shuts down the meter provider flushing all pending telemetry and releasing
    /// any held computational resources, waiting at most 5 seconds.
    ///
    /// This call is idempotent. The first call performs the final flush of
    /// every reader and releases their exporters. Later calls do nothing and
    /// return `Ok(())`.
    ///
    /// Measurements made by instruments from meters this MeterProvider created will
    /// not be exported after Shutdown is called.
    pub fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Like [SdkMeterProvider::shutdown], with one deadline shared by every
    /// reader.
    ///
    /// Readers that run out of time still release their resources and report
    /// [SdkError::Timeout].
    ///
    /// [SdkError::Timeout]: crate::error::SdkError::Timeout
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        tally_info!(
            name: "MeterProvider.Shutdown",
            message = "User initiated shutdown of MeterProvider."
        );
        self.inner.shutdown_with_timeout(timeout)
    }
}

impl SdkMeterProviderInner {
    fn force_flush(&self) -> SdkResult {
        if self.shutdown_invoked.load(Ordering::Relaxed) {
            Err(crate::error::SdkError::AlreadyShutdown)
        } else {
            self.pipes.force_flush()
        }
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        if self.shutdown_invoked.swap(true, Ordering::SeqCst) {
            // If the previous value was true, shutdown was already invoked.
            tally_debug!(
                name: "MeterProvider.AlreadyShutdown",
                message = "Shutdown was already invoked, nothing left to do."
            );
            return Ok(());
        }
        let result = self.pipes.shutdown_with_timeout(timeout);
        if let Ok(mut meters) = self.meters.lock() {
            meters.clear();
        }
        result
    }
}

impl Drop for SdkMeterProviderInner {
    fn drop(&mut self) {
        // If user has already shutdown the provider manually by calling
        // shutdown(), then we don't need to call shutdown again.
        if self.shutdown_invoked.load(Ordering::Relaxed) {
            tally_debug!(
                name: "MeterProvider.Drop.AlreadyShutdown",
                message = "MeterProvider was already shut down; drop will not attempt shutdown again."
            );
        } else {
            tally_info!(
                name: "MeterProvider.Drop",
                message = "Last reference of MeterProvider dropped, initiating shutdown."
            );
            if let Err(err) = self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT) {
                tally_error!(
                    name: "MeterProvider.Drop.ShutdownFailed",
                    message = "Shutdown attempt failed during drop of MeterProvider.",
                    reason = format!("{}", err)
                );
            } else {
                tally_info!(name: "MeterProvider.Drop.ShutdownCompleted");
            }
        }
    }
}

/// Configuration options for a [SdkMeterProvider].
#[derive(Default)]
pub struct MeterProviderBuilder {
    readers: Vec<Box<dyn MetricReader>>,
}

impl MeterProviderBuilder {
    /// Associates a [MetricReader] with a [SdkMeterProvider].
    /// [`MeterProviderBuilder::with_periodic_exporter()`] can be used to add a PeriodicReader which is
    /// the most common use case.
    ///
    /// Each reader gets its own aggregation state, so readers with different
    /// temporalities can observe the same instruments.
    ///
    /// A [SdkMeterProvider] will export no metrics without [MetricReader]
    /// added.
    pub fn with_reader<T: MetricReader>(mut self, reader: T) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    /// Adds a [`PushMetricExporter`] to the [`SdkMeterProvider`] and configures it
    /// to export metrics at **fixed** intervals (60 seconds) using a
    /// [`PeriodicReader`].
    ///
    /// To customize the export interval, set the
    /// **"OTEL_METRIC_EXPORT_INTERVAL"** environment variable (in
    /// milliseconds), or build the reader with
    /// [`crate::metrics::PeriodicReaderBuilder`] and attach it using
    /// [`MeterProviderBuilder::with_reader()`].
    pub fn with_periodic_exporter<T>(mut self, exporter: T) -> Self
    where
        T: PushMetricExporter,
    {
        let reader = PeriodicReader::builder(exporter).build();
        self.readers.push(Box::new(reader));
        self
    }

    /// Construct a new [SdkMeterProvider] with this configuration.
    ///
    /// Every reader is registered here, which starts the periodic readers'
    /// worker threads.
    pub fn build(self) -> SdkMeterProvider {
        tally_debug!(
            name: "MeterProvider.Building",
            builder = format!("{:?}", &self),
        );
        let readers = self.readers.len();

        let meter_provider = SdkMeterProvider {
            inner: Arc::new(SdkMeterProviderInner {
                pipes: Arc::new(Pipelines::new(self.readers)),
                meters: Default::default(),
                shutdown_invoked: AtomicBool::new(false),
            }),
        };

        tally_info!(name: "MeterProvider.Built", readers = readers);
        meter_provider
    }
}

impl fmt::Debug for MeterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderBuilder")
            .field("readers", &self.readers)
            .finish()
    }
}
