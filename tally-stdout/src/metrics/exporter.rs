use core::fmt;
use std::{
    io::{stdout, Write},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use tally_sdk::{
    error::{SdkError, SdkResult},
    metrics::{
        InstrumentKind, MetricBatch, PushMetricExporter, Temporality, TemporalityPreference,
    },
    tally_debug,
};

use crate::MetricsData;

/// An exporter that writes each batch to stdout as a single JSON line.
pub struct MetricExporter {
    writer: Mutex<Option<Box<dyn Write + Send + Sync>>>,
    temporality: TemporalityPreference,
}

impl MetricExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> MetricExporterBuilder {
        MetricExporterBuilder::default()
    }
}

impl Default for MetricExporter {
    fn default() -> Self {
        MetricExporterBuilder::default().build()
    }
}

impl fmt::Debug for MetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricExporter")
            .field("temporality", &self.temporality)
            .finish()
    }
}

#[async_trait]
impl PushMetricExporter for MetricExporter {
    async fn export(&self, metrics: &MetricBatch) -> SdkResult {
        let mut guard = self.writer.lock()?;
        let Some(writer) = guard.as_mut() else {
            return Err(SdkError::AlreadyShutdown);
        };

        serde_json::to_writer(&mut *writer, &MetricsData::from(metrics))
            .map_err(|err| SdkError::InternalFailure(err.to_string()))?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|err| SdkError::InternalFailure(err.to_string()))
    }

    fn force_flush(&self) -> SdkResult {
        // every export is flushed already
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
        match self.writer.lock()?.take() {
            Some(mut writer) => {
                tally_debug!(name: "StdoutMetricExporter.Shutdown");
                writer
                    .flush()
                    .map_err(|err| SdkError::InternalFailure(err.to_string()))
            }
            None => Err(SdkError::AlreadyShutdown),
        }
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.temporality.get(kind)
    }
}

/// Configuration for the stdout metrics exporter
#[derive(Default)]
pub struct MetricExporterBuilder {
    writer: Option<Box<dyn Write + Send + Sync>>,
    temporality: Option<TemporalityPreference>,
}

impl MetricExporterBuilder {
    /// Set the writer that the exporter will write to
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_stdout::MetricExporterBuilder;
    ///
    /// let buffer = Vec::new(); // Any type that implements `Write`
    /// let exporter = MetricExporterBuilder::default().with_writer(buffer).build();
    /// ```
    pub fn with_writer(mut self, writer: impl Write + Send + Sync + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Set a uniform temporality preference, see [TemporalityPreference] for
    /// how a single [Temporality] maps to instrument kinds.
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = Some(temporality.into());
        self
    }

    /// Set the per-kind temporality preference.
    ///
    /// Without this call the preference is read from
    /// `OTEL_EXPORTER_METRICS_TEMPORALITY_PREFERENCE`.
    pub fn with_temporality_preference(mut self, preference: TemporalityPreference) -> Self {
        self.temporality = Some(preference);
        self
    }

    /// Create a metrics exporter with the current configuration
    pub fn build(self) -> MetricExporter {
        MetricExporter {
            writer: Mutex::new(Some(self.writer.unwrap_or_else(|| Box::new(stdout())))),
            temporality: self
                .temporality
                .unwrap_or_else(TemporalityPreference::from_env),
        }
    }
}

impl fmt::Debug for MetricExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MetricExporterBuilder")
    }
}
