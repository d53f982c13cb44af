use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use crate::{
    error::{SdkError, SdkResult},
    metrics::{MetricError, MetricResult},
    tally_warn,
};

use super::{
    data::MetricBatch,
    pipeline::Pipeline,
    reader::{MetricReader, SdkProducer},
    InstrumentKind, Temporality, TemporalityPreference,
};

/// A simple [MetricReader] that allows an application to read metrics on demand.
///
/// Clones share the same registration, so a clone kept by the caller can
/// collect from the provider the reader was registered with.
///
/// # Example
///
/// ```
/// use tally_sdk::metrics::{ManualReader, MetricBatch, MetricReader, SdkMeterProvider};
///
/// let reader = ManualReader::builder().build();
/// let provider = SdkMeterProvider::builder().with_reader(reader.clone()).build();
///
/// provider.meter("app").u64_counter("requests").build().add(3).unwrap();
///
/// let mut batch = MetricBatch::default();
/// reader.collect(&mut batch).unwrap();
/// assert_eq!(batch.metric("requests").unwrap().data.value_as_f64(), 3.0);
/// ```
#[derive(Clone)]
pub struct ManualReader {
    inner: Arc<Mutex<ManualReaderInner>>,
    temporality: Arc<TemporalityPreference>,
}

impl Default for ManualReader {
    fn default() -> Self {
        ManualReader::builder().build()
    }
}

impl fmt::Debug for ManualReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ManualReader")
    }
}

#[derive(Debug, Default)]
struct ManualReaderInner {
    sdk_producer: Option<Weak<dyn SdkProducer>>,
    is_shutdown: bool,
}

impl ManualReader {
    /// Configuration for this reader
    pub fn builder() -> ManualReaderBuilder {
        ManualReaderBuilder::default()
    }

    /// A [MetricReader] which is directly called to collect metrics.
    pub(crate) fn new(temporality: TemporalityPreference) -> Self {
        ManualReader {
            inner: Arc::new(Mutex::new(ManualReaderInner::default())),
            temporality: Arc::new(temporality),
        }
    }
}

impl MetricReader for ManualReader {
    ///  Register a pipeline which enables the caller to read metrics from the SDK
    ///  on demand.
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        let _ = self.inner.lock().map(|mut inner| {
            // Only register once. If producer is already set, do nothing.
            if inner.sdk_producer.is_none() {
                inner.sdk_producer = Some(pipeline);
            } else {
                tally_warn!(
                    name: "ManualReader.DuplicateRegistration",
                    message = "The pipeline is already registered to the Reader. Registering pipeline multiple times is not allowed."
                );
            }
        });
    }

    /// Gathers all metrics from the SDK, returning the results in `batch`.
    ///
    /// Returns an error if called after shutdown.
    fn collect(&self, batch: &mut MetricBatch) -> MetricResult<()> {
        let inner = self.inner.lock()?;
        if inner.is_shutdown {
            return Err(MetricError::Other("reader is shut down".into()));
        }

        match &inner.sdk_producer.as_ref().and_then(|w| w.upgrade()) {
            Some(producer) => producer.produce(batch)?,
            None => {
                return Err(MetricError::Other(
                    "reader is not registered with a provider".into(),
                ))
            }
        };

        Ok(())
    }

    /// ForceFlush is a no-op, it always returns Ok.
    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    /// Closes any connections and frees any resources used by the reader.
    fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
        let mut inner = self.inner.lock()?;
        if inner.is_shutdown {
            return Err(SdkError::AlreadyShutdown);
        }

        // Any future call to collect will now return an error.
        inner.sdk_producer = None;
        inner.is_shutdown = true;

        Ok(())
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.temporality.get(kind)
    }
}

/// Configuration for a [ManualReader]
#[derive(Debug, Default)]
pub struct ManualReaderBuilder {
    temporality: TemporalityPreference,
}

impl ManualReaderBuilder {
    /// New manual builder configuration
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the [Temporality] of the reader: [TemporalityPreference::delta]
    /// for `Delta`, cumulative for everything otherwise.
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality.into();
        self
    }

    /// Set the full per-kind temporality preference of the reader.
    pub fn with_temporality_preference(mut self, preference: TemporalityPreference) -> Self {
        self.temporality = preference;
        self
    }

    /// Create a new [ManualReader] from this configuration.
    pub fn build(self) -> ManualReader {
        ManualReader::new(self.temporality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SdkMeterProvider;

    #[test]
    fn collect_without_registration_fails() {
        let reader = ManualReader::builder().build();
        let mut batch = MetricBatch::default();
        assert!(reader.collect(&mut batch).is_err());
    }

    #[test]
    fn collect_after_shutdown_fails() {
        let reader = ManualReader::builder().build();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let mut batch = MetricBatch::default();
        assert!(reader.collect(&mut batch).is_ok());

        provider.shutdown().unwrap();

        assert!(reader.collect(&mut batch).is_err());
        assert!(matches!(reader.shutdown(), Err(SdkError::AlreadyShutdown)));
    }

    #[test]
    fn temporality_follows_preference() {
        let reader = ManualReader::builder()
            .with_temporality(Temporality::Delta)
            .build();
        assert_eq!(reader.temporality(InstrumentKind::Counter), Temporality::Delta);
        assert_eq!(
            reader.temporality(InstrumentKind::UpDownCounter),
            Temporality::Cumulative
        );
    }
}
