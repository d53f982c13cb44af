use core::fmt;
use std::{borrow::Cow, sync::Arc};

use crate::metrics::{
    instrument::{InstrumentDescriptor, InstrumentKind, InstrumentationScope},
    instruments::{Counter, InstrumentBuilder, UpDownCounter},
    internal::{Number, RunningTotal},
    pipeline::Pipelines,
};
use crate::tally_debug;

/// Handles the creation and coordination of all metric instruments.
///
/// A meter represents a single instrumentation scope; all metric telemetry
/// produced by an instrumentation scope will use metric instruments from a
/// single meter. Meters are obtained from an [SdkMeterProvider] and are cheap
/// to clone.
///
/// Instrument names are opaque; creating two instruments with the same name
/// yields two independent running totals.
///
/// [SdkMeterProvider]: crate::metrics::SdkMeterProvider
#[derive(Clone)]
pub struct Meter {
    scope: InstrumentationScope,
    pipes: Arc<Pipelines>,
}

impl Meter {
    pub(crate) fn new(scope: InstrumentationScope, pipes: Arc<Pipelines>) -> Self {
        Meter { scope, pipes }
    }

    /// The scope this meter was created for.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Creates a builder for a monotonic `u64` counter.
    pub fn u64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<u64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a monotonic `f64` counter.
    pub fn f64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an `i64` up-down counter.
    pub fn i64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an `f64` up-down counter.
    pub fn f64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates the running total of a new sum instrument and hands it to
    /// every pipeline of the provider.
    pub(crate) fn register_sum<T: Number>(
        &self,
        name: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
        unit: Option<Cow<'static, str>>,
        kind: InstrumentKind,
    ) -> Arc<RunningTotal<T>> {
        let descriptor = InstrumentDescriptor {
            name,
            description: description.unwrap_or_default(),
            unit: unit.unwrap_or_default(),
            kind,
        };
        let total = Arc::new(RunningTotal::new());
        self.pipes.add_sum(&self.scope, &descriptor, &total);

        tally_debug!(
            name: "Meter.InstrumentCreated",
            meter_name = self.scope.name(),
            instrument_name = descriptor.name.as_ref(),
            kind = format!("{:?}", kind),
        );
        total
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter").field("scope", &self.scope).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{data::MetricBatch, ManualReader, MetricError, MetricReader};

    fn meter_with_reader() -> (Meter, ManualReader) {
        let reader = ManualReader::builder().build();
        let pipes = Arc::new(Pipelines::new(vec![Box::new(reader.clone())]));
        let meter = Meter::new(InstrumentationScope::builder("test").build(), pipes);
        (meter, reader)
    }

    #[test]
    fn builder_metadata_reaches_the_reader() {
        let (meter, reader) = meter_with_reader();
        let counter = meter
            .u64_counter("energy")
            .with_description("energy used")
            .with_unit("kWh")
            .build();
        counter.add(2).unwrap();

        let mut batch = MetricBatch::default();
        reader.collect(&mut batch).unwrap();
        let metric = batch.metric("energy").unwrap();
        assert_eq!(metric.description, "energy used");
        assert_eq!(metric.unit, "kWh");
        assert!(metric.data.is_monotonic());
        assert_eq!(metric.data.value_as_f64(), 2.0);
    }

    #[test]
    fn same_name_instruments_are_independent() {
        let (meter, _reader) = meter_with_reader();
        let a = meter.u64_counter("dup").build();
        let b = meter.u64_counter("dup").build();
        a.add(1).unwrap();
        assert_eq!(a.current_total(), 1);
        assert_eq!(b.current_total(), 0);
    }

    #[test]
    fn counter_rejects_invalid_increments() {
        let (meter, _reader) = meter_with_reader();
        let counter = meter.f64_counter("latency").build();
        counter.add(1.5).unwrap();

        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                counter.add(bad),
                Err(MetricError::InvalidArgument(_))
            ));
        }
        assert_eq!(counter.current_total(), 1.5);
    }

    #[test]
    fn up_down_counter_accepts_negative_increments() {
        let (meter, reader) = meter_with_reader();
        let queue = meter.i64_up_down_counter("queue_depth").build();
        queue.add(5).unwrap();
        queue.add(-7).unwrap();
        assert_eq!(queue.current_total(), -2);

        let mut batch = MetricBatch::default();
        reader.collect(&mut batch).unwrap();
        let metric = batch.metric("queue_depth").unwrap();
        assert!(!metric.data.is_monotonic());
        assert_eq!(metric.data.value_as_f64(), -2.0);
    }
}
