use std::{borrow::Cow, fmt, marker::PhantomData, sync::Arc};

use crate::metrics::{
    instrument::InstrumentKind,
    internal::{Number, RunningTotal},
    meter::Meter,
    MetricResult,
};

mod counter;
mod up_down_counter;

pub use counter::Counter;
pub use up_down_counter::UpDownCounter;

/// Records measurements into an instrument's running total.
pub(crate) trait SyncInstrument<T>: Send + Sync {
    /// Validates and folds one measurement into the total.
    fn measure(&self, value: T) -> MetricResult<()>;

    /// The running total at call time.
    fn current_total(&self) -> T;
}

/// The recording side of a sum instrument.
pub(crate) struct SumRecorder<T: Number> {
    total: Arc<RunningTotal<T>>,
    kind: InstrumentKind,
}

impl<T: Number> SumRecorder<T> {
    pub(crate) fn new(total: Arc<RunningTotal<T>>, kind: InstrumentKind) -> Self {
        SumRecorder { total, kind }
    }
}

impl<T: Number> SyncInstrument<T> for SumRecorder<T> {
    fn measure(&self, value: T) -> MetricResult<()> {
        value.validate(self.kind.is_monotonic())?;
        self.total.add(value)
    }

    fn current_total(&self) -> T {
        self.total.get()
    }
}

/// Configuration for building a sum instrument.
#[non_exhaustive]
pub struct InstrumentBuilder<'a, T> {
    meter: &'a Meter,
    /// Instrument name.
    pub name: Cow<'static, str>,
    /// Instrument description.
    pub description: Option<Cow<'static, str>>,
    /// Instrument unit.
    pub unit: Option<Cow<'static, str>>,
    _marker: PhantomData<T>,
}

impl<'a, T> InstrumentBuilder<'a, T> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            _marker: PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    fn register<N: Number>(self, kind: InstrumentKind) -> SumRecorder<N> {
        let total = self
            .meter
            .register_sum(self.name, self.description, self.unit, kind);
        SumRecorder::new(total, kind)
    }
}

impl InstrumentBuilder<'_, Counter<u64>> {
    /// Creates a new counter and registers it with every reader of the
    /// meter's provider.
    pub fn build(self) -> Counter<u64> {
        Counter::new(Arc::new(self.register::<u64>(InstrumentKind::Counter)))
    }
}

impl InstrumentBuilder<'_, Counter<f64>> {
    /// Creates a new counter and registers it with every reader of the
    /// meter's provider.
    pub fn build(self) -> Counter<f64> {
        Counter::new(Arc::new(self.register::<f64>(InstrumentKind::Counter)))
    }
}

impl InstrumentBuilder<'_, UpDownCounter<i64>> {
    /// Creates a new up-down counter and registers it with every reader of
    /// the meter's provider.
    pub fn build(self) -> UpDownCounter<i64> {
        UpDownCounter::new(Arc::new(self.register::<i64>(InstrumentKind::UpDownCounter)))
    }
}

impl InstrumentBuilder<'_, UpDownCounter<f64>> {
    /// Creates a new up-down counter and registers it with every reader of
    /// the meter's provider.
    pub fn build(self) -> UpDownCounter<f64> {
        UpDownCounter::new(Arc::new(self.register::<f64>(InstrumentKind::UpDownCounter)))
    }
}

impl<T> fmt::Debug for InstrumentBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<T>())
            .finish()
    }
}
