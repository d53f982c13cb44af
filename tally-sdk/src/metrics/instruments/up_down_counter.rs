use core::fmt;
use std::sync::Arc;

use crate::metrics::MetricResult;

use super::SyncInstrument;

/// An instrument that records increasing or decreasing values.
#[derive(Clone)]
#[non_exhaustive]
pub struct UpDownCounter<T>(Arc<dyn SyncInstrument<T>>);

impl<T> fmt::Debug for UpDownCounter<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("UpDownCounter<{}>", std::any::type_name::<T>()))
    }
}

impl<T> UpDownCounter<T> {
    pub(crate) fn new(inner: Arc<dyn SyncInstrument<T>>) -> Self {
        UpDownCounter(inner)
    }

    /// Records an increment or decrement.
    ///
    /// Only non-finite values are rejected.
    pub fn add(&self, value: T) -> MetricResult<()> {
        self.0.measure(value)
    }

    /// The running total at call time.
    pub fn current_total(&self) -> T {
        self.0.current_total()
    }
}
