use core::fmt;
use std::sync::Arc;

use crate::metrics::MetricResult;

use super::SyncInstrument;

/// An instrument that records increasing values.
///
/// Clones share the same running total.
#[derive(Clone)]
#[non_exhaustive]
pub struct Counter<T>(Arc<dyn SyncInstrument<T>>);

impl<T> fmt::Debug for Counter<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("Counter<{}>", std::any::type_name::<T>()))
    }
}

impl<T> Counter<T> {
    pub(crate) fn new(inner: Arc<dyn SyncInstrument<T>>) -> Self {
        Counter(inner)
    }

    /// Records an increment to the counter.
    ///
    /// Fails with [MetricError::InvalidArgument] for negative or non-finite
    /// values, in which case the running total is left unchanged.
    ///
    /// [MetricError::InvalidArgument]: crate::metrics::MetricError::InvalidArgument
    pub fn add(&self, value: T) -> MetricResult<()> {
        self.0.measure(value)
    }

    /// The sum of every accepted increment since the counter was created.
    pub fn current_total(&self) -> T {
        self.0.current_total()
    }
}
