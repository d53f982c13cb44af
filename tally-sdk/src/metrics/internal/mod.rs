mod sum;

use core::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::SystemTime;

pub(crate) use sum::Sum;

use super::data::{self, AggregatedMetrics};
use super::{MetricError, MetricResult};

/// Produces the aggregated data of one instrument for one reader.
pub(crate) trait ComputeAggregation: Send + Sync + 'static {
    /// Reads the instrument and returns its data in the reader's temporality.
    fn call(&self, now: SystemTime) -> MetricResult<AggregatedMetrics>;
}

/// Marks a type that can have a value added and retrieved atomically. Required since
/// different types have different backing atomic mechanisms
pub(crate) trait AtomicValue<T>: Sync + Send + 'static {
    /// Adds `value` unless the result is out of range for `T`.
    ///
    /// Returns `false` and leaves the stored value untouched on overflow.
    fn try_add(&self, value: T) -> bool;
    fn get_value(&self) -> T;
}

pub(crate) trait Number:
    PartialOrd
    + fmt::Debug
    + fmt::Display
    + Clone
    + Copy
    + Default
    + Send
    + Sync
    + 'static
{
    type AtomicValue: AtomicValue<Self>;

    fn new_atomic_value() -> Self::AtomicValue;

    /// Rejects values an instrument must never record.
    fn validate(self, monotonic: bool) -> MetricResult<()>;

    /// `self + rhs`, or `None` if the sum is out of range.
    fn try_add(self, rhs: Self) -> Option<Self>;

    /// `self - rhs`, or `None` if the difference is out of range.
    fn try_sub(self, rhs: Self) -> Option<Self>;

    fn into_aggregated(sum: data::Sum<Self>) -> AggregatedMetrics;
}

impl Number for u64 {
    type AtomicValue = AtomicU64;

    fn new_atomic_value() -> Self::AtomicValue {
        AtomicU64::new(0)
    }

    fn validate(self, _monotonic: bool) -> MetricResult<()> {
        Ok(())
    }

    fn try_add(self, rhs: Self) -> Option<Self> {
        self.checked_add(rhs)
    }

    fn try_sub(self, rhs: Self) -> Option<Self> {
        self.checked_sub(rhs)
    }

    fn into_aggregated(sum: data::Sum<Self>) -> AggregatedMetrics {
        AggregatedMetrics::U64(sum)
    }
}

impl Number for i64 {
    type AtomicValue = AtomicI64;

    fn new_atomic_value() -> Self::AtomicValue {
        AtomicI64::new(0)
    }

    fn validate(self, monotonic: bool) -> MetricResult<()> {
        if monotonic && self < 0 {
            return Err(MetricError::InvalidArgument(format!(
                "counter increments must be non-negative, got {self}"
            )));
        }
        Ok(())
    }

    fn try_add(self, rhs: Self) -> Option<Self> {
        self.checked_add(rhs)
    }

    fn try_sub(self, rhs: Self) -> Option<Self> {
        self.checked_sub(rhs)
    }

    fn into_aggregated(sum: data::Sum<Self>) -> AggregatedMetrics {
        AggregatedMetrics::I64(sum)
    }
}

impl Number for f64 {
    type AtomicValue = F64AtomicValue;

    fn new_atomic_value() -> Self::AtomicValue {
        F64AtomicValue::new()
    }

    fn validate(self, monotonic: bool) -> MetricResult<()> {
        if !self.is_finite() {
            return Err(MetricError::InvalidArgument(format!(
                "measurements must be finite, got {self}"
            )));
        }
        if monotonic && self < 0.0 {
            return Err(MetricError::InvalidArgument(format!(
                "counter increments must be non-negative, got {self}"
            )));
        }
        Ok(())
    }

    fn try_add(self, rhs: Self) -> Option<Self> {
        Some(self + rhs).filter(|sum| sum.is_finite())
    }

    fn try_sub(self, rhs: Self) -> Option<Self> {
        Some(self - rhs).filter(|diff| diff.is_finite())
    }

    fn into_aggregated(sum: data::Sum<Self>) -> AggregatedMetrics {
        AggregatedMetrics::F64(sum)
    }
}

impl AtomicValue<u64> for AtomicU64 {
    fn try_add(&self, value: u64) -> bool {
        self.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            current.checked_add(value)
        })
        .is_ok()
    }

    fn get_value(&self) -> u64 {
        self.load(Ordering::Relaxed)
    }
}

impl AtomicValue<i64> for AtomicI64 {
    fn try_add(&self, value: i64) -> bool {
        self.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            current.checked_add(value)
        })
        .is_ok()
    }

    fn get_value(&self) -> i64 {
        self.load(Ordering::Relaxed)
    }
}

/// `f64` stored as its bit pattern so updates stay lock free.
pub(crate) struct F64AtomicValue {
    inner: AtomicU64,
}

impl F64AtomicValue {
    fn new() -> Self {
        F64AtomicValue {
            inner: AtomicU64::new(0.0_f64.to_bits()),
        }
    }
}

impl AtomicValue<f64> for F64AtomicValue {
    fn try_add(&self, value: f64) -> bool {
        self.inner
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                f64::from_bits(current).try_add(value).map(f64::to_bits)
            })
            .is_ok()
    }

    fn get_value(&self) -> f64 {
        f64::from_bits(self.inner.load(Ordering::Relaxed))
    }
}

/// The running total of one instrument.
///
/// Shared by the instrument handle, which adds to it, and every reader's
/// aggregator, which only ever reads it.
pub(crate) struct RunningTotal<T: Number> {
    value: T::AtomicValue,
    start_time: SystemTime,
}

impl<T: Number> RunningTotal<T> {
    pub(crate) fn new() -> Self {
        RunningTotal {
            value: T::new_atomic_value(),
            start_time: SystemTime::now(),
        }
    }

    /// Adds `value`, rejecting it if the total would leave the range of `T`.
    pub(crate) fn add(&self, value: T) -> MetricResult<()> {
        if self.value.try_add(value) {
            Ok(())
        } else {
            Err(MetricError::InvalidArgument(format!(
                "adding {value} would overflow the running total"
            )))
        }
    }

    pub(crate) fn get(&self) -> T {
        self.value.get_value()
    }

    /// When the instrument was created; the start of every cumulative window.
    pub(crate) fn start_time(&self) -> SystemTime {
        self.start_time
    }
}

impl<T: Number> fmt::Debug for RunningTotal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningTotal")
            .field("value", &self.get())
            .field("start_time", &self.start_time)
            .finish()
    }
}
