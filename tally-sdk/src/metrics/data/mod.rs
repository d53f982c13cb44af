//! Types for delivery of aggregated metric data to exporters.

use std::{borrow::Cow, time::SystemTime};

use super::{InstrumentationScope, Temporality};

/// Everything one reader collected in one collection cycle.
///
/// This is the batch handed to [PushMetricExporter::export].
///
/// [PushMetricExporter::export]: crate::metrics::PushMetricExporter::export
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricBatch {
    /// The collected metrics, grouped by the scope of the meter that created
    /// them.
    pub scope_metrics: Vec<ScopeMetrics>,
}

impl MetricBatch {
    /// Whether the batch holds no metric at all.
    pub fn is_empty(&self) -> bool {
        self.scope_metrics.iter().all(|sm| sm.metrics.is_empty())
    }

    /// Iterates over every metric in the batch, regardless of scope.
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.scope_metrics.iter().flat_map(|sm| sm.metrics.iter())
    }

    /// Finds the first metric with the given instrument name.
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics().find(|m| m.name == name)
    }
}

/// A collection of metrics produced by a meter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeMetrics {
    /// The [InstrumentationScope] that the meter was created with.
    pub scope: InstrumentationScope,
    /// The list of aggregations created by the meter.
    pub metrics: Vec<Metric>,
}

/// The aggregated state of one instrument at one collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// The name of the instrument that created this data.
    pub name: Cow<'static, str>,
    /// The description of the instrument, which can be used in documentation.
    pub description: Cow<'static, str>,
    /// The unit in which the instrument reports.
    pub unit: Cow<'static, str>,
    /// The aggregated data from an instrument.
    pub data: AggregatedMetrics,
}

/// Aggregated data of an instrument, by value type.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregatedMetrics {
    /// Sum with `u64` values.
    U64(Sum<u64>),
    /// Sum with `i64` values.
    I64(Sum<i64>),
    /// Sum with `f64` values.
    F64(Sum<f64>),
}

impl AggregatedMetrics {
    /// The temporality the data was aggregated with.
    pub fn temporality(&self) -> Temporality {
        match self {
            AggregatedMetrics::U64(sum) => sum.temporality,
            AggregatedMetrics::I64(sum) => sum.temporality,
            AggregatedMetrics::F64(sum) => sum.temporality,
        }
    }

    /// Whether the sum can only grow.
    pub fn is_monotonic(&self) -> bool {
        match self {
            AggregatedMetrics::U64(sum) => sum.is_monotonic,
            AggregatedMetrics::I64(sum) => sum.is_monotonic,
            AggregatedMetrics::F64(sum) => sum.is_monotonic,
        }
    }

    /// The data point value widened to `f64`. May lose precision for very
    /// large integers.
    pub fn value_as_f64(&self) -> f64 {
        match self {
            AggregatedMetrics::U64(sum) => sum.data_point.value as f64,
            AggregatedMetrics::I64(sum) => sum.data_point.value as f64,
            AggregatedMetrics::F64(sum) => sum.data_point.value,
        }
    }

    /// The `(start_time, time)` window the data point covers.
    pub fn window(&self) -> (SystemTime, SystemTime) {
        match self {
            AggregatedMetrics::U64(sum) => (sum.data_point.start_time, sum.data_point.time),
            AggregatedMetrics::I64(sum) => (sum.data_point.start_time, sum.data_point.time),
            AggregatedMetrics::F64(sum) => (sum.data_point.start_time, sum.data_point.time),
        }
    }
}

/// Represents the sum of all measurements of values from an instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct Sum<T> {
    /// The aggregated value for the collection window.
    pub data_point: SumDataPoint<T>,
    /// Describes if the aggregation is reported as the change from the last report
    /// time, or the cumulative changes since a fixed start time.
    pub temporality: Temporality,
    /// Whether this aggregation only increases or decreases.
    pub is_monotonic: bool,
}

/// A single value together with the time window it covers.
///
/// For cumulative sums the window starts when the instrument was created.
/// For delta sums it starts at the previous collection by the same reader.
#[derive(Clone, Debug, PartialEq)]
pub struct SumDataPoint<T> {
    /// The value of this data point.
    pub value: T,
    /// The time when the window started.
    pub start_time: SystemTime,
    /// The time when the window ended.
    pub time: SystemTime,
}
