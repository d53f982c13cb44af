use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::{
    borrow::Cow,
    time::{SystemTime, UNIX_EPOCH},
};
use tally_sdk::metrics::{data, InstrumentationScope};

/// Transformed metrics data that can be serialized
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MetricsData {
    scope_metrics: Vec<ScopeMetrics>,
}

impl From<&data::MetricBatch> for MetricsData {
    fn from(value: &data::MetricBatch) -> Self {
        MetricsData {
            scope_metrics: value.scope_metrics.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct ScopeMetrics {
    scope: Scope,
    metrics: Vec<Metric>,
}

impl From<&data::ScopeMetrics> for ScopeMetrics {
    fn from(value: &data::ScopeMetrics) -> Self {
        ScopeMetrics {
            scope: (&value.scope).into(),
            metrics: value.metrics.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct Scope {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema_url: Option<String>,
}

impl From<&InstrumentationScope> for Scope {
    fn from(value: &InstrumentationScope) -> Self {
        Scope {
            name: value.name().to_owned(),
            version: value.version().map(ToOwned::to_owned),
            schema_url: value.schema_url().map(ToOwned::to_owned),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct Metric {
    name: Cow<'static, str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: Cow<'static, str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    unit: Cow<'static, str>,
    #[serde(flatten)]
    data: MetricData,
}

impl From<&data::Metric> for Metric {
    fn from(value: &data::Metric) -> Self {
        Metric {
            name: value.name.clone(),
            description: value.description.clone(),
            unit: value.unit.clone(),
            data: (&value.data).into(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
enum MetricData {
    Sum(Sum),
}

impl From<&data::AggregatedMetrics> for MetricData {
    fn from(value: &data::AggregatedMetrics) -> Self {
        match value {
            data::AggregatedMetrics::U64(sum) => MetricData::Sum(sum.into()),
            data::AggregatedMetrics::I64(sum) => MetricData::Sum(sum.into()),
            data::AggregatedMetrics::F64(sum) => MetricData::Sum(sum.into()),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
enum DataValue {
    F64(f64),
    I64(i64),
    U64(u64),
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::F64(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::I64(value)
    }
}

impl From<u64> for DataValue {
    fn from(value: u64) -> Self {
        DataValue::U64(value)
    }
}

/// Wire values follow the OTLP `AggregationTemporality` enum.
#[derive(Debug, Clone, Copy)]
enum Temporality {
    Delta = 1,
    Cumulative = 2,
}

impl Serialize for Temporality {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

impl From<tally_sdk::metrics::Temporality> for Temporality {
    fn from(value: tally_sdk::metrics::Temporality) -> Self {
        match value {
            tally_sdk::metrics::Temporality::Delta => Temporality::Delta,
            // Cumulative, and anything added later, reports as cumulative
            _ => Temporality::Cumulative,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct Sum {
    data_points: Vec<DataPoint>,
    aggregation_temporality: Temporality,
    is_monotonic: bool,
}

impl<T: Into<DataValue> + Copy> From<&data::Sum<T>> for Sum {
    fn from(value: &data::Sum<T>) -> Self {
        Sum {
            data_points: vec![(&value.data_point).into()],
            aggregation_temporality: value.temporality.into(),
            is_monotonic: value.is_monotonic,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct DataPoint {
    #[serde(serialize_with = "as_rfc3339")]
    start_time: SystemTime,
    #[serde(serialize_with = "as_rfc3339")]
    time: SystemTime,
    value: DataValue,
}

impl<T: Into<DataValue> + Copy> From<&data::SumDataPoint<T>> for DataPoint {
    fn from(value: &data::SumDataPoint<T>) -> Self {
        DataPoint {
            start_time: value.start_time,
            time: value.time,
            value: value.value.into(),
        }
    }
}

fn as_rfc3339<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = i64::try_from(since_epoch.as_secs())
        .map_err(|_| serde::ser::Error::custom("Invalid Timestamp."))?;

    match DateTime::<Utc>::from_timestamp(secs, since_epoch.subsec_nanos()) {
        Some(datetime) => {
            serializer.serialize_str(&datetime.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        None => Err(serde::ser::Error::custom("Invalid Timestamp.")),
    }
}
