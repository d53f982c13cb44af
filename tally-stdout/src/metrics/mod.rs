mod exporter;
mod transform;

pub use exporter::{MetricExporter, MetricExporterBuilder};
pub use transform::MetricsData;
