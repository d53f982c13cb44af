//! Export tally metrics to stdout.
//!
//! Every export writes one JSON document on its own line, so the output can be
//! piped into line oriented tools.
//!
//! # Examples
//!
//! ```no_run
//! use tally_sdk::metrics::{PeriodicReader, SdkMeterProvider};
//!
//! fn init_metrics() -> SdkMeterProvider {
//!     let exporter = tally_stdout::MetricExporter::default();
//!     let reader = PeriodicReader::builder(exporter).build();
//!     SdkMeterProvider::builder().with_reader(reader).build()
//! }
//!
//! let meter_provider = init_metrics();
//!
//! // recorded metrics will now be sent to stdout:
//!
//! // {"scopeMetrics":[{"scope":{"name":"my_app"},"metrics":[{"name":"c1","sum":{"dataPoints":[...
//! # drop(meter_provider);
//! ```
#![warn(missing_debug_implementations, missing_docs)]

mod metrics;
pub use metrics::*;
