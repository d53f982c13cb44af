//! # Tally SDK
//!
//! An in-process metrics engine. Instruments accumulate running totals,
//! readers periodically turn those totals into data points in the
//! temporality their exporter prefers, and exporters ship the result.
//!
//! Every reader keeps its own aggregation state, so one instrument can be
//! exported as a cumulative sum to one sink and as per-interval deltas to
//! another at the same time.
//!
//! ```
//! # #[cfg(feature = "testing")]
//! # {
//! use tally_sdk::metrics::{
//!     InMemoryMetricExporter, PeriodicReader, SdkMeterProvider, Temporality,
//! };
//!
//! let cumulative = InMemoryMetricExporter::default();
//! let delta = InMemoryMetricExporter::builder()
//!     .with_temporality(Temporality::Delta)
//!     .build();
//!
//! let provider = SdkMeterProvider::builder()
//!     .with_reader(PeriodicReader::builder(cumulative.clone()).build())
//!     .with_reader(PeriodicReader::builder(delta.clone()).build())
//!     .build();
//!
//! let counter = provider.meter("preferred-temporality").u64_counter("requests").build();
//! counter.add(5).unwrap();
//!
//! provider.shutdown().unwrap();
//! # }
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![cfg_attr(test, deny(warnings))]

pub mod error;
mod internal_logging;
pub mod metrics;

/// Items used by the exported logging macros. Not part of the public API.
#[doc(hidden)]
pub mod _private {
    #[cfg(feature = "internal-logs")]
    pub use tracing::{debug, error, info, warn};
}
