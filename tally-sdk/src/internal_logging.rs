//! Structured diagnostics emitted by the SDK itself.
//!
//! The macros are exported so that exporter crates built on this SDK can
//! report through the same channel. They are not meant for application
//! logging.
//!
//! Every event carries a stable `name` plus optional `key = value` fields.
//! With the `internal-logs` feature the events go to [`tracing`] under the
//! calling crate's name as target; under `cfg(test)` they are also printed so
//! `cargo test -- --nocapture` shows them.
//!
//! [`tracing`]: https://docs.rs/tracing
#![allow(unused_macros)]

/// Shared body of the level macros below. `$level` names the `tracing` macro.
// TODO: drop the duplicated `name` field once tracing-subscriber's fmt layer prints event names.
#[doc(hidden)]
#[macro_export]
macro_rules! __tally_event {
    ($level:ident, $name:expr $(, $key:ident = $value:expr)*) => {{
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name $(, $key = $value)*);
        }

        #[cfg(test)]
        {
            print!(concat!("tally_", stringify!($level), ": name={}"), $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )*
            println!();
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name $(, $value)*);
        }
    }};
}

/// Log an informational lifecycle event.
///
/// ```rust
/// use tally_sdk::tally_info;
/// tally_info!(name: "MeterProvider.Built", readers = 2);
/// ```
#[macro_export]
macro_rules! tally_info {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__tally_event!(info, $name $(, $key = $value)*)
    };
}

/// Log a recoverable problem, such as a failed or skipped export.
#[macro_export]
macro_rules! tally_warn {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__tally_event!(warn, $name $(, $key = $value)*)
    };
}

/// Log a fine grained event useful while debugging the pipeline.
///
/// ```rust
/// use tally_sdk::tally_debug;
/// tally_debug!(name: "Pipeline.InstrumentAdded", instrument_name = "requests");
/// ```
#[macro_export]
macro_rules! tally_debug {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__tally_event!(debug, $name $(, $key = $value)*)
    };
}

/// Log a failure the SDK could not recover from on its own.
///
/// ```rust
/// use tally_sdk::tally_error;
/// tally_error!(name: "PeriodicReader.ThreadStartFailed", error = "resource exhausted");
/// ```
#[macro_export]
macro_rules! tally_error {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__tally_event!(error, $name $(, $key = $value)*)
    };
}
