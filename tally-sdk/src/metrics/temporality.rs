use std::collections::HashMap;
use std::env;

use super::{InstrumentKind, Temporality};

const TEMPORALITY_PREFERENCE_NAME: &str = "OTEL_EXPORTER_METRICS_TEMPORALITY_PREFERENCE";

/// The [Temporality] an exporter wants for each [InstrumentKind].
///
/// Kinds without an explicit entry resolve to [Temporality::Cumulative].
/// A preference is fixed once the exporter holding it is built.
///
/// ```
/// use tally_sdk::metrics::{InstrumentKind, Temporality, TemporalityPreference};
///
/// let preference = TemporalityPreference::default()
///     .with(InstrumentKind::Counter, Temporality::Delta);
///
/// assert_eq!(preference.get(InstrumentKind::Counter), Temporality::Delta);
/// assert_eq!(preference.get(InstrumentKind::UpDownCounter), Temporality::Cumulative);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemporalityPreference {
    by_kind: HashMap<InstrumentKind, Temporality>,
}

impl TemporalityPreference {
    /// Cumulative for every kind.
    pub fn cumulative() -> Self {
        Self::default()
    }

    /// Delta for counters, cumulative for up-down counters.
    ///
    /// A delta of a non-monotonic sum is rarely useful on its own, so
    /// up-down counters keep reporting their running total.
    pub fn delta() -> Self {
        Self::default().with(InstrumentKind::Counter, Temporality::Delta)
    }

    /// The same temporality for every kind.
    pub fn uniform(temporality: Temporality) -> Self {
        Self::default()
            .with(InstrumentKind::Counter, temporality)
            .with(InstrumentKind::UpDownCounter, temporality)
    }

    /// Reads `OTEL_EXPORTER_METRICS_TEMPORALITY_PREFERENCE`.
    ///
    /// `delta` selects [TemporalityPreference::delta]; `cumulative`, an unset
    /// variable or any other value selects the cumulative default.
    pub fn from_env() -> Self {
        match env::var(TEMPORALITY_PREFERENCE_NAME) {
            Ok(value) if value.trim().eq_ignore_ascii_case("delta") => Self::delta(),
            _ => Self::cumulative(),
        }
    }

    /// Sets the temporality used for `kind`.
    pub fn with(mut self, kind: InstrumentKind, temporality: Temporality) -> Self {
        self.by_kind.insert(kind, temporality);
        self
    }

    /// Resolves the temporality for `kind`.
    pub fn get(&self, kind: InstrumentKind) -> Temporality {
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }
}

impl From<Temporality> for TemporalityPreference {
    fn from(temporality: Temporality) -> Self {
        match temporality {
            Temporality::Cumulative => Self::cumulative(),
            Temporality::Delta => Self::delta(),
        }
    }
}
