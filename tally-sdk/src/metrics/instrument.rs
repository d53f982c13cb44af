use std::borrow::Cow;

/// The identifier of a group of instruments that all perform the same function.
///
/// Temporality preferences are resolved per kind, never per instrument.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum InstrumentKind {
    /// Identifies a group of instruments that record increasing values synchronously
    /// with the code path they are measuring.
    Counter,
    /// A group of instruments that record increasing and decreasing values
    /// synchronously with the code path they are measuring.
    UpDownCounter,
}

impl InstrumentKind {
    /// Whether the sum produced by this kind of instrument never decreases.
    pub fn is_monotonic(&self) -> bool {
        matches!(self, InstrumentKind::Counter)
    }
}

/// Information about the library or component that created a set of
/// instruments.
///
/// Two scopes are equal when name, version and schema URL are all equal.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct InstrumentationScope {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
    schema_url: Option<Cow<'static, str>>,
}

impl InstrumentationScope {
    /// Create a new builder for a scope with the given name.
    pub fn builder<T: Into<Cow<'static, str>>>(name: T) -> InstrumentationScopeBuilder {
        InstrumentationScopeBuilder {
            name: name.into(),
            version: None,
            schema_url: None,
        }
    }

    /// Returns the scope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the scope version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns the schema URL, if any.
    pub fn schema_url(&self) -> Option<&str> {
        self.schema_url.as_deref()
    }
}

/// Configuration options for [InstrumentationScope].
#[derive(Debug)]
pub struct InstrumentationScopeBuilder {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
    schema_url: Option<Cow<'static, str>>,
}

impl InstrumentationScopeBuilder {
    /// Configure the version of the instrumented component.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Configure the schema URL the emitted telemetry follows.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    /// Create a new [InstrumentationScope] from this configuration.
    pub fn build(self) -> InstrumentationScope {
        InstrumentationScope {
            name: self.name,
            version: self.version,
            schema_url: self.schema_url,
        }
    }
}

/// Identity of an instrument as seen by pipelines and exporters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct InstrumentDescriptor {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
}
