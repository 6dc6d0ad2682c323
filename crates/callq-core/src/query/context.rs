use crate::{
    config::CompileConfig,
    model::FieldRegistry,
    obs::{MetricsSink, NoopSink},
};
use std::{fmt, sync::LazyLock};

static DEFAULT_CONFIG: LazyLock<CompileConfig> = LazyLock::new(CompileConfig::default);
static NOOP: NoopSink = NoopSink;

///
/// QueryContext
///
/// Everything a compile reads besides the request itself: the field
/// registry, limits and toggles, and where telemetry goes. Contexts are
/// cheap to copy and safe to share between threads.
///

#[derive(Clone, Copy)]
pub struct QueryContext<'a> {
    pub(crate) fields: &'a FieldRegistry,
    pub(crate) config: &'a CompileConfig,
    pub(crate) sink: &'a dyn MetricsSink,
}

impl<'a> QueryContext<'a> {
    #[must_use]
    pub const fn new(fields: &'a FieldRegistry, config: &'a CompileConfig) -> Self {
        Self {
            fields,
            config,
            sink: &NOOP,
        }
    }

    /// Calls schema with default limits and no metrics.
    #[must_use]
    pub fn standard() -> QueryContext<'static> {
        QueryContext::new(FieldRegistry::calls(), &DEFAULT_CONFIG)
    }

    #[must_use]
    pub fn with_sink(mut self, sink: &'a dyn MetricsSink) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &'a CompileConfig {
        self.config
    }

    #[must_use]
    pub const fn fields(&self) -> &'a FieldRegistry {
        self.fields
    }
}

impl Default for QueryContext<'static> {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for QueryContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("fields", &self.fields)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
