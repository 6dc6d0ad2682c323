//! Observability: compile telemetry and sink abstractions.
//!
//! Structured logs go through `tracing`; counters go through `MetricsSink`.

pub(crate) mod sink;

pub use sink::{CompileCounters, CompileEvent, CountersReport, MetricsSink, NoopSink};
