//! Metrics sink boundary.
//!
//! Compilation never touches counters directly; it reports `CompileEvent`s
//! to whatever `MetricsSink` the caller installed on the `QueryContext`.

use crate::{model::table::TableKind, query::optimize::PassSet};
use std::sync::atomic::{AtomicU64, Ordering};

///
/// CompileEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompileEvent {
    Compiled {
        table: TableKind,
        passes: PassSet,
        ctes: usize,
        params: usize,
    },
    Rejected {
        reason: &'static str,
    },
    NoOp,
}

///
/// MetricsSink
///

pub trait MetricsSink: Sync {
    fn record(&self, event: CompileEvent);
}

///
/// NoopSink
///

#[derive(Debug, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _event: CompileEvent) {}
}

///
/// CompileCounters
///
/// Process-local atomic counters; safe to share across request threads.
///

#[derive(Debug, Default)]
pub struct CompileCounters {
    compiled: AtomicU64,
    rejected: AtomicU64,
    noops: AtomicU64,
    pushdowns: AtomicU64,
    like_prefilters: AtomicU64,
    datetime_prefilters: AtomicU64,
    object_ref_queries: AtomicU64,
    feedback_joins: AtomicU64,
    cost_chains: AtomicU64,
    storage_joins: AtomicU64,
}

impl CompileCounters {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            compiled: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            noops: AtomicU64::new(0),
            pushdowns: AtomicU64::new(0),
            like_prefilters: AtomicU64::new(0),
            datetime_prefilters: AtomicU64::new(0),
            object_ref_queries: AtomicU64::new(0),
            feedback_joins: AtomicU64::new(0),
            cost_chains: AtomicU64::new(0),
            storage_joins: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn report(&self) -> CountersReport {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        CountersReport {
            compiled: load(&self.compiled),
            rejected: load(&self.rejected),
            noops: load(&self.noops),
            pushdowns: load(&self.pushdowns),
            like_prefilters: load(&self.like_prefilters),
            datetime_prefilters: load(&self.datetime_prefilters),
            object_ref_queries: load(&self.object_ref_queries),
            feedback_joins: load(&self.feedback_joins),
            cost_chains: load(&self.cost_chains),
            storage_joins: load(&self.storage_joins),
        }
    }
}

impl MetricsSink for CompileCounters {
    fn record(&self, event: CompileEvent) {
        let bump = |counter: &AtomicU64, hit: bool| {
            if hit {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        };

        match event {
            CompileEvent::Compiled { passes, .. } => {
                bump(&self.compiled, true);
                bump(&self.pushdowns, passes.pushdown);
                bump(&self.like_prefilters, passes.like_prefilter);
                bump(&self.datetime_prefilters, passes.datetime_prefilter);
                bump(&self.object_ref_queries, passes.object_refs);
                bump(&self.feedback_joins, passes.feedback_join);
                bump(&self.cost_chains, passes.costs);
                bump(&self.storage_joins, passes.storage_size);
            }
            CompileEvent::Rejected { .. } => bump(&self.rejected, true),
            CompileEvent::NoOp => bump(&self.noops, true),
        }
    }
}

///
/// CountersReport
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CountersReport {
    pub compiled: u64,
    pub rejected: u64,
    pub noops: u64,
    pub pushdowns: u64,
    pub like_prefilters: u64,
    pub datetime_prefilters: u64,
    pub object_ref_queries: u64,
    pub feedback_joins: u64,
    pub cost_chains: u64,
    pub storage_joins: u64,
}
