mod passes;
mod properties;
mod running;
mod scenarios;

use crate::{
    config::CompileConfig,
    error::CompileError,
    model::{FieldRegistry, TableKind},
    obs::{CompileCounters, CountersReport},
    query::{CallsQuery, CompiledQuery, QueryContext},
    value::Value,
};

fn compile(query: CallsQuery) -> CompiledQuery {
    query.compile().expect("query compiles")
}

fn compile_err(query: CallsQuery) -> CompileError {
    query.compile().expect_err("query is rejected")
}

// Compile with a counting sink and return what it saw.
fn compile_counted(queries: Vec<CallsQuery>) -> CountersReport {
    let config = CompileConfig::default();
    let counters = CompileCounters::new();
    let ctx = QueryContext::new(FieldRegistry::calls(), &config).with_sink(&counters);
    for query in queries {
        let _ = query.compile_with(&ctx);
    }

    counters.report()
}

fn has_value(compiled: &CompiledQuery, value: &str) -> bool {
    compiled.params.name_of(&Value::from(value)).is_some()
}

fn merged(project: &str) -> CallsQuery {
    CallsQuery::new(project).table(TableKind::Merged)
}

fn complete(project: &str) -> CallsQuery {
    CallsQuery::new(project).table(TableKind::Complete)
}
