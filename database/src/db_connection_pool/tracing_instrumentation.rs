use std::time::Instant;

use diesel::connection::Instrumentation;
use diesel::connection::InstrumentationEvent;
use opentelemetry_semantic_conventions::attribute::DB_QUERY_TEXT;
use opentelemetry_semantic_conventions::attribute::DB_SYSTEM_NAME;
use tracing::Span;

/// Opens a `sql_query` span for each query ran on the connection
///
/// The span is closed when diesel reports the end of the query, so its duration
/// matches the one of the database round trip.
#[derive(Debug, Default)]
pub(super) struct TracingInstrumentation {
    current_query: Option<(Span, Instant)>,
}

impl Instrumentation for TracingInstrumentation {
    fn on_connection_event(&mut self, event: InstrumentationEvent<'_>) {
        match event {
            InstrumentationEvent::StartQuery { query, .. } => {
                let span = tracing::debug_span!(
                    "sql_query",
                    "db.system.name" = tracing::field::Empty,
                    "db.query.text" = tracing::field::Empty,
                );
                span.record(DB_SYSTEM_NAME, "postgresql");
                span.record(DB_QUERY_TEXT, query.to_string());
                self.current_query = Some((span, Instant::now()));
            }
            InstrumentationEvent::FinishQuery { error, .. } => {
                let Some((span, started)) = self.current_query.take() else {
                    return;
                };
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match error {
                    Some(error) => {
                        tracing::debug!(parent: &span, elapsed_ms, %error, "query failed")
                    }
                    None => tracing::trace!(parent: &span, elapsed_ms, "query done"),
                }
            }
            InstrumentationEvent::BeginTransaction { depth, .. } => {
                tracing::trace!(depth = depth.get(), "begin transaction");
            }
            InstrumentationEvent::CommitTransaction { depth, .. } => {
                tracing::trace!(depth = depth.get(), "commit transaction");
            }
            InstrumentationEvent::RollbackTransaction { depth, .. } => {
                tracing::debug!(depth = depth.get(), "rollback transaction");
            }
            _ => {}
        }
    }
}
