use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::warn;

use super::{AccessProf, AggregationPatterns};
use crate::handlers::{AppError, ReportQuery};

/// How often a fresh report is pushed to SSE subscribers.
const STREAM_INTERVAL: Duration = Duration::from_secs(1);

// ─── GET {report}/stream ─────────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a full `ReportSummary` as JSON every second. Patterns are
/// compiled once, up front, so a bad `agg` fails the request instead of
/// every tick. Each report is built on the blocking pool.

pub async fn report_stream(
    State(prof): State<AccessProf>,
    Query(query): Query<ReportQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    let patterns = Arc::new(AggregationPatterns::from_query(
        query.agg.as_deref().unwrap_or(""),
    )?);
    let interval = tokio::time::interval(STREAM_INTERVAL);

    let stream = IntervalStream::new(interval).then(move |_| {
        let prof = prof.clone();
        let patterns = Arc::clone(&patterns);
        async move {
            let built = tokio::task::spawn_blocking(move || prof.report(&patterns)).await;
            let event = match built {
                Ok(Ok(report)) => {
                    let json = serde_json::to_string(&report.summary()).unwrap_or_default();
                    Event::default().event("report").data(json)
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "report stream tick failed");
                    Event::default().event("error").data(err.to_string())
                }
                Err(err) => {
                    warn!(error = %err, "report stream task failed");
                    Event::default().event("error").data(err.to_string())
                }
            };
            Ok::<_, Infallible>(event)
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
