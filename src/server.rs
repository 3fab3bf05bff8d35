use axum::{
    middleware as axum_mw,
    routing::get,
    Router,
};

use crate::handlers::{html, report};
use crate::metrics::{stream, AccessProf};
use crate::middleware::timing;

/// Wrap every route registered on `app` so far with request recording.
/// Routes added afterwards (e.g. the report endpoints) are not recorded.
pub fn instrument<S>(app: Router<S>, prof: AccessProf) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    app.layer(axum_mw::from_fn_with_state(prof, timing::record_requests))
}

/// Report endpoints, meant to be nested under a path of the host's choosing:
///
///   GET    /         JSON report      (`?agg=pattern,pattern`)
///   GET    /table    plain-text table
///   GET    /html     browser page with an `agg` form and a Reset button
///   GET    /stream   SSE, one JSON report per second
///   DELETE /         reset the in-memory buffer (also on /html)
pub fn report_router(prof: AccessProf) -> Router {
    Router::new()
        .route("/", get(report::get_report).delete(report::reset_report))
        .route("/table", get(report::get_report_table))
        .route(
            "/html",
            get(html::get_report_html).delete(report::reset_report),
        )
        .route("/stream", get(stream::report_stream))
        .with_state(prof)
}
