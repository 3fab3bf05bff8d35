use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::metrics::{AccessProf, AggregationPatterns, Report, ReportSummary};

use super::{AppError, ReportQuery};

/// Builds the report off the async workers: it may flush and re-read the
/// log file.
pub(super) async fn build_report(prof: AccessProf, query: ReportQuery) -> Result<Report, AppError> {
    tokio::task::spawn_blocking(move || {
        let patterns = AggregationPatterns::from_query(query.agg.as_deref().unwrap_or(""))?;
        prof.report(&patterns)
    })
    .await
    .map_err(|e| AppError::Internal(format!("report task failed: {e}")))?
    .map_err(AppError::from)
}

// ─── GET {report} ────────────────────────────────────────────────

pub async fn get_report(
    State(prof): State<AccessProf>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ReportSummary>, AppError> {
    let report = build_report(prof, query).await?;
    Ok(Json(report.summary()))
}

// ─── GET {report}/table ──────────────────────────────────────────

pub async fn get_report_table(
    State(prof): State<AccessProf>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = build_report(prof, query).await?;
    let since = report
        .since()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".into());
    let body = format!(
        "{} requests (since {since})\n{report}\n",
        report.total_requests()
    );
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

// ─── DELETE {report} ─────────────────────────────────────────────

pub async fn reset_report(State(prof): State<AccessProf>) -> StatusCode {
    prof.reset();
    StatusCode::OK
}
