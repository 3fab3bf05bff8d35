use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use http_body::{Body as HttpBody, Frame, SizeHint};
use tracing::debug;

use crate::metrics::{AccessProf, Observation, UNKNOWN_BODY_SIZE};

/// Middleware that records one [`Observation`] per request into the
/// profiler passed as state:
///
/// ```ignore
/// app.layer(axum::middleware::from_fn_with_state(prof, record_requests))
/// ```
///
/// Recording never changes the response and never fails the request.
/// A body with a known length is recorded as soon as the handler returns.
/// Any other body is counted frame by frame as the client reads it, and the
/// observation is recorded when the body ends, fails or is dropped.
pub async fn record_requests(
    State(prof): State<AccessProf>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().as_str().to_owned();
    let path = req.uri().path().to_owned();
    let request_body_size = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(UNKNOWN_BODY_SIZE);

    let accessed_at = Utc::now();
    let start = Instant::now();
    let response = next.run(req).await;

    let obs = Observation {
        method,
        path,
        request_body_size,
        status: response.status().as_u16(),
        response_body_size: 0,
        response_time: start.elapsed(),
        accessed_at,
    };

    if let Some(size) = response.body().size_hint().exact() {
        finish(&prof, obs, size, start);
        return response;
    }

    let (parts, body) = response.into_parts();
    let body = CountingBody {
        inner: body,
        prof,
        pending: Some(obs),
        bytes: 0,
        start,
    };
    Response::from_parts(parts, Body::new(body))
}

fn finish(prof: &AccessProf, mut obs: Observation, bytes: u64, start: Instant) {
    obs.response_body_size = bytes;
    obs.response_time = start.elapsed();
    debug!(
        method = %obs.method,
        path = %obs.path,
        status = obs.status,
        bytes,
        elapsed_us = obs.response_time.as_micros() as u64,
        "recorded request"
    );
    prof.record(obs);
}

// ─── Streamed bodies ─────────────────────────────────────────────

/// Passes frames through untouched while counting data bytes.
struct CountingBody {
    inner: Body,
    prof: AccessProf,
    // Taken once the observation is recorded
    pending: Option<Observation>,
    bytes: u64,
    start: Instant,
}

impl CountingBody {
    fn complete(&mut self) {
        if let Some(obs) = self.pending.take() {
            finish(&self.prof, obs, self.bytes, self.start);
        }
    }
}

impl HttpBody for CountingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        let polled = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        match &polled {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
                if this.inner.is_end_stream() {
                    this.complete();
                }
            }
            Some(Err(err)) => {
                debug!(error = %err, "response body failed");
                this.complete();
            }
            None => this.complete(),
        }
        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CountingBody {
    fn drop(&mut self) {
        self.complete();
    }
}
