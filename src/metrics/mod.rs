pub mod ltsv;
pub mod percentiles;
pub mod report;
pub mod segment;
pub mod store;
pub mod stream;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use percentiles::PercentileSet;
pub use report::{AggregationPatterns, Report, ReportSummary, SegmentSummary};
pub use segment::{build_segments, Segment};
pub use store::AccessProf;

/// Request body size recorded when the transport did not report one.
pub const UNKNOWN_BODY_SIZE: i64 = -1;

/// One completed request, as seen by the recording middleware.
/// This is the "write" side: the middleware creates these and pushes them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub method: String,
    /// Raw request path, not normalized.
    pub path: String,
    /// `Content-Length` of the request, or [`UNKNOWN_BODY_SIZE`].
    pub request_body_size: i64,
    pub status: u16,
    pub response_body_size: u64,
    pub response_time: Duration,
    pub accessed_at: DateTime<Utc>,
}

impl Observation {
    /// An observation with no request size, zero latency and an empty body,
    /// stamped now. Tests and synthetic traffic fill in the rest.
    pub fn new(method: impl Into<String>, path: impl Into<String>, status: u16) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            request_body_size: UNKNOWN_BODY_SIZE,
            status,
            response_body_size: 0,
            response_time: Duration::ZERO,
            accessed_at: Utc::now(),
        }
    }

    pub fn with_response(mut self, body_size: u64, elapsed: Duration) -> Self {
        self.response_body_size = body_size;
        self.response_time = elapsed;
        self
    }

    pub fn with_request_body_size(mut self, size: i64) -> Self {
        self.request_body_size = size;
        self
    }

    pub fn at(mut self, accessed_at: DateTime<Utc>) -> Self {
        self.accessed_at = accessed_at;
        self
    }
}
